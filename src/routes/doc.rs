use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    bog::{CallbackBody, CallbackPayload},
    dto::{
        admin::{AuditLogList, InventoryAdjustRequest, InventoryLevel},
        auth::{LoginRequest, LoginResponse, RegisterRequest, VerifyEmailRequest},
        cart::{AddToCartRequest, CartDto, UpdateCartItemRequest},
        orders::{CreateOrderRequest, OrderList, OrderWithItems, UpdateOrderStatusRequest},
        payments::{BogPaymentStarted, BogPaymentStatus, BogTokenInfo, CallbackAck},
        products::{
            CategoryList, CreateProductRequest, CreateSizeRequest, ProductDetail, ProductList,
            UpdateProductRequest, UpdateSizeRequest,
        },
        users::{AdminUpdateUserRequest, UpdatePaymentMethodRequest, UpdateProfileRequest, UserList},
    },
    models::{
        AuditLog, CartLine, Order, OrderItem, OrderStatus, PaymentMethod, PaymentResult, Product,
        ProductSize, ShippingAddress, User,
    },
    pricing::CartTotals,
    response::{ApiResponse, Meta},
    routes::{
        admin, auth, cart, health, orders, params, payments, products as product_routes, users,
    },
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::register,
        auth::login,
        auth::logout,
        auth::verify,
        product_routes::list_products,
        product_routes::list_categories,
        product_routes::get_product,
        cart::get_cart,
        cart::add_to_cart,
        cart::update_cart_item,
        cart::remove_from_cart,
        users::me,
        users::update_profile,
        users::update_address,
        users::update_payment_method,
        orders::list_orders,
        orders::create_order,
        orders::get_order,
        payments::start_bog_payment,
        payments::bog_payment_status,
        payments::bog_callback,
        admin::create_product,
        admin::update_product,
        admin::delete_product,
        admin::create_size,
        admin::update_size,
        admin::delete_size,
        admin::list_low_stock,
        admin::adjust_inventory,
        admin::list_all_orders,
        admin::get_order_admin,
        admin::update_order_status,
        admin::mark_order_paid,
        admin::mark_delivered,
        admin::delete_order,
        admin::list_users,
        admin::update_user,
        admin::delete_user,
        admin::list_audit_logs,
        admin::bog_token
    ),
    components(
        schemas(
            User,
            Product,
            ProductSize,
            CartLine,
            CartTotals,
            ShippingAddress,
            PaymentMethod,
            PaymentResult,
            OrderStatus,
            Order,
            OrderItem,
            AuditLog,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            VerifyEmailRequest,
            AddToCartRequest,
            UpdateCartItemRequest,
            CartDto,
            UpdateProfileRequest,
            UpdatePaymentMethodRequest,
            AdminUpdateUserRequest,
            UserList,
            CreateOrderRequest,
            UpdateOrderStatusRequest,
            OrderList,
            OrderWithItems,
            BogPaymentStarted,
            BogPaymentStatus,
            BogTokenInfo,
            CallbackAck,
            CallbackPayload,
            CallbackBody,
            CreateProductRequest,
            UpdateProductRequest,
            CreateSizeRequest,
            UpdateSizeRequest,
            ProductList,
            ProductDetail,
            CategoryList,
            InventoryAdjustRequest,
            InventoryLevel,
            AuditLogList,
            params::Pagination,
            params::ProductQuery,
            params::OrderListQuery,
            params::UserListQuery,
            params::LowStockQuery,
            params::AuditLogQuery,
            Meta,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<CartDto>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<User>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Registration, login and email verification"),
        (name = "Products", description = "Catalog browsing"),
        (name = "Cart", description = "Guest and user carts"),
        (name = "Users", description = "Profile, address and payment preference"),
        (name = "Orders", description = "Checkout and order history"),
        (name = "Payments", description = "Bank of Georgia payments"),
        (name = "Admin", description = "Back office endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
