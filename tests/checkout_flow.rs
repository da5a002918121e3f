mod common;

use common::FakeBog;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use secrecy::SecretString;
use storefront_api::{
    bog::{CallbackBody, CallbackPayload, status},
    config::AppConfig,
    db::{create_orm_conn, run_migrations},
    dto::{
        auth::{LoginRequest, RegisterRequest, VerifyEmailRequest},
        cart::{AddToCartRequest, UpdateCartItemRequest},
        orders::{CreateOrderRequest, UpdateOrderStatusRequest},
        products::{CreateProductRequest, CreateSizeRequest},
        users::UpdatePaymentMethodRequest,
    },
    entity::{
        orders::{ActiveModel as OrderActive, Entity as Orders},
        product_sizes::Entity as ProductSizes, products::Entity as Products,
        verification_tokens::{Column as TokenCol, Entity as VerificationTokens},
    },
    error::AppError,
    middleware::auth::{AuthUser, ROLE_ADMIN, ROLE_USER},
    models::{OrderStatus, PaymentMethod, ShippingAddress},
    pricing::PricingConfig,
    routes::params::AuditLogQuery,
    services::{
        admin_service, auth_service, cart_service::{self, CartOwner}, order_service,
        payment_service, product_service, user_service,
    },
    state::AppState,
};
use uuid::Uuid;

fn database_url() -> Option<String> {
    std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .ok()
}

async fn setup_state(database_url: &str, bog: &FakeBog) -> anyhow::Result<AppState> {
    let orm = create_orm_conn(database_url).await?;
    run_migrations(&orm).await?;

    let config = AppConfig {
        database_url: database_url.to_string(),
        host: "127.0.0.1".into(),
        port: 0,
        jwt_secret: SecretString::from("checkout-flow-secret"),
        public_url: "http://shop.test".into(),
        pricing: PricingConfig::default(),
        bog: bog.config(),
        smtp: None,
    };
    AppState::new(orm, config)
}

fn admin() -> AuthUser {
    AuthUser {
        user_id: Uuid::new_v4(),
        role: ROLE_ADMIN.into(),
    }
}

fn address() -> ShippingAddress {
    ShippingAddress {
        full_name: "Nino Beridze".into(),
        street_address: "12 Rustaveli Ave".into(),
        city: "Tbilisi".into(),
        postal_code: "0108".into(),
        country: "Georgia".into(),
        phone: "+995555000000".into(),
    }
}

async fn create_bed(state: &AppState, admin: &AuthUser, tag: &str) -> anyhow::Result<(Uuid, Uuid)> {
    let product = product_service::create_product(
        state,
        admin,
        CreateProductRequest {
            name: format!("Test Bed {tag}"),
            slug: None,
            category: "Beds".into(),
            brand: "Mtatsminda".into(),
            description: "Bed used by the checkout flow".into(),
            images: vec!["/images/bed.jpg".into()],
            price: Decimal::new(25_50, 2),
            stock: 0,
            is_featured: false,
        },
    )
    .await?
    .data
    .unwrap();

    let size = product_service::create_size(
        state,
        admin,
        product.id,
        CreateSizeRequest {
            label: "160x200".into(),
            price: Decimal::new(25_50, 2),
            stock: 5,
        },
    )
    .await?
    .data
    .unwrap();

    Ok((product.id, size.id))
}

async fn size_stock(state: &AppState, size_id: Uuid) -> anyhow::Result<i32> {
    let size = ProductSizes::find_by_id(size_id).one(&state.orm).await?;
    Ok(size.expect("size exists").stock)
}

async fn register_and_login(
    state: &AppState,
    email: &str,
    session: Option<Uuid>,
) -> anyhow::Result<AuthUser> {
    auth_service::register_user(
        state,
        RegisterRequest {
            name: "Nino".into(),
            email: email.into(),
            password: "sup3rsecret".into(),
        },
    )
    .await?;

    let login = auth_service::login_user(
        state,
        LoginRequest {
            email: email.into(),
            password: "sup3rsecret".into(),
        },
        session,
    )
    .await?
    .data
    .unwrap();
    assert!(login.token.starts_with("Bearer "));

    Ok(AuthUser {
        user_id: login.user.id,
        role: login.user.role,
    })
}

#[tokio::test]
async fn guest_cart_to_bog_payment_flow() -> anyhow::Result<()> {
    let Some(database_url) = database_url() else {
        eprintln!("Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run checkout flow tests.");
        return Ok(());
    };

    let bog = FakeBog::start().await;
    let state = setup_state(&database_url, &bog).await?;
    let tag = Uuid::new_v4().simple().to_string();
    let (product_id, size_id) = create_bed(&state, &admin(), &tag).await?;

    // Guest fills a cart before signing in.
    let session = Uuid::new_v4();
    let guest = CartOwner::new(None, Some(session));
    let cart = cart_service::add_item(
        &state,
        guest,
        AddToCartRequest {
            product_id,
            size_id: Some(size_id),
            quantity: Some(2),
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(cart.totals.total_price, Decimal::new(70_18, 2));

    // Sizes are required for sized products.
    let missing_size = cart_service::add_item(
        &state,
        guest,
        AddToCartRequest {
            product_id,
            size_id: None,
            quantity: None,
        },
    )
    .await;
    assert!(matches!(missing_size, Err(AppError::BadRequest(_))));

    let email = format!("flow-{tag}@example.ge");
    let user = register_and_login(&state, &email, Some(session)).await?;
    assert_eq!(user.role, ROLE_USER);

    let token = VerificationTokens::find()
        .filter(TokenCol::Identifier.eq(email.as_str()))
        .one(&state.orm)
        .await?
        .expect("verification token");
    let verified = auth_service::verify_email(
        &state,
        VerifyEmailRequest {
            email: email.clone(),
            token: token.token,
        },
    )
    .await?
    .data
    .unwrap();
    assert!(verified.email_verified_at.is_some());

    // The guest cart now belongs to the user.
    let owner = CartOwner::new(Some(&user), None);
    let cart = cart_service::get_cart(&state, owner).await?.data.unwrap();
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].quantity, 2);

    // Checkout needs an address first.
    let no_address = order_service::create_order(&state, &user, CreateOrderRequest::default()).await;
    assert!(matches!(no_address, Err(AppError::BadRequest(_))));

    user_service::update_address(&state, &user, address()).await?;
    user_service::update_payment_method(
        &state,
        &user,
        UpdatePaymentMethodRequest {
            payment_method: PaymentMethod::Bog,
        },
    )
    .await?;

    let created = order_service::create_order(&state, &user, CreateOrderRequest::default())
        .await?
        .data
        .unwrap();
    let order = created.order;
    assert_eq!(created.items.len(), 1);
    assert_eq!(order.payment_method, "BOG");
    assert_eq!(order.items_price, Decimal::new(51_00, 2));
    assert_eq!(order.shipping_price, Decimal::new(10, 0));
    assert_eq!(order.tax_price, Decimal::new(9_18, 2));
    assert_eq!(order.total_price, Decimal::new(70_18, 2));
    assert!(order.order_number.starts_with("ORD-"));
    assert!(!order.is_paid);

    let size = ProductSizes::find_by_id(size_id).one(&state.orm).await?.unwrap();
    assert_eq!(size.stock, 3);

    let cart = cart_service::get_cart(&state, owner).await?.data.unwrap();
    assert!(cart.items.is_empty());

    // Pay with BOG.
    let started = payment_service::start_bog_payment(&state, &user, order.id)
        .await?
        .data
        .unwrap();
    assert_eq!(started.bog_order_id, format!("bog-{}", order.id));
    assert!(started.redirect_url.contains(&started.bog_order_id));

    let sent = bog.order_body(&started.bog_order_id).unwrap();
    assert_eq!(sent["external_order_id"], order.id.to_string());
    assert_eq!(sent["purchase_units"]["basket"].as_array().unwrap().len(), 2);

    let callback = || CallbackPayload {
        event: "order_payment".into(),
        zoned_request_time: None,
        body: CallbackBody {
            order_id: started.bog_order_id.clone(),
            external_order_id: Some(order.id.to_string()),
        },
    };

    let ack = payment_service::handle_bog_callback(&state, callback())
        .await?
        .data
        .unwrap();
    assert_eq!(ack.order_id, order.id);
    assert_eq!(ack.status, status::COMPLETED);

    // A repeated callback leaves the order as it was.
    payment_service::handle_bog_callback(&state, callback()).await?;

    let paid = order_service::get_order(&state, &user, order.id)
        .await?
        .data
        .unwrap()
        .order;
    assert!(paid.is_paid);
    assert_eq!(paid.status, "paid");
    let result = paid.payment_result.expect("payment result");
    assert_eq!(result.provider, "BOG");
    assert_eq!(result.reference, format!("tx-{}", started.bog_order_id));
    assert_eq!(result.amount, Some(Decimal::new(70_18, 2)));

    let again = payment_service::start_bog_payment(&state, &user, order.id).await;
    assert!(matches!(again, Err(AppError::BadRequest(_))));

    let status_resp = payment_service::bog_payment_status(&state, &user, order.id)
        .await?
        .data
        .unwrap();
    assert!(status_resp.order_paid);

    Ok(())
}

#[tokio::test]
async fn rejected_bog_payment_keeps_order_unpaid() -> anyhow::Result<()> {
    let Some(database_url) = database_url() else {
        eprintln!("Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run checkout flow tests.");
        return Ok(());
    };

    let bog = FakeBog::start().await;
    let state = setup_state(&database_url, &bog).await?;
    let tag = Uuid::new_v4().simple().to_string();
    let (product_id, size_id) = create_bed(&state, &admin(), &tag).await?;

    let user = register_and_login(&state, &format!("rejected-{tag}@example.ge"), None).await?;
    user_service::update_address(&state, &user, address()).await?;
    cart_service::add_item(
        &state,
        CartOwner::new(Some(&user), None),
        AddToCartRequest {
            product_id,
            size_id: Some(size_id),
            quantity: Some(1),
        },
    )
    .await?;

    let order = order_service::create_order(
        &state,
        &user,
        CreateOrderRequest {
            payment_method: Some(PaymentMethod::Bog),
        },
    )
    .await?
    .data
    .unwrap()
    .order;

    let started = payment_service::start_bog_payment(&state, &user, order.id)
        .await?
        .data
        .unwrap();
    bog.set_status(&started.bog_order_id, status::REJECTED);

    payment_service::handle_bog_callback(
        &state,
        CallbackPayload {
            event: "order_payment".into(),
            zoned_request_time: None,
            body: CallbackBody {
                order_id: started.bog_order_id.clone(),
                external_order_id: None,
            },
        },
    )
    .await?;

    let order = order_service::get_order(&state, &user, order.id)
        .await?
        .data
        .unwrap()
        .order;
    assert!(!order.is_paid);
    assert_eq!(order.status, "pending");
    assert_eq!(
        order.payment_result.map(|r| r.status).as_deref(),
        Some(status::REJECTED)
    );

    let unknown = payment_service::handle_bog_callback(
        &state,
        CallbackPayload {
            event: "order_payment".into(),
            zoned_request_time: None,
            body: CallbackBody {
                order_id: format!("bog-unknown-{tag}"),
                external_order_id: None,
            },
        },
    )
    .await;
    assert!(matches!(unknown, Err(AppError::NotFound)));

    Ok(())
}

#[tokio::test]
async fn cash_on_delivery_admin_flow() -> anyhow::Result<()> {
    let Some(database_url) = database_url() else {
        eprintln!("Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run checkout flow tests.");
        return Ok(());
    };

    let bog = FakeBog::start().await;
    let state = setup_state(&database_url, &bog).await?;
    let admin = admin();
    let tag = Uuid::new_v4().simple().to_string();
    let (product_id, size_id) = create_bed(&state, &admin, &tag).await?;

    let user = register_and_login(&state, &format!("cod-{tag}@example.ge"), None).await?;
    user_service::update_address(&state, &user, address()).await?;

    let owner = CartOwner::new(Some(&user), None);
    let add = |quantity| AddToCartRequest {
        product_id,
        size_id: Some(size_id),
        quantity: Some(quantity),
    };

    // Over-ordering is refused.
    let too_many = cart_service::add_item(&state, owner, add(6)).await;
    assert!(matches!(too_many, Err(AppError::BadRequest(_))));

    cart_service::add_item(&state, owner, add(4)).await?;
    let cod = CreateOrderRequest {
        payment_method: Some(PaymentMethod::CashOnDelivery),
    };
    let first = order_service::create_order(&state, &user, cod)
        .await?
        .data
        .unwrap()
        .order;
    // 4 x 25.50 = 102.00 ships free.
    assert_eq!(first.shipping_price, Decimal::ZERO);

    // Delivery needs payment first.
    let early = admin_service::mark_delivered(&state, &admin, first.id).await;
    assert!(matches!(early, Err(AppError::BadRequest(_))));

    let paid = admin_service::mark_order_paid(&state, &admin, first.id)
        .await?
        .data
        .unwrap();
    assert!(paid.is_paid);

    let delivered = admin_service::mark_delivered(&state, &admin, first.id)
        .await?
        .data
        .unwrap();
    assert!(delivered.is_delivered);
    assert_eq!(delivered.status, "delivered");

    // A second order that is deleted before payment puts its stock back.
    cart_service::add_item(&state, owner, add(1)).await?;
    let second = order_service::create_order(
        &state,
        &user,
        CreateOrderRequest {
            payment_method: Some(PaymentMethod::CashOnDelivery),
        },
    )
    .await?
    .data
    .unwrap()
    .order;
    let stock_after_order = ProductSizes::find_by_id(size_id).one(&state.orm).await?.unwrap().stock;
    assert_eq!(stock_after_order, 0);

    admin_service::delete_order(&state, &admin, second.id).await?;
    let restored = ProductSizes::find_by_id(size_id).one(&state.orm).await?.unwrap().stock;
    assert_eq!(restored, 1);

    // Users with orders cannot be removed.
    let refused = admin_service::delete_user(&state, &admin, user.user_id).await;
    assert!(matches!(refused, Err(AppError::BadRequest(_))));

    // Regular users cannot reach the back office.
    let forbidden = admin_service::delete_order(&state, &user, first.id).await;
    assert!(matches!(forbidden, Err(AppError::Forbidden)));

    let logs = admin_service::list_audit_logs(
        &state,
        &admin,
        AuditLogQuery {
            page: None,
            per_page: None,
            action: Some("order_create".into()),
            user_id: Some(user.user_id),
        },
    )
    .await?;
    let entries = logs.data.unwrap().items;
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.user_email.is_some()));
    assert_eq!(logs.meta.and_then(|m| m.total), Some(2));

    assert!(Products::find_by_id(product_id).one(&state.orm).await?.is_some());
    Ok(())
}

#[tokio::test]
async fn guest_session_keeps_working_after_login() -> anyhow::Result<()> {
    let Some(database_url) = database_url() else {
        eprintln!("Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run checkout flow tests.");
        return Ok(());
    };

    let bog = FakeBog::start().await;
    let state = setup_state(&database_url, &bog).await?;
    let tag = Uuid::new_v4().simple().to_string();
    let (product_id, size_id) = create_bed(&state, &admin(), &tag).await?;
    let add = |quantity| AddToCartRequest {
        product_id,
        size_id: Some(size_id),
        quantity: Some(quantity),
    };

    let session = Uuid::new_v4();
    let guest = CartOwner::new(None, Some(session));
    cart_service::add_item(&state, guest, add(2)).await?;

    let user = register_and_login(&state, &format!("relogin-{tag}@example.ge"), Some(session)).await?;
    let user_cart = cart_service::get_cart(&state, CartOwner::new(Some(&user), None))
        .await?
        .data
        .unwrap();
    assert_eq!(user_cart.items[0].quantity, 2);
    assert_ne!(user_cart.session_cart_id, Some(session));

    // After logout the browser still sends the same header.
    let fresh = cart_service::add_item(&state, guest, add(1)).await?.data.unwrap();
    assert_eq!(fresh.session_cart_id, Some(session));
    assert_eq!(fresh.user_id, None);
    assert_eq!(fresh.items[0].quantity, 1);

    // A signed-in user whose client still holds a guest header gets a cart of their own.
    let other = register_and_login(&state, &format!("other-{tag}@example.ge"), None).await?;
    let other_cart = cart_service::add_item(&state, CartOwner::new(Some(&other), Some(session)), add(1))
        .await?
        .data
        .unwrap();
    assert_eq!(other_cart.user_id, Some(other.user_id));
    assert_ne!(other_cart.session_cart_id, Some(session));

    let user_cart = cart_service::get_cart(&state, CartOwner::new(Some(&user), Some(session)))
        .await?
        .data
        .unwrap();
    assert_eq!(user_cart.items[0].quantity, 2);
    let guest_cart = cart_service::get_cart(&state, guest).await?.data.unwrap();
    assert_eq!(guest_cart.items[0].quantity, 1);

    Ok(())
}

#[tokio::test]
async fn concurrent_first_adds_share_one_cart() -> anyhow::Result<()> {
    let Some(database_url) = database_url() else {
        eprintln!("Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run checkout flow tests.");
        return Ok(());
    };

    let bog = FakeBog::start().await;
    let state = setup_state(&database_url, &bog).await?;
    let tag = Uuid::new_v4().simple().to_string();
    let (product_id, size_id) = create_bed(&state, &admin(), &tag).await?;

    let guest = CartOwner::new(None, Some(Uuid::new_v4()));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let state = state.clone();
            tokio::spawn(async move {
                cart_service::add_item(
                    &state,
                    guest,
                    AddToCartRequest {
                        product_id,
                        size_id: Some(size_id),
                        quantity: Some(1),
                    },
                )
                .await
            })
        })
        .collect();
    for handle in handles {
        handle.await??;
    }

    let cart = cart_service::get_cart(&state, guest).await?.data.unwrap();
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].quantity, 4);
    Ok(())
}

#[tokio::test]
async fn cart_lines_update_and_remove() -> anyhow::Result<()> {
    let Some(database_url) = database_url() else {
        eprintln!("Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run checkout flow tests.");
        return Ok(());
    };

    let bog = FakeBog::start().await;
    let state = setup_state(&database_url, &bog).await?;
    let tag = Uuid::new_v4().simple().to_string();
    let (product_id, size_id) = create_bed(&state, &admin(), &tag).await?;
    let owner = CartOwner::new(None, Some(Uuid::new_v4()));
    let update = |quantity| UpdateCartItemRequest {
        product_id,
        size_id: Some(size_id),
        quantity,
    };

    // Nothing to update before the cart exists.
    let missing = cart_service::update_item(&state, owner, update(1)).await;
    assert!(matches!(missing, Err(AppError::NotFound)));

    cart_service::add_item(
        &state,
        owner,
        AddToCartRequest {
            product_id,
            size_id: Some(size_id),
            quantity: Some(2),
        },
    )
    .await?;

    let cart = cart_service::update_item(&state, owner, update(5)).await?.data.unwrap();
    assert_eq!(cart.items[0].quantity, 5);
    assert_eq!(cart.totals.items_price, Decimal::new(127_50, 2));

    // Only five in stock.
    let too_many = cart_service::update_item(&state, owner, update(6)).await;
    assert!(matches!(too_many, Err(AppError::BadRequest(_))));
    let negative = cart_service::update_item(&state, owner, update(-1)).await;
    assert!(matches!(negative, Err(AppError::BadRequest(_))));

    let other_size = cart_service::update_item(
        &state,
        owner,
        UpdateCartItemRequest {
            product_id,
            size_id: Some(Uuid::new_v4()),
            quantity: 1,
        },
    )
    .await;
    assert!(matches!(other_size, Err(AppError::NotFound)));

    let cart = cart_service::update_item(&state, owner, update(0)).await?.data.unwrap();
    assert!(cart.items.is_empty());
    assert_eq!(cart.totals.total_price, Decimal::ZERO);

    let gone = cart_service::remove_item(&state, owner, product_id, Some(size_id)).await;
    assert!(matches!(gone, Err(AppError::NotFound)));

    cart_service::add_item(
        &state,
        owner,
        AddToCartRequest {
            product_id,
            size_id: Some(size_id),
            quantity: Some(3),
        },
    )
    .await?;
    let cart = cart_service::remove_item(&state, owner, product_id, Some(size_id))
        .await?
        .data
        .unwrap();
    assert!(cart.items.is_empty());

    Ok(())
}

#[tokio::test]
async fn callback_for_replaced_bog_order_still_pays() -> anyhow::Result<()> {
    let Some(database_url) = database_url() else {
        eprintln!("Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run checkout flow tests.");
        return Ok(());
    };

    let bog = FakeBog::start().await;
    let state = setup_state(&database_url, &bog).await?;
    let tag = Uuid::new_v4().simple().to_string();
    let (product_id, size_id) = create_bed(&state, &admin(), &tag).await?;

    let user = register_and_login(&state, &format!("retry-{tag}@example.ge"), None).await?;
    user_service::update_address(&state, &user, address()).await?;
    cart_service::add_item(
        &state,
        CartOwner::new(Some(&user), None),
        AddToCartRequest {
            product_id,
            size_id: Some(size_id),
            quantity: Some(1),
        },
    )
    .await?;
    let order = order_service::create_order(
        &state,
        &user,
        CreateOrderRequest {
            payment_method: Some(PaymentMethod::Bog),
        },
    )
    .await?
    .data
    .unwrap()
    .order;

    let first = payment_service::start_bog_payment(&state, &user, order.id)
        .await?
        .data
        .unwrap();

    // The customer restarts payment and BOG hands out a new order id.
    let stored = Orders::find_by_id(order.id).one(&state.orm).await?.unwrap();
    let mut active: OrderActive = stored.into();
    active.bog_order_id = Set(Some(format!("bog-retry-{tag}")));
    active.update(&state.orm).await?;

    // The first payment page is the one that gets paid.
    let ack = payment_service::handle_bog_callback(
        &state,
        CallbackPayload {
            event: "order_payment".into(),
            zoned_request_time: None,
            body: CallbackBody {
                order_id: first.bog_order_id.clone(),
                external_order_id: None,
            },
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(ack.order_id, order.id);

    let paid = order_service::get_order(&state, &user, order.id)
        .await?
        .data
        .unwrap()
        .order;
    assert!(paid.is_paid);
    assert_eq!(
        paid.payment_result.map(|r| r.reference),
        Some(format!("tx-{}", first.bog_order_id))
    );

    Ok(())
}

#[tokio::test]
async fn cancelled_order_returns_stock_and_cannot_be_paid() -> anyhow::Result<()> {
    let Some(database_url) = database_url() else {
        eprintln!("Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run checkout flow tests.");
        return Ok(());
    };

    let bog = FakeBog::start().await;
    let state = setup_state(&database_url, &bog).await?;
    let admin = admin();
    let tag = Uuid::new_v4().simple().to_string();
    let (product_id, size_id) = create_bed(&state, &admin, &tag).await?;

    let user = register_and_login(&state, &format!("cancel-{tag}@example.ge"), None).await?;
    user_service::update_address(&state, &user, address()).await?;
    cart_service::add_item(
        &state,
        CartOwner::new(Some(&user), None),
        AddToCartRequest {
            product_id,
            size_id: Some(size_id),
            quantity: Some(2),
        },
    )
    .await?;
    let order = order_service::create_order(
        &state,
        &user,
        CreateOrderRequest {
            payment_method: Some(PaymentMethod::Bog),
        },
    )
    .await?
    .data
    .unwrap()
    .order;
    assert_eq!(size_stock(&state, size_id).await?, 3);

    let started = payment_service::start_bog_payment(&state, &user, order.id)
        .await?
        .data
        .unwrap();

    let set_status = |status| UpdateOrderStatusRequest { status };
    let cancelled = admin_service::update_order_status(
        &state,
        &admin,
        order.id,
        set_status(OrderStatus::Cancelled),
    )
    .await?
    .data
    .unwrap();
    assert_eq!(cancelled.status, "cancelled");
    assert_eq!(size_stock(&state, size_id).await?, 5);

    // Cancelling is final.
    let reopen =
        admin_service::update_order_status(&state, &admin, order.id, set_status(OrderStatus::Pending))
            .await;
    assert!(matches!(reopen, Err(AppError::BadRequest(_))));
    let twice =
        admin_service::update_order_status(&state, &admin, order.id, set_status(OrderStatus::Cancelled))
            .await;
    assert!(matches!(twice, Err(AppError::BadRequest(_))));
    assert_eq!(size_stock(&state, size_id).await?, 5);

    let restart = payment_service::start_bog_payment(&state, &user, order.id).await;
    assert!(matches!(restart, Err(AppError::BadRequest(_))));

    // A late completed payment is recorded but does not revive the order.
    payment_service::handle_bog_callback(
        &state,
        CallbackPayload {
            event: "order_payment".into(),
            zoned_request_time: None,
            body: CallbackBody {
                order_id: started.bog_order_id.clone(),
                external_order_id: None,
            },
        },
    )
    .await?;
    let after = order_service::get_order(&state, &user, order.id)
        .await?
        .data
        .unwrap()
        .order;
    assert!(!after.is_paid);
    assert_eq!(after.status, "cancelled");
    assert_eq!(
        after.payment_result.map(|r| r.status).as_deref(),
        Some(status::COMPLETED)
    );

    // Deleting the cancelled order does not count its stock twice.
    admin_service::delete_order(&state, &admin, order.id).await?;
    assert_eq!(size_stock(&state, size_id).await?, 5);

    Ok(())
}
