use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::orders::{CreateOrderRequest, OrderList, OrderWithItems},
    entity::{
        carts::{Column as CartCol, Entity as Carts},
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
            Model as OrderItemModel,
        },
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
        product_sizes::{Column as SizeCol, Entity as ProductSizes},
        products::{Column as ProdCol, Entity as Products},
        users::Entity as Users,
    },
    error::{AppError, AppResult},
    mail,
    middleware::auth::AuthUser,
    models::{Order, OrderItem, OrderStatus, PaymentMethod, PaymentResult},
    pricing::cart_totals,
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    state::AppState,
};

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let condition = Condition::all().add(OrderCol::UserId.eq(user.user_id));
    paged_orders(state, condition, query).await
}

/// Shared by the customer and admin order listings.
pub async fn paged_orders(
    state: &AppState,
    mut condition: Condition,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination().normalize();
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        condition = condition.add(OrderCol::Status.eq(status.clone()));
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let mut finder = Orders::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Order::from)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Ok",
        OrderList { items: orders },
        Some(meta),
    ))
}

/// Turn the user's cart into an order.
pub async fn create_order(
    state: &AppState,
    user: &AuthUser,
    payload: CreateOrderRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let txn = state.orm.begin().await?;

    let customer = Users::find_by_id(user.user_id)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let shipping_address = customer
        .address
        .clone()
        .ok_or_else(|| AppError::BadRequest("Shipping address is required".into()))?;

    let payment_method = match payload.payment_method {
        Some(method) => method,
        None => customer
            .payment_method
            .as_deref()
            .and_then(|m| m.parse::<PaymentMethod>().ok())
            .ok_or_else(|| AppError::BadRequest("Payment method is required".into()))?,
    };

    let cart = Carts::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .lock(LockType::Update)
        .one(&txn)
        .await?;
    let cart = match cart {
        Some(c) if !c.items.0.is_empty() => c,
        _ => return Err(AppError::BadRequest("Cart is empty".into())),
    };
    let lines = cart.items.0.clone();

    for line in &lines {
        reserve_stock(&txn, line.product_id, line.size_id, line.quantity).await?;
    }

    let totals = cart_totals(&lines, &state.config.pricing)?;

    let order_id = Uuid::new_v4();
    let order = OrderActive {
        id: Set(order_id),
        order_number: Set(build_order_number(order_id)),
        user_id: Set(user.user_id),
        shipping_address: Set(shipping_address),
        payment_method: Set(payment_method.as_str().to_string()),
        payment_result: Set(None),
        bog_order_id: Set(None),
        items_price: Set(totals.items_price),
        shipping_price: Set(totals.shipping_price),
        tax_price: Set(totals.tax_price),
        total_price: Set(totals.total_price),
        status: Set(OrderStatus::Pending.as_str().to_string()),
        paid_at: Set(None),
        delivered_at: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let mut items: Vec<OrderItem> = Vec::with_capacity(lines.len());
    for line in lines {
        let item = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(line.product_id),
            size_id: Set(line.size_id),
            name: Set(line.name),
            slug: Set(line.slug),
            size_label: Set(line.size_label),
            image: Set(line.image),
            quantity: Set(line.quantity),
            price: Set(line.price),
            created_at: NotSet,
        }
        .insert(&txn)
        .await?;
        items.push(item.into());
    }

    Carts::delete_by_id(cart.id).exec(&txn).await?;

    txn.commit().await?;

    tracing::info!(order_id = %order.id, order_number = %order.order_number, total = %order.total_price, "order created");

    audit::record(
        state,
        Some(user.user_id),
        "order_create",
        "orders",
        serde_json::json!({ "order_id": order.id, "total_price": order.total_price }),
    )
    .await;

    if payment_method == PaymentMethod::CashOnDelivery {
        let email = customer.email.clone();
        let confirmed = order.clone();
        mail::deliver(state.mailer.as_ref(), "order_confirmation", |mailer| async move {
            mailer.send_order_confirmation(&email, &confirmed).await
        })
        .await;
    }

    Ok(ApiResponse::success(
        "Order created",
        OrderWithItems {
            order: order.into(),
            items,
        },
        Some(Meta::empty()),
    ))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let data = with_items(&state.orm, order).await?;
    Ok(ApiResponse::success("OK", data, Some(Meta::empty())))
}

pub async fn with_items<C: ConnectionTrait>(conn: &C, order: OrderModel) -> AppResult<OrderWithItems> {
    let items = order_items(conn, order.id)
        .await?
        .into_iter()
        .map(OrderItem::from)
        .collect();
    Ok(OrderWithItems {
        order: order.into(),
        items,
    })
}

pub async fn order_items<C: ConnectionTrait>(conn: &C, order_id: Uuid) -> AppResult<Vec<OrderItemModel>> {
    Ok(OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order_id))
        .order_by_asc(OrderItemCol::CreatedAt)
        .all(conn)
        .await?)
}

/// Record a successful payment. Callers must check the order is unpaid.
pub async fn mark_paid<C: ConnectionTrait>(
    conn: &C,
    order: OrderModel,
    result: PaymentResult,
) -> AppResult<OrderModel> {
    let now = Utc::now();
    let mut active: OrderActive = order.into();
    active.status = Set(OrderStatus::Paid.as_str().to_string());
    active.paid_at = Set(Some(now.into()));
    active.payment_result = Set(Some(result));
    active.updated_at = Set(now.into());
    Ok(active.update(conn).await?)
}

/// Lock the stock row for a line, check availability and decrement it.
async fn reserve_stock<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    size_id: Option<Uuid>,
    quantity: i32,
) -> AppResult<()> {
    if quantity <= 0 {
        return Err(AppError::BadRequest("Cart has invalid quantity".into()));
    }

    match size_id {
        Some(size_id) => {
            let size = ProductSizes::find_by_id(size_id)
                .filter(SizeCol::ProductId.eq(product_id))
                .lock(LockType::Update)
                .one(conn)
                .await?
                .ok_or_else(|| AppError::BadRequest(format!("Size {size_id} no longer exists")))?;
            if size.stock < quantity {
                return Err(AppError::BadRequest(format!(
                    "Insufficient stock for product {product_id} size {}",
                    size.label
                )));
            }
            ProductSizes::update_many()
                .col_expr(SizeCol::Stock, Expr::col(SizeCol::Stock).sub(quantity))
                .filter(SizeCol::Id.eq(size_id))
                .exec(conn)
                .await?;
        }
        None => {
            let product = Products::find_by_id(product_id)
                .lock(LockType::Update)
                .one(conn)
                .await?
                .ok_or_else(|| {
                    AppError::BadRequest(format!("Product {product_id} no longer exists"))
                })?;
            if product.stock < quantity {
                return Err(AppError::BadRequest(format!(
                    "Insufficient stock for product {product_id}"
                )));
            }
            Products::update_many()
                .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).sub(quantity))
                .filter(ProdCol::Id.eq(product_id))
                .exec(conn)
                .await?;
        }
    }
    Ok(())
}

/// Put the stock of an order's items back.
pub async fn restore_stock<C: ConnectionTrait>(conn: &C, items: &[OrderItemModel]) -> AppResult<()> {
    for item in items {
        match item.size_id {
            Some(size_id) => {
                ProductSizes::update_many()
                    .col_expr(SizeCol::Stock, Expr::col(SizeCol::Stock).add(item.quantity))
                    .filter(SizeCol::Id.eq(size_id))
                    .exec(conn)
                    .await?;
            }
            None => {
                Products::update_many()
                    .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).add(item.quantity))
                    .filter(ProdCol::Id.eq(item.product_id))
                    .exec(conn)
                    .await?;
            }
        }
    }
    Ok(())
}

fn build_order_number(order_id: Uuid) -> String {
    let date = Utc::now().format("%Y%m%d");
    let suffix = order_id.simple().to_string();
    let short = &suffix[..8];
    format!("ORD-{}-{}", date, short.to_uppercase())
}
