use chrono::Utc;
use sea_orm::sea_query::extension::postgres::PgExpr;
use sea_orm::sea_query::{Expr, LockType, Query};
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::{
        admin::{AuditLogList, InventoryAdjustRequest, InventoryLevel},
        orders::{OrderList, OrderWithItems, UpdateOrderStatusRequest},
        products::ProductList,
        users::{AdminUpdateUserRequest, UserList},
    },
    entity::{
        audit_logs::{Column as AuditCol, Entity as AuditLogs},
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
        product_sizes::{ActiveModel as SizeActive, Column as SizeCol, Entity as ProductSizes},
        products::{ActiveModel as ProductActive, Column as ProdCol, Entity as Products},
        users::{ActiveModel as UserActive, Column as UserCol, Entity as Users},
        verification_tokens::{Column as TokenCol, Entity as VerificationTokens},
    },
    error::{AppError, AppResult},
    mail,
    middleware::auth::{AuthUser, ROLE_ADMIN, ROLE_USER, ensure_admin},
    models::{AuditLog, Order, OrderStatus, PaymentMethod, PaymentResult, Product, User},
    response::{ApiResponse, Meta},
    routes::params::{AuditLogQuery, LowStockQuery, OrderListQuery, UserListQuery},
    services::order_service,
    state::AppState,
};

const DEFAULT_LOW_STOCK: i32 = 5;

pub async fn list_all_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_admin(user)?;
    order_service::paged_orders(state, Condition::all(), query).await
}

pub async fn get_order_admin(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    ensure_admin(user)?;
    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let data = order_service::with_items(&state.orm, order).await?;
    Ok(ApiResponse::success(
        "Order found",
        data,
        Some(Meta::empty()),
    ))
}

/// Sets the status label. `paid` and `delivered` must match the recorded
/// payment and delivery, which are set through their own endpoints.
/// Cancelling an unpaid order puts its stock back and is final.
pub async fn update_order_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<Order>> {
    ensure_admin(user)?;
    let txn = state.orm.begin().await?;

    let existing = Orders::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    check_status_change(&existing, payload.status)?;

    if payload.status == OrderStatus::Cancelled {
        let items = order_service::order_items(&txn, existing.id).await?;
        order_service::restore_stock(&txn, &items).await?;
    }

    let mut active: OrderActive = existing.into();
    active.status = Set(payload.status.as_str().to_string());
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&txn).await?;
    txn.commit().await?;

    audit::record(
        state,
        Some(user.user_id),
        "order_status_update",
        "orders",
        serde_json::json!({ "order_id": order.id, "status": order.status }),
    )
    .await;

    Ok(ApiResponse::success(
        "Order updated",
        Order::from(order),
        Some(Meta::empty()),
    ))
}

fn check_status_change(order: &OrderModel, next: OrderStatus) -> AppResult<()> {
    if order.status == OrderStatus::Cancelled.as_str() {
        return Err(AppError::BadRequest("Order is cancelled".into()));
    }
    match next {
        OrderStatus::Paid if order.paid_at.is_none() => {
            Err(AppError::BadRequest("Order has not been paid".into()))
        }
        OrderStatus::Delivered if order.delivered_at.is_none() => {
            Err(AppError::BadRequest("Order has not been delivered".into()))
        }
        OrderStatus::Pending | OrderStatus::Cancelled if order.paid_at.is_some() => Err(
            AppError::BadRequest(format!("Paid orders cannot be set to {}", next.as_str())),
        ),
        _ => Ok(()),
    }
}

/// Records payment collected on delivery.
pub async fn mark_order_paid(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Order>> {
    ensure_admin(user)?;
    let txn = state.orm.begin().await?;

    let existing = Orders::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    if existing.payment_method != PaymentMethod::CashOnDelivery.as_str() {
        return Err(AppError::BadRequest(
            "Only cash on delivery orders can be marked paid manually".into(),
        ));
    }
    if existing.paid_at.is_some() {
        return Err(AppError::BadRequest("Order already paid".into()));
    }
    if existing.status == OrderStatus::Cancelled.as_str() {
        return Err(AppError::BadRequest("Order is cancelled".into()));
    }

    let result = PaymentResult {
        provider: PaymentMethod::CashOnDelivery.as_str().to_string(),
        reference: existing.order_number.clone(),
        status: "completed".to_string(),
        amount: Some(existing.total_price),
        paid_by: Some(user.user_id.to_string()),
        raw: None,
    };
    let order = order_service::mark_paid(&txn, existing, result).await?;
    txn.commit().await?;

    audit::record(
        state,
        Some(user.user_id),
        "order_paid",
        "orders",
        serde_json::json!({ "order_id": order.id, "payment_method": order.payment_method }),
    )
    .await;

    if let Some(customer) = Users::find_by_id(order.user_id).one(&state.orm).await? {
        let paid = order.clone();
        mail::deliver(state.mailer.as_ref(), "payment_receipt", |mailer| async move {
            mailer.send_payment_receipt(&customer.email, &paid).await
        })
        .await;
    }

    Ok(ApiResponse::success(
        "Order marked paid",
        Order::from(order),
        Some(Meta::empty()),
    ))
}

pub async fn mark_delivered(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Order>> {
    ensure_admin(user)?;

    let existing = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    if existing.paid_at.is_none() {
        return Err(AppError::BadRequest("Order has not been paid".into()));
    }
    if existing.delivered_at.is_some() {
        return Err(AppError::BadRequest("Order already delivered".into()));
    }

    let now = Utc::now();
    let mut active: OrderActive = existing.into();
    active.status = Set(OrderStatus::Delivered.as_str().to_string());
    active.delivered_at = Set(Some(now.into()));
    active.updated_at = Set(now.into());
    let order = active.update(&state.orm).await?;

    audit::record(
        state,
        Some(user.user_id),
        "order_delivered",
        "orders",
        serde_json::json!({ "order_id": order.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Order delivered",
        Order::from(order),
        Some(Meta::empty()),
    ))
}

/// Deletes an order. Stock is put back when the order was never paid and
/// not already cancelled.
pub async fn delete_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let txn = state.orm.begin().await?;

    let order = Orders::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let restocked =
        order.paid_at.is_none() && order.status != OrderStatus::Cancelled.as_str();
    if restocked {
        let items = order_service::order_items(&txn, order.id).await?;
        order_service::restore_stock(&txn, &items).await?;
    }

    Orders::delete_by_id(order.id).exec(&txn).await?;
    txn.commit().await?;

    audit::record(
        state,
        Some(user.user_id),
        "order_delete",
        "orders",
        serde_json::json!({ "order_id": id, "restocked": restocked }),
    )
    .await;

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn list_low_stock(
    state: &AppState,
    user: &AuthUser,
    query: LowStockQuery,
) -> AppResult<ApiResponse<ProductList>> {
    ensure_admin(user)?;
    let threshold = query.threshold.unwrap_or(DEFAULT_LOW_STOCK);
    let (page, limit, offset) = query.pagination().normalize();

    // Sized products keep their stock per size; the product row only counts
    // for products without sizes.
    let sized = Query::select()
        .column(SizeCol::ProductId)
        .from(ProductSizes)
        .to_owned();
    let low_sizes = Query::select()
        .column(SizeCol::ProductId)
        .from(ProductSizes)
        .and_where(SizeCol::Stock.lte(threshold))
        .to_owned();
    let condition = Condition::any()
        .add(
            Condition::all()
                .add(ProdCol::Stock.lte(threshold))
                .add(ProdCol::Id.not_in_subquery(sized)),
        )
        .add(ProdCol::Id.in_subquery(low_sizes));

    let finder = Products::find()
        .filter(condition)
        .order_by_asc(ProdCol::Stock)
        .order_by_desc(ProdCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Product::from)
        .collect();

    let data = ProductList { items };
    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Low stock", data, Some(meta)))
}

pub async fn adjust_inventory(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: InventoryAdjustRequest,
) -> AppResult<ApiResponse<InventoryLevel>> {
    ensure_admin(user)?;
    if payload.delta == 0 {
        return Err(AppError::BadRequest("delta must not be 0".into()));
    }

    let txn = state.orm.begin().await?;
    let stock = match payload.size_id {
        Some(size_id) => {
            let size = ProductSizes::find_by_id(size_id)
                .filter(SizeCol::ProductId.eq(id))
                .lock(LockType::Update)
                .one(&txn)
                .await?
                .ok_or(AppError::NotFound)?;

            let new_stock = checked_stock(size.stock, payload.delta)?;
            let mut active: SizeActive = size.into();
            active.stock = Set(new_stock);
            active.update(&txn).await?.stock
        }
        None => {
            let product = Products::find_by_id(id)
                .lock(LockType::Update)
                .one(&txn)
                .await?
                .ok_or(AppError::NotFound)?;

            let new_stock = checked_stock(product.stock, payload.delta)?;
            let mut active: ProductActive = product.into();
            active.stock = Set(new_stock);
            active.updated_at = Set(Utc::now().into());
            active.update(&txn).await?.stock
        }
    };

    txn.commit().await?;

    audit::record(
        state,
        Some(user.user_id),
        "inventory_adjust",
        "products",
        serde_json::json!({ "product_id": id, "size_id": payload.size_id, "delta": payload.delta }),
    )
    .await;

    Ok(ApiResponse::success(
        "Inventory updated",
        InventoryLevel {
            product_id: id,
            size_id: payload.size_id,
            stock,
        },
        Some(Meta::empty()),
    ))
}

pub async fn list_users(
    state: &AppState,
    user: &AuthUser,
    query: UserListQuery,
) -> AppResult<ApiResponse<UserList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = query.pagination().normalize();

    let mut condition = Condition::all();
    if let Some(search) = query.q.as_ref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        condition = condition.add(
            Condition::any()
                .add(Expr::col(UserCol::Name).ilike(pattern.clone()))
                .add(Expr::col(UserCol::Email).ilike(pattern)),
        );
    }

    let finder = Users::find()
        .filter(condition)
        .order_by_desc(UserCol::CreatedAt);
    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(User::from)
        .collect();

    Ok(ApiResponse::success(
        "Users",
        UserList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn update_user(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: AdminUpdateUserRequest,
) -> AppResult<ApiResponse<User>> {
    ensure_admin(user)?;

    let existing = Users::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: UserActive = existing.into();
    if let Some(name) = payload.name {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::BadRequest("Name is required".into()));
        }
        active.name = Set(name);
    }
    if let Some(role) = payload.role {
        validate_role(&role)?;
        if id == user.user_id && role != ROLE_ADMIN {
            return Err(AppError::BadRequest("You cannot remove your own admin role".into()));
        }
        active.role = Set(role);
    }
    active.updated_at = Set(Utc::now().into());
    let updated = active.update(&state.orm).await?;

    audit::record(
        state,
        Some(user.user_id),
        "user_update",
        "users",
        serde_json::json!({ "user_id": updated.id, "role": updated.role }),
    )
    .await;

    Ok(ApiResponse::success("User updated", updated.into(), Some(Meta::empty())))
}

pub async fn delete_user(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    if id == user.user_id {
        return Err(AppError::BadRequest("You cannot delete yourself".into()));
    }

    let existing = Users::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let orders = Orders::find()
        .filter(OrderCol::UserId.eq(id))
        .count(&state.orm)
        .await?;
    if orders > 0 {
        return Err(AppError::BadRequest("User has orders and cannot be deleted".into()));
    }

    let txn = state.orm.begin().await?;
    VerificationTokens::delete_many()
        .filter(TokenCol::Identifier.eq(existing.email.as_str()))
        .exec(&txn)
        .await?;
    Users::delete_by_id(id).exec(&txn).await?;
    txn.commit().await?;

    audit::record(
        state,
        Some(user.user_id),
        "user_delete",
        "users",
        serde_json::json!({ "user_id": id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn list_audit_logs(
    state: &AppState,
    user: &AuthUser,
    query: AuditLogQuery,
) -> AppResult<ApiResponse<AuditLogList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = query.pagination().normalize();

    let mut condition = Condition::all();
    if let Some(action) = query.action.as_ref().filter(|s| !s.is_empty()) {
        condition = condition.add(AuditCol::Action.eq(action.clone()));
    }
    if let Some(user_id) = query.user_id {
        condition = condition.add(AuditCol::UserId.eq(user_id));
    }

    let finder = AuditLogs::find()
        .filter(condition)
        .order_by_desc(AuditCol::CreatedAt);
    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .find_also_related(Users)
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(AuditLog::from)
        .collect();

    Ok(ApiResponse::success(
        "Audit logs",
        AuditLogList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

fn validate_role(role: &str) -> Result<(), AppError> {
    if role == ROLE_ADMIN || role == ROLE_USER {
        Ok(())
    } else {
        Err(AppError::BadRequest("Invalid role".into()))
    }
}

fn checked_stock(current: i32, delta: i32) -> AppResult<i32> {
    let next = current
        .checked_add(delta)
        .ok_or_else(|| AppError::BadRequest("stock out of range".into()))?;
    if next < 0 {
        return Err(AppError::BadRequest("stock cannot be negative".into()));
    }
    Ok(next)
}
