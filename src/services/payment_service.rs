use rust_decimal::Decimal;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, QueryFilter, QuerySelect, Set,
    TransactionTrait,
};
use std::str::FromStr;
use uuid::Uuid;

use crate::{
    audit,
    bog::{self, BasketItem, CreateOrderRequest, PurchaseUnits, Receipt, RedirectUrls},
    dto::payments::{BogPaymentStarted, BogPaymentStatus, BogTokenInfo, CallbackAck},
    entity::{
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
        order_items::Model as OrderItemModel,
        users::Entity as Users,
    },
    error::{AppError, AppResult},
    mail,
    middleware::auth::{AuthUser, ensure_admin},
    models::{OrderStatus, PaymentMethod, PaymentResult},
    response::{ApiResponse, Meta},
    services::order_service,
    state::AppState,
};

pub const PROVIDER: &str = "BOG";
const CURRENCY: &str = "GEL";

/// Register the order with BOG and hand back the payment page URL.
pub async fn start_bog_payment(
    state: &AppState,
    user: &AuthUser,
    order_id: Uuid,
) -> AppResult<ApiResponse<BogPaymentStarted>> {
    let order = own_order(state, user, order_id).await?;

    if order.payment_method != PaymentMethod::Bog.as_str() {
        return Err(AppError::BadRequest("Order is not paid by card".into()));
    }
    if order.paid_at.is_some() {
        return Err(AppError::BadRequest("Order already paid".into()));
    }
    if order.status == OrderStatus::Cancelled.as_str() {
        return Err(AppError::BadRequest("Order is cancelled".into()));
    }

    let items = order_service::order_items(&state.orm, order.id).await?;
    let request = build_create_order(state, &order, &items);
    let created = state.bog.create_order(&request).await?;

    let mut active: OrderActive = order.into();
    active.bog_order_id = Set(Some(created.bog_order_id.clone()));
    active.updated_at = Set(chrono::Utc::now().into());
    let order = active.update(&state.orm).await?;

    audit::record(
        state,
        Some(user.user_id),
        "payment_start",
        "orders",
        serde_json::json!({ "order_id": order.id, "bog_order_id": created.bog_order_id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Payment created",
        BogPaymentStarted {
            bog_order_id: created.bog_order_id,
            redirect_url: created.redirect_url,
        },
        Some(Meta::empty()),
    ))
}

/// Handle a BOG status callback. The receipt is re-fetched from BOG rather
/// than trusting the posted body.
pub async fn handle_bog_callback(
    state: &AppState,
    payload: bog::CallbackPayload,
) -> AppResult<ApiResponse<CallbackAck>> {
    tracing::info!(event = %payload.event, bog_order_id = %payload.body.order_id, "BOG callback received");

    let receipt = state.bog.get_receipt(&payload.body.order_id).await?;
    let (order, newly_paid) = apply_receipt(state, &receipt).await?;

    if newly_paid {
        audit::record(
            state,
            Some(order.user_id),
            "order_paid",
            "orders",
            serde_json::json!({ "order_id": order.id, "bog_order_id": receipt.order_id }),
        )
        .await;

        if let Some(customer) = Users::find_by_id(order.user_id).one(&state.orm).await? {
            let paid = order.clone();
            mail::deliver(state.mailer.as_ref(), "payment_receipt", |mailer| async move {
                mailer.send_payment_receipt(&customer.email, &paid).await
            })
            .await;
        }
    }

    Ok(ApiResponse::success(
        "Callback processed",
        CallbackAck {
            order_id: order.id,
            status: receipt.order_status.key,
        },
        Some(Meta::empty()),
    ))
}

/// Apply a BOG receipt to the matching order. Returns the order and whether
/// this call is the one that marked it paid.
pub async fn apply_receipt(state: &AppState, receipt: &Receipt) -> AppResult<(OrderModel, bool)> {
    let txn = state.orm.begin().await?;

    // A restarted payment replaces `bog_order_id`, so receipts for the earlier
    // BOG order are matched through the external id we sent.
    let mut matches = Condition::any().add(OrderCol::BogOrderId.eq(receipt.order_id.as_str()));
    if let Some(order_id) = receipt
        .external_order_id
        .as_deref()
        .and_then(|id| Uuid::from_str(id).ok())
    {
        matches = matches.add(
            Condition::all()
                .add(OrderCol::Id.eq(order_id))
                .add(OrderCol::PaymentMethod.eq(PaymentMethod::Bog.as_str())),
        );
    }

    let order = Orders::find()
        .filter(matches)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    if order.paid_at.is_some() {
        return Ok((order, false));
    }

    let result = payment_result(receipt);
    let cancelled = order.status == OrderStatus::Cancelled.as_str();
    let (order, newly_paid) = match receipt.order_status.key.as_str() {
        bog::status::COMPLETED if cancelled => {
            tracing::warn!(order_id = %order.id, bog_order_id = %receipt.order_id, "BOG payment completed for a cancelled order");
            let mut active: OrderActive = order.into();
            active.payment_result = Set(Some(result));
            active.updated_at = Set(chrono::Utc::now().into());
            (active.update(&txn).await?, false)
        }
        bog::status::COMPLETED => (order_service::mark_paid(&txn, order, result).await?, true),
        bog::status::REJECTED => {
            let mut active: OrderActive = order.into();
            active.payment_result = Set(Some(result));
            active.updated_at = Set(chrono::Utc::now().into());
            (active.update(&txn).await?, false)
        }
        other => {
            tracing::debug!(status = other, "BOG order not final yet");
            (order, false)
        }
    };

    txn.commit().await?;
    Ok((order, newly_paid))
}

pub async fn bog_payment_status(
    state: &AppState,
    user: &AuthUser,
    order_id: Uuid,
) -> AppResult<ApiResponse<BogPaymentStatus>> {
    let order = own_order(state, user, order_id).await?;
    let bog_order_id = order
        .bog_order_id
        .clone()
        .ok_or_else(|| AppError::BadRequest("Payment has not been started".into()))?;

    let receipt = state.bog.get_receipt(&bog_order_id).await?;
    Ok(ApiResponse::success(
        "Payment status",
        BogPaymentStatus {
            bog_order_id,
            status: receipt.order_status.key,
            order_paid: order.paid_at.is_some(),
        },
        Some(Meta::empty()),
    ))
}

pub async fn bog_token_info(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<BogTokenInfo>> {
    ensure_admin(user)?;
    let token = state.bog.token().await?;
    Ok(ApiResponse::success(
        "BOG token",
        BogTokenInfo {
            token_type: token.token_type,
            expires_at: token.expires_at,
        },
        Some(Meta::empty()),
    ))
}

pub fn build_create_order(
    state: &AppState,
    order: &OrderModel,
    items: &[OrderItemModel],
) -> CreateOrderRequest {
    let config = state.bog.config();
    let mut basket: Vec<BasketItem> = items
        .iter()
        .map(|item| BasketItem {
            product_id: item.product_id.to_string(),
            description: match &item.size_label {
                Some(label) => format!("{} ({label})", item.name),
                None => item.name.clone(),
            },
            quantity: item.quantity,
            unit_price: item.price,
        })
        .collect();

    let extras = order.shipping_price + order.tax_price;
    if extras > Decimal::ZERO {
        basket.push(BasketItem {
            product_id: "shipping-and-tax".into(),
            description: "Shipping and tax".into(),
            quantity: 1,
            unit_price: extras,
        });
    }

    CreateOrderRequest {
        callback_url: config.callback_url.clone(),
        external_order_id: order.id.to_string(),
        purchase_units: PurchaseUnits {
            currency: CURRENCY.into(),
            total_amount: order.total_price,
            basket,
        },
        redirect_urls: RedirectUrls {
            success: format!("{}?order_id={}", config.success_url, order.id),
            fail: format!("{}?order_id={}", config.fail_url, order.id),
        },
    }
}

fn payment_result(receipt: &Receipt) -> PaymentResult {
    let detail = receipt.payment_detail.as_ref();
    PaymentResult {
        provider: PROVIDER.into(),
        reference: detail
            .and_then(|d| d.transaction_id.clone())
            .unwrap_or_else(|| receipt.order_id.clone()),
        status: receipt.order_status.key.clone(),
        amount: receipt
            .purchase_units
            .as_ref()
            .and_then(|u| u.transfer_amount.as_deref().or(u.request_amount.as_deref()))
            .and_then(|raw| Decimal::from_str(raw).ok()),
        paid_by: detail.and_then(|d| d.payer_identifier.clone()),
        raw: serde_json::to_value(receipt).ok(),
    }
}

async fn own_order(state: &AppState, user: &AuthUser, order_id: Uuid) -> AppResult<OrderModel> {
    Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(order_id)),
        )
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bog::{PaymentDetail, ReceiptPurchaseUnits, ReceiptStatus};

    #[test]
    fn payment_result_prefers_transfer_amount_and_transaction_id() {
        let receipt = Receipt {
            order_id: "bog-1".into(),
            external_order_id: Some("ord".into()),
            order_status: ReceiptStatus {
                key: "completed".into(),
                value: None,
            },
            purchase_units: Some(ReceiptPurchaseUnits {
                request_amount: Some("120.00".into()),
                transfer_amount: Some("118.00".into()),
                currency_code: Some("GEL".into()),
            }),
            payment_detail: Some(PaymentDetail {
                transaction_id: Some("tx-9".into()),
                payer_identifier: Some("4111***1111".into()),
                transfer_method: None,
            }),
        };
        let result = payment_result(&receipt);
        assert_eq!(result.provider, "BOG");
        assert_eq!(result.reference, "tx-9");
        assert_eq!(result.amount, Some(Decimal::new(11800, 2)));
        assert_eq!(result.paid_by.as_deref(), Some("4111***1111"));
    }

    #[test]
    fn payment_result_falls_back_to_order_id() {
        let receipt = Receipt {
            order_id: "bog-2".into(),
            external_order_id: None,
            order_status: ReceiptStatus {
                key: "rejected".into(),
                value: None,
            },
            purchase_units: None,
            payment_detail: None,
        };
        let result = payment_result(&receipt);
        assert_eq!(result.reference, "bog-2");
        assert_eq!(result.amount, None);
    }
}
