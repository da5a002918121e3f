use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    bog::CallbackPayload,
    dto::payments::{BogPaymentStarted, BogPaymentStatus, CallbackAck},
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    services::payment_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/bog/orders/{order_id}", post(start_bog_payment))
        .route("/bog/orders/{order_id}/status", get(bog_payment_status))
        .route("/bog/callback", post(bog_callback))
}

#[utoipa::path(
    post,
    path = "/api/payments/bog/orders/{order_id}",
    params(
        ("order_id" = Uuid, Path, description = "Order ID")
    ),
    responses(
        (status = 200, description = "BOG payment page created", body = ApiResponse<BogPaymentStarted>),
        (status = 400, description = "Order not payable by BOG"),
        (status = 404, description = "Order not found"),
        (status = 502, description = "BOG request failed")
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn start_bog_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<BogPaymentStarted>>> {
    let resp = payment_service::start_bog_payment(&state, &user, order_id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/payments/bog/orders/{order_id}/status",
    params(
        ("order_id" = Uuid, Path, description = "Order ID")
    ),
    responses(
        (status = 200, description = "Status reported by BOG", body = ApiResponse<BogPaymentStatus>),
        (status = 400, description = "Payment not started"),
        (status = 404, description = "Order not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn bog_payment_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<BogPaymentStatus>>> {
    let resp = payment_service::bog_payment_status(&state, &user, order_id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/payments/bog/callback",
    request_body = CallbackPayload,
    responses(
        (status = 200, description = "Callback processed", body = ApiResponse<CallbackAck>),
        (status = 404, description = "Unknown BOG order"),
        (status = 502, description = "Receipt lookup failed")
    ),
    tag = "Payments"
)]
pub async fn bog_callback(
    State(state): State<AppState>,
    Json(payload): Json<CallbackPayload>,
) -> AppResult<Json<ApiResponse<CallbackAck>>> {
    let resp = payment_service::handle_bog_callback(&state, payload).await?;
    Ok(Json(resp))
}
