use axum::{
    Json, Router,
    extract::State,
    routing::{get, put},
};

use crate::{
    dto::users::{UpdatePaymentMethodRequest, UpdateProfileRequest},
    error::AppResult,
    middleware::auth::AuthUser,
    models::{ShippingAddress, User},
    response::ApiResponse,
    services::user_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/me", get(me).put(update_profile))
        .route("/me/address", put(update_address))
        .route("/me/payment-method", put(update_payment_method))
}

#[utoipa::path(
    get,
    path = "/api/users/me",
    responses(
        (status = 200, description = "Current user", body = ApiResponse<User>),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn me(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<User>>> {
    let resp = user_service::me(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/users/me",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = ApiResponse<User>)
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> AppResult<Json<ApiResponse<User>>> {
    let resp = user_service::update_profile(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/users/me/address",
    request_body = ShippingAddress,
    responses(
        (status = 200, description = "Shipping address saved", body = ApiResponse<User>),
        (status = 400, description = "Missing address field")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn update_address(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<ShippingAddress>,
) -> AppResult<Json<ApiResponse<User>>> {
    let resp = user_service::update_address(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/users/me/payment-method",
    request_body = UpdatePaymentMethodRequest,
    responses(
        (status = 200, description = "Payment method saved", body = ApiResponse<User>)
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn update_payment_method(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<UpdatePaymentMethodRequest>,
) -> AppResult<Json<ApiResponse<User>>> {
    let resp = user_service::update_payment_method(&state, &user, payload).await?;
    Ok(Json(resp))
}
