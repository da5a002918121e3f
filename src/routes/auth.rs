use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header::SET_COOKIE},
    response::{AppendHeaders, IntoResponse},
    routing::post,
};

use crate::{
    dto::auth::{LoginRequest, LoginResponse, RegisterRequest, VerifyEmailRequest},
    error::AppResult,
    middleware::{
        auth::{expired_session_cookie, session_cookie},
        cart_session::CartSession,
    },
    models::User,
    response::{ApiResponse, Meta},
    services::auth_service::{login_user, register_user, verify_email},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/verify-email", post(verify))
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Register user", body = ApiResponse<User>),
        (status = 400, description = "Invalid input or email taken")
    ),
    tag = "Auth"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<User>>)> {
    let resp = register_user(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    params(
        ("x-session-cart-id" = Option<String>, Header, description = "Guest cart to attach to the user")
    ),
    responses(
        (status = 200, description = "Login user, also sets the session cookie", body = ApiResponse<LoginResponse>),
        (status = 400, description = "Invalid credentials")
    ),
    tag = "Auth"
)]
pub async fn login(
    State(state): State<AppState>,
    CartSession(session): CartSession,
    Json(payload): Json<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    let resp = login_user(&state, payload, session).await?;
    let cookie = resp
        .data
        .as_ref()
        .and_then(|data| data.token.strip_prefix("Bearer "))
        .map(|token| (SET_COOKIE, session_cookie(token)));
    Ok((AppendHeaders(cookie), Json(resp)))
}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses(
        (status = 200, description = "Session cookie cleared")
    ),
    tag = "Auth"
)]
pub async fn logout() -> impl IntoResponse {
    (
        AppendHeaders([(SET_COOKIE, expired_session_cookie())]),
        Json(ApiResponse::success(
            "Logged out",
            serde_json::json!({}),
            Some(Meta::empty()),
        )),
    )
}

#[utoipa::path(
    post,
    path = "/api/auth/verify-email",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Email verified", body = ApiResponse<User>),
        (status = 400, description = "Invalid or expired token")
    ),
    tag = "Auth"
)]
pub async fn verify(
    State(state): State<AppState>,
    Json(payload): Json<VerifyEmailRequest>,
) -> AppResult<Json<ApiResponse<User>>> {
    let resp = verify_email(&state, payload).await?;
    Ok(Json(resp))
}
