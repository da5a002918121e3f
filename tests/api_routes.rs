//! Router-level checks that are decided before any database access.

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use sea_orm::DatabaseConnection;
use secrecy::SecretString;
use serde_json::Value;
use storefront_api::{
    config::{AppConfig, BogConfig},
    middleware::auth::{ROLE_ADMIN, ROLE_USER},
    pricing::PricingConfig,
    routes::{create_app, doc::ApiDoc},
    services::auth_service::issue_token,
    state::AppState,
};
use tower::ServiceExt;
use utoipa::OpenApi;
use uuid::Uuid;

const SECRET: &str = "router-test-secret";

fn app() -> Router {
    let config = AppConfig {
        database_url: "postgres://unused".into(),
        host: "127.0.0.1".into(),
        port: 0,
        jwt_secret: SecretString::from(SECRET),
        public_url: "http://shop.test".into(),
        pricing: PricingConfig::default(),
        bog: BogConfig {
            client_id: String::new(),
            client_secret: SecretString::from(""),
            auth_url: "http://127.0.0.1:9/token".into(),
            api_url: "http://127.0.0.1:9".into(),
            callback_url: "http://shop.test/api/payments/bog/callback".into(),
            success_url: "http://shop.test/checkout/success".into(),
            fail_url: "http://shop.test/checkout/failed".into(),
            locale: "ka".into(),
        },
        smtp: None,
    };
    let state = AppState::new(DatabaseConnection::default(), config).unwrap();
    create_app(state)
}

fn bearer(role: &str) -> String {
    format!("Bearer {}", issue_token(Uuid::new_v4(), role, SECRET).unwrap())
}

async fn send(request: Request<Body>) -> (StatusCode, Value) {
    let response = app().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn unknown_path_gets_json_not_found() {
    let (status, body) = send(Request::get("/api/nowhere").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["data"]["path"], "/api/nowhere");
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let response = app()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn orders_require_a_token() {
    let (status, body) = send(
        Request::get("/api/orders").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["data"]["error"], "Unauthorized");
}

#[tokio::test]
async fn token_signed_with_other_secret_is_rejected() {
    let token = issue_token(Uuid::new_v4(), ROLE_USER, "someone-else").unwrap();
    let (status, _) = send(
        Request::get("/api/users/me")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_routes_reject_regular_users() {
    let (status, body) = send(
        Request::get("/api/admin/users")
            .header(header::AUTHORIZATION, bearer(ROLE_USER))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Forbidden");
}

#[tokio::test]
async fn guest_without_session_sees_empty_cart() {
    let (status, body) = send(Request::get("/api/cart").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["items"], Value::Array(vec![]));
    assert_eq!(body["data"]["total_price"], "0");
}

#[tokio::test]
async fn malformed_session_header_is_rejected() {
    let (status, _) = send(
        Request::get("/api/cart")
            .header("x-session-cart-id", "not-a-uuid")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn adding_to_cart_needs_an_owner() {
    let payload = serde_json::json!({ "product_id": Uuid::new_v4(), "quantity": 1 });
    let (status, body) = send(
        Request::post("/api/cart/items")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(
        body["data"]["error"]
            .as_str()
            .unwrap()
            .contains("x-session-cart-id")
    );
}

#[tokio::test]
async fn zero_quantity_is_rejected_before_lookup() {
    let payload = serde_json::json!({ "product_id": Uuid::new_v4(), "quantity": 0 });
    let (status, _) = send(
        Request::post("/api/cart/items")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-session-cart-id", Uuid::new_v4().to_string())
            .body(Body::from(payload.to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn short_password_is_rejected_on_register() {
    let payload = serde_json::json!({ "name": "Nino", "email": "nino@example.ge", "password": "123" });
    let (status, _) = send(
        Request::post("/api/auth/register")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn incomplete_address_is_rejected() {
    let payload = serde_json::json!({
        "full_name": "Nino Beridze",
        "street_address": "12 Rustaveli Ave",
        "city": "",
        "postal_code": "0108",
        "country": "Georgia",
        "phone": "+995555000000"
    });
    let (status, body) = send(
        Request::put("/api/users/me/address")
            .header(header::AUTHORIZATION, bearer(ROLE_USER))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["data"]["error"], "Bad Request city is required");
}

#[tokio::test]
async fn bog_token_info_fails_when_unconfigured() {
    let (status, _) = send(
        Request::get("/api/admin/payments/bog/token")
            .header(header::AUTHORIZATION, bearer(ROLE_ADMIN))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[test]
fn openapi_lists_payment_and_admin_paths() {
    let doc = ApiDoc::openapi();
    for path in [
        "/api/products/{slug}",
        "/api/cart/items",
        "/api/orders",
        "/api/payments/bog/callback",
        "/api/payments/bog/orders/{order_id}",
        "/api/admin/orders/{id}/pay",
        "/api/admin/audit-logs",
    ] {
        assert!(doc.paths.paths.contains_key(path), "missing {path}");
    }
}

#[tokio::test]
async fn session_cookie_authenticates_like_a_bearer_token() {
    let token = issue_token(Uuid::new_v4(), ROLE_USER, SECRET).unwrap();
    let (status, body) = send(
        Request::put("/api/users/me/address")
            .header(header::COOKIE, format!("session={token}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                serde_json::json!({
                    "full_name": "",
                    "street_address": "12 Rustaveli Ave",
                    "city": "Tbilisi",
                    "postal_code": "0108",
                    "country": "Georgia",
                    "phone": "+995555000000"
                })
                .to_string(),
            ))
            .unwrap(),
    )
    .await;
    // Past authentication, stopped by validation.
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["data"]["error"], "Bad Request full_name is required");
}

#[tokio::test]
async fn logout_expires_the_session_cookie() {
    let response = app()
        .oneshot(Request::post("/api/auth/logout").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap();
    assert!(cookie.starts_with("session=;"));
    assert!(cookie.contains("Max-Age=0"));
}
