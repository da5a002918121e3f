#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use secrecy::SecretString;
use serde_json::{Value, json};
use storefront_api::config::BogConfig;

/// In-process stand-in for the BOG auth server and payments API.
#[derive(Clone)]
pub struct FakeBog {
    pub base_url: String,
    inner: Arc<FakeBogInner>,
}

#[derive(Default)]
struct FakeBogInner {
    token_requests: AtomicUsize,
    /// Receipt status per BOG order id; missing entries report `completed`.
    statuses: Mutex<HashMap<String, String>>,
    /// Basket bodies received by the order endpoint, keyed by BOG order id.
    orders: Mutex<HashMap<String, Value>>,
}

impl FakeBog {
    pub async fn start() -> Self {
        let inner = Arc::new(FakeBogInner::default());
        let app = Router::new()
            .route("/token", post(token))
            .route("/ecommerce/orders", post(create_order))
            .route("/receipt/{id}", get(receipt))
            .with_state(inner.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake BOG");
        let addr = listener.local_addr().expect("fake BOG addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("fake BOG server");
        });

        Self {
            base_url: format!("http://{addr}"),
            inner,
        }
    }

    pub fn config(&self) -> BogConfig {
        BogConfig {
            client_id: "shop-client".into(),
            client_secret: SecretString::from("shop-secret"),
            auth_url: format!("{}/token", self.base_url),
            api_url: self.base_url.clone(),
            callback_url: "http://shop.test/api/payments/bog/callback".into(),
            success_url: "http://shop.test/checkout/success".into(),
            fail_url: "http://shop.test/checkout/failed".into(),
            locale: "ka".into(),
        }
    }

    pub fn token_requests(&self) -> usize {
        self.inner.token_requests.load(Ordering::SeqCst)
    }

    pub fn set_status(&self, bog_order_id: &str, status: &str) {
        self.inner
            .statuses
            .lock()
            .expect("statuses lock")
            .insert(bog_order_id.to_string(), status.to_string());
    }

    pub fn order_body(&self, bog_order_id: &str) -> Option<Value> {
        self.inner
            .orders
            .lock()
            .expect("orders lock")
            .get(bog_order_id)
            .cloned()
    }
}

async fn token(State(state): State<Arc<FakeBogInner>>, headers: HeaderMap) -> Response {
    let basic = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Basic "));
    if !basic {
        return (StatusCode::UNAUTHORIZED, "missing client credentials").into_response();
    }

    let n = state.token_requests.fetch_add(1, Ordering::SeqCst) + 1;
    Json(json!({
        "access_token": format!("token-{n}"),
        "token_type": "Bearer",
        "expires_in": 3600
    }))
    .into_response()
}

fn has_bearer(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Bearer token-"))
}

async fn create_order(
    State(state): State<Arc<FakeBogInner>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !has_bearer(&headers) {
        return (StatusCode::UNAUTHORIZED, "bad token").into_response();
    }

    let external = body["external_order_id"].as_str().unwrap_or_default().to_string();
    if external == "explode" {
        return (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded").into_response();
    }

    let id = format!("bog-{external}");
    state
        .orders
        .lock()
        .expect("orders lock")
        .insert(id.clone(), body);

    let mut links = json!({
        "details": { "href": format!("https://api.bog.test/receipt/{id}") }
    });
    if external != "no-redirect" {
        links["redirect"] = json!({ "href": format!("https://payment.bog.test/?order_id={id}") });
    }

    Json(json!({ "id": id, "_links": links })).into_response()
}

async fn receipt(
    State(state): State<Arc<FakeBogInner>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if !has_bearer(&headers) {
        return (StatusCode::UNAUTHORIZED, "bad token").into_response();
    }

    let status = state
        .statuses
        .lock()
        .expect("statuses lock")
        .get(&id)
        .cloned()
        .unwrap_or_else(|| "completed".to_string());

    let amount = state
        .orders
        .lock()
        .expect("orders lock")
        .get(&id)
        .and_then(|body| body["purchase_units"]["total_amount"].as_f64())
        .map(|amount| format!("{amount:.2}"))
        .unwrap_or_else(|| "0.00".to_string());

    Json(json!({
        "order_id": id,
        "external_order_id": id.trim_start_matches("bog-"),
        "order_status": { "key": status, "value": status },
        "purchase_units": {
            "request_amount": amount,
            "transfer_amount": amount,
            "currency_code": "GEL"
        },
        "payment_detail": {
            "transaction_id": format!("tx-{id}"),
            "payer_identifier": "548888***1234",
            "transfer_method": { "key": "card" }
        }
    }))
    .into_response()
}
