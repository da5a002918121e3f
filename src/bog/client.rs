use std::{sync::Arc, time::Duration};

use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::instrument;

use super::{
    BogError,
    auth::{BogToken, fetch_token},
    types::{CreateOrderRequest, CreateOrderResponse, CreatedOrder, Receipt},
};
use crate::config::BogConfig;

/// BOG payments API client.
///
/// The access token is cached in process memory. Callers that find it expired
/// refresh it while holding the cache lock, so concurrent requests wait for a
/// single refresh instead of each requesting a token.
#[derive(Clone)]
pub struct BogClient {
    inner: Arc<BogClientInner>,
}

struct BogClientInner {
    http: reqwest::Client,
    config: BogConfig,
    token: Mutex<Option<BogToken>>,
}

impl BogClient {
    pub fn new(config: BogConfig) -> Result<Self, BogError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            inner: Arc::new(BogClientInner {
                http,
                config,
                token: Mutex::new(None),
            }),
        })
    }

    pub fn config(&self) -> &BogConfig {
        &self.inner.config
    }

    /// Returns the cached token, fetching a new one when missing or expired.
    pub async fn token(&self) -> Result<BogToken, BogError> {
        let config = &self.inner.config;
        if config.client_id.is_empty() || config.client_secret.expose_secret().is_empty() {
            return Err(BogError::NotConfigured);
        }

        let mut cached = self.inner.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|token| !token.is_expired()) {
            return Ok(token.clone());
        }

        let token = fetch_token(
            &self.inner.http,
            &config.auth_url,
            &config.client_id,
            &config.client_secret,
        )
        .await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    pub async fn clear_token(&self) {
        *self.inner.token.lock().await = None;
    }

    /// Register an order with BOG and return the hosted payment page.
    #[instrument(skip(self, request), fields(external_order_id = %request.external_order_id))]
    pub async fn create_order(&self, request: &CreateOrderRequest) -> Result<CreatedOrder, BogError> {
        let token = self.token().await?;
        let url = format!("{}/ecommerce/orders", self.inner.config.api_url);

        let response = self
            .inner
            .http
            .post(url)
            .bearer_auth(token.access_token.expose_secret())
            .header("Accept-Language", &self.inner.config.locale)
            .json(request)
            .send()
            .await?;

        let created: CreateOrderResponse = self.checked(read_json(response).await).await?;
        let redirect_url = created
            .links
            .redirect
            .map(|link| link.href)
            .ok_or(BogError::MissingRedirect)?;

        tracing::info!(bog_order_id = %created.id, "created BOG order");
        Ok(CreatedOrder {
            bog_order_id: created.id,
            redirect_url,
        })
    }

    /// Fetch the payment receipt for a BOG order.
    #[instrument(skip(self))]
    pub async fn get_receipt(&self, bog_order_id: &str) -> Result<Receipt, BogError> {
        let token = self.token().await?;
        let url = format!("{}/receipt/{bog_order_id}", self.inner.config.api_url);

        let response = self
            .inner
            .http
            .get(url)
            .bearer_auth(token.access_token.expose_secret())
            .header("Accept-Language", &self.inner.config.locale)
            .send()
            .await?;

        self.checked(read_json(response).await).await
    }

    /// Drops the cached token when BOG rejects it, so the next call re-authenticates.
    async fn checked<T>(&self, result: Result<T, BogError>) -> Result<T, BogError> {
        if let Err(BogError::Api { status: 401, .. }) = &result {
            tracing::warn!("BOG rejected the access token, clearing cache");
            self.clear_token().await;
        }
        result
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, BogError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(BogError::Api {
        status: status.as_u16(),
        body,
    })
}

impl std::fmt::Debug for BogClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BogClient")
            .field("api_url", &self.inner.config.api_url)
            .finish_non_exhaustive()
    }
}
