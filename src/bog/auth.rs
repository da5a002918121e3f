use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::instrument;

use super::BogError;

/// Seconds before the real expiry at which a token is treated as expired.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Bearer token issued by the BOG authorization server.
#[derive(Debug, Clone)]
pub struct BogToken {
    pub access_token: SecretString,
    pub token_type: String,
    /// Unix timestamp when the token expires.
    pub expires_at: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    #[serde(default = "default_token_type")]
    token_type: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl BogToken {
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(chrono::Utc::now().timestamp())
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.expires_at - EXPIRY_MARGIN_SECS
    }
}

/// Obtain a token with the client-credentials grant.
#[instrument(skip(client, client_secret))]
pub async fn fetch_token(
    client: &reqwest::Client,
    auth_url: &str,
    client_id: &str,
    client_secret: &SecretString,
) -> Result<BogToken, BogError> {
    let now = chrono::Utc::now().timestamp();

    let response = client
        .post(auth_url)
        .basic_auth(client_id, Some(client_secret.expose_secret()))
        .form(&[("grant_type", "client_credentials")])
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(BogError::AuthenticationFailed(format!("HTTP {status}: {body}")));
    }

    let token: TokenResponse = response.json().await?;
    tracing::debug!(expires_in = token.expires_in, "obtained BOG access token");

    Ok(BogToken {
        access_token: SecretString::from(token.access_token),
        token_type: token.token_type,
        expires_at: now + token.expires_in,
    })
}
