//! Bank of Georgia (BOG) online payments client.
//!
//! - OAuth2 client-credentials token, cached in memory until shortly before expiry
//! - Order creation returning the hosted payment page URL
//! - Receipt lookup used to confirm payment status on callback

pub mod auth;
pub mod client;
pub mod types;

pub use auth::BogToken;
pub use client::BogClient;
pub use types::*;

use thiserror::Error;

/// Status keys reported by BOG for an order.
pub mod status {
    pub const COMPLETED: &str = "completed";
    pub const REJECTED: &str = "rejected";
}

#[derive(Debug, Error)]
pub enum BogError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("BOG API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("BOG response has no redirect link")]
    MissingRedirect,

    #[error("BOG client is not configured")]
    NotConfigured,
}
