use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::error::AppError;

pub const SESSION_CART_HEADER: &str = "x-session-cart-id";

/// Guest cart identifier sent by the client in `x-session-cart-id`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CartSession(pub Option<Uuid>);

impl<S> FromRequestParts<S> for CartSession
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(SESSION_CART_HEADER) else {
            return Ok(CartSession(None));
        };
        let id = value
            .to_str()
            .ok()
            .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
            .ok_or_else(|| AppError::BadRequest(format!("Invalid {SESSION_CART_HEADER} header")))?;
        Ok(CartSession(Some(id)))
    }
}
