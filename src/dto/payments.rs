use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct BogPaymentStarted {
    pub bog_order_id: String,
    pub redirect_url: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BogPaymentStatus {
    pub bog_order_id: String,
    pub status: String,
    pub order_paid: bool,
}

/// Token metadata only; the token itself never leaves the server.
#[derive(Debug, Serialize, ToSchema)]
pub struct BogTokenInfo {
    pub token_type: String,
    pub expires_at: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CallbackAck {
    pub order_id: uuid::Uuid,
    pub status: String,
}
