use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct CreateOrderRequest {
    pub callback_url: String,
    pub external_order_id: String,
    pub purchase_units: PurchaseUnits,
    pub redirect_urls: RedirectUrls,
}

#[derive(Debug, Clone, Serialize)]
pub struct PurchaseUnits {
    pub currency: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    pub basket: Vec<BasketItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BasketItem {
    pub product_id: String,
    pub description: String,
    pub quantity: i32,
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct RedirectUrls {
    pub success: String,
    pub fail: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderResponse {
    pub id: String,
    #[serde(rename = "_links")]
    pub links: OrderLinks,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderLinks {
    pub details: Option<Link>,
    pub redirect: Option<Link>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Link {
    pub href: String,
}

/// A created BOG order and the page the customer pays on.
#[derive(Debug, Clone)]
pub struct CreatedOrder {
    pub bog_order_id: String,
    pub redirect_url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Receipt {
    pub order_id: String,
    #[serde(default)]
    pub external_order_id: Option<String>,
    pub order_status: ReceiptStatus,
    #[serde(default)]
    pub purchase_units: Option<ReceiptPurchaseUnits>,
    #[serde(default)]
    pub payment_detail: Option<PaymentDetail>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReceiptStatus {
    pub key: String,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReceiptPurchaseUnits {
    #[serde(default)]
    pub request_amount: Option<String>,
    #[serde(default)]
    pub transfer_amount: Option<String>,
    #[serde(default)]
    pub currency_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PaymentDetail {
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub payer_identifier: Option<String>,
    #[serde(default)]
    pub transfer_method: Option<TransferMethod>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransferMethod {
    pub key: String,
}

/// Body BOG posts to the callback URL.
#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct CallbackPayload {
    pub event: String,
    #[serde(default)]
    pub zoned_request_time: Option<String>,
    pub body: CallbackBody,
}

#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct CallbackBody {
    pub order_id: String,
    #[serde(default)]
    pub external_order_id: Option<String>,
}
