use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entity;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub address: Option<ShippingAddress>,
    pub payment_method: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub category: String,
    pub brand: String,
    pub description: String,
    pub images: Vec<String>,
    pub price: Decimal,
    pub stock: i32,
    pub is_featured: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductSize {
    pub id: Uuid,
    pub product_id: Uuid,
    pub label: String,
    pub price: Decimal,
    pub stock: i32,
}

/// One line of a cart, priced at the moment it was added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CartLine {
    pub product_id: Uuid,
    pub size_id: Option<Uuid>,
    pub name: String,
    pub slug: String,
    pub size_label: Option<String>,
    pub image: Option<String>,
    pub price: Decimal,
    pub quantity: i32,
}

impl CartLine {
    pub fn matches(&self, product_id: Uuid, size_id: Option<Uuid>) -> bool {
        self.product_id == product_id && self.size_id == size_id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct CartLines(pub Vec<CartLine>);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct ImageList(pub Vec<String>);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, FromJsonQueryResult)]
pub struct ShippingAddress {
    pub full_name: String,
    pub street_address: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
    pub phone: String,
}

impl ShippingAddress {
    pub fn missing_field(&self) -> Option<&'static str> {
        [
            ("full_name", &self.full_name),
            ("street_address", &self.street_address),
            ("city", &self.city),
            ("postal_code", &self.postal_code),
            ("country", &self.country),
            ("phone", &self.phone),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
    }
}

/// Outcome reported by the payment provider, stored on the order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, FromJsonQueryResult)]
pub struct PaymentResult {
    pub provider: String,
    pub reference: String,
    pub status: String,
    pub amount: Option<Decimal>,
    pub paid_by: Option<String>,
    #[schema(value_type = Object)]
    pub raw: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum PaymentMethod {
    #[serde(rename = "BOG")]
    Bog,
    CashOnDelivery,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Bog => "BOG",
            PaymentMethod::CashOnDelivery => "CashOnDelivery",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BOG" => Ok(PaymentMethod::Bog),
            "CashOnDelivery" => Ok(PaymentMethod::CashOnDelivery),
            other => Err(format!("unknown payment method {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "paid" => Ok(OrderStatus::Paid),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(format!("unknown order status {other}")),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub shipping_address: ShippingAddress,
    pub payment_method: String,
    pub payment_result: Option<PaymentResult>,
    pub bog_order_id: Option<String>,
    pub items_price: Decimal,
    pub shipping_price: Decimal,
    pub tax_price: Decimal,
    pub total_price: Decimal,
    pub status: String,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub is_delivered: bool,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub size_id: Option<Uuid>,
    pub name: String,
    pub slug: String,
    pub size_label: Option<String>,
    pub image: Option<String>,
    pub quantity: i32,
    pub price: Decimal,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuditLog {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    /// Email of the acting user, when the account still exists.
    pub user_email: Option<String>,
    pub action: String,
    pub resource: Option<String>,
    #[schema(value_type = Object)]
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl From<entity::users::Model> for User {
    fn from(model: entity::users::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            email: model.email,
            role: model.role,
            email_verified_at: model.email_verified_at.map(|dt| dt.with_timezone(&Utc)),
            address: model.address,
            payment_method: model.payment_method,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

impl From<entity::products::Model> for Product {
    fn from(model: entity::products::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            slug: model.slug,
            category: model.category,
            brand: model.brand,
            description: model.description,
            images: model.images.0,
            price: model.price,
            stock: model.stock,
            is_featured: model.is_featured,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

impl From<entity::product_sizes::Model> for ProductSize {
    fn from(model: entity::product_sizes::Model) -> Self {
        Self {
            id: model.id,
            product_id: model.product_id,
            label: model.label,
            price: model.price,
            stock: model.stock,
        }
    }
}

impl From<entity::orders::Model> for Order {
    fn from(model: entity::orders::Model) -> Self {
        Self {
            id: model.id,
            order_number: model.order_number,
            user_id: model.user_id,
            shipping_address: model.shipping_address,
            payment_method: model.payment_method,
            payment_result: model.payment_result,
            bog_order_id: model.bog_order_id,
            items_price: model.items_price,
            shipping_price: model.shipping_price,
            tax_price: model.tax_price,
            total_price: model.total_price,
            status: model.status,
            is_paid: model.paid_at.is_some(),
            paid_at: model.paid_at.map(|dt| dt.with_timezone(&Utc)),
            is_delivered: model.delivered_at.is_some(),
            delivered_at: model.delivered_at.map(|dt| dt.with_timezone(&Utc)),
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

impl From<entity::order_items::Model> for OrderItem {
    fn from(model: entity::order_items::Model) -> Self {
        Self {
            id: model.id,
            order_id: model.order_id,
            product_id: model.product_id,
            size_id: model.size_id,
            name: model.name,
            slug: model.slug,
            size_label: model.size_label,
            image: model.image,
            quantity: model.quantity,
            price: model.price,
        }
    }
}

impl From<(entity::audit_logs::Model, Option<entity::users::Model>)> for AuditLog {
    fn from((model, user): (entity::audit_logs::Model, Option<entity::users::Model>)) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            user_email: user.map(|u| u.email),
            action: model.action,
            resource: model.resource,
            metadata: model.metadata,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}
