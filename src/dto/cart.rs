use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{models::CartLine, pricing::CartTotals};

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddToCartRequest {
    pub product_id: Uuid,
    pub size_id: Option<Uuid>,
    /// Defaults to 1.
    pub quantity: Option<i32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateCartItemRequest {
    pub product_id: Uuid,
    pub size_id: Option<Uuid>,
    /// 0 removes the line.
    pub quantity: i32,
}

#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct CartItemQuery {
    pub size_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartDto {
    pub id: Option<Uuid>,
    pub session_cart_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub items: Vec<CartLine>,
    #[serde(flatten)]
    pub totals: CartTotals,
    pub updated_at: Option<DateTime<Utc>>,
}
