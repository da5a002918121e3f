use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::AuditLog;

/// Stock change for a product, or for one of its sizes when `size_id` is set.
#[derive(Debug, Deserialize, ToSchema)]
pub struct InventoryAdjustRequest {
    pub delta: i32,
    pub size_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InventoryLevel {
    pub product_id: Uuid,
    pub size_id: Option<Uuid>,
    pub stock: i32,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct AuditLogList {
    #[schema(value_type = Vec<AuditLog>)]
    pub items: Vec<AuditLog>,
}
