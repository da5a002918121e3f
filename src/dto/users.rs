use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{PaymentMethod, User};

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    pub name: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdatePaymentMethodRequest {
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct AdminUpdateUserRequest {
    pub name: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct UserList {
    #[schema(value_type = Vec<User>)]
    pub items: Vec<User>,
}
