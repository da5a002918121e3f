use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};

use crate::{
    audit,
    dto::users::{UpdatePaymentMethodRequest, UpdateProfileRequest},
    entity::users::{ActiveModel as UserActive, Entity as Users, Model as UserModel},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{ShippingAddress, User},
    response::{ApiResponse, Meta},
    state::AppState,
};

pub async fn me(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<User>> {
    let model = load(state, user).await?;
    Ok(ApiResponse::success("OK", model.into(), Some(Meta::empty())))
}

pub async fn update_profile(
    state: &AppState,
    user: &AuthUser,
    payload: UpdateProfileRequest,
) -> AppResult<ApiResponse<User>> {
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::BadRequest("Name is required".into()));
    }

    let mut active: UserActive = load(state, user).await?.into();
    active.name = Set(name);
    active.updated_at = Set(Utc::now().into());
    let updated = active.update(&state.orm).await?;

    audit::record(
        state,
        Some(user.user_id),
        "profile_update",
        "users",
        serde_json::json!({ "user_id": user.user_id }),
    )
    .await;

    Ok(ApiResponse::success("Profile updated", updated.into(), Some(Meta::empty())))
}

/// Saves the shipping address used at checkout.
pub async fn update_address(
    state: &AppState,
    user: &AuthUser,
    payload: ShippingAddress,
) -> AppResult<ApiResponse<User>> {
    if let Some(field) = payload.missing_field() {
        return Err(AppError::BadRequest(format!("{field} is required")));
    }

    let mut active: UserActive = load(state, user).await?.into();
    active.address = Set(Some(payload));
    active.updated_at = Set(Utc::now().into());
    let updated = active.update(&state.orm).await?;

    audit::record(
        state,
        Some(user.user_id),
        "address_update",
        "users",
        serde_json::json!({ "user_id": user.user_id }),
    )
    .await;

    Ok(ApiResponse::success("Address saved", updated.into(), Some(Meta::empty())))
}

pub async fn update_payment_method(
    state: &AppState,
    user: &AuthUser,
    payload: UpdatePaymentMethodRequest,
) -> AppResult<ApiResponse<User>> {
    let mut active: UserActive = load(state, user).await?.into();
    active.payment_method = Set(Some(payload.payment_method.as_str().to_string()));
    active.updated_at = Set(Utc::now().into());
    let updated = active.update(&state.orm).await?;

    audit::record(
        state,
        Some(user.user_id),
        "payment_method_update",
        "users",
        serde_json::json!({ "user_id": user.user_id, "payment_method": payload.payment_method }),
    )
    .await;

    Ok(ApiResponse::success(
        "Payment method saved",
        updated.into(),
        Some(Meta::empty()),
    ))
}

async fn load(state: &AppState, user: &AuthUser) -> AppResult<UserModel> {
    Users::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)
}
