use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    response::{ApiResponse, Meta},
    state::AppState,
};

#[derive(Serialize, ToSchema)]
pub struct HealthData {
    pub status: String,
    pub database: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "OK", body = ApiResponse<HealthData>),
        (status = 503, description = "Database unreachable", body = ApiResponse<HealthData>),
    ),
        tag = "Health"
)]
pub async fn health_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<ApiResponse<HealthData>>) {
    let (code, data) = match state.orm.ping().await {
        Ok(()) => (
            StatusCode::OK,
            HealthData {
                status: "ok".to_string(),
                database: "up".to_string(),
            },
        ),
        Err(err) => {
            tracing::warn!(error = %err, "database ping failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                HealthData {
                    status: "degraded".to_string(),
                    database: "down".to_string(),
                },
            )
        }
    };

    (
        code,
        Json(ApiResponse::success("Health check", data, Some(Meta::empty()))),
    )
}
