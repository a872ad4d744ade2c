use axum::{Json, extract::State};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    response::{ApiResponse, Meta},
    state::AppState,
};

#[derive(Serialize, ToSchema)]
pub struct HealthData {
    pub status: String,
    /// Whether the last product fetch succeeded.
    pub catalog: String,
    pub sessions: usize,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "OK", body = ApiResponse<HealthData>),
    ),
    tag = "Health"
)]
pub async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<HealthData>> {
    let snapshot = state.feed.snapshot();
    let catalog = match (&snapshot.error, snapshot.loading) {
        (Some(_), _) => "error",
        (None, true) => "loading",
        (None, false) => "ok",
    };
    let data = HealthData {
        status: "ok".to_string(),
        catalog: catalog.to_string(),
        sessions: state.sessions.len(),
    };

    Json(ApiResponse::success(
        "Health check",
        data,
        Some(Meta::new(snapshot.products.len() as i64, snapshot.revision)),
    ))
}
