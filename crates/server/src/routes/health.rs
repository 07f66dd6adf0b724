use axum::extract::State;
use axum::Json;
use pipeline::STAGE_ORDER;
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    status: String,
    version: String,
    /// Stage names in execution order.
    stages: Vec<String>,
    /// Runs currently holding a cancellation token.
    active_runs: usize,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let active_runs = state
        .active_runs
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .len();

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        stages: STAGE_ORDER.iter().map(|s| s.to_string()).collect(),
        active_runs,
    })
}
