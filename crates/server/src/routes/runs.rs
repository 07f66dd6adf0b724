use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct CancelResponse {
    pub run_id: Uuid,
    pub cancelled: bool,
}

#[utoipa::path(
    post,
    path = "/api/runs/{id}/cancel",
    params(
        ("id" = Uuid, Path, description = "Run ID"),
    ),
    responses(
        (status = 200, description = "Cancellation requested", body = CancelResponse),
        (status = 404, description = "Run not active"),
    ),
    tag = "runs"
)]
pub async fn cancel_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CancelResponse>, AppError> {
    if !state.cancel_run(&id) {
        return Err(AppError::NotFound(format!("Run not active: {}", id)));
    }

    tracing::info!(run_id = %id, "cancellation requested");

    Ok(Json(CancelResponse {
        run_id: id,
        cancelled: true,
    }))
}
