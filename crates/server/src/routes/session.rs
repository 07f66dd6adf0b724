use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use db::ViewStateSnapshot;
use pipeline::ViewStateMachine;
use serde::Deserialize;
use solver_core::ViewState;
use utoipa::ToSchema;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct PutViewStateRequest {
    /// "input", "review" or "solution". "processing" is transient and
    /// cannot be stored.
    pub state: String,
    pub transcript: Option<String>,
    pub extraction_confidence: Option<f32>,
    pub entry_id: Option<String>,
}

/// A persisted `Input` may legally reach `Review` or `Solution`: the
/// `Processing` hop between them is never stored.
fn transition_allowed(from: &ViewState, to: &ViewState) -> bool {
    ViewStateMachine::can_transition(from, to)
        || (ViewStateMachine::can_transition(from, &ViewState::Processing)
            && ViewStateMachine::can_transition(&ViewState::Processing, to))
}

#[utoipa::path(
    get,
    path = "/api/session/{id}/view-state",
    params(
        ("id" = String, Path, description = "Session ID"),
    ),
    responses(
        (status = 200, description = "Current view state"),
    ),
    tag = "session"
)]
pub async fn get_view_state(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ViewStateSnapshot>, AppError> {
    let snapshot = state.view_states.load(&id).await?;
    Ok(Json(
        snapshot.unwrap_or_else(|| ViewStateSnapshot::initial(&id)),
    ))
}

#[utoipa::path(
    put,
    path = "/api/session/{id}/view-state",
    params(
        ("id" = String, Path, description = "Session ID"),
    ),
    request_body = PutViewStateRequest,
    responses(
        (status = 200, description = "View state stored"),
        (status = 400, description = "Unknown or unpersistable state"),
        (status = 409, description = "Transition not allowed"),
    ),
    tag = "session"
)]
pub async fn put_view_state(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<PutViewStateRequest>,
) -> Result<Json<ViewStateSnapshot>, AppError> {
    let target = ViewState::parse(&payload.state)
        .ok_or_else(|| AppError::BadRequest(format!("Unknown view state: {}", payload.state)))?;
    if !target.is_persistable() {
        return Err(AppError::BadRequest(format!(
            "State '{}' cannot be persisted",
            target.as_str()
        )));
    }

    let current = state
        .view_states
        .load(&id)
        .await?
        .map(|snapshot| snapshot.state)
        .unwrap_or_default();

    if !transition_allowed(&current, &target) {
        return Err(AppError::Conflict(format!(
            "Invalid view transition from '{}' to '{}'",
            current.as_str(),
            target.as_str()
        )));
    }

    let snapshot = ViewStateSnapshot {
        session_id: id,
        state: target,
        transcript: payload.transcript,
        extraction_confidence: payload.extraction_confidence,
        entry_id: payload.entry_id,
        updated_at: Utc::now(),
    };
    state.view_states.save(&snapshot).await?;

    Ok(Json(snapshot))
}

#[utoipa::path(
    delete,
    path = "/api/session/{id}/view-state",
    params(
        ("id" = String, Path, description = "Session ID"),
    ),
    responses(
        (status = 204, description = "View state cleared"),
        (status = 404, description = "No stored view state"),
    ),
    tag = "session"
)]
pub async fn clear_view_state(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let cleared = state.view_states.clear(&id).await?;

    if cleared {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!(
            "No stored view state for session: {}",
            id
        )))
    }
}
