use axum::extract::{Path, Query, State};
use axum::Json;
use events::{Event, EventEnvelope};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct FeedbackRequest {
    pub entry_id: String,
    pub is_correct: bool,
    pub comment: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FeedbackResponse {
    pub entry_id: String,
    pub recorded: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

#[utoipa::path(
    post,
    path = "/api/feedback",
    request_body = FeedbackRequest,
    responses(
        (status = 200, description = "Feedback recorded", body = FeedbackResponse),
        (status = 404, description = "Entry not found"),
    ),
    tag = "feedback"
)]
pub async fn record_feedback(
    State(state): State<AppState>,
    Json(payload): Json<FeedbackRequest>,
) -> Result<Json<FeedbackResponse>, AppError> {
    let recorded = state
        .solutions
        .update_feedback(
            &payload.entry_id,
            payload.is_correct,
            payload.comment.as_deref(),
        )
        .await?;

    if !recorded {
        return Err(AppError::NotFound(format!(
            "Entry not found: {}",
            payload.entry_id
        )));
    }

    state
        .event_bus
        .publish(EventEnvelope::new(Event::FeedbackRecorded {
            entry_id: payload.entry_id.clone(),
            is_correct: payload.is_correct,
        }));

    Ok(Json(FeedbackResponse {
        entry_id: payload.entry_id,
        recorded: true,
    }))
}

#[utoipa::path(
    get,
    path = "/api/history",
    params(
        ("limit" = Option<i64>, Query, description = "Maximum entries to return (default 20)"),
    ),
    responses(
        (status = 200, description = "Recent solution entries"),
    ),
    tag = "history"
)]
pub async fn list_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<db::SolutionEntry>>, AppError> {
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let entries = state.solutions.find_recent(limit).await?;
    Ok(Json(entries))
}

#[utoipa::path(
    get,
    path = "/api/history/{id}",
    params(
        ("id" = String, Path, description = "Entry ID"),
    ),
    responses(
        (status = 200, description = "Stored solution entry"),
        (status = 404, description = "Entry not found"),
    ),
    tag = "history"
)]
pub async fn get_history_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<db::SolutionEntry>, AppError> {
    let entry = state.solutions.find_by_id(&id).await?;

    match entry {
        Some(entry) => Ok(Json(entry)),
        None => Err(AppError::NotFound(format!("Entry not found: {}", id))),
    }
}
