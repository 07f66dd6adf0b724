use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use db::KnowledgeEntry;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateKnowledgeRequest {
    pub topic: String,
    pub content: String,
}

#[utoipa::path(
    get,
    path = "/api/knowledge",
    responses(
        (status = 200, description = "All knowledge base documents"),
    ),
    tag = "knowledge"
)]
pub async fn list_knowledge(
    State(state): State<AppState>,
) -> Result<Json<Vec<KnowledgeEntry>>, AppError> {
    let entries = state.knowledge.list().await?;
    Ok(Json(entries))
}

#[utoipa::path(
    post,
    path = "/api/knowledge",
    request_body = CreateKnowledgeRequest,
    responses(
        (status = 201, description = "Document added"),
        (status = 400, description = "Empty topic or content"),
    ),
    tag = "knowledge"
)]
pub async fn create_knowledge(
    State(state): State<AppState>,
    Json(payload): Json<CreateKnowledgeRequest>,
) -> Result<(StatusCode, Json<KnowledgeEntry>), AppError> {
    if payload.topic.trim().is_empty() || payload.content.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Topic and content cannot be empty".to_string(),
        ));
    }

    let entry = KnowledgeEntry::new(payload.topic, payload.content);
    state.knowledge.insert(&entry).await?;

    Ok((StatusCode::CREATED, Json(entry)))
}
