use axum::extract::State;
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use pipeline::services::needs_confirmation;
use serde::{Deserialize, Serialize};
use solver_core::Modality;
use utoipa::ToSchema;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct IngestRequest {
    /// "text", "image" or "audio".
    pub input_type: String,
    /// Problem text for direct text input.
    pub text: Option<String>,
    /// Base64-encoded payload for image/audio input.
    pub payload_base64: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IngestResponse {
    pub modality: String,
    pub text: String,
    pub confidence: f32,
    /// Whether the transcript must be confirmed by the user before solving.
    pub needs_confirmation: bool,
}

#[utoipa::path(
    post,
    path = "/api/ingest",
    request_body = IngestRequest,
    responses(
        (status = 200, description = "Normalized problem text", body = IngestResponse),
        (status = 400, description = "Invalid input"),
        (status = 503, description = "No extraction service configured"),
    ),
    tag = "ingest"
)]
pub async fn ingest(
    State(state): State<AppState>,
    Json(payload): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, AppError> {
    let modality = Modality::parse(&payload.input_type)
        .ok_or_else(|| AppError::BadRequest(format!("Unknown input type: {}", payload.input_type)))?;

    if modality == Modality::Text {
        let text = payload
            .text
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| AppError::BadRequest("Text input requires 'text'".to_string()))?;

        return Ok(Json(IngestResponse {
            modality: modality.as_str().to_string(),
            text,
            confidence: 1.0,
            needs_confirmation: false,
        }));
    }

    let data = payload
        .payload_base64
        .ok_or_else(|| AppError::BadRequest("Missing 'payload_base64'".to_string()))?;
    if BASE64.decode(&data).is_err() {
        return Err(AppError::BadRequest("Invalid base64 payload".to_string()));
    }

    let extractor = state.extractor.as_ref().ok_or_else(|| {
        AppError::Unavailable("No extraction service configured".to_string())
    })?;

    let extraction = extractor.extract(modality, &data).await?;

    Ok(Json(IngestResponse {
        modality: modality.as_str().to_string(),
        needs_confirmation: needs_confirmation(
            modality,
            extraction.confidence,
            state.extraction_threshold,
        ),
        text: extraction.text,
        confidence: extraction.confidence,
    }))
}
