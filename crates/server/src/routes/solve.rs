use std::convert::Infallible;

use axum::body::Body;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use futures::StreamExt;
use pipeline::{progress_channel, ProgressUpdate, RunOptions};
use serde::{Deserialize, Serialize};
use solver_core::{Modality, ProblemInput, SolutionResult};
use tokio_stream::wrappers::UnboundedReceiverStream;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct SolveRequest {
    /// Problem text, or the extracted transcript for image/audio input.
    pub text: String,
    /// "text" (default), "image" or "audio".
    pub modality: Option<String>,
    /// Extraction confidence reported by ingestion, 1.0 when omitted.
    pub extraction_confidence: Option<f32>,
    /// Transcript as edited by the user during review.
    pub edited_transcript: Option<String>,
    #[serde(default = "default_true")]
    pub enable_guardrails: bool,
    pub context: Option<String>,
    /// Caller-assigned run id, generated when omitted.
    pub run_id: Option<Uuid>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SolveResponse {
    pub run_id: Uuid,
    pub entry_id: String,
    pub result: SolutionResult,
}

fn build_run(payload: &SolveRequest) -> Result<(ProblemInput, RunOptions, Uuid), AppError> {
    if payload.text.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Problem text cannot be empty".to_string(),
        ));
    }

    let modality = match payload.modality.as_deref() {
        None => Modality::Text,
        Some(s) => Modality::parse(s)
            .ok_or_else(|| AppError::BadRequest(format!("Unknown modality: {}", s)))?,
    };

    let mut input = match modality {
        Modality::Text => ProblemInput::text(&payload.text),
        _ => ProblemInput::extracted(
            modality,
            &payload.text,
            payload.extraction_confidence.unwrap_or(1.0),
        ),
    };
    if let Some(transcript) = &payload.edited_transcript {
        input = input.with_edited_transcript(transcript);
    }

    let run_id = payload.run_id.unwrap_or_else(Uuid::new_v4);
    let options = RunOptions {
        enable_guardrails: payload.enable_guardrails,
        context: payload.context.clone(),
        run_id: Some(run_id),
    };

    Ok((input, options, run_id))
}

async fn persist_entry(
    state: &AppState,
    original_input: &str,
    modality: Modality,
    result: &SolutionResult,
) -> Result<db::SolutionEntry, db::DbError> {
    let parsed_question = result.metadata["problem_text"]
        .as_str()
        .unwrap_or(original_input)
        .to_string();
    let topic = result.metadata["topic"].as_str().unwrap_or("general");

    let entry = db::SolutionEntry::new(
        original_input,
        modality,
        parsed_question,
        topic,
        result.clone(),
    );
    state.solutions.create(&entry).await
}

#[utoipa::path(
    post,
    path = "/api/solve",
    request_body = SolveRequest,
    responses(
        (status = 200, description = "Problem solved", body = SolveResponse),
        (status = 400, description = "Invalid input or guardrail violation"),
    ),
    tag = "solve"
)]
pub async fn solve_problem(
    State(state): State<AppState>,
    Json(payload): Json<SolveRequest>,
) -> Result<Json<SolveResponse>, AppError> {
    let (input, options, run_id) = build_run(&payload)?;
    let modality = input.modality;

    let token = state.register_run(run_id);
    // Synchronous callers do not consume progress.
    let (progress, _receiver) = progress_channel();

    let outcome = state
        .orchestrator
        .run(input, options, progress, token)
        .await;
    state.unregister_run(&run_id);

    match outcome {
        Ok(result) => {
            let entry = persist_entry(&state, &payload.text, modality, &result).await?;
            Ok(Json(SolveResponse {
                run_id,
                entry_id: entry.id,
                result,
            }))
        }
        Err(err) if err.is_cancelled() => {
            Err(AppError::Pipeline(pipeline::PipelineError::Cancelled))
        }
        Err(err) => Err(AppError::Pipeline(err.error)),
    }
}

#[utoipa::path(
    post,
    path = "/api/solve/stream",
    request_body = SolveRequest,
    responses(
        (status = 200, description = "NDJSON progress stream, one update per line"),
        (status = 400, description = "Invalid input"),
    ),
    tag = "solve"
)]
pub async fn solve_stream(
    State(state): State<AppState>,
    Json(payload): Json<SolveRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (input, options, run_id) = build_run(&payload)?;
    let modality = input.modality;
    let original_input = payload.text.clone();

    let token = state.register_run(run_id);
    let (progress, receiver) = progress_channel();

    // The run outlives a disconnected consumer: the spawned task finishes and
    // persists the result either way.
    let worker_state = state.clone();
    tokio::spawn(async move {
        let outcome = worker_state
            .orchestrator
            .run(input, options, progress.clone(), token)
            .await;
        worker_state.unregister_run(&run_id);

        match outcome {
            Ok(result) => {
                match persist_entry(&worker_state, &original_input, modality, &result).await {
                    Ok(entry) => progress.send(ProgressUpdate::FinalResult {
                        data: serde_json::json!({
                            "run_id": run_id,
                            "entry_id": entry.id,
                            "result": result,
                        }),
                    }),
                    Err(err) => {
                        tracing::error!(%run_id, "failed to store solution: {err}");
                        progress.send(ProgressUpdate::Error {
                            error: "Failed to store solution".to_string(),
                        });
                    }
                }
            }
            Err(err) if err.is_cancelled() => progress.send(ProgressUpdate::Cancelled {
                message: "Run cancelled".to_string(),
            }),
            Err(err) => progress.send(ProgressUpdate::Error {
                error: err.error.to_string(),
            }),
        }
    });

    let stream = UnboundedReceiverStream::new(receiver).map(|update| {
        let mut line = serde_json::to_string(&update).unwrap_or_else(|_| "{}".to_string());
        line.push('\n');
        Ok::<_, Infallible>(line)
    });

    Ok((
        [
            ("content-type", "application/x-ndjson".to_string()),
            ("x-run-id", run_id.to_string()),
        ],
        Body::from_stream(stream),
    ))
}
