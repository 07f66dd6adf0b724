use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Unavailable(String),
    Internal(String),
    Database(db::DbError),
    Pipeline(pipeline::PipelineError),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            AppError::Unavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", msg)
            }
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
            AppError::Database(err) => {
                tracing::error!("Database error: {:?}", err);
                match err {
                    db::DbError::UnpersistableState(_) => {
                        (StatusCode::BAD_REQUEST, "bad_request", err.to_string())
                    }
                    _ => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "database_error",
                        "Database error occurred".to_string(),
                    ),
                }
            }
            AppError::Pipeline(err) => {
                tracing::error!("Pipeline error: {:?}", err);
                match err {
                    pipeline::PipelineError::GuardrailViolation { .. } => {
                        (StatusCode::BAD_REQUEST, "guardrail_violation", err.to_string())
                    }
                    pipeline::PipelineError::Cancelled => (
                        StatusCode::CONFLICT,
                        "run_cancelled",
                        "Run was cancelled".to_string(),
                    ),
                    pipeline::PipelineError::InvalidTransition { .. } => {
                        (StatusCode::CONFLICT, "invalid_transition", err.to_string())
                    }
                    pipeline::PipelineError::RateLimited { .. }
                    | pipeline::PipelineError::Api { .. }
                    | pipeline::PipelineError::Http(_) => {
                        (StatusCode::BAD_GATEWAY, "upstream_error", err.to_string())
                    }
                    pipeline::PipelineError::StageTimeout { .. } => (
                        StatusCode::GATEWAY_TIMEOUT,
                        "stage_timeout",
                        err.to_string(),
                    ),
                    _ => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "pipeline_error",
                        err.to_string(),
                    ),
                }
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

impl From<db::DbError> for AppError {
    fn from(err: db::DbError) -> Self {
        AppError::Database(err)
    }
}

impl From<pipeline::PipelineError> for AppError {
    fn from(err: pipeline::PipelineError) -> Self {
        AppError::Pipeline(err)
    }
}
