use solver_core::TraceEntry;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Input blocked by guardrail: {}", .violations.join("; "))]
    GuardrailViolation { violations: Vec<String> },

    #[error("Stage {stage} timed out after {elapsed_ms}ms")]
    StageTimeout { stage: String, elapsed_ms: u64 },

    #[error("Upstream service error in {stage}: {message}")]
    Upstream { stage: String, message: String },

    #[error("Stage {stage} failed: {message}")]
    StageFailed { stage: String, message: String },

    #[error("Stage {stage} requires output from {needs}, which has not run")]
    MissingUpstream { stage: String, needs: String },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Rate limited")]
    RateLimited { retry_after: Option<u64> },

    #[error("LLM API error: {message}")]
    Api {
        message: String,
        status_code: Option<u16>,
    },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Database error: {0}")]
    Database(#[from] db::DbError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn upstream(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Upstream {
            stage: stage.into(),
            message: message.into(),
        }
    }

    pub fn stage_failed(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StageFailed {
            stage: stage.into(),
            message: message.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Terminal outcome of an unsuccessful run.
///
/// Carries the partial trace up to the failing stage. Cancelled runs carry
/// an empty trace: nothing about them is observable afterwards.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct RunError {
    #[source]
    pub error: PipelineError,
    pub trace: Vec<TraceEntry>,
}

impl RunError {
    pub fn new(error: PipelineError, trace: Vec<TraceEntry>) -> Self {
        Self { error, trace }
    }

    pub fn cancelled() -> Self {
        Self {
            error: PipelineError::Cancelled,
            trace: Vec::new(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.error.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guardrail_violation_message() {
        let err = PipelineError::GuardrailViolation {
            violations: vec!["off-topic".to_string(), "unsafe".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Input blocked by guardrail: off-topic; unsafe"
        );
    }

    #[test]
    fn test_cancelled_run_error_has_empty_trace() {
        let err = RunError::cancelled();
        assert!(err.is_cancelled());
        assert!(err.trace.is_empty());
    }
}
