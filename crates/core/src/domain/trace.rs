use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Record of a single stage attempt. Append-only: one entry per attempt,
/// never mutated after it is pushed onto the run's trace.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TraceEntry {
    /// Stage name (guardrail, parser, router, solver, verifier, explainer).
    pub stage: String,
    pub input_summary: String,
    pub output_summary: String,
    pub duration_ms: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Stage-specific metadata (topic, confidence, ambiguity list, ...).
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl TraceEntry {
    pub fn success(
        stage: impl Into<String>,
        input_summary: impl Into<String>,
        output_summary: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            stage: stage.into(),
            input_summary: input_summary.into(),
            output_summary: output_summary.into(),
            duration_ms,
            success: true,
            error: None,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn failure(
        stage: impl Into<String>,
        input_summary: impl Into<String>,
        error: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            stage: stage.into(),
            input_summary: input_summary.into(),
            output_summary: String::new(),
            duration_ms,
            success: false,
            error: Some(error.into()),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}
