//! Event types for the run lifecycle event system

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping all events with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event ID
    pub id: Uuid,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// The actual event
    pub event: Event,
}

impl EventEnvelope {
    /// Create a new event envelope with auto-generated ID and timestamp
    pub fn new(event: Event) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        }
    }
}

/// All possible events in the system
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A pipeline run started executing
    #[serde(rename = "run.started")]
    RunStarted { run_id: Uuid, modality: String },

    /// A stage within a run started
    #[serde(rename = "stage.started")]
    StageStarted { run_id: Uuid, stage: String },

    /// A stage within a run finished (successfully or not)
    #[serde(rename = "stage.finished")]
    StageFinished {
        run_id: Uuid,
        stage: String,
        success: bool,
        duration_ms: u64,
    },

    /// Run completed with a solution
    #[serde(rename = "run.completed")]
    RunCompleted {
        run_id: Uuid,
        confidence: f32,
        requires_human_review: bool,
    },

    /// Run halted with an error
    #[serde(rename = "run.failed")]
    RunFailed { run_id: Uuid, error: String },

    /// Run was cancelled by the user
    #[serde(rename = "run.cancelled")]
    RunCancelled { run_id: Uuid },

    /// User feedback was recorded against a stored solution
    #[serde(rename = "feedback.recorded")]
    FeedbackRecorded { entry_id: String, is_correct: bool },

    /// Generic error event
    #[serde(rename = "error")]
    Error {
        message: String,
        context: Option<String>,
    },
}

impl Event {
    /// Get the run ID associated with this event, if any
    pub fn run_id(&self) -> Option<Uuid> {
        match self {
            Event::RunStarted { run_id, .. } => Some(*run_id),
            Event::StageStarted { run_id, .. } => Some(*run_id),
            Event::StageFinished { run_id, .. } => Some(*run_id),
            Event::RunCompleted { run_id, .. } => Some(*run_id),
            Event::RunFailed { run_id, .. } => Some(*run_id),
            Event::RunCancelled { run_id } => Some(*run_id),
            Event::FeedbackRecorded { .. } => None,
            Event::Error { .. } => None,
        }
    }

    /// SSE event type string for this event
    pub fn kind(&self) -> &'static str {
        match self {
            Event::RunStarted { .. } => "run.started",
            Event::StageStarted { .. } => "stage.started",
            Event::StageFinished { .. } => "stage.finished",
            Event::RunCompleted { .. } => "run.completed",
            Event::RunFailed { .. } => "run.failed",
            Event::RunCancelled { .. } => "run.cancelled",
            Event::FeedbackRecorded { .. } => "feedback.recorded",
            Event::Error { .. } => "error",
        }
    }
}
