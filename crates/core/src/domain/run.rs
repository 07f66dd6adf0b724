use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::trace::TraceEntry;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// One end-to-end pipeline execution. Owned exclusively by the orchestrator
/// for its lifetime; the durable projection is the stored solution entry,
/// never the run itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub trace: Vec<TraceEntry>,
    pub status: RunStatus,
}

impl Run {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            trace: Vec::new(),
            status: RunStatus::Running,
        }
    }

    pub fn record(&mut self, entry: TraceEntry) {
        self.trace.push(entry);
    }

    pub fn complete(&mut self) {
        self.status = RunStatus::Completed;
    }

    pub fn fail(&mut self) {
        self.status = RunStatus::Failed;
    }

    /// Cancellation discards the partial trace: nothing about a cancelled
    /// run is observable afterwards.
    pub fn cancel(&mut self) {
        self.status = RunStatus::Cancelled;
        self.trace.clear();
    }
}

impl Default for Run {
    fn default() -> Self {
        Self::new()
    }
}
