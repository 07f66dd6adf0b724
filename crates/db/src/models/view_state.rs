use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solver_core::ViewState;

use super::solution::{datetime_to_timestamp, timestamp_to_datetime};

/// Restorable snapshot of a session's UI state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewStateSnapshot {
    pub session_id: String,
    pub state: ViewState,
    /// Extracted or edited transcript awaiting confirmation in `Review`.
    pub transcript: Option<String>,
    pub extraction_confidence: Option<f32>,
    /// Stored solution backing the `Solution` state.
    pub entry_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ViewStateSnapshot {
    pub fn initial(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            state: ViewState::Input,
            transcript: None,
            extraction_confidence: None,
            entry_id: None,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ViewStateRow {
    pub session_id: String,
    pub state: String,
    pub transcript: Option<String>,
    pub extraction_confidence: Option<f64>,
    pub entry_id: Option<String>,
    pub updated_at: i64,
}

impl ViewStateRow {
    pub fn into_domain(self) -> ViewStateSnapshot {
        let state = ViewState::parse(&self.state).unwrap_or(ViewState::Input);
        ViewStateSnapshot {
            session_id: self.session_id,
            state,
            transcript: self.transcript,
            extraction_confidence: self.extraction_confidence.map(|c| c as f32),
            entry_id: self.entry_id,
            updated_at: timestamp_to_datetime(self.updated_at),
        }
    }
}

impl From<&ViewStateSnapshot> for ViewStateRow {
    fn from(snapshot: &ViewStateSnapshot) -> Self {
        Self {
            session_id: snapshot.session_id.clone(),
            state: snapshot.state.as_str().to_string(),
            transcript: snapshot.transcript.clone(),
            extraction_confidence: snapshot.extraction_confidence.map(|c| c as f64),
            entry_id: snapshot.entry_id.clone(),
            updated_at: datetime_to_timestamp(snapshot.updated_at),
        }
    }
}
