use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use solver_core::{Modality, SolutionResult};
use uuid::Uuid;

/// A solved problem persisted for later lookup and feedback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolutionEntry {
    pub id: String,
    pub original_input: String,
    pub modality: Modality,
    pub parsed_question: String,
    pub topic: String,
    pub result: SolutionResult,
    /// "correct" or "incorrect" once the user has rated the solution.
    pub user_feedback: Option<String>,
    pub feedback_comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SolutionEntry {
    pub fn new(
        original_input: impl Into<String>,
        modality: Modality,
        parsed_question: impl Into<String>,
        topic: impl Into<String>,
        result: SolutionResult,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_entry_id(),
            original_input: original_input.into(),
            modality,
            parsed_question: parsed_question.into(),
            topic: topic.into(),
            result,
            user_feedback: None,
            feedback_comment: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Entry ids are short and prefixed so they are recognizable in logs
/// and never collide with session ids.
pub fn new_entry_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("mem_{}", &hex[..12])
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SolutionRow {
    pub id: String,
    pub original_input: String,
    pub modality: String,
    pub parsed_question: String,
    pub topic: String,
    pub final_answer: String,
    pub explanation: String,
    pub confidence: f64,
    pub requires_human_review: i64,
    pub hitl_reasons: String,
    pub sources: String,
    pub trace: String,
    pub metadata: String,
    pub user_feedback: Option<String>,
    pub feedback_comment: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl SolutionRow {
    pub fn into_domain(self) -> SolutionEntry {
        let result = SolutionResult {
            final_answer: self.final_answer,
            explanation: self.explanation,
            confidence: self.confidence as f32,
            requires_human_review: self.requires_human_review != 0,
            hitl_reasons: serde_json::from_str(&self.hitl_reasons).unwrap_or_default(),
            sources: serde_json::from_str(&self.sources).unwrap_or_default(),
            agent_trace: serde_json::from_str(&self.trace).unwrap_or_default(),
            metadata: serde_json::from_str(&self.metadata).unwrap_or_default(),
        };

        SolutionEntry {
            id: self.id,
            original_input: self.original_input,
            modality: Modality::parse(&self.modality).unwrap_or(Modality::Text),
            parsed_question: self.parsed_question,
            topic: self.topic,
            result,
            user_feedback: self.user_feedback,
            feedback_comment: self.feedback_comment,
            created_at: timestamp_to_datetime(self.created_at),
            updated_at: timestamp_to_datetime(self.updated_at),
        }
    }
}

impl From<&SolutionEntry> for SolutionRow {
    fn from(entry: &SolutionEntry) -> Self {
        Self {
            id: entry.id.clone(),
            original_input: entry.original_input.clone(),
            modality: entry.modality.as_str().to_string(),
            parsed_question: entry.parsed_question.clone(),
            topic: entry.topic.clone(),
            final_answer: entry.result.final_answer.clone(),
            explanation: entry.result.explanation.clone(),
            confidence: entry.result.confidence as f64,
            requires_human_review: entry.result.requires_human_review as i64,
            hitl_reasons: serde_json::to_string(&entry.result.hitl_reasons)
                .unwrap_or_else(|_| "[]".to_string()),
            sources: serde_json::to_string(&entry.result.sources)
                .unwrap_or_else(|_| "[]".to_string()),
            trace: serde_json::to_string(&entry.result.agent_trace)
                .unwrap_or_else(|_| "[]".to_string()),
            metadata: serde_json::to_string(&entry.result.metadata)
                .unwrap_or_else(|_| "{}".to_string()),
            user_feedback: entry.user_feedback.clone(),
            feedback_comment: entry.feedback_comment.clone(),
            created_at: datetime_to_timestamp(entry.created_at),
            updated_at: datetime_to_timestamp(entry.updated_at),
        }
    }
}

pub(crate) fn timestamp_to_datetime(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0).unwrap()
}

pub(crate) fn datetime_to_timestamp(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}
