use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::trace::TraceEntry;

/// Stable reason codes for human-in-the-loop escalation. The wire strings
/// are load-bearing: clients render deterministic messages from them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HitlReason {
    ParserAmbiguity,
    VerifierLowConfidence,
    OcrLowConfidence,
    AsrLowConfidence,
}

impl HitlReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ParserAmbiguity => "parser_ambiguity",
            Self::VerifierLowConfidence => "verifier_low_confidence",
            Self::OcrLowConfidence => "ocr_low_confidence",
            Self::AsrLowConfidence => "asr_low_confidence",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "parser_ambiguity" => Some(Self::ParserAmbiguity),
            "verifier_low_confidence" => Some(Self::VerifierLowConfidence),
            "ocr_low_confidence" => Some(Self::OcrLowConfidence),
            "asr_low_confidence" => Some(Self::AsrLowConfidence),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Memory,
    KnowledgeBase,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::KnowledgeBase => "knowledge_base",
        }
    }
}

/// A retrieved context snippet cited by the solver or explainer.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SourceRef {
    pub content: String,
    pub source_type: SourceType,
    pub similarity: f32,
}

/// Final output of a successful run. Produced once, immutable.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SolutionResult {
    pub final_answer: String,
    pub explanation: String,
    /// Aggregate confidence in [0, 1], taken from the verifier.
    pub confidence: f32,
    pub requires_human_review: bool,
    /// Ordered, de-duplicated escalation reasons. Non-empty iff
    /// `requires_human_review`.
    pub hitl_reasons: Vec<HitlReason>,
    pub sources: Vec<SourceRef>,
    pub agent_trace: Vec<TraceEntry>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl SolutionResult {
    /// Push a reason preserving insertion order without duplicates.
    pub fn push_reason(reasons: &mut Vec<HitlReason>, reason: HitlReason) {
        if !reasons.contains(&reason) {
            reasons.push(reason);
        }
    }
}
