use std::time::Duration;

/// Tunable thresholds and limits for a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Verifier confidence below this flags the result for review.
    pub verifier_confidence_threshold: f32,
    /// Extraction confidence (image/audio) below this flags for review.
    pub extraction_confidence_threshold: f32,
    /// Number of parser ambiguities at or above which review is flagged.
    pub ambiguity_count_threshold: usize,
    /// Deadline for a single stage, including its external calls.
    pub stage_timeout: Duration,
    pub enable_guardrails: bool,
    /// Number of knowledge snippets retrieved for the solver.
    pub retrieval_top_k: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            verifier_confidence_threshold: 0.75,
            extraction_confidence_threshold: 0.75,
            ambiguity_count_threshold: 1,
            stage_timeout: Duration::from_secs(30),
            enable_guardrails: true,
            retrieval_top_k: 3,
        }
    }
}
