//! Confidence gate: pure mapping from stage signals to a review verdict.

use solver_core::{HitlReason, Modality, SolutionResult};

use crate::config::PipelineConfig;

/// Signals available at a gate checkpoint. The parser gate fills the first
/// three fields; the verifier gate fills only `verifier_confidence`.
#[derive(Debug, Clone, Default)]
pub struct GateSignals {
    pub parser_ambiguity_count: usize,
    pub needs_clarification: bool,
    /// Upstream extraction confidence, present for image/audio input.
    pub extraction: Option<(Modality, f32)>,
    pub verifier_confidence: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GateVerdict {
    pub requires_review: bool,
    /// Ordered, de-duplicated reason codes.
    pub reasons: Vec<HitlReason>,
}

pub struct ConfidenceGate;

impl ConfidenceGate {
    /// Evaluate signals against configured thresholds. No side effects.
    ///
    /// Reason order is stable: extraction confidence first, then parser
    /// ambiguity, then verifier confidence.
    pub fn evaluate(config: &PipelineConfig, signals: &GateSignals) -> GateVerdict {
        let mut reasons = Vec::new();

        if let Some((modality, confidence)) = signals.extraction {
            if confidence < config.extraction_confidence_threshold {
                let reason = match modality {
                    Modality::Image => Some(HitlReason::OcrLowConfidence),
                    Modality::Audio => Some(HitlReason::AsrLowConfidence),
                    Modality::Text => None,
                };
                if let Some(reason) = reason {
                    SolutionResult::push_reason(&mut reasons, reason);
                }
            }
        }

        if signals.parser_ambiguity_count >= config.ambiguity_count_threshold
            || signals.needs_clarification
        {
            SolutionResult::push_reason(&mut reasons, HitlReason::ParserAmbiguity);
        }

        if let Some(confidence) = signals.verifier_confidence {
            if confidence < config.verifier_confidence_threshold {
                SolutionResult::push_reason(&mut reasons, HitlReason::VerifierLowConfidence);
            }
        }

        GateVerdict {
            requires_review: !reasons.is_empty(),
            reasons,
        }
    }
}
