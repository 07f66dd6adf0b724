//! Solution verification. A low confidence here never halts the run, it
//! feeds the confidence gate.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::Result;
use crate::services::LlmClient;
use crate::stage::{RunContext, Stage, StageData, StageOutcome, Verification};

const SYSTEM_PROMPT: &str = "\
You are a meticulous mathematical quality assurance expert. Ensure solutions \
are correct, complete, and reliable.

First verify the logic: is the method appropriate, does the solution address \
what was asked, is the reasoning sound. Then verify the computation: check \
each arithmetic and algebraic operation, validate units and domain \
constraints, and substitute the answer back into the original problem.

Watch for: sign errors, extraneous solutions, division by zero, missing \
cases, unit conversion errors.

Confidence guidelines: 0.9-1.0 definitely correct and verified multiple \
ways; 0.75-0.89 appears correct with minor uncertainty; 0.5-0.74 some \
concerns; below 0.5 significant issues detected.";

pub struct VerifierStage {
    llm: Arc<LlmClient>,
}

impl VerifierStage {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self { llm }
    }

    fn build_prompt(
        parsed: &crate::stage::ParsedProblem,
        solution: &crate::stage::SolverAnswer,
    ) -> String {
        let steps = solution
            .solution_steps
            .iter()
            .enumerate()
            .map(|(i, step)| format!("{}. {step}", i + 1))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "Verify this mathematical solution thoroughly:\n\n\
             ORIGINAL PROBLEM: {}\n\
             TOPIC: {}\n\n\
             PROPOSED SOLUTION:\n\
             Answer: {}\n\
             Reasoning: {}\n\
             Steps:\n{steps}\n\n\
             Return JSON with this structure:\n\
             {{\n\
             \x20   \"is_correct\": true,\n\
             \x20   \"confidence\": 0.95,\n\
             \x20   \"issues\": [\"list any problems found\"]\n\
             }}",
            parsed.problem_text, parsed.topic, solution.answer, solution.reasoning
        )
    }
}

#[async_trait]
impl Stage for VerifierStage {
    fn name(&self) -> &'static str {
        "verifier"
    }

    async fn execute(&self, ctx: &RunContext, _cancel: &CancellationToken) -> Result<StageOutcome> {
        let parsed = ctx.parsed(self.name())?;
        let solution = ctx.solution(self.name())?;

        // Unparseable verifier output is itself a reason for review.
        let fallback = serde_json::json!({
            "is_correct": true,
            "confidence": 0.5,
            "issues": ["Unable to fully verify the solution"]
        });

        let response = self
            .llm
            .generate_json(
                &Self::build_prompt(parsed, solution),
                Some(SYSTEM_PROMPT),
                Some(fallback),
            )
            .await?;

        let mut verification: Verification = serde_json::from_value(response)?;
        verification.confidence = verification.confidence.clamp(0.0, 1.0);

        info!(
            is_correct = verification.is_correct,
            confidence = verification.confidence,
            issues = verification.issues.len(),
            "verified solution"
        );

        let summary = format!(
            "Verified: {} ({:.2})",
            verification.is_correct, verification.confidence
        );
        let metadata = serde_json::json!({
            "is_correct": verification.is_correct,
            "confidence": verification.confidence,
            "issues": verification.issues,
        });

        Ok(StageOutcome::new(StageData::Verified(verification), summary).with_metadata(metadata))
    }
}
