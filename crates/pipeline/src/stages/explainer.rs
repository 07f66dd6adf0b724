//! Student-facing explanation. Always runs, even when the result is headed
//! for human review.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::Result;
use crate::services::LlmClient;
use crate::stage::{Explanation, RunContext, Stage, StageData, StageOutcome};

const SYSTEM_PROMPT: &str = "\
You are an exceptional mathematics teacher known for making complex concepts \
simple. Your explanation should feel like a patient one-on-one tutoring \
session.

Start from the conceptual foundation: what concepts does this problem test \
and how do they connect to what the student already knows. Then walk through \
the solution: state each step in simple terms, explain why it is necessary, \
show the mathematics with LaTeX, and translate the result into plain \
language. Warn about common mistakes before they happen, and end with a \
summary reinforcing the key takeaways.";

pub struct ExplainerStage {
    llm: Arc<LlmClient>,
}

impl ExplainerStage {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self { llm }
    }

    fn build_prompt(
        parsed: &crate::stage::ParsedProblem,
        solution: &crate::stage::SolverAnswer,
        verification: &crate::stage::Verification,
    ) -> String {
        let steps = solution
            .solution_steps
            .iter()
            .enumerate()
            .map(|(i, step)| format!("{}. {step}", i + 1))
            .collect::<Vec<_>>()
            .join("\n");

        let verification_note = if !verification.is_correct || !verification.issues.is_empty() {
            format!(
                "\nIMPORTANT: verification raised these issues, address them in the \
                 explanation:\n{}\n",
                verification
                    .issues
                    .iter()
                    .map(|issue| format!("- {issue}"))
                    .collect::<Vec<_>>()
                    .join("\n")
            )
        } else {
            String::new()
        };

        format!(
            "Create a teacher-quality explanation of this mathematical solution for a \
             student who needs to deeply understand it.\n\n\
             ## THE PROBLEM\n\
             Question: {}\n\
             Topic: {}\n\n\
             ## THE SOLUTION TO EXPLAIN\n\
             Final Answer: {}\n\
             Solution Steps:\n{steps}\n\
             Reasoning Used: {}\n\
             {verification_note}\n\
             Return JSON with this structure:\n\
             {{\n\
             \x20   \"explanation\": \"full tutoring-session explanation\",\n\
             \x20   \"key_concepts\": [\"concepts the student should take away\"],\n\
             \x20   \"common_mistakes\": [\"mistakes students make on problems like this\"]\n\
             }}",
            parsed.problem_text, parsed.topic, solution.answer, solution.reasoning
        )
    }
}

#[async_trait]
impl Stage for ExplainerStage {
    fn name(&self) -> &'static str {
        "explainer"
    }

    async fn execute(&self, ctx: &RunContext, _cancel: &CancellationToken) -> Result<StageOutcome> {
        let parsed = ctx.parsed(self.name())?;
        let solution = ctx.solution(self.name())?;
        let verification = ctx.verification(self.name())?;

        let fallback = serde_json::json!({
            "explanation": solution.reasoning,
            "key_concepts": [],
            "common_mistakes": []
        });

        let response = self
            .llm
            .generate_json(
                &Self::build_prompt(parsed, solution, verification),
                Some(SYSTEM_PROMPT),
                Some(fallback),
            )
            .await?;

        let explanation: Explanation = serde_json::from_value(response)?;

        info!(
            concepts = explanation.key_concepts.len(),
            "generated explanation"
        );

        let summary = format!(
            "Explained: {} key concepts",
            explanation.key_concepts.len()
        );
        let metadata = serde_json::json!({
            "key_concepts": explanation.key_concepts,
            "common_mistakes": explanation.common_mistakes,
        });

        Ok(StageOutcome::new(StageData::Explained(explanation), summary).with_metadata(metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{ParsedProblem, SolverAnswer, Verification};

    fn inputs() -> (ParsedProblem, SolverAnswer, Verification) {
        (
            ParsedProblem {
                problem_text: "2x + 5 = 15".to_string(),
                topic: "algebra".to_string(),
                variables: vec![],
                constraints: vec![],
                needs_clarification: false,
                ambiguities: vec![],
            },
            SolverAnswer {
                answer: "x = 5".to_string(),
                solution_steps: vec!["2x = 10".to_string()],
                reasoning: "subtract then divide".to_string(),
                used_context: false,
                sources: vec![],
            },
            Verification {
                is_correct: true,
                confidence: 0.95,
                issues: vec![],
            },
        )
    }

    #[test]
    fn test_prompt_without_issues_has_no_note() {
        let (parsed, solution, verification) = inputs();
        let prompt = ExplainerStage::build_prompt(&parsed, &solution, &verification);
        assert!(!prompt.contains("IMPORTANT"));
        assert!(prompt.contains("Final Answer: x = 5"));
    }

    #[test]
    fn test_prompt_surfaces_verification_issues() {
        let (parsed, solution, mut verification) = inputs();
        verification.is_correct = false;
        verification.issues = vec!["sign error in step 1".to_string()];

        let prompt = ExplainerStage::build_prompt(&parsed, &solution, &verification);
        assert!(prompt.contains("- sign error in step 1"));
    }
}
