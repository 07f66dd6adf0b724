//! Structured extraction of the problem. Ambiguities found here feed the
//! confidence gate but never halt the run.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::Result;
use crate::services::LlmClient;
use crate::stage::{ParsedProblem, RunContext, Stage, StageData, StageOutcome};

const SYSTEM_PROMPT: &str = "\
You are an expert mathematical problem analyst. Understand and structure \
problems BEFORE they are solved.

First comprehend: what is the core question, what type of problem, what is \
given, what is implied. Then extract: all variables, all constraints, units, \
and any ambiguities or missing information.

Guidelines:
- Do NOT attempt to solve the problem
- Identify the specific mathematical domain (algebra, calculus, geometry, \
statistics, number theory, linear algebra)
- Flag unclear or ambiguous statements";

pub struct ParserStage {
    llm: Arc<LlmClient>,
}

impl ParserStage {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self { llm }
    }

    fn build_prompt(raw_text: &str) -> String {
        format!(
            "Analyze this problem and extract structured information:\n\n\
             PROBLEM:\n{raw_text}\n\n\
             Return JSON with this exact structure:\n\
             {{\n\
             \x20   \"problem_text\": \"cleaned problem statement\",\n\
             \x20   \"topic\": \"mathematical domain (e.g., algebra, calculus, geometry)\",\n\
             \x20   \"variables\": [\"list\", \"of\", \"variables\"],\n\
             \x20   \"constraints\": [\"list\", \"of\", \"constraints\"],\n\
             \x20   \"needs_clarification\": false,\n\
             \x20   \"ambiguities\": [\"any\", \"unclear\", \"aspects\"]\n\
             }}"
        )
    }
}

#[async_trait]
impl Stage for ParserStage {
    fn name(&self) -> &'static str {
        "parser"
    }

    async fn execute(&self, ctx: &RunContext, _cancel: &CancellationToken) -> Result<StageOutcome> {
        let raw_text = ctx.input.effective_text();

        let fallback = serde_json::json!({
            "problem_text": raw_text,
            "topic": "general",
            "variables": [],
            "constraints": [],
            "needs_clarification": false,
            "ambiguities": []
        });

        let response = self
            .llm
            .generate_json(
                &Self::build_prompt(raw_text),
                Some(SYSTEM_PROMPT),
                Some(fallback),
            )
            .await?;

        let parsed: ParsedProblem = serde_json::from_value(response)?;

        if !parsed.ambiguities.is_empty() || parsed.needs_clarification {
            warn!(
                ambiguities = parsed.ambiguities.len(),
                "parser found ambiguities"
            );
        }
        info!(
            topic = %parsed.topic,
            variables = parsed.variables.len(),
            "parsed problem"
        );

        let summary = format!(
            "Parsed: {} ({} variables)",
            parsed.topic,
            parsed.variables.len()
        );
        let metadata = serde_json::json!({
            "topic": parsed.topic,
            "ambiguities": parsed.ambiguities,
            "needs_clarification": parsed.needs_clarification,
        });

        Ok(StageOutcome::new(StageData::Parsed(parsed), summary).with_metadata(metadata))
    }
}
