//! The solving stage. Consults retrieval for relevant knowledge before
//! asking the model for a step-by-step solution.

use std::sync::Arc;

use async_trait::async_trait;
use solver_core::SourceRef;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::services::{LlmClient, Retriever};
use crate::stage::{RunContext, SolverAnswer, Stage, StageData, StageOutcome};
use crate::stages::truncate;

const SYSTEM_PROMPT: &str = "\
You are an expert mathematics teacher and problem solver. Solve problems like \
a patient teacher who shows EVERY step.

Before solving, state what is asked, what is given, and which approach you \
will use and why. Then execute step by step: for every calculation, state \
what you are doing and why, show the operation, and connect to the next step.

Guidelines:
- Never skip intermediate calculations
- Use LaTeX notation for math expressions
- End with a clear final answer and a sanity check
- If reference material or verified past solutions are provided, learn from \
their approach";

pub struct SolverStage {
    llm: Arc<LlmClient>,
    retriever: Arc<dyn Retriever>,
    top_k: usize,
}

impl SolverStage {
    pub fn new(llm: Arc<LlmClient>, retriever: Arc<dyn Retriever>, top_k: usize) -> Self {
        Self {
            llm,
            retriever,
            top_k,
        }
    }

    fn build_prompt(
        parsed: &crate::stage::ParsedProblem,
        routing: &crate::stage::RoutingDecision,
        sources: &[SourceRef],
    ) -> String {
        let mut prompt = format!(
            "Solve this mathematical problem like an expert teacher showing every step:\n\n\
             ## PROBLEM\n{}\n\n\
             ## PROBLEM CLASSIFICATION\n\
             - Type: {}\n\
             - Difficulty: {}\n\
             - Recommended Strategy: {}\n",
            parsed.problem_text,
            routing.problem_type,
            routing.difficulty_level,
            routing.recommended_strategy
        );

        if !parsed.variables.is_empty() {
            prompt.push_str(&format!(
                "\n## KNOWN VARIABLES\n{}\n",
                parsed.variables.join(", ")
            ));
        }
        if !parsed.constraints.is_empty() {
            prompt.push_str(&format!(
                "\n## CONSTRAINTS\n{}\n",
                parsed.constraints.join(", ")
            ));
        }

        if !sources.is_empty() {
            prompt.push_str("\n## RELEVANT KNOWLEDGE BASE (reference material):\n");
            for (i, source) in sources.iter().enumerate() {
                prompt.push_str(&format!("{}. {}\n", i + 1, source.content));
            }
        }

        prompt.push_str(
            "\n## REQUIRED OUTPUT FORMAT (JSON)\n\
             {\n\
             \x20   \"reasoning\": \"what is asked, what is given, which approach and why, \
             then the detailed step-by-step execution\",\n\
             \x20   \"solution_steps\": [\n\
             \x20       \"Step 1: [action] - [why] -> Result: [intermediate result]\",\n\
             \x20       \"Final: [clear final answer with verification]\"\n\
             \x20   ],\n\
             \x20   \"answer\": \"final answer with proper formatting and units if applicable\"\n\
             }\n\n\
             Each solution step must explain what you are doing and why. Show all \
             intermediate calculations.",
        );

        prompt
    }
}

#[async_trait]
impl Stage for SolverStage {
    fn name(&self) -> &'static str {
        "solver"
    }

    async fn execute(&self, ctx: &RunContext, cancel: &CancellationToken) -> Result<StageOutcome> {
        let parsed = ctx.parsed(self.name())?;
        let routing = ctx.routing(self.name())?;

        let query = format!("{}: {}", parsed.topic, parsed.problem_text);
        let sources = match self.retriever.search(&query, self.top_k).await {
            Ok(sources) => sources,
            Err(e) => {
                warn!("context retrieval failed: {e}");
                Vec::new()
            }
        };

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let fallback = serde_json::json!({
            "answer": "Unable to generate solution",
            "solution_steps": ["Please try rephrasing the problem"],
            "reasoning": "Model output could not be parsed"
        });

        let response = self
            .llm
            .generate_json(
                &Self::build_prompt(parsed, routing, &sources),
                Some(SYSTEM_PROMPT),
                Some(fallback),
            )
            .await?;

        let mut answer: SolverAnswer = serde_json::from_value(response)?;
        answer.used_context = !sources.is_empty();
        answer.sources = sources;

        info!(
            answer = %truncate(&answer.answer, 50),
            steps = answer.solution_steps.len(),
            used_context = answer.used_context,
            "solved problem"
        );

        let summary = format!("Answer: {}", truncate(&answer.answer, 80));
        let metadata = serde_json::json!({
            "steps": answer.solution_steps.len(),
            "used_context": answer.used_context,
            "source_count": answer.sources.len(),
        });

        Ok(StageOutcome::new(StageData::Solved(answer), summary).with_metadata(metadata))
    }
}
