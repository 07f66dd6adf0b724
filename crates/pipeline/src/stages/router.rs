//! Problem classification and strategy selection.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::Result;
use crate::services::LlmClient;
use crate::stage::{RoutingDecision, RunContext, Stage, StageData, StageOutcome};

const SYSTEM_PROMPT: &str = "\
You are an expert mathematical problem classifier and strategist. Categorize \
the problem precisely and recommend the optimal solving approach.

Identify: the mathematical domain, the specific subtype (e.g. \
linear_equation, quadratic_equation, derivative, integral_definite, \
area_calculation, probability_basic), the primary operation, and the \
required knowledge level. Then recommend the best method, needed tools, and \
difficulty (easy for single-concept, medium for multi-step, hard for \
advanced techniques).";

/// Tools recommended per topic, merged into whatever the model suggests.
const TOOL_RECOMMENDATIONS: [(&str, &[&str]); 8] = [
    ("arithmetic", &["calculator"]),
    ("algebra", &["symbolic_solver", "calculator"]),
    ("calculus", &["symbolic_solver", "calculator"]),
    ("geometry", &["plotter", "calculator"]),
    ("statistics", &["calculator", "plotter"]),
    ("probability", &["calculator"]),
    ("linear_algebra", &["matrix_solver", "calculator"]),
    ("differential_equations", &["symbolic_solver", "numerical_solver"]),
];

pub struct RouterStage {
    llm: Arc<LlmClient>,
}

impl RouterStage {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self { llm }
    }

    fn build_prompt(parsed: &crate::stage::ParsedProblem) -> String {
        let variables = if parsed.variables.is_empty() {
            "None".to_string()
        } else {
            parsed.variables.join(", ")
        };
        let constraints = if parsed.constraints.is_empty() {
            "None".to_string()
        } else {
            parsed.constraints.join(", ")
        };

        format!(
            "Classify this mathematical problem and recommend a solving strategy:\n\n\
             PROBLEM: {}\n\
             TOPIC: {}\n\
             VARIABLES: {variables}\n\
             CONSTRAINTS: {constraints}\n\n\
             Return JSON with this exact structure:\n\
             {{\n\
             \x20   \"problem_type\": \"specific_type (e.g., quadratic_equation)\",\n\
             \x20   \"difficulty_level\": \"easy|medium|hard\",\n\
             \x20   \"recommended_strategy\": \"description of solving approach\",\n\
             \x20   \"requires_tools\": [\"list\", \"of\", \"needed\", \"tools\"],\n\
             \x20   \"confidence\": 0.95\n\
             }}\n\n\
             Available tools: calculator, symbolic_solver, numerical_solver, \
             plotter, matrix_solver",
            parsed.problem_text, parsed.topic
        )
    }

    fn merge_recommended_tools(topic: &str, problem_type: &str, tools: &mut Vec<String>) {
        let topic = topic.to_lowercase();
        for (key, recommended) in TOOL_RECOMMENDATIONS {
            if topic.contains(key) || problem_type.contains(key) {
                for tool in recommended {
                    if !tools.iter().any(|t| t == tool) {
                        tools.push(tool.to_string());
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Stage for RouterStage {
    fn name(&self) -> &'static str {
        "router"
    }

    async fn execute(&self, ctx: &RunContext, _cancel: &CancellationToken) -> Result<StageOutcome> {
        let parsed = ctx.parsed(self.name())?;

        let fallback = serde_json::json!({
            "problem_type": "general",
            "difficulty_level": "medium",
            "recommended_strategy": "general_solving",
            "requires_tools": ["calculator"],
            "confidence": 0.5
        });

        let response = self
            .llm
            .generate_json(
                &Self::build_prompt(parsed),
                Some(SYSTEM_PROMPT),
                Some(fallback),
            )
            .await?;

        let mut routing: RoutingDecision = serde_json::from_value(response)?;
        Self::merge_recommended_tools(
            &parsed.topic,
            &routing.problem_type,
            &mut routing.requires_tools,
        );
        routing.confidence = routing.confidence.clamp(0.0, 1.0);

        info!(
            problem_type = %routing.problem_type,
            difficulty = %routing.difficulty_level,
            tools = ?routing.requires_tools,
            "routed problem"
        );

        let summary = format!(
            "Routed: {} ({})",
            routing.problem_type, routing.difficulty_level
        );
        let metadata = serde_json::json!({
            "problem_type": routing.problem_type,
            "difficulty_level": routing.difficulty_level,
            "requires_tools": routing.requires_tools,
        });

        Ok(StageOutcome::new(StageData::Routed(routing), summary).with_metadata(metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_merge_dedupes() {
        let mut tools = vec!["calculator".to_string()];
        RouterStage::merge_recommended_tools("algebra", "linear_equation", &mut tools);
        assert_eq!(tools, vec!["calculator", "symbolic_solver"]);
    }

    #[test]
    fn test_tool_merge_matches_problem_type() {
        let mut tools = Vec::new();
        RouterStage::merge_recommended_tools("general", "linear_algebra_inverse", &mut tools);
        assert!(tools.contains(&"matrix_solver".to_string()));
    }

    #[test]
    fn test_decision_parses_with_defaults() {
        let routing: RoutingDecision = serde_json::from_str("{}").unwrap();
        assert_eq!(routing.problem_type, "general");
        assert_eq!(routing.difficulty_level, "medium");
        assert_eq!(routing.confidence, 0.5);
    }
}
