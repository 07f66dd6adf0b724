//! Stage abstraction and the typed outputs stages accumulate on a run.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use solver_core::{ProblemInput, SourceRef};
use tokio_util::sync::CancellationToken;

use crate::error::{PipelineError, Result};
use crate::orchestrator::RunOptions;

/// Fixed execution order. Stages never run out of order and never
/// concurrently with each other.
pub const STAGE_ORDER: [&str; 6] = [
    "guardrail",
    "parser",
    "router",
    "solver",
    "verifier",
    "explainer",
];

/// Safety verdict for the raw input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailReport {
    #[serde(default = "default_true")]
    pub is_safe: bool,
    #[serde(default = "default_true")]
    pub should_continue: bool,
    #[serde(default)]
    pub violations: Vec<String>,
    #[serde(default = "default_risk")]
    pub risk_level: String,
}

/// Structured representation of the problem, extracted by the parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedProblem {
    pub problem_text: String,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default)]
    pub variables: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub needs_clarification: bool,
    #[serde(default)]
    pub ambiguities: Vec<String>,
}

/// Problem classification and solving strategy from the router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    #[serde(default = "default_problem_type")]
    pub problem_type: String,
    #[serde(default = "default_difficulty")]
    pub difficulty_level: String,
    #[serde(default)]
    pub recommended_strategy: String,
    #[serde(default)]
    pub requires_tools: Vec<String>,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

/// The solver's answer with its working.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverAnswer {
    pub answer: String,
    #[serde(default)]
    pub solution_steps: Vec<String>,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub used_context: bool,
    #[serde(skip)]
    pub sources: Vec<SourceRef>,
}

/// Verifier judgement on the solver's answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verification {
    #[serde(default = "default_true")]
    pub is_correct: bool,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    #[serde(default)]
    pub issues: Vec<String>,
}

/// Student-facing explanation produced by the explainer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Explanation {
    pub explanation: String,
    #[serde(default)]
    pub key_concepts: Vec<String>,
    #[serde(default)]
    pub common_mistakes: Vec<String>,
}

fn default_true() -> bool {
    true
}
fn default_risk() -> String {
    "low".to_string()
}
fn default_topic() -> String {
    "general".to_string()
}
fn default_problem_type() -> String {
    "general".to_string()
}
fn default_difficulty() -> String {
    "medium".to_string()
}
fn default_confidence() -> f32 {
    0.5
}

/// Output of one stage, tagged by which slot of the run context it fills.
#[derive(Debug, Clone)]
pub enum StageData {
    Guardrail(GuardrailReport),
    Parsed(ParsedProblem),
    Routed(RoutingDecision),
    Solved(SolverAnswer),
    Verified(Verification),
    Explained(Explanation),
}

/// What a stage hands back to the orchestrator.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub data: StageData,
    pub output_summary: String,
    pub metadata: serde_json::Value,
}

impl StageOutcome {
    pub fn new(data: StageData, output_summary: impl Into<String>) -> Self {
        Self {
            data,
            output_summary: output_summary.into(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Accumulated state for one run. Owned exclusively by the orchestrator;
/// stages read prior outputs through it and never mutate it directly.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub input: ProblemInput,
    pub options: RunOptions,
    pub guardrail: Option<GuardrailReport>,
    pub parsed: Option<ParsedProblem>,
    pub routing: Option<RoutingDecision>,
    pub solution: Option<SolverAnswer>,
    pub verification: Option<Verification>,
    pub explanation: Option<Explanation>,
    /// Retrieved snippets cited by the solver, in retrieval order.
    pub sources: Vec<SourceRef>,
}

impl RunContext {
    pub fn new(input: ProblemInput, options: RunOptions) -> Self {
        Self {
            input,
            options,
            guardrail: None,
            parsed: None,
            routing: None,
            solution: None,
            verification: None,
            explanation: None,
            sources: Vec::new(),
        }
    }

    /// Store a stage's output in its slot.
    pub fn apply(&mut self, data: StageData) {
        match data {
            StageData::Guardrail(report) => self.guardrail = Some(report),
            StageData::Parsed(parsed) => self.parsed = Some(parsed),
            StageData::Routed(routing) => self.routing = Some(routing),
            StageData::Solved(answer) => {
                self.sources = answer.sources.clone();
                self.solution = Some(answer);
            }
            StageData::Verified(verification) => self.verification = Some(verification),
            StageData::Explained(explanation) => self.explanation = Some(explanation),
        }
    }

    pub fn parsed(&self, stage: &str) -> Result<&ParsedProblem> {
        self.parsed.as_ref().ok_or_else(|| missing(stage, "parser"))
    }

    pub fn routing(&self, stage: &str) -> Result<&RoutingDecision> {
        self.routing.as_ref().ok_or_else(|| missing(stage, "router"))
    }

    pub fn solution(&self, stage: &str) -> Result<&SolverAnswer> {
        self.solution.as_ref().ok_or_else(|| missing(stage, "solver"))
    }

    pub fn verification(&self, stage: &str) -> Result<&Verification> {
        self.verification
            .as_ref()
            .ok_or_else(|| missing(stage, "verifier"))
    }
}

fn missing(stage: &str, needs: &str) -> PipelineError {
    PipelineError::MissingUpstream {
        stage: stage.to_string(),
        needs: needs.to_string(),
    }
}

/// One unit in the fixed reasoning sequence.
///
/// Stages honor the cancellation token at their own suspension points; the
/// orchestrator additionally bounds each call with the configured deadline
/// and aborts it on cancellation.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(&self, ctx: &RunContext, cancel: &CancellationToken) -> Result<StageOutcome>;
}
