//! Staged problem-solving pipeline.
//!
//! A run drives a fixed stage sequence (guardrail, parser, router, solver,
//! verifier, explainer) over one problem input, streams per-stage progress
//! to a single consumer, and escalates low-confidence results to human
//! review via the confidence gate.

mod config;
mod error;
mod gate;
mod orchestrator;
mod progress;
pub mod services;
mod stage;
pub mod stages;
mod state_machine;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result, RunError};
pub use gate::{ConfidenceGate, GateSignals, GateVerdict};
pub use orchestrator::{PipelineOrchestrator, RunOptions};
pub use progress::{progress_channel, ProgressReceiver, ProgressSender, ProgressUpdate, StageStatus};
pub use stage::{
    Explanation, GuardrailReport, ParsedProblem, RoutingDecision, RunContext, SolverAnswer, Stage,
    StageData, StageOutcome, Verification, STAGE_ORDER,
};
pub use state_machine::ViewStateMachine;
