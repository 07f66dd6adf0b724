//! Drives the fixed stage sequence for one run.
//!
//! The orchestrator owns all per-run mutable state (trace, progress sender,
//! cancellation token). Stages execute strictly sequentially; cancellation
//! is checked at stage boundaries and aborts the in-flight stage call.

use std::time::Instant;

use events::{Event, EventBus, EventEnvelope};
use solver_core::{HitlReason, Modality, ProblemInput, Run, SolutionResult, TraceEntry};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result, RunError};
use crate::gate::{ConfidenceGate, GateSignals};
use crate::progress::ProgressSender;
use crate::stage::{RunContext, Stage, StageData};
use crate::stages::truncate;

/// Per-run options supplied by the caller.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub enable_guardrails: bool,
    /// Free-form context passed through to the guardrail check.
    pub context: Option<String>,
    /// Caller-assigned run id, so cancellation and published events can be
    /// correlated with the request that started the run.
    pub run_id: Option<Uuid>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            enable_guardrails: true,
            context: None,
            run_id: None,
        }
    }
}

pub struct PipelineOrchestrator {
    stages: Vec<Box<dyn Stage>>,
    config: PipelineConfig,
    events: EventBus,
}

impl PipelineOrchestrator {
    pub fn new(stages: Vec<Box<dyn Stage>>, config: PipelineConfig, events: EventBus) -> Self {
        Self {
            stages,
            config,
            events,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Execute the pipeline for one input.
    ///
    /// Stage lifecycle updates go to `progress`; the terminal result is the
    /// return value, so the caller decides how to deliver it. Cancelled runs
    /// return with an empty trace and are never surfaced as failures.
    pub async fn run(
        &self,
        input: ProblemInput,
        options: RunOptions,
        progress: ProgressSender,
        cancel: CancellationToken,
    ) -> std::result::Result<SolutionResult, RunError> {
        let mut run = Run::new();
        if let Some(id) = options.run_id {
            run.id = id;
        }
        let mut ctx = RunContext::new(input, options);
        let mut reasons: Vec<HitlReason> = Vec::new();

        info!(
            run_id = %run.id,
            modality = ctx.input.modality.as_str(),
            "starting pipeline run"
        );
        self.publish(Event::RunStarted {
            run_id: run.id,
            modality: ctx.input.modality.as_str().to_string(),
        });

        for stage in &self.stages {
            let name = stage.name();

            if cancel.is_cancelled() {
                return Err(self.cancelled(&mut run, name));
            }

            progress.stage_started(name);
            self.publish(Event::StageStarted {
                run_id: run.id,
                stage: name.to_string(),
            });

            let input_summary = Self::input_summary(name, &ctx);
            let started = Instant::now();

            let execution =
                tokio::time::timeout(self.config.stage_timeout, stage.execute(&ctx, &cancel));
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.cancelled(&mut run, name)),
                outcome = execution => match outcome {
                    Ok(inner) => inner,
                    Err(_) => Err(PipelineError::StageTimeout {
                        stage: name.to_string(),
                        elapsed_ms: self.config.stage_timeout.as_millis() as u64,
                    }),
                },
            };
            let duration_ms = started.elapsed().as_millis() as u64;

            let outcome = match result {
                Ok(outcome) => outcome,
                Err(PipelineError::Cancelled) => return Err(self.cancelled(&mut run, name)),
                Err(error) => {
                    return Err(self.stage_failed(
                        &mut run,
                        &progress,
                        name,
                        input_summary,
                        error,
                        duration_ms,
                        serde_json::Value::Null,
                    ));
                }
            };

            // Guardrail is authoritative: a block terminates the run with a
            // single non-success trace entry and no solution.
            if let StageData::Guardrail(report) = &outcome.data {
                if !report.should_continue {
                    let violations = if report.violations.is_empty() {
                        vec!["Input rejected by safety policy".to_string()]
                    } else {
                        report.violations.clone()
                    };
                    return Err(self.stage_failed(
                        &mut run,
                        &progress,
                        name,
                        input_summary,
                        PipelineError::GuardrailViolation { violations },
                        duration_ms,
                        outcome.metadata,
                    ));
                }
            }

            run.record(
                TraceEntry::success(name, input_summary, &outcome.output_summary, duration_ms)
                    .with_metadata(outcome.metadata.clone()),
            );
            progress.stage_completed(name, outcome.metadata.clone());
            self.publish(Event::StageFinished {
                run_id: run.id,
                stage: name.to_string(),
                success: true,
                duration_ms,
            });

            ctx.apply(outcome.data);

            // Gate checkpoints. Both are soft: they flag reasons and the
            // pipeline continues.
            match name {
                "parser" => {
                    if let Some(parsed) = &ctx.parsed {
                        let extraction = (ctx.input.modality != Modality::Text)
                            .then(|| (ctx.input.modality, ctx.input.extraction_confidence));
                        let verdict = ConfidenceGate::evaluate(
                            &self.config,
                            &GateSignals {
                                parser_ambiguity_count: parsed.ambiguities.len(),
                                needs_clarification: parsed.needs_clarification,
                                extraction,
                                verifier_confidence: None,
                            },
                        );
                        for reason in verdict.reasons {
                            SolutionResult::push_reason(&mut reasons, reason);
                        }
                    }
                }
                "verifier" => {
                    if let Some(verification) = &ctx.verification {
                        let verdict = ConfidenceGate::evaluate(
                            &self.config,
                            &GateSignals {
                                verifier_confidence: Some(verification.confidence),
                                ..Default::default()
                            },
                        );
                        for reason in verdict.reasons {
                            SolutionResult::push_reason(&mut reasons, reason);
                        }
                    }
                }
                _ => {}
            }
        }

        let result = match Self::assemble(&ctx, reasons, run.trace.clone()) {
            Ok(result) => result,
            Err(error) => {
                run.fail();
                self.publish(Event::RunFailed {
                    run_id: run.id,
                    error: error.to_string(),
                });
                return Err(RunError::new(error, run.trace.clone()));
            }
        };

        run.complete();
        info!(
            run_id = %run.id,
            confidence = result.confidence,
            requires_human_review = result.requires_human_review,
            "pipeline run completed"
        );
        self.publish(Event::RunCompleted {
            run_id: run.id,
            confidence: result.confidence,
            requires_human_review: result.requires_human_review,
        });

        Ok(result)
    }

    fn publish(&self, event: Event) {
        self.events.publish(EventEnvelope::new(event));
    }

    #[allow(clippy::too_many_arguments)]
    fn stage_failed(
        &self,
        run: &mut Run,
        progress: &ProgressSender,
        stage: &str,
        input_summary: String,
        error: PipelineError,
        duration_ms: u64,
        metadata: serde_json::Value,
    ) -> RunError {
        warn!(run_id = %run.id, stage, %error, "stage failed, halting run");

        run.record(
            TraceEntry::failure(stage, input_summary, error.to_string(), duration_ms)
                .with_metadata(metadata),
        );
        progress.stage_failed(stage, &error.to_string());
        self.publish(Event::StageFinished {
            run_id: run.id,
            stage: stage.to_string(),
            success: false,
            duration_ms,
        });

        run.fail();
        self.publish(Event::RunFailed {
            run_id: run.id,
            error: error.to_string(),
        });

        RunError::new(error, run.trace.clone())
    }

    fn cancelled(&self, run: &mut Run, stage: &str) -> RunError {
        info!(run_id = %run.id, stage, "run cancelled");
        run.cancel();
        self.publish(Event::RunCancelled { run_id: run.id });
        RunError::cancelled()
    }

    fn assemble(
        ctx: &RunContext,
        reasons: Vec<HitlReason>,
        trace: Vec<TraceEntry>,
    ) -> Result<SolutionResult> {
        let parsed = ctx.parsed("result")?;
        let routing = ctx.routing("result")?;
        let solution = ctx.solution("result")?;
        let verification = ctx.verification("result")?;
        let explanation = ctx
            .explanation
            .as_ref()
            .ok_or_else(|| PipelineError::MissingUpstream {
                stage: "result".to_string(),
                needs: "explainer".to_string(),
            })?;

        Ok(SolutionResult {
            final_answer: solution.answer.clone(),
            explanation: explanation.explanation.clone(),
            confidence: verification.confidence.clamp(0.0, 1.0),
            requires_human_review: !reasons.is_empty(),
            hitl_reasons: reasons,
            sources: ctx.sources.clone(),
            agent_trace: trace,
            metadata: serde_json::json!({
                "problem_text": parsed.problem_text,
                "topic": parsed.topic,
                "problem_type": routing.problem_type,
                "difficulty_level": routing.difficulty_level,
                "solution_steps": solution.solution_steps,
                "is_correct": verification.is_correct,
                "verification_issues": verification.issues,
                "key_concepts": explanation.key_concepts,
                "common_mistakes": explanation.common_mistakes,
            }),
        })
    }

    fn input_summary(stage: &str, ctx: &RunContext) -> String {
        match stage {
            "guardrail" | "parser" => {
                format!("Text: {}", truncate(ctx.input.effective_text(), 80))
            }
            "router" => ctx
                .parsed
                .as_ref()
                .map(|p| format!("Topic: {}", p.topic))
                .unwrap_or_default(),
            "solver" => ctx
                .parsed
                .as_ref()
                .map(|p| format!("Problem: {}", truncate(&p.problem_text, 80)))
                .unwrap_or_default(),
            "verifier" => ctx
                .solution
                .as_ref()
                .map(|s| format!("Answer: {}", truncate(&s.answer, 80)))
                .unwrap_or_default(),
            "explainer" => ctx
                .verification
                .as_ref()
                .map(|v| format!("Verified: {} ({:.2})", v.is_correct, v.confidence))
                .unwrap_or_default(),
            _ => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{progress_channel, ProgressUpdate, StageStatus};
    use crate::stage::{
        Explanation, GuardrailReport, ParsedProblem, RoutingDecision, SolverAnswer, StageOutcome,
        Verification, STAGE_ORDER,
    };
    use async_trait::async_trait;
    use std::time::Duration;

    enum Behavior {
        Produce(StageData),
        Fail(String),
        Sleep(Duration, StageData),
        CancelThenProduce(StageData),
    }

    struct StubStage {
        name: &'static str,
        behavior: Behavior,
    }

    #[async_trait]
    impl Stage for StubStage {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn execute(
            &self,
            _ctx: &RunContext,
            cancel: &CancellationToken,
        ) -> Result<StageOutcome> {
            match &self.behavior {
                Behavior::Produce(data) => Ok(StageOutcome::new(data.clone(), "ok")),
                Behavior::Fail(message) => {
                    Err(PipelineError::upstream(self.name, message.clone()))
                }
                Behavior::Sleep(duration, data) => {
                    tokio::time::sleep(*duration).await;
                    Ok(StageOutcome::new(data.clone(), "ok"))
                }
                Behavior::CancelThenProduce(data) => {
                    cancel.cancel();
                    Ok(StageOutcome::new(data.clone(), "ok"))
                }
            }
        }
    }

    fn guardrail_data(should_continue: bool) -> StageData {
        StageData::Guardrail(GuardrailReport {
            is_safe: should_continue,
            should_continue,
            violations: if should_continue {
                vec![]
            } else {
                vec!["off-topic request".to_string()]
            },
            risk_level: "low".to_string(),
        })
    }

    fn parsed_data(ambiguities: Vec<String>) -> StageData {
        StageData::Parsed(ParsedProblem {
            problem_text: "Solve for x: 2x + 5 = 15".to_string(),
            topic: "algebra".to_string(),
            variables: vec!["x".to_string()],
            constraints: vec![],
            needs_clarification: false,
            ambiguities,
        })
    }

    fn routed_data() -> StageData {
        StageData::Routed(RoutingDecision {
            problem_type: "linear_equation".to_string(),
            difficulty_level: "easy".to_string(),
            recommended_strategy: "isolate the variable".to_string(),
            requires_tools: vec![],
            confidence: 0.95,
        })
    }

    fn solved_data(answer: &str) -> StageData {
        StageData::Solved(SolverAnswer {
            answer: answer.to_string(),
            solution_steps: vec!["2x = 10".to_string(), "x = 5".to_string()],
            reasoning: "subtract 5, divide by 2".to_string(),
            used_context: false,
            sources: vec![],
        })
    }

    fn verified_data(confidence: f32) -> StageData {
        StageData::Verified(Verification {
            is_correct: true,
            confidence,
            issues: vec![],
        })
    }

    fn explained_data() -> StageData {
        StageData::Explained(Explanation {
            explanation: "Subtract 5 from both sides, then divide by 2.".to_string(),
            key_concepts: vec!["inverse operations".to_string()],
            common_mistakes: vec![],
        })
    }

    fn stub(name: &'static str, behavior: Behavior) -> Box<dyn Stage> {
        Box::new(StubStage { name, behavior })
    }

    fn happy_stages(verifier_confidence: f32) -> Vec<Box<dyn Stage>> {
        vec![
            stub("guardrail", Behavior::Produce(guardrail_data(true))),
            stub("parser", Behavior::Produce(parsed_data(vec![]))),
            stub("router", Behavior::Produce(routed_data())),
            stub("solver", Behavior::Produce(solved_data("x = 5"))),
            stub("verifier", Behavior::Produce(verified_data(verifier_confidence))),
            stub("explainer", Behavior::Produce(explained_data())),
        ]
    }

    fn orchestrator(stages: Vec<Box<dyn Stage>>) -> PipelineOrchestrator {
        PipelineOrchestrator::new(stages, PipelineConfig::default(), EventBus::new())
    }

    #[tokio::test]
    async fn test_happy_path_produces_solution() {
        let orchestrator = orchestrator(happy_stages(0.95));
        let (tx, _rx) = progress_channel();

        let result = orchestrator
            .run(
                ProblemInput::text("Solve for x: 2x + 5 = 15"),
                RunOptions::default(),
                tx,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.final_answer, "x = 5");
        assert!(!result.requires_human_review);
        assert!(result.hitl_reasons.is_empty());
        assert!((0.0..=1.0).contains(&result.confidence));

        let trace_stages: Vec<&str> =
            result.agent_trace.iter().map(|e| e.stage.as_str()).collect();
        assert_eq!(trace_stages, STAGE_ORDER.to_vec());
        assert!(result.agent_trace.iter().all(|e| e.success));
    }

    #[tokio::test]
    async fn test_guardrail_block_leaves_single_trace_entry() {
        let mut stages = happy_stages(0.95);
        stages[0] = stub("guardrail", Behavior::Produce(guardrail_data(false)));
        let orchestrator = orchestrator(stages);
        let (tx, mut rx) = progress_channel();

        let err = orchestrator
            .run(
                ProblemInput::text("write my essay"),
                RunOptions::default(),
                tx,
                CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err.error,
            PipelineError::GuardrailViolation { .. }
        ));
        assert_eq!(err.trace.len(), 1);
        assert_eq!(err.trace[0].stage, "guardrail");
        assert!(!err.trace[0].success);

        // started then failed, nothing else
        let mut updates = Vec::new();
        while let Ok(update) = rx.try_recv() {
            updates.push(update);
        }
        assert_eq!(updates.len(), 2);
        assert!(matches!(
            updates[1],
            ProgressUpdate::AgentUpdate {
                status: StageStatus::Failed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_stage_failure_halts_with_partial_trace() {
        let mut stages = happy_stages(0.95);
        stages[3] = stub("solver", Behavior::Fail("model unavailable".to_string()));
        let orchestrator = orchestrator(stages);
        let (tx, _rx) = progress_channel();

        let err = orchestrator
            .run(
                ProblemInput::text("2x + 5 = 15"),
                RunOptions::default(),
                tx,
                CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err.error, PipelineError::Upstream { .. }));
        let trace_stages: Vec<&str> = err.trace.iter().map(|e| e.stage.as_str()).collect();
        assert_eq!(trace_stages, vec!["guardrail", "parser", "router", "solver"]);
        assert!(!err.trace.last().unwrap().success);
    }

    #[tokio::test]
    async fn test_low_verifier_confidence_flags_review_but_completes() {
        let orchestrator = orchestrator(happy_stages(0.5));
        let (tx, _rx) = progress_channel();

        let result = orchestrator
            .run(
                ProblemInput::text("2x + 5 = 15"),
                RunOptions::default(),
                tx,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(result.requires_human_review);
        assert_eq!(
            result.hitl_reasons,
            vec![HitlReason::VerifierLowConfidence]
        );
        // explainer still ran
        assert_eq!(result.agent_trace.len(), 6);
    }

    #[tokio::test]
    async fn test_parser_ambiguity_is_soft() {
        let mut stages = happy_stages(0.95);
        stages[1] = stub(
            "parser",
            Behavior::Produce(parsed_data(vec!["unit of x unclear".to_string()])),
        );
        let orchestrator = orchestrator(stages);
        let (tx, _rx) = progress_channel();

        let result = orchestrator
            .run(
                ProblemInput::text("2x + 5 = 15"),
                RunOptions::default(),
                tx,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.hitl_reasons, vec![HitlReason::ParserAmbiguity]);
        assert_eq!(result.agent_trace.len(), 6);
    }

    #[tokio::test]
    async fn test_low_extraction_confidence_orders_reasons() {
        let mut stages = happy_stages(0.95);
        stages[1] = stub(
            "parser",
            Behavior::Produce(parsed_data(vec!["garbled symbol".to_string()])),
        );
        let orchestrator = orchestrator(stages);
        let (tx, _rx) = progress_channel();

        let result = orchestrator
            .run(
                ProblemInput::extracted(Modality::Image, "2x + 5 = 15", 0.6),
                RunOptions::default(),
                tx,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(
            result.hitl_reasons,
            vec![HitlReason::OcrLowConfidence, HitlReason::ParserAmbiguity]
        );
    }

    #[tokio::test]
    async fn test_cancellation_between_stages_discards_trace() {
        let mut stages = happy_stages(0.95);
        stages[2] = stub("router", Behavior::CancelThenProduce(routed_data()));
        let orchestrator = orchestrator(stages);
        let (tx, mut rx) = progress_channel();

        let err = orchestrator
            .run(
                ProblemInput::text("2x + 5 = 15"),
                RunOptions::default(),
                tx,
                CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(err.trace.is_empty());

        // solver never started
        let mut updates = Vec::new();
        while let Ok(update) = rx.try_recv() {
            updates.push(update);
        }
        assert!(!updates.iter().any(|u| matches!(
            u,
            ProgressUpdate::AgentUpdate { agent, .. } if agent == "solver"
        )));
    }

    #[tokio::test]
    async fn test_cancellation_aborts_in_flight_stage() {
        let mut stages = happy_stages(0.95);
        stages[3] = stub(
            "solver",
            Behavior::Sleep(Duration::from_secs(10), solved_data("x = 5")),
        );
        let orchestrator = orchestrator(stages);
        let (tx, _rx) = progress_channel();
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let err = orchestrator
            .run(
                ProblemInput::text("2x + 5 = 15"),
                RunOptions::default(),
                tx,
                cancel,
            )
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_stage_deadline_is_a_failure_not_a_cancellation() {
        let mut stages = happy_stages(0.95);
        stages[3] = stub(
            "solver",
            Behavior::Sleep(Duration::from_secs(10), solved_data("x = 5")),
        );
        let config = PipelineConfig {
            stage_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let orchestrator = PipelineOrchestrator::new(stages, config, EventBus::new());
        let (tx, _rx) = progress_channel();

        let err = orchestrator
            .run(
                ProblemInput::text("2x + 5 = 15"),
                RunOptions::default(),
                tx,
                CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err.error, PipelineError::StageTimeout { .. }));
        assert_eq!(err.trace.len(), 4);
        assert!(!err.trace.last().unwrap().success);
    }

    #[tokio::test]
    async fn test_progress_updates_follow_stage_order() {
        let orchestrator = orchestrator(happy_stages(0.95));
        let (tx, mut rx) = progress_channel();

        orchestrator
            .run(
                ProblemInput::text("2x + 5 = 15"),
                RunOptions::default(),
                tx,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        let mut updates = Vec::new();
        while let Ok(update) = rx.try_recv() {
            updates.push(update);
        }
        assert_eq!(updates.len(), 12);

        for (i, stage) in STAGE_ORDER.iter().enumerate() {
            match (&updates[i * 2], &updates[i * 2 + 1]) {
                (
                    ProgressUpdate::AgentUpdate {
                        agent: a1,
                        status: StageStatus::Started,
                        ..
                    },
                    ProgressUpdate::AgentUpdate {
                        agent: a2,
                        status: StageStatus::Completed,
                        ..
                    },
                ) => {
                    assert_eq!(a1, stage);
                    assert_eq!(a2, stage);
                }
                other => panic!("unexpected update pair for {stage}: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_lifecycle_events_are_published() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let orchestrator =
            PipelineOrchestrator::new(happy_stages(0.95), PipelineConfig::default(), bus);
        let (tx, _prx) = progress_channel();

        let run_id = Uuid::new_v4();
        orchestrator
            .run(
                ProblemInput::text("2x + 5 = 15"),
                RunOptions {
                    run_id: Some(run_id),
                    ..Default::default()
                },
                tx,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.event.kind(), "run.started");
        assert_eq!(first.event.run_id(), Some(run_id));

        let mut last = first;
        while let Ok(envelope) = rx.try_recv() {
            last = envelope;
        }
        assert_eq!(last.event.kind(), "run.completed");
    }
}
