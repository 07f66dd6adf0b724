use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use db::{KnowledgeRepository, SolutionRepository, ViewStateRepository};
use events::EventBus;
use pipeline::services::{Extractor, KnowledgeRetriever, LlmClient, LlmConfig};
use pipeline::stages::default_stages;
use pipeline::{PipelineConfig, PipelineOrchestrator};
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::routes::sse::{
    spawn_event_buffering, EventBuffer, SharedEventBuffer, DEFAULT_EVENT_BUFFER_SIZE,
};

/// Cancellation tokens for runs that are currently executing, keyed by the
/// caller-visible run id.
pub type ActiveRuns = Arc<RwLock<HashMap<Uuid, CancellationToken>>>;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<PipelineOrchestrator>,
    pub solutions: SolutionRepository,
    pub view_states: ViewStateRepository,
    pub knowledge: KnowledgeRepository,
    pub event_bus: EventBus,
    pub event_buffer: SharedEventBuffer,
    pub extractor: Option<Arc<dyn Extractor>>,
    pub extraction_threshold: f32,
    pub active_runs: ActiveRuns,
}

impl AppState {
    pub fn new(pool: SqlitePool, llm_config: LlmConfig, pipeline_config: PipelineConfig) -> Self {
        let event_bus = EventBus::new();
        let event_buffer = Arc::new(RwLock::new(EventBuffer::new(DEFAULT_EVENT_BUFFER_SIZE)));
        spawn_event_buffering(&event_bus, Arc::clone(&event_buffer));

        let solutions = SolutionRepository::new(pool.clone());
        let view_states = ViewStateRepository::new(pool.clone());
        let knowledge = KnowledgeRepository::new(pool);

        let llm = Arc::new(LlmClient::new(llm_config));
        let retriever = Arc::new(KnowledgeRetriever::new(knowledge.clone()));
        let stages = default_stages(llm, retriever, &pipeline_config);
        let extraction_threshold = pipeline_config.extraction_confidence_threshold;
        let orchestrator = Arc::new(PipelineOrchestrator::new(
            stages,
            pipeline_config,
            event_bus.clone(),
        ));

        Self {
            orchestrator,
            solutions,
            view_states,
            knowledge,
            event_bus,
            event_buffer,
            extractor: None,
            extraction_threshold,
            active_runs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Register a run for cancellation. Returns the token the run should
    /// observe.
    pub fn register_run(&self, run_id: Uuid) -> CancellationToken {
        let token = CancellationToken::new();
        self.active_runs
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(run_id, token.clone());
        token
    }

    pub fn unregister_run(&self, run_id: &Uuid) {
        self.active_runs
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(run_id);
    }

    /// Cancel a registered run. Returns false when the run is unknown or
    /// already finished.
    pub fn cancel_run(&self, run_id: &Uuid) -> bool {
        let token = self
            .active_runs
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(run_id);

        match token {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}
