mod explainer;
mod guardrail;
mod parser;
mod router;
mod solver;
mod verifier;

pub use explainer::ExplainerStage;
pub use guardrail::GuardrailStage;
pub use parser::ParserStage;
pub use router::RouterStage;
pub use solver::SolverStage;
pub use verifier::VerifierStage;

use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::services::{LlmClient, Retriever};
use crate::stage::Stage;

/// Build the production stage list in execution order.
pub fn default_stages(
    llm: Arc<LlmClient>,
    retriever: Arc<dyn Retriever>,
    config: &PipelineConfig,
) -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(GuardrailStage::new(llm.clone())),
        Box::new(ParserStage::new(llm.clone())),
        Box::new(RouterStage::new(llm.clone())),
        Box::new(SolverStage::new(
            llm.clone(),
            retriever,
            config.retrieval_top_k,
        )),
        Box::new(VerifierStage::new(llm.clone())),
        Box::new(ExplainerStage::new(llm)),
    ]
}

/// Char-safe prefix for trace summaries.
pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let prefix: String = text.chars().take(max_chars).collect();
        format!("{prefix}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::STAGE_ORDER;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("0123456789abc", 10), "0123456789...");
    }

    #[test]
    fn test_default_stages_follow_fixed_order() {
        let llm = Arc::new(LlmClient::new(Default::default()));
        let retriever = Arc::new(crate::services::NullRetriever);
        let stages = default_stages(llm, retriever, &PipelineConfig::default());

        let names: Vec<&str> = stages.iter().map(|s| s.name()).collect();
        assert_eq!(names, STAGE_ORDER.to_vec());
    }
}
