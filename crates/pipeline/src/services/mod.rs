pub mod extraction;
pub mod llm;
pub mod retrieval;

pub use extraction::{needs_confirmation, Extraction, Extractor, HttpExtractor};
pub use llm::{LlmClient, LlmConfig};
pub use retrieval::{KnowledgeRetriever, NullRetriever, Retriever};
