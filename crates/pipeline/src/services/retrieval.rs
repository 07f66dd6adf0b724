//! Knowledge retrieval for the solver.

use std::collections::HashSet;

use async_trait::async_trait;
use db::KnowledgeRepository;
use solver_core::{SourceRef, SourceType};
use tracing::debug;

use crate::error::Result;

#[async_trait]
pub trait Retriever: Send + Sync {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<SourceRef>>;
}

/// Keyword-overlap retrieval over the knowledge base.
///
/// Similarity is the fraction of query terms present in a document, so it
/// stays within [0, 1] like the source refs require.
#[derive(Clone)]
pub struct KnowledgeRetriever {
    repo: KnowledgeRepository,
}

impl KnowledgeRetriever {
    pub fn new(repo: KnowledgeRepository) -> Self {
        Self { repo }
    }
}

fn terms(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(|t| t.to_string())
        .collect()
}

fn similarity(query_terms: &HashSet<String>, doc: &str) -> f32 {
    if query_terms.is_empty() {
        return 0.0;
    }
    let doc_terms = terms(doc);
    let overlap = query_terms.intersection(&doc_terms).count();
    overlap as f32 / query_terms.len() as f32
}

#[async_trait]
impl Retriever for KnowledgeRetriever {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<SourceRef>> {
        let query_terms = terms(query);
        let entries = self.repo.list().await?;

        let mut scored: Vec<SourceRef> = entries
            .into_iter()
            .filter_map(|entry| {
                let text = format!("{} {}", entry.topic, entry.content);
                let score = similarity(&query_terms, &text);
                (score > 0.0).then(|| SourceRef {
                    content: entry.content,
                    source_type: SourceType::KnowledgeBase,
                    similarity: score,
                })
            })
            .collect();

        scored.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        scored.truncate(k);

        debug!(query_terms = query_terms.len(), hits = scored.len(), "knowledge search");
        Ok(scored)
    }
}

/// Retriever that finds nothing. Used when no knowledge base is configured.
pub struct NullRetriever;

#[async_trait]
impl Retriever for NullRetriever {
    async fn search(&self, _query: &str, _k: usize) -> Result<Vec<SourceRef>> {
        Ok(Vec::new())
    }
}
