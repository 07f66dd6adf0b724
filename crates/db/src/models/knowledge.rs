use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::solution::{datetime_to_timestamp, timestamp_to_datetime};

/// A document in the static knowledge base.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: String,
    pub topic: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl KnowledgeEntry {
    pub fn new(topic: impl Into<String>, content: impl Into<String>) -> Self {
        let hex = Uuid::new_v4().simple().to_string();
        Self {
            id: format!("kb_{}", &hex[..12]),
            topic: topic.into(),
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct KnowledgeRow {
    pub id: String,
    pub topic: String,
    pub content: String,
    pub created_at: i64,
}

impl KnowledgeRow {
    pub fn into_domain(self) -> KnowledgeEntry {
        KnowledgeEntry {
            id: self.id,
            topic: self.topic,
            content: self.content,
            created_at: timestamp_to_datetime(self.created_at),
        }
    }
}

impl From<&KnowledgeEntry> for KnowledgeRow {
    fn from(entry: &KnowledgeEntry) -> Self {
        Self {
            id: entry.id.clone(),
            topic: entry.topic.clone(),
            content: entry.content.clone(),
            created_at: datetime_to_timestamp(entry.created_at),
        }
    }
}
