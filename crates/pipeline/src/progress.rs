//! Per-run progress channel.
//!
//! Each run owns an independent sender/receiver pair with exactly one
//! consumer. Updates are delivered in emission order. A dropped receiver
//! does not stop the run: sends to a gone consumer are silently discarded
//! and the final result stays fetchable through the synchronous path.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Started,
    Completed,
    Failed,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// One line of the streaming solve protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressUpdate {
    AgentUpdate {
        agent: String,
        status: StageStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<serde_json::Value>,
    },
    FinalResult {
        data: serde_json::Value,
    },
    Error {
        error: String,
    },
    Cancelled {
        message: String,
    },
}

pub type ProgressReceiver = mpsc::UnboundedReceiver<ProgressUpdate>;

#[derive(Clone)]
pub struct ProgressSender {
    tx: mpsc::UnboundedSender<ProgressUpdate>,
}

impl ProgressSender {
    pub fn send(&self, update: ProgressUpdate) {
        // Consumer gone: keep running, result stays fetchable elsewhere.
        let _ = self.tx.send(update);
    }

    pub fn stage_started(&self, agent: &str) {
        self.send(ProgressUpdate::AgentUpdate {
            agent: agent.to_string(),
            status: StageStatus::Started,
            data: None,
        });
    }

    pub fn stage_completed(&self, agent: &str, data: serde_json::Value) {
        self.send(ProgressUpdate::AgentUpdate {
            agent: agent.to_string(),
            status: StageStatus::Completed,
            data: if data.is_null() { None } else { Some(data) },
        });
    }

    pub fn stage_failed(&self, agent: &str, error: &str) {
        self.send(ProgressUpdate::AgentUpdate {
            agent: agent.to_string(),
            status: StageStatus::Failed,
            data: Some(serde_json::json!({ "error": error })),
        });
    }
}

/// Create the channel for one run.
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ProgressSender { tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_updates_arrive_in_order() {
        let (tx, mut rx) = progress_channel();

        tx.stage_started("guardrail");
        tx.stage_completed("guardrail", serde_json::json!({"risk_level": "low"}));
        tx.stage_started("parser");

        match rx.recv().await.unwrap() {
            ProgressUpdate::AgentUpdate { agent, status, .. } => {
                assert_eq!(agent, "guardrail");
                assert_eq!(status, StageStatus::Started);
            }
            other => panic!("unexpected update: {other:?}"),
        }
        match rx.recv().await.unwrap() {
            ProgressUpdate::AgentUpdate { agent, status, data } => {
                assert_eq!(agent, "guardrail");
                assert_eq!(status, StageStatus::Completed);
                assert!(data.is_some());
            }
            other => panic!("unexpected update: {other:?}"),
        }
        match rx.recv().await.unwrap() {
            ProgressUpdate::AgentUpdate { agent, .. } => assert_eq!(agent, "parser"),
            other => panic!("unexpected update: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_with_dropped_consumer_does_not_panic() {
        let (tx, rx) = progress_channel();
        drop(rx);
        tx.stage_started("solver");
        tx.send(ProgressUpdate::Error {
            error: "boom".to_string(),
        });
    }

    #[test]
    fn test_wire_format() {
        let update = ProgressUpdate::AgentUpdate {
            agent: "parser".to_string(),
            status: StageStatus::Completed,
            data: None,
        };
        let json = serde_json::to_string(&update).unwrap();
        assert!(json.contains(r#""type":"agent_update""#));
        assert!(json.contains(r#""status":"completed""#));
        assert!(!json.contains("data"));

        let terminal = ProgressUpdate::FinalResult {
            data: serde_json::json!({"final_answer": "x = 5"}),
        };
        let json = serde_json::to_string(&terminal).unwrap();
        assert!(json.contains(r#""type":"final_result""#));

        let cancelled = ProgressUpdate::Cancelled {
            message: "Run cancelled".to_string(),
        };
        let json = serde_json::to_string(&cancelled).unwrap();
        assert!(json.contains(r#""type":"cancelled""#));
    }
}
