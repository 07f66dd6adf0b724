use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::state::AppState;

pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 1000;
pub const SSE_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub run_ids: Option<String>,
}

/// Ring buffer of recent events, used to replay what a reconnecting client
/// missed (`Last-Event-ID`).
pub struct EventBuffer {
    events: VecDeque<events::EventEnvelope>,
    max_size: usize,
}

impl EventBuffer {
    pub fn new(max_size: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_size),
            max_size,
        }
    }

    pub fn push(&mut self, envelope: events::EventEnvelope) {
        if self.events.len() >= self.max_size {
            self.events.pop_front();
        }
        self.events.push_back(envelope);
    }

    pub fn events_after(&self, event_id: Uuid) -> Vec<events::EventEnvelope> {
        let mut found = false;
        self.events
            .iter()
            .filter_map(|envelope| {
                if found {
                    Some(envelope.clone())
                } else if envelope.id == event_id {
                    found = true;
                    None
                } else {
                    None
                }
            })
            .collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.events.len()
    }
}

pub type SharedEventBuffer = Arc<RwLock<EventBuffer>>;

/// Mirror every published event into the replay buffer.
///
/// The spawned task is the buffer's only writer: events are buffered even
/// with no connected clients, and exactly once regardless of how many
/// clients are streaming.
pub fn spawn_event_buffering(bus: &events::EventBus, buffer: SharedEventBuffer) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(envelope) => buffer
                    .write()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .push(envelope),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event buffering lagged behind the bus");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

fn parse_run_ids(run_ids: Option<&str>) -> Option<Vec<Uuid>> {
    run_ids.map(|s| {
        s.split(',')
            .filter_map(|id| id.trim().parse().ok())
            .collect()
    })
}

fn envelope_to_sse_event(envelope: &events::EventEnvelope) -> Result<Event, Infallible> {
    let data = serde_json::to_string(&envelope).unwrap_or_else(|_| "{}".to_string());

    Ok(Event::default()
        .id(envelope.id.to_string())
        .event(envelope.event.kind())
        .data(data))
}

#[utoipa::path(
    get,
    path = "/api/events",
    params(
        ("run_ids" = Option<String>, Query, description = "Comma-separated run IDs to filter events"),
    ),
    responses(
        (status = 200, description = "SSE event stream"),
    ),
    tag = "events"
)]
pub async fn events_stream(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
    headers: axum::http::HeaderMap,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let run_ids = parse_run_ids(query.run_ids.as_deref());
    let last_event_id = headers
        .get("Last-Event-ID")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<Uuid>().ok());

    let rx = state.event_bus.subscribe();

    let missed_events = if let Some(event_id) = last_event_id {
        state
            .event_buffer
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .events_after(event_id)
    } else {
        vec![]
    };

    let missed_stream =
        futures::stream::iter(missed_events.into_iter().map(|e| envelope_to_sse_event(&e)));

    let live_stream = BroadcastStream::new(rx).filter_map(move |result| {
        let run_ids = run_ids.clone();

        async move {
            match result {
                Ok(envelope) => {
                    if let Some(ref ids) = run_ids {
                        if let Some(event_run_id) = envelope.event.run_id() {
                            if !ids.contains(&event_run_id) {
                                return None;
                            }
                        }
                    }

                    Some(envelope_to_sse_event(&envelope))
                }
                Err(e) => {
                    tracing::warn!("SSE broadcast error: {:?}", e);
                    None
                }
            }
        }
    });

    let stream = missed_stream.chain(live_stream);

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(SSE_KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(run_id: Uuid) -> events::EventEnvelope {
        events::EventEnvelope::new(events::Event::RunStarted {
            run_id,
            modality: "text".to_string(),
        })
    }

    #[test]
    fn test_parse_run_ids_none() {
        assert!(parse_run_ids(None).is_none());
    }

    #[test]
    fn test_parse_run_ids_filters_invalid() {
        let uuid1 = Uuid::new_v4();
        let uuid2 = Uuid::new_v4();
        let input = format!("{},invalid,{}", uuid1, uuid2);
        let result = parse_run_ids(Some(&input)).unwrap();
        assert_eq!(result, vec![uuid1, uuid2]);
    }

    #[test]
    fn test_event_buffer_events_after() {
        let mut buffer = EventBuffer::new(3);

        let e1 = envelope(Uuid::new_v4());
        let e2 = envelope(Uuid::new_v4());
        let e3 = envelope(Uuid::new_v4());

        let id1 = e1.id;
        let id2 = e2.id;

        buffer.push(e1);
        buffer.push(e2);
        buffer.push(e3.clone());

        let after_first = buffer.events_after(id1);
        assert_eq!(after_first.len(), 2);
        assert_eq!(after_first[0].id, id2);

        let after_nonexistent = buffer.events_after(Uuid::new_v4());
        assert!(after_nonexistent.is_empty());
    }

    #[test]
    fn test_event_buffer_evicts_oldest() {
        let mut buffer = EventBuffer::new(2);

        let e1 = envelope(Uuid::new_v4());
        let id1 = e1.id;
        buffer.push(e1);
        buffer.push(envelope(Uuid::new_v4()));
        buffer.push(envelope(Uuid::new_v4()));

        assert_eq!(buffer.len(), 2);
        assert!(buffer.events_after(id1).is_empty());
    }

    #[test]
    fn test_envelope_to_sse_event_does_not_panic() {
        let envelope = envelope(Uuid::new_v4());
        let _event = envelope_to_sse_event(&envelope).unwrap();
    }

    async fn wait_for_len(buffer: &SharedEventBuffer, expected: usize) {
        for _ in 0..100 {
            let len = buffer
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .len();
            if len == expected {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("buffer never reached {expected} events");
    }

    #[tokio::test]
    async fn test_events_buffered_without_clients() {
        let bus = events::EventBus::new();
        let buffer: SharedEventBuffer = Arc::new(RwLock::new(EventBuffer::new(10)));
        spawn_event_buffering(&bus, Arc::clone(&buffer));

        bus.publish(envelope(Uuid::new_v4()));
        wait_for_len(&buffer, 1).await;
    }

    #[tokio::test]
    async fn test_events_buffered_once_despite_multiple_clients() {
        let bus = events::EventBus::new();
        let buffer: SharedEventBuffer = Arc::new(RwLock::new(EventBuffer::new(10)));
        spawn_event_buffering(&bus, Arc::clone(&buffer));

        let _client_a = bus.subscribe();
        let _client_b = bus.subscribe();

        let published = envelope(Uuid::new_v4());
        let id = published.id;
        bus.publish(published);
        bus.publish(envelope(Uuid::new_v4()));
        wait_for_len(&buffer, 2).await;

        let replay = buffer
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .events_after(id);
        assert_eq!(replay.len(), 1);
    }
}
