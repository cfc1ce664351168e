//! Progress event bus (§4.14): per-session, one producer, many consumers.

use crate::ids::{ClaimId, PaperId, SessionId};
use crate::model::{Phase, Plan};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    Progress {
        phase: Phase,
        phase_index: usize,
        current: usize,
        total: usize,
        message: String,
        #[serde(default)]
        warn: bool,
        #[serde(default)]
        slow: bool,
    },
    StateChange {
        from: Phase,
        to: Phase,
    },
    Message {
        role: String,
        content: String,
    },
    TokenStream {
        message_id: String,
        token: String,
        done: bool,
    },
    Plan {
        plan: Plan,
    },
    PapersCollected {
        papers: Vec<PaperId>,
        count: usize,
    },
    ScreeningSummary {
        included: usize,
        excluded: usize,
        reasons: Value,
    },
    Evidence {
        paper_title: String,
        spans_count: usize,
        sample_snippet: String,
    },
    Taxonomy {
        matrix: Value,
    },
    Claims {
        claims: Vec<ClaimId>,
    },
    GapMining {
        gaps: Value,
    },
    ApprovalRequired {
        gate: Value,
    },
    Complete,
    Error {
        message: String,
    },
    Done {
        state: String,
    },
}

/// The bounded queue depth beyond which a slow consumer is dropped (§4.14:
/// "a consumer's slow read must not block the producer").
const CONSUMER_QUEUE_BOUND: usize = 256;

/// Snapshot of a session's current state, delivered to a late-joining
/// consumer before it starts receiving live events (§4.14).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub phase: Phase,
    pub events_so_far: Vec<Event>,
}

/// One bus per session. Producers call `publish`; consumers call
/// `subscribe` and then drain the returned receiver. `tokio::sync::broadcast`
/// already gives per-producer FIFO ordering and marks lagging consumers via
/// `RecvError::Lagged`, which callers surface as a drop count.
pub struct EventBus {
    session_id: SessionId,
    sender: broadcast::Sender<Event>,
    history: std::sync::Mutex<Vec<Event>>,
}

impl EventBus {
    pub fn new(session_id: SessionId) -> Self {
        let (sender, _) = broadcast::channel(CONSUMER_QUEUE_BOUND);
        Self {
            session_id,
            sender,
            history: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn publish(&self, event: Event) {
        self.history
            .lock()
            .expect("history mutex poisoned")
            .push(event.clone());
        // A lagging/closed receiver set yields an `Err`; there being no
        // consumers at all is not a producer-side failure.
        let _ = self.sender.send(event);
    }

    /// Snapshot-then-live: callers drain the snapshot before polling the
    /// receiver, so no live event is missed or duplicated across the join.
    pub fn subscribe(&self, current_phase: Phase) -> (SessionSnapshot, broadcast::Receiver<Event>) {
        let receiver = self.sender.subscribe();
        let snapshot = SessionSnapshot {
            session_id: self.session_id.clone(),
            phase: current_phase,
            events_so_far: self.history.lock().expect("history mutex poisoned").clone(),
        };
        (snapshot, receiver)
    }
}

/// Drains a receiver, counting events lost to lag (§4.14 "drop and mark
/// drops for consumers that fall behind").
pub async fn drain_counting_drops(mut receiver: broadcast::Receiver<Event>) -> (Vec<Event>, u64) {
    let mut events = Vec::new();
    let mut dropped = 0u64;
    loop {
        match receiver.recv().await {
            Ok(event) => {
                let is_terminal = matches!(event, Event::Complete | Event::Done { .. } | Event::Error { .. });
                events.push(event);
                if is_terminal {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => dropped += skipped,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    (events, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn late_joiner_sees_snapshot_then_live_events() {
        let bus = EventBus::new(SessionId::new());
        bus.publish(Event::StateChange { from: Phase::Idle, to: Phase::Planning });

        let (snapshot, mut rx) = bus.subscribe(Phase::Planning);
        assert_eq!(snapshot.events_so_far.len(), 1);

        bus.publish(Event::Complete);
        let next = rx.recv().await.unwrap();
        assert!(matches!(next, Event::Complete));
    }

    #[tokio::test]
    async fn events_are_delivered_in_publish_order() {
        let bus = EventBus::new(SessionId::new());
        let (_snapshot, mut rx) = bus.subscribe(Phase::Idle);
        bus.publish(Event::StateChange { from: Phase::Idle, to: Phase::Planning });
        bus.publish(Event::StateChange { from: Phase::Planning, to: Phase::Collection });
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(matches!(first, Event::StateChange { to: Phase::Planning, .. }));
        assert!(matches!(second, Event::StateChange { to: Phase::Collection, .. }));
    }
}
