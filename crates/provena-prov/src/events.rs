//! Registration lifecycle events.
//!
//! The orchestrator emits a [`LifecycleEvent`] on every state transition via
//! a [`tokio::sync::broadcast`] channel, so observers can follow model run
//! registrations without coupling to the orchestrator.

use serde::{Deserialize, Serialize};

use provena_types::RegistrationState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LifecycleEvent {
    StateEntered {
        /// Job id for queued work, a generated correlation id otherwise.
        correlation_id: String,
        record_id: Option<String>,
        state: RegistrationState,
    },
    RegistrationCompleted {
        correlation_id: String,
        record_id: String,
        nodes: usize,
        edges: usize,
        duration_ms: u64,
    },
    RegistrationFailed {
        correlation_id: String,
        record_id: Option<String>,
        state: RegistrationState,
        error: String,
    },
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<LifecycleEvent>,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all current subscribers; dropped if there are none.
    pub fn emit(&self, event: LifecycleEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_transitions() {
        let emitter = EventEmitter::new(16);
        let mut rx = emitter.subscribe();

        emitter.emit(LifecycleEvent::StateEntered {
            correlation_id: "c1".into(),
            record_id: None,
            state: RegistrationState::Validating,
        });

        match rx.recv().await.unwrap() {
            LifecycleEvent::StateEntered { state, record_id, .. } => {
                assert_eq!(state, RegistrationState::Validating);
                assert!(record_id.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn emit_without_subscribers_is_silent() {
        let emitter = EventEmitter::new(4);
        emitter.emit(LifecycleEvent::RegistrationFailed {
            correlation_id: "c1".into(),
            record_id: Some("10378.1/1".into()),
            state: RegistrationState::MergingGraph,
            error: "graph database returned HTTP 503".into(),
        });
    }

    #[test]
    fn events_serialize_with_state_names() {
        let json = serde_json::to_value(LifecycleEvent::StateEntered {
            correlation_id: "c".into(),
            record_id: Some("r".into()),
            state: RegistrationState::BuildingGraph,
        })
        .unwrap();
        assert_eq!(json["StateEntered"]["state"], "BUILDING_GRAPH");
    }
}
