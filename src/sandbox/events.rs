/*!
 * Sandbox Events
 * Lifecycle, violation, and resource events for the embedding application
 */

use crate::core::types::SandboxId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Event raised by the sandbox manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum SandboxEvent {
    Created {
        id: SandboxId,
    },
    Destroyed {
        id: SandboxId,
    },
    ViolationDetected {
        id: SandboxId,
        message: String,
    },
    ResourceLimitExceeded {
        id: SandboxId,
        resource: String,
    },
}

/// Fan-out bus: each subscriber gets every event on its own channel
///
/// Subscribers that dropped their receiver are pruned on the next emit.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<flume::Sender<SandboxEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> flume::Receiver<SandboxEvent> {
        let (tx, rx) = flume::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn emit(&self, event: SandboxEvent) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_and_emit() {
        let bus = EventBus::new();
        let rx = bus.subscribe();

        bus.emit(SandboxEvent::Created {
            id: SandboxId::from("s1"),
        });

        let event = rx.try_recv().unwrap();
        assert_eq!(
            event,
            SandboxEvent::Created {
                id: SandboxId::from("s1")
            }
        );
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        drop(rx);

        bus.emit(SandboxEvent::Destroyed {
            id: SandboxId::from("s1"),
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_events_arrive_in_order() {
        let bus = EventBus::new();
        let rx = bus.subscribe();

        bus.emit(SandboxEvent::Created {
            id: SandboxId::from("s1"),
        });
        bus.emit(SandboxEvent::ViolationDetected {
            id: SandboxId::from("s1"),
            message: "denied".to_string(),
        });
        bus.emit(SandboxEvent::Destroyed {
            id: SandboxId::from("s1"),
        });

        let kinds: Vec<SandboxEvent> = rx.try_iter().collect();
        assert_eq!(kinds.len(), 3);
        assert!(matches!(kinds[0], SandboxEvent::Created { .. }));
        assert!(matches!(kinds[1], SandboxEvent::ViolationDetected { .. }));
        assert!(matches!(kinds[2], SandboxEvent::Destroyed { .. }));
    }
}
