use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::agent_engine::state::{ActionKind, TerminalState};

/// Notifications the loop emits for a host or UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoopEvent {
    /// Screen pixel about to be acted on. Sent before the cursor moves.
    Coordinate { x: f64, y: f64 },
    IterationStarted {
        iteration: u32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    Decision {
        iteration: u32,
        action: ActionKind,
        status: String,
    },
    Terminated {
        reason: TerminalState,
        message: String,
    },
}

/// Lossy, non-blocking sender side of the notification channel.
///
/// A full or closed channel drops the event; the loop never waits on its
/// listeners.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    tx: Option<mpsc::Sender<LoopEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<LoopEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx) }, rx)
    }

    /// A bus with no listener.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: LoopEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(ev)) => {
                tracing::debug!(?ev, "event channel full, dropping");
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }

    pub fn coordinate(&self, x: f64, y: f64) {
        self.emit(LoopEvent::Coordinate { x, y });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_channel_drops_without_blocking() {
        let (bus, mut rx) = EventBus::new(1);
        bus.coordinate(1.0, 2.0);
        bus.coordinate(3.0, 4.0);

        match rx.try_recv() {
            Ok(LoopEvent::Coordinate { x, y }) => assert_eq!((x, y), (1.0, 2.0)),
            other => panic!("unexpected {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_and_disabled_are_silent() {
        let (bus, rx) = EventBus::new(4);
        drop(rx);
        bus.coordinate(0.0, 0.0);
        EventBus::disabled().coordinate(0.0, 0.0);
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(LoopEvent::Coordinate { x: 5.0, y: 6.0 }).unwrap();
        assert_eq!(json["type"], "coordinate");
        assert_eq!(json["x"], 5.0);
    }
}
