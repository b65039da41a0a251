use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::policy::BlockReason;

/// Every observable state change in the engine produces an Event.
/// The status surface and any UI subscribe to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    TimerStarted {
        duration_minutes: u32,
        at: DateTime<Utc>,
    },
    TimerStopped {
        at: DateTime<Utc>,
    },
    TimerCompleted {
        at: DateTime<Utc>,
    },
    TimerExtended {
        added_minutes: u32,
        duration_minutes: u32,
        remaining_ms: u64,
        at: DateTime<Utc>,
    },
    RemainingTimeChanged {
        remaining_ms: u64,
        at: DateTime<Utc>,
    },
    StudyModeChanged {
        enabled: bool,
        at: DateTime<Utc>,
    },
    /// The blocking surface went up over `package_id`.
    SurfaceShown {
        package_id: Option<String>,
        reason: BlockReason,
        at: DateTime<Utc>,
    },
    SurfaceHidden {
        at: DateTime<Utc>,
    },
}

impl Event {
    /// True for the events that end a timer session.
    pub fn ends_timer(&self) -> bool {
        matches!(self, Event::TimerStopped { .. } | Event::TimerCompleted { .. })
    }
}

pub type EventSender = broadcast::Sender<Event>;
pub type EventReceiver = broadcast::Receiver<Event>;

/// Create a broadcast event bus with the given capacity.
pub fn event_bus(capacity: usize) -> (EventSender, EventReceiver) {
    broadcast::channel(capacity.max(1))
}

/// Send without caring whether anyone is listening.
pub(crate) fn publish(tx: &EventSender, event: Event) {
    if tx.send(event).is_err() {
        tracing::trace!("event published with no subscribers");
    }
}
