use crate::types::{RunId, RunStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

/// An event emitted while a run progresses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub run_id: RunId,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
}

impl Event {
    pub fn new(run_id: RunId, event_type: EventType) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            run_id,
            timestamp: Utc::now(),
            event_type,
        }
    }
}

/// Types of events that can occur during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventType {
    // Run lifecycle events
    RunStarted {
        total_nodes: usize,
        levels: usize,
        max_concurrency: usize,
    },
    RunCompleted {
        status: RunStatus,
        completed: usize,
        failed: usize,
        skipped: usize,
        duration_ms: u64,
    },

    // Level lifecycle events
    LevelStarted {
        level: usize,
        node_count: usize,
    },
    LevelCompleted {
        level: usize,
        completed: usize,
        failed: usize,
        skipped: usize,
    },

    // Node lifecycle events
    NodeStarted {
        node: String,
        level: usize,
    },
    NodeCompleted {
        node: String,
        duration_ms: u64,
    },
    NodeFailed {
        node: String,
        error: String,
    },
    NodeSkipped {
        node: String,
        reason: String,
    },
}

/// Sends events for one run to an optional subscriber.
///
/// A dropped receiver is not an error; events are simply discarded.
#[derive(Debug, Clone)]
pub(crate) struct EventEmitter {
    run_id: RunId,
    sender: Option<UnboundedSender<Event>>,
}

impl EventEmitter {
    pub(crate) fn new(run_id: RunId, sender: Option<UnboundedSender<Event>>) -> Self {
        Self { run_id, sender }
    }

    pub(crate) fn emit(&self, event_type: EventType) {
        if let Some(sender) = &self.sender {
            if sender.send(Event::new(self.run_id, event_type)).is_err() {
                tracing::trace!("Event receiver dropped for run {}", self.run_id);
            }
        }
    }
}
