//! Flush outcome events published to observers

use crate::flush::FlushTrigger;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Capacity of the event channel; slow observers skip ahead
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Summary of one flush cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlushOutcome {
    pub trigger: FlushTrigger,
    pub points_sent: usize,
    pub batches: usize,
    /// Points returned to the buffer after a failed send
    pub points_requeued: usize,
    /// The failed send hit the send timeout
    #[serde(default)]
    pub timed_out: bool,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl FlushOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlushEvent {
    Completed(FlushOutcome),
    Failed(FlushOutcome),
    PointsLost { count: usize, cause: String },
}

pub(crate) fn channel() -> broadcast::Sender<FlushEvent> {
    broadcast::channel(EVENT_CHANNEL_CAPACITY).0
}

/// Publish without caring whether anyone listens
pub(crate) fn publish(tx: &broadcast::Sender<FlushEvent>, event: FlushEvent) {
    let _ = tx.send(event);
}
