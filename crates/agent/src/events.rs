//! Logs flush events published by the bridge

use bridge_lib::FlushEvent;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

/// Consume flush events until the bridge drops its sender.
/// Returns the number of events handled.
pub async fn log_flush_events(mut rx: broadcast::Receiver<FlushEvent>) -> u64 {
    let mut handled = 0;
    loop {
        match rx.recv().await {
            Ok(event) => {
                handled += 1;
                match &event {
                    FlushEvent::Completed(outcome) => debug!(
                        trigger = %outcome.trigger,
                        points = outcome.points_sent,
                        batches = outcome.batches,
                        duration_ms = outcome.duration_ms,
                        "Flush event"
                    ),
                    FlushEvent::Failed(outcome) => warn!(
                        trigger = %outcome.trigger,
                        points_sent = outcome.points_sent,
                        requeued = outcome.points_requeued,
                        timed_out = outcome.timed_out,
                        error = outcome.error.as_deref().unwrap_or("unknown"),
                        "Flush event: send failed"
                    ),
                    FlushEvent::PointsLost { count, cause } => warn!(
                        count = count,
                        cause = %cause,
                        "Flush event: points lost"
                    ),
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped = skipped, "Flush event subscriber lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
    handled
}
