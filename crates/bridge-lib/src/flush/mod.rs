//! Flush scheduling
//!
//! Decides when buffered points leave the bridge:
//! - `time`: fixed interval
//! - `size`: buffer reaches `max_batch_size`
//! - `priority`: HIGH points immediately, the rest by size
//! - `hybrid`: first of time, size or priority
//! - `adaptive`: interval follows the arrival rate, size as a ceiling
//!
//! Manual and shutdown flushes are available under every strategy.

mod rate;
mod scheduler;
mod signals;
mod trigger;

pub use rate::{adaptive_interval, RateTracker};
pub use scheduler::{FlushScheduler, ShutdownReport};
pub use signals::FlushSignals;
pub use trigger::{FlushDecision, FlushTrigger, SchedulerState};
