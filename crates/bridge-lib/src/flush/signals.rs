use super::rate::RateTracker;
use super::trigger::SchedulerState;
use crate::models::Priority;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Flags raised by producers and consumed by the flush task.
///
/// Every request is a flag plus a wake-up, so repeated requests made while a
/// cycle is in flight collapse into a single follow-up cycle.
#[derive(Debug)]
pub struct FlushSignals {
    manual: AtomicBool,
    /// One bit per priority tier
    urgent: AtomicU8,
    closed: AtomicBool,
    state: AtomicU8,
    deadline: Mutex<Option<Instant>>,
    rate: Mutex<RateTracker>,
    notify: Notify,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl FlushSignals {
    pub fn new(rate_window: Duration) -> Self {
        Self {
            manual: AtomicBool::new(false),
            urgent: AtomicU8::new(0),
            closed: AtomicBool::new(false),
            state: AtomicU8::new(SchedulerState::Idle as u8),
            deadline: Mutex::new(None),
            rate: Mutex::new(RateTracker::new(rate_window)),
            notify: Notify::new(),
        }
    }

    /// Request a manual flush. Returns false if one was already pending.
    pub fn request_manual(&self) -> bool {
        let fresh = !self.manual.swap(true, Ordering::AcqRel);
        self.notify.notify_one();
        fresh
    }

    /// Request an immediate flush of `priority`'s tier
    pub fn request_priority(&self, priority: Priority) {
        self.urgent
            .fetch_or(1 << priority.index(), Ordering::AcqRel);
        self.notify.notify_one();
    }

    /// Ask the flush task to re-evaluate its triggers now
    pub fn wake(&self) {
        self.notify.notify_one();
    }

    pub async fn notified(&self) {
        self.notify.notified().await
    }

    pub(crate) fn take_manual(&self) -> bool {
        self.manual.swap(false, Ordering::AcqRel)
    }

    /// Urgent tiers in drain order, clearing the flags
    pub(crate) fn take_urgent(&self) -> Vec<Priority> {
        let bits = self.urgent.swap(0, Ordering::AcqRel);
        Priority::ALL
            .into_iter()
            .filter(|p| bits & (1 << p.index()) != 0)
            .collect()
    }

    /// Keep the earliest per-signal transmission deadline
    pub fn arm_deadline(&self, at: Instant) {
        let mut deadline = lock(&self.deadline);
        match *deadline {
            Some(current) if current <= at => {}
            _ => *deadline = Some(at),
        }
    }

    pub(crate) fn deadline_due(&self, now: Instant) -> bool {
        lock(&self.deadline).map(|d| d <= now).unwrap_or(false)
    }

    pub(crate) fn clear_deadline(&self) {
        *lock(&self.deadline) = None;
    }

    pub fn record_arrival(&self, at: Instant) {
        lock(&self.rate).record(at);
    }

    pub(crate) fn arrival_rate(&self, now: Instant) -> f64 {
        lock(&self.rate).rate(now)
    }

    /// Stop accepting new observations
    pub(crate) fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn state(&self) -> SchedulerState {
        SchedulerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: SchedulerState) {
        self.state.store(state as u8, Ordering::Release);
    }
}
