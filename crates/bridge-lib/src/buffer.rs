//! Priority-partitioned point buffer
//!
//! Holds pending points in three FIFO tiers. Producers enqueue from any
//! thread; a single flush task drains. The lock is only held for the
//! queue manipulation itself, never across a send.

use crate::models::{NormalizedPoint, Priority};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Default hard cap on buffered points
pub const DEFAULT_HARD_CAP: usize = 10_000;

/// Point-in-time buffer occupancy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferSnapshot {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub total: usize,
}

impl BufferSnapshot {
    pub fn get(&self, priority: Priority) -> usize {
        match priority {
            Priority::High => self.high,
            Priority::Medium => self.medium,
            Priority::Low => self.low,
        }
    }
}

/// Result of an enqueue
#[derive(Debug, Default, PartialEq)]
pub struct EnqueueOutcome {
    /// Points evicted to stay under the hard cap, oldest first
    pub evicted: Vec<NormalizedPoint>,
    /// Total size after the enqueue
    pub size: usize,
}

#[derive(Debug, Default)]
struct Tiers {
    queues: [VecDeque<NormalizedPoint>; 3],
}

impl Tiers {
    fn len(&self) -> usize {
        self.queues.iter().map(VecDeque::len).sum()
    }

    /// Remove the oldest point of the lowest non-empty tier
    fn evict_one(&mut self) -> Option<NormalizedPoint> {
        self.queues.iter_mut().rev().find_map(|q| q.pop_front())
    }

    fn snapshot(&self) -> BufferSnapshot {
        let high = self.queues[0].len();
        let medium = self.queues[1].len();
        let low = self.queues[2].len();
        BufferSnapshot {
            high,
            medium,
            low,
            total: high + medium + low,
        }
    }
}

/// Bounded three-tier buffer
#[derive(Debug)]
pub struct PriorityBuffer {
    tiers: Mutex<Tiers>,
    hard_cap: usize,
}

impl Default for PriorityBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_HARD_CAP)
    }
}

impl PriorityBuffer {
    pub fn new(hard_cap: usize) -> Self {
        Self {
            tiers: Mutex::new(Tiers::default()),
            hard_cap: hard_cap.max(1),
        }
    }

    pub fn hard_cap(&self) -> usize {
        self.hard_cap
    }

    fn lock(&self) -> MutexGuard<'_, Tiers> {
        // A panic while holding the lock cannot leave the queues half-updated
        self.tiers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a point to its tier, evicting lowest-priority oldest points if
    /// the hard cap would be exceeded. The new point is never dropped.
    pub fn enqueue(&self, point: NormalizedPoint) -> EnqueueOutcome {
        let mut tiers = self.lock();
        let mut evicted = Vec::new();
        while tiers.len() >= self.hard_cap {
            match tiers.evict_one() {
                Some(p) => evicted.push(p),
                None => break,
            }
        }
        tiers.queues[point.priority.index()].push_back(point);
        let size = tiers.len();
        drop(tiers);

        if !evicted.is_empty() {
            debug!(evicted = evicted.len(), size, "Buffer at hard cap, evicted oldest points");
        }
        EnqueueOutcome { evicted, size }
    }

    /// Remove up to `max` points, HIGH before MEDIUM before LOW, FIFO per tier
    pub fn drain_batch(&self, max: usize) -> Vec<NormalizedPoint> {
        self.drain_tiers(max, &Priority::ALL)
    }

    /// Like [`drain_batch`](Self::drain_batch) but restricted to `tiers`
    pub fn drain_tiers(&self, max: usize, tiers: &[Priority]) -> Vec<NormalizedPoint> {
        let mut guard = self.lock();
        let mut batch = Vec::with_capacity(max.min(guard.len()));
        for priority in Priority::ALL {
            if !tiers.contains(&priority) {
                continue;
            }
            let queue = &mut guard.queues[priority.index()];
            let take = (max - batch.len()).min(queue.len());
            batch.extend(queue.drain(..take));
            if batch.len() == max {
                break;
            }
        }
        batch
    }

    /// Put a failed batch back at the head of its tiers, preserving order.
    ///
    /// Returns points evicted if the re-inserted batch pushes the buffer past
    /// the hard cap (newer LOW points go first).
    pub fn requeue_front(&self, batch: Vec<NormalizedPoint>) -> Vec<NormalizedPoint> {
        let mut tiers = self.lock();
        for point in batch.into_iter().rev() {
            tiers.queues[point.priority.index()].push_front(point);
        }
        let mut evicted = Vec::new();
        while tiers.len() > self.hard_cap {
            match tiers.evict_one() {
                Some(p) => evicted.push(p),
                None => break,
            }
        }
        evicted
    }

    /// Remove and return everything
    pub fn drain_all(&self) -> Vec<NormalizedPoint> {
        let mut tiers = self.lock();
        let mut out = Vec::with_capacity(tiers.len());
        for q in tiers.queues.iter_mut() {
            out.extend(q.drain(..));
        }
        out
    }

    pub fn size(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn size_by_priority(&self) -> BufferSnapshot {
        self.lock().snapshot()
    }

    /// Receive instant of the oldest point in `priority`, if any
    pub fn oldest(&self, priority: Priority) -> Option<tokio::time::Instant> {
        self.lock().queues[priority.index()]
            .front()
            .map(|p| p.received_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;

    fn p(id: &str, priority: Priority) -> NormalizedPoint {
        NormalizedPoint::new(id, 1.0, Utc::now()).with_priority(priority)
    }

    fn ids(batch: &[NormalizedPoint]) -> Vec<&str> {
        batch.iter().map(|p| p.signal_id.as_str()).collect()
    }

    #[test]
    fn test_drain_order_by_tier_then_fifo() {
        let buf = PriorityBuffer::new(100);
        buf.enqueue(p("l1", Priority::Low));
        buf.enqueue(p("h1", Priority::High));
        buf.enqueue(p("m1", Priority::Medium));
        buf.enqueue(p("l2", Priority::Low));
        buf.enqueue(p("h2", Priority::High));
        buf.enqueue(p("m2", Priority::Medium));

        let batch = buf.drain_batch(4);
        assert_eq!(ids(&batch), vec!["h1", "h2", "m1", "m2"]);
        let rest = buf.drain_batch(10);
        assert_eq!(ids(&rest), vec!["l1", "l2"]);
        assert!(buf.drain_batch(10).is_empty());
    }

    #[test]
    fn test_snapshot_sums_to_size() {
        let buf = PriorityBuffer::new(100);
        for i in 0..7 {
            let prio = Priority::ALL[i % 3];
            buf.enqueue(p(&format!("s{}", i), prio));
        }
        let snap = buf.size_by_priority();
        assert_eq!(snap.high + snap.medium + snap.low, buf.size());
        assert_eq!(snap.total, 7);
        assert_eq!(snap.get(Priority::High), 3);
    }

    #[test]
    fn test_eviction_prefers_oldest_low() {
        let buf = PriorityBuffer::new(3);
        buf.enqueue(p("h1", Priority::High));
        buf.enqueue(p("l1", Priority::Low));
        buf.enqueue(p("l2", Priority::Low));

        let out = buf.enqueue(p("m1", Priority::Medium));
        assert_eq!(ids(&out.evicted), vec!["l1"]);
        assert_eq!(out.size, 3);

        let out = buf.enqueue(p("h2", Priority::High));
        assert_eq!(ids(&out.evicted), vec!["l2"]);

        // no LOW left: oldest MEDIUM goes next
        let out = buf.enqueue(p("l3", Priority::Low));
        assert_eq!(ids(&out.evicted), vec!["m1"]);

        assert_eq!(ids(&buf.drain_batch(10)), vec!["h1", "h2", "l3"]);
    }

    #[test]
    fn test_eviction_falls_back_to_high() {
        let buf = PriorityBuffer::new(2);
        buf.enqueue(p("h1", Priority::High));
        buf.enqueue(p("h2", Priority::High));
        let out = buf.enqueue(p("h3", Priority::High));
        assert_eq!(ids(&out.evicted), vec!["h1"]);
        assert_eq!(ids(&buf.drain_batch(10)), vec!["h2", "h3"]);
    }

    #[test]
    fn test_requeue_front_preserves_order() {
        let buf = PriorityBuffer::new(100);
        for (id, prio) in [
            ("h1", Priority::High),
            ("m1", Priority::Medium),
            ("l1", Priority::Low),
            ("h2", Priority::High),
            ("l2", Priority::Low),
        ] {
            buf.enqueue(p(id, prio));
        }

        let batch = buf.drain_batch(5);
        let expected = ids(&batch).into_iter().map(String::from).collect::<Vec<_>>();
        assert!(buf.requeue_front(batch).is_empty());

        let again = buf.drain_batch(5);
        assert_eq!(ids(&again), expected);
    }

    #[test]
    fn test_requeue_goes_ahead_of_new_arrivals() {
        let buf = PriorityBuffer::new(100);
        buf.enqueue(p("l1", Priority::Low));
        buf.enqueue(p("l2", Priority::Low));
        let batch = buf.drain_batch(2);
        buf.enqueue(p("l3", Priority::Low));
        buf.requeue_front(batch);
        assert_eq!(ids(&buf.drain_batch(10)), vec!["l1", "l2", "l3"]);
    }

    #[test]
    fn test_drain_tiers_only_touches_requested() {
        let buf = PriorityBuffer::new(100);
        buf.enqueue(p("h1", Priority::High));
        buf.enqueue(p("l1", Priority::Low));
        let batch = buf.drain_tiers(10, &[Priority::High]);
        assert_eq!(ids(&batch), vec!["h1"]);
        assert_eq!(buf.size(), 1);
    }

    #[test]
    fn test_concurrent_producers_respect_cap() {
        let buf = Arc::new(PriorityBuffer::new(50));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let buf = Arc::clone(&buf);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let prio = Priority::ALL[(t + i) % 3];
                        buf.enqueue(p(&format!("t{}-{}", t, i), prio));
                        assert!(buf.size() <= 50);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let snap = buf.size_by_priority();
        assert_eq!(snap.total, 50);
        assert_eq!(snap.high + snap.medium + snap.low, snap.total);
    }
}
