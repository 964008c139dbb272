use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Most arrivals kept for rate estimation
const MAX_SAMPLES: usize = 100;

/// Arrivals closer together than this are measured over this span
const MIN_SPAN: Duration = Duration::from_secs(1);

/// Rates above this use the minimum interval
const FAST_RATE: f64 = 1.0;
/// Rates below this use the maximum interval
const SLOW_RATE: f64 = 0.1;

/// Arrival-rate estimate over a trailing window of recent enqueues
#[derive(Debug)]
pub struct RateTracker {
    arrivals: VecDeque<Instant>,
    window: Duration,
}

impl RateTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            arrivals: VecDeque::with_capacity(MAX_SAMPLES),
            window,
        }
    }

    pub fn record(&mut self, at: Instant) {
        if self.arrivals.len() == MAX_SAMPLES {
            self.arrivals.pop_front();
        }
        self.arrivals.push_back(at);
    }

    /// Points per second. With fewer than two arrivals left in the window
    /// the rate is their count over the whole window, so a quiet source
    /// decays to zero.
    pub fn rate(&mut self, now: Instant) -> f64 {
        while let Some(front) = self.arrivals.front() {
            if now.saturating_duration_since(*front) > self.window {
                self.arrivals.pop_front();
            } else {
                break;
            }
        }
        let (first, last) = match (self.arrivals.front(), self.arrivals.back()) {
            (Some(first), Some(last)) if self.arrivals.len() >= 2 => (*first, *last),
            _ => return self.arrivals.len() as f64 / self.window.as_secs_f64(),
        };
        let span = last
            .saturating_duration_since(first)
            .max(MIN_SPAN)
            .as_secs_f64();
        self.arrivals.len() as f64 / span
    }
}

/// Interval for an arrival rate: `min` above 1/s, `max` below 0.1/s,
/// linear in between.
pub fn adaptive_interval(rate: f64, min: Duration, max: Duration) -> Duration {
    if rate > FAST_RATE {
        return min;
    }
    if rate < SLOW_RATE {
        return max;
    }
    let factor = (rate - SLOW_RATE) / (FAST_RATE - SLOW_RATE);
    let range = max.as_secs_f64() - min.as_secs_f64();
    Duration::from_secs_f64((max.as_secs_f64() - factor * range).max(min.as_secs_f64()))
}
