//! Event sources feeding raw observations into the bridge

use crate::models::RawObservation;
use dashmap::DashMap;
use std::sync::{Arc, RwLock};
use tracing::trace;

/// Callback invoked for each observation of a subscribed signal
pub type ObservationHandler = Arc<dyn Fn(RawObservation) + Send + Sync>;

/// Pushes observations for a set of signals to a handler
pub trait EventSource: Send + Sync {
    /// Subscribe `handler` to `signal_ids`. An empty list subscribes to all
    /// signals. Returns the number of signals newly subscribed.
    fn subscribe(&self, signal_ids: &[String], handler: ObservationHandler) -> usize;

    fn unsubscribe(&self, signal_ids: &[String]);
}

/// In-process source: observations are pushed with [`publish`](Self::publish)
#[derive(Default)]
pub struct ChannelSource {
    handlers: DashMap<String, ObservationHandler>,
    wildcard: RwLock<Option<ObservationHandler>>,
}

impl ChannelSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an observation. Returns false when nobody subscribed to it.
    pub fn publish(&self, obs: RawObservation) -> bool {
        let handler = self
            .handlers
            .get(&obs.signal_id)
            .map(|h| Arc::clone(h.value()))
            .or_else(|| self.wildcard_handler());

        match handler {
            Some(handler) => {
                // Guard is released; handlers may take their own locks
                handler(obs);
                true
            }
            None => {
                trace!(signal_id = %obs.signal_id, "No subscriber for observation");
                false
            }
        }
    }

    pub fn is_subscribed(&self, signal_id: &str) -> bool {
        self.handlers.contains_key(signal_id) || self.wildcard_handler().is_some()
    }

    fn wildcard_handler(&self) -> Option<ObservationHandler> {
        self.wildcard
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(Arc::clone)
    }

    fn set_wildcard(&self, handler: Option<ObservationHandler>) {
        *self.wildcard.write().unwrap_or_else(|e| e.into_inner()) = handler;
    }
}

impl EventSource for ChannelSource {
    fn subscribe(&self, signal_ids: &[String], handler: ObservationHandler) -> usize {
        if signal_ids.is_empty() {
            self.set_wildcard(Some(handler));
            return 0;
        }
        signal_ids
            .iter()
            .filter(|id| {
                self.handlers
                    .insert((*id).clone(), Arc::clone(&handler))
                    .is_none()
            })
            .count()
    }

    fn unsubscribe(&self, signal_ids: &[String]) {
        if signal_ids.is_empty() {
            self.set_wildcard(None);
        }
        for id in signal_ids {
            self.handlers.remove(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting() -> (ObservationHandler, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let handler: ObservationHandler = Arc::new(move |_obs| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        (handler, count)
    }

    #[test]
    fn test_publish_only_reaches_subscribed_signals() {
        let source = ChannelSource::new();
        let (handler, count) = counting();
        let ids = vec!["sensor.a".to_string(), "sensor.b".to_string()];
        assert_eq!(source.subscribe(&ids, handler), 2);

        assert!(source.publish(RawObservation::new("sensor.a", 1.0)));
        assert!(!source.publish(RawObservation::new("sensor.c", 1.0)));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        source.unsubscribe(&ids[..1]);
        assert!(!source.publish(RawObservation::new("sensor.a", 1.0)));
        assert!(source.is_subscribed("sensor.b"));
    }

    #[test]
    fn test_wildcard_subscription() {
        let source = ChannelSource::new();
        let (handler, count) = counting();
        source.subscribe(&[], handler);
        assert!(source.publish(RawObservation::new("sensor.any", "on")));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        source.unsubscribe(&[]);
        assert!(!source.publish(RawObservation::new("sensor.any", "on")));
    }
}
