//! Subscriber registry and analytics events
//!
//! Synchronous observer fan-out. Callbacks run in registration order, each
//! inside its own fault boundary: a callback that returns an error or panics
//! is logged and counted, and delivery continues with the next one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::warn;

use crate::anomaly::Anomaly;

/// Token returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(u64);

type Callback<E> = Arc<dyn Fn(&E) -> anyhow::Result<()> + Send + Sync>;

/// Outcome of one publish call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Ordered callback registry
pub struct SubscriberRegistry<E> {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(SubscriptionId, Callback<E>)>>,
}

impl<E> SubscriberRegistry<E> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Register a callback; delivery order follows registration order
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, Arc::new(callback)));
        id
    }

    /// Remove a callback, returning whether it was registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.lock();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    /// Deliver an event to every subscriber
    pub fn publish(&self, event: &E) -> PublishReport {
        // Snapshot so callbacks may (un)subscribe without deadlocking
        let callbacks: Vec<(SubscriptionId, Callback<E>)> = self.lock().clone();
        let mut report = PublishReport::default();

        for (id, callback) in callbacks {
            match panic::catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    warn!(subscriber = ?id, error = %e, "subscriber callback failed");
                    report.failed += 1;
                }
                Err(_) => {
                    warn!(subscriber = ?id, "subscriber callback panicked");
                    report.failed += 1;
                }
            }
        }

        report
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(SubscriptionId, Callback<E>)>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<E> Default for SubscriberRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary pushed when a full analysis cycle completes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisCompleted {
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub sessions_analyzed: usize,
    pub insights: usize,
    pub recommendations: usize,
    pub anomalies: usize,
}

/// Push notifications exposed by the analytics service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AnalyticsEvent {
    AnomalyDetected(Anomaly),
    AnalysisCompleted(AnalysisCompleted),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_delivery_in_registration_order() {
        let registry: SubscriberRegistry<u32> = SubscriberRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            registry.subscribe(move |value: &u32| {
                seen.lock().unwrap().push(format!("{}:{}", tag, value));
                Ok(())
            });
        }

        let report = registry.publish(&7);
        assert_eq!(report.delivered, 3);
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["first:7", "second:7", "third:7"]
        );
    }

    #[test]
    fn test_failing_subscribers_are_isolated() {
        let registry: SubscriberRegistry<u32> = SubscriberRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));

        registry.subscribe(|_| Err(anyhow::anyhow!("refused")));
        registry.subscribe(|_| panic!("subscriber blew up"));
        let counter = Arc::clone(&count);
        registry.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let report = registry.publish(&1);
        assert_eq!(report.failed, 2);
        assert_eq!(report.delivered, 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let registry: SubscriberRegistry<u32> = SubscriberRegistry::new();
        let id = registry.subscribe(|_| Ok(()));
        assert_eq!(registry.len(), 1);
        assert!(registry.unsubscribe(id));
        assert!(!registry.unsubscribe(id));
        assert!(registry.is_empty());
        assert_eq!(registry.publish(&1), PublishReport::default());
    }
}
