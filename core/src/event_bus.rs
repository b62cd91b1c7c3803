//! In-process publish/subscribe bus for lifecycle events.
//!
//! The [`EventBus`] fans every [`LifecycleEvent`] out to the observers
//! subscribed to its topic. Delivery is synchronous: `broadcast` returns only
//! after every observer registered at call time has run, in subscription order.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   PublishEvent   ┌──────────────┐
//! │   Reducer    │ ───────────────► │   EventBus   │
//! └──────────────┘   (via Store)    └──────┬───────┘
//!                                          │ snapshot, then invoke
//!                                   ┌──────┴───────┐
//!                                   ▼              ▼
//!                              ┌─────────┐    ┌─────────┐
//!                              │Observer │    │Observer │
//!                              └─────────┘    └─────────┘
//! ```
//!
//! # Key Principles
//!
//! - **Snapshot delivery**: the observer list is copied and the lock released
//!   before any observer runs, so observers may subscribe or unsubscribe
//!   (even on the topic being broadcast) without deadlocking. Observers added
//!   during a broadcast are not invoked for that event.
//! - **Isolation**: an observer that returns an error or panics is logged and
//!   counted; delivery continues with the next observer and nothing reaches
//!   the broadcaster.
//!
//! # Example
//!
//! ```
//! use outstream_core::event::{LifecycleEvent, LifecycleTopic};
//! use outstream_core::event_bus::EventBus;
//!
//! let bus = EventBus::new();
//! let id = bus.subscribe(LifecycleTopic::AdCanceled, |event| {
//!     println!("{}", event.topic());
//!     Ok(())
//! });
//!
//! let report = bus.broadcast(&LifecycleEvent::warning(LifecycleTopic::AdCanceled, "canceled"));
//! assert_eq!(report.delivered, 1);
//! assert!(bus.unsubscribe(id));
//! ```

use crate::event::{LifecycleEvent, LifecycleTopic};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Failure reported by an observer.
///
/// Observer failures never propagate past the bus; they exist so observers
/// can use `?` and still have the failure logged with context.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Observer failed: {0}")]
pub struct ObserverError(pub String);

impl ObserverError {
    /// Create an observer error from any displayable reason.
    #[must_use]
    pub fn new(reason: impl fmt::Display) -> Self {
        Self(reason.to_string())
    }
}

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// An observer callback.
pub type Observer = Arc<dyn Fn(&LifecycleEvent) -> Result<(), ObserverError> + Send + Sync>;

/// Outcome of a single broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Observers that returned `Ok`
    pub delivered: usize,
    /// Observers that returned an error or panicked
    pub failed: usize,
}

struct Registration {
    id: SubscriptionId,
    observer: Observer,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    topics: HashMap<LifecycleTopic, Vec<Registration>>,
}

impl Registry {
    fn allocate(&mut self) -> SubscriptionId {
        self.next_id += 1;
        SubscriptionId(self.next_id)
    }
}

/// Topic-keyed observer registry with synchronous, isolated delivery.
#[derive(Default)]
pub struct EventBus {
    registry: Mutex<Registry>,
}

impl EventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // Observers run outside the lock, so a poisoned registry still holds a
    // consistent map.
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe `observer` to `topic`.
    ///
    /// Observers on the same topic are invoked in subscription order.
    pub fn subscribe<F>(&self, topic: LifecycleTopic, observer: F) -> SubscriptionId
    where
        F: Fn(&LifecycleEvent) -> Result<(), ObserverError> + Send + Sync + 'static,
    {
        let mut registry = self.registry();
        let id = registry.allocate();
        registry.topics.entry(topic).or_default().push(Registration {
            id,
            observer: Arc::new(observer),
        });
        tracing::trace!(topic = %topic, subscription = %id, "Observer subscribed");
        id
    }

    /// Subscribe `observer` to every topic under a single subscription id.
    pub fn subscribe_all<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&LifecycleEvent) -> Result<(), ObserverError> + Send + Sync + 'static,
    {
        let observer: Observer = Arc::new(observer);
        let mut registry = self.registry();
        let id = registry.allocate();
        for topic in LifecycleTopic::ALL {
            registry.topics.entry(topic).or_default().push(Registration {
                id,
                observer: Arc::clone(&observer),
            });
        }
        tracing::trace!(subscription = %id, "Observer subscribed to all topics");
        id
    }

    /// Remove a subscription from every topic it is registered under.
    ///
    /// Returns `false` if the id was not (or no longer) subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.registry();
        let mut removed = false;
        for registrations in registry.topics.values_mut() {
            let before = registrations.len();
            registrations.retain(|registration| registration.id != id);
            removed |= registrations.len() != before;
        }
        registry.topics.retain(|_, registrations| !registrations.is_empty());
        tracing::trace!(subscription = %id, removed, "Observer unsubscribed");
        removed
    }

    /// Number of observers currently subscribed to `topic`.
    #[must_use]
    pub fn subscriber_count(&self, topic: LifecycleTopic) -> usize {
        self.registry().topics.get(&topic).map_or(0, Vec::len)
    }

    /// Deliver `event` to every observer subscribed to its topic.
    ///
    /// Broadcasting to a topic without observers is a no-op.
    pub fn broadcast(&self, event: &LifecycleEvent) -> BroadcastReport {
        let topic = event.topic();
        let observers: Vec<(SubscriptionId, Observer)> = {
            let registry = self.registry();
            registry
                .topics
                .get(&topic)
                .map(|registrations| {
                    registrations
                        .iter()
                        .map(|r| (r.id, Arc::clone(&r.observer)))
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut report = BroadcastReport::default();
        for (id, observer) in observers {
            match catch_unwind(AssertUnwindSafe(|| observer(event))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(error)) => {
                    report.failed += 1;
                    metrics::counter!("event_bus_observer_failures_total", "kind" => "error")
                        .increment(1);
                    tracing::warn!(
                        topic = %topic,
                        subscription = %id,
                        error = %error,
                        "Observer returned an error"
                    );
                },
                Err(payload) => {
                    report.failed += 1;
                    metrics::counter!("event_bus_observer_failures_total", "kind" => "panic")
                        .increment(1);
                    tracing::error!(
                        topic = %topic,
                        subscription = %id,
                        panic = panic_message(payload.as_ref()),
                        "Observer panicked"
                    );
                },
            }
        }

        tracing::trace!(
            topic = %topic,
            delivered = report.delivered,
            failed = report.failed,
            "Broadcast complete"
        );
        report
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry();
        let subscriptions: usize = registry.topics.values().map(Vec::len).sum();
        f.debug_struct("EventBus")
            .field("topics", &registry.topics.len())
            .field("subscriptions", &subscriptions)
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}
