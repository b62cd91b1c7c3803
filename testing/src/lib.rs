//! # Outstream Testing
//!
//! Testing utilities and helpers for the outstream ad controller.
//!
//! This crate provides:
//! - Mock implementations of Environment traits and collaborators
//! - An event recorder for asserting on published lifecycle events
//! - Test helpers for asynchronous assertions
//! - Property-based testing strategies
//! - Assertion helpers for reducers
//!
//! ## Example
//!
//! ```ignore
//! use outstream_testing::{EventRecorder, MockEngine, ScriptedDecision, test_clock};
//!
//! #[tokio::test]
//! async fn test_ad_plays() {
//!     let decision = Arc::new(ScriptedDecision::always(Locator::new("vast-1")));
//!     let engine = Arc::new(MockEngine::new());
//!     let controller = AdController::new(config, test_clock(), decision, engine, presentation);
//!     let recorder = EventRecorder::attach(controller.bus());
//!
//!     controller.start().await?;
//!     assert!(eventually(Duration::from_secs(1), || recorder.count(LifecycleTopic::AdSdkLoaderReady) == 1).await);
//! }
//! ```

use chrono::{DateTime, Utc};
use outstream_core::environment::Clock;

mod collaborator_mocks;
mod reducer_test;

pub use collaborator_mocks::{
    DecisionReply, MockEngine, PrepareBehavior, PresentationCall, RecordingPresentation,
    ScriptedDecision,
};
pub use reducer_test::{ReducerTest, assertions};

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use outstream_testing::mocks::FixedClock;
    /// use outstream_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone, Copy)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Event recording for assertions on published lifecycle events
pub mod recorder {
    use outstream_core::event::{LifecycleEvent, LifecycleTopic};
    use outstream_core::event_bus::{EventBus, SubscriptionId};
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

    /// Records every event broadcast on a bus.
    ///
    /// # Example
    ///
    /// ```
    /// use outstream_core::event::{LifecycleEvent, LifecycleTopic};
    /// use outstream_core::event_bus::EventBus;
    /// use outstream_testing::EventRecorder;
    ///
    /// let bus = EventBus::new();
    /// let recorder = EventRecorder::attach(&bus);
    ///
    /// bus.broadcast(&LifecycleEvent::success(LifecycleTopic::Started, "started"));
    /// assert_eq!(recorder.topics(), vec![LifecycleTopic::Started]);
    /// ```
    #[derive(Debug, Clone)]
    pub struct EventRecorder {
        events: Arc<Mutex<Vec<LifecycleEvent>>>,
        subscription: SubscriptionId,
    }

    impl EventRecorder {
        /// Subscribe a new recorder to every topic on `bus`.
        #[must_use]
        pub fn attach(bus: &EventBus) -> Self {
            let events = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&events);
            let subscription = bus.subscribe_all(move |event: &LifecycleEvent| {
                sink.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(event.clone());
                Ok(())
            });
            Self {
                events,
                subscription,
            }
        }

        fn lock(&self) -> MutexGuard<'_, Vec<LifecycleEvent>> {
            self.events.lock().unwrap_or_else(PoisonError::into_inner)
        }

        /// Stop recording.
        pub fn detach(&self, bus: &EventBus) -> bool {
            bus.unsubscribe(self.subscription)
        }

        /// All recorded events, oldest first.
        #[must_use]
        pub fn events(&self) -> Vec<LifecycleEvent> {
            self.lock().clone()
        }

        /// Topics of all recorded events, oldest first.
        #[must_use]
        pub fn topics(&self) -> Vec<LifecycleTopic> {
            self.lock().iter().map(LifecycleEvent::topic).collect()
        }

        /// Topics filtered to the controller's own topics (`AD_*`).
        #[must_use]
        pub fn controller_topics(&self) -> Vec<LifecycleTopic> {
            self.lock()
                .iter()
                .map(LifecycleEvent::topic)
                .filter(|topic| topic.is_controller_topic())
                .collect()
        }

        /// Number of recorded events on `topic`.
        #[must_use]
        pub fn count(&self, topic: LifecycleTopic) -> usize {
            self.lock().iter().filter(|e| e.topic() == topic).count()
        }

        /// The most recent event on `topic`.
        #[must_use]
        pub fn last(&self, topic: LifecycleTopic) -> Option<LifecycleEvent> {
            self.lock().iter().rev().find(|e| e.topic() == topic).cloned()
        }

        /// Forget everything recorded so far.
        pub fn clear(&self) {
            self.lock().clear();
        }
    }
}

/// Test helpers and utilities
pub mod helpers {
    use std::time::Duration;

    /// Poll `check` until it returns `true` or `timeout` elapses.
    ///
    /// Returns whether the condition was met.
    pub async fn eventually<F>(timeout: Duration, mut check: F) -> bool
    where
        F: FnMut() -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if check() {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Install a `tracing` subscriber that writes through the test harness.
    ///
    /// Honors `RUST_LOG`; safe to call from every test.
    pub fn init_test_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    }
}

/// Property-based testing strategies
pub mod properties {
    use outstream_core::engine::{EngineSignal, RenderError};
    use outstream_core::event::LifecycleTopic;
    use proptest::prelude::*;
    use proptest::sample::select;

    /// Any lifecycle topic.
    pub fn arb_topic() -> impl Strategy<Value = LifecycleTopic> {
        select(LifecycleTopic::ALL.to_vec())
    }

    /// Any engine signal, errors included.
    pub fn arb_engine_signal() -> impl Strategy<Value = EngineSignal> {
        prop_oneof![
            8 => select(vec![
                EngineSignal::Ready,
                EngineSignal::AdBreakReady,
                EngineSignal::Metadata,
                EngineSignal::ContentPauseRequested,
                EngineSignal::ContentResumeRequested,
                EngineSignal::Started,
                EngineSignal::Paused,
                EngineSignal::Resumed,
                EngineSignal::Impression,
                EngineSignal::Click,
                EngineSignal::Interaction,
                EngineSignal::DurationChange,
                EngineSignal::LinearChanged,
                EngineSignal::SkippableStateChanged,
                EngineSignal::Skipped,
                EngineSignal::FirstQuartile,
                EngineSignal::Midpoint,
                EngineSignal::ThirdQuartile,
                EngineSignal::Complete,
                EngineSignal::AllAdsCompleted,
                EngineSignal::UserClose,
                EngineSignal::VolumeChanged,
                EngineSignal::VolumeMuted,
            ]),
            1 => "[a-z/0-9]{1,12}".prop_map(|content_type| EngineSignal::Loaded { content_type }),
            1 => (100u32..1200, "[a-z ]{0,16}")
                .prop_map(|(code, message)| EngineSignal::Error(RenderError::new(code, message))),
        ]
    }
}

// Re-export commonly used items
pub use helpers::{eventually, init_test_tracing};
pub use mocks::{FixedClock, test_clock};
pub use recorder::EventRecorder;
