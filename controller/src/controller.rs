//! The [`AdController`] facade.
//!
//! Owns the store running the lifecycle reducer and the task that forwards
//! engine signals into it. Every method is a thin wrapper over
//! `Store::send` or `Store::state`.

use outstream_core::decision::Locator;
use outstream_core::engine::SessionSignal;
use outstream_core::environment::Clock;
use outstream_core::event::{LifecycleEvent, LifecycleTopic};
use outstream_core::event_bus::{EventBus, ObserverError, SubscriptionId};
use outstream_runtime::{HealthCheck, HealthReport, Store, StoreError};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::AdConfig;
use crate::error::ControllerError;
use crate::lifecycle::{
    AdAction, AdEnvironment, AdReducer, AdSnapshot, AdState, Collaborators, LifecyclePhase,
};
use crate::pipeline::AdRequestHandle;

/// Consecutive request failures after which [`AdController::health`] reports degraded.
pub const DEGRADED_AFTER_FAILURES: u32 = 3;

/// Store type driving the lifecycle.
pub type AdStore<C> = Store<AdState, AdAction, AdEnvironment<C>, AdReducer<C>>;

/// Controller for a single outstream ad slot.
///
/// Must be created inside a tokio runtime.
///
/// # Example
///
/// ```ignore
/// let controller = AdController::new(
///     AdConfig::new("outstream-640").with_domain("example.com"),
///     SystemClock,
///     Collaborators::new(decision, engine, presentation),
/// );
///
/// controller.subscribe(LifecycleTopic::AdCanceled, |event| {
///     tracing::info!(?event, "ad canceled");
///     Ok(())
/// });
///
/// controller.start().await?;
/// controller.show_advertisement().await?;
/// ```
pub struct AdController<C: Clock + Clone + 'static> {
    store: AdStore<C>,
    bus: Arc<EventBus>,
    config: Arc<AdConfig>,
    pump: JoinHandle<()>,
    last_show: Mutex<Option<Instant>>,
}

impl<C: Clock + Clone + 'static> AdController<C> {
    /// Build the controller and start forwarding engine signals.
    #[must_use]
    pub fn new(config: AdConfig, clock: C, collaborators: Collaborators) -> Self {
        let config = Arc::new(config);
        let bus = Arc::new(EventBus::new());
        let (signals, mut rx) = mpsc::unbounded_channel::<SessionSignal>();

        let environment = AdEnvironment::new(
            clock,
            Arc::clone(&config),
            Arc::clone(&bus),
            collaborators,
            signals,
        );
        let state = AdState::new().with_debug_locator(config.debug_locator.clone());
        let store = Store::with_config(state, AdReducer::new(), environment, config.store.clone());

        let pump_store = store.clone();
        let pump = tokio::spawn(async move {
            while let Some(SessionSignal { session, signal }) = rx.recv().await {
                if let Err(error) = pump_store.send(AdAction::Engine { session, signal }).await {
                    tracing::debug!(%error, "Signal pump stopping");
                    break;
                }
            }
        });

        tracing::info!(tag = %config.tag, domain = %config.domain, "Ad controller created");

        Self {
            store,
            bus,
            config,
            pump,
            last_show: Mutex::new(None),
        }
    }

    async fn send(&self, action: AdAction) -> Result<(), ControllerError> {
        self.store.send(action).await?;
        Ok(())
    }

    /// Arm the `initial` watchdog and prepare the rendering engine.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Store`] after shutdown.
    pub async fn start(&self) -> Result<(), ControllerError> {
        self.send(AdAction::Start).await
    }

    /// Request an ad. Ignored with a warning unless the controller is idle.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Store`] after shutdown.
    pub async fn request_ad(&self) -> Result<(), ControllerError> {
        self.send(AdAction::RequestAd).await
    }

    /// Tear down whatever is in progress and return to idle.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Store`] after shutdown.
    pub async fn cancel(&self) -> Result<(), ControllerError> {
        self.send(AdAction::Cancel).await
    }

    /// Float the container.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Store`] after shutdown.
    pub async fn float_start(&self) -> Result<(), ControllerError> {
        self.send(AdAction::FloatStart).await
    }

    /// Return the container in-page.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Store`] after shutdown.
    pub async fn float_reset(&self) -> Result<(), ControllerError> {
        self.send(AdAction::FloatReset).await
    }

    /// Serve `locator` instead of calling the decision collaborator (`None` clears it).
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Store`] after shutdown.
    pub async fn set_debug_locator(&self, locator: Option<Locator>) -> Result<(), ControllerError> {
        self.send(AdAction::SetDebugLocator(locator)).await
    }

    /// Wait for the pre-fetched locator, then request an ad.
    ///
    /// Calls closer together than `ad_request_interval` are refused; a call
    /// that ends in a failed pre-fetch does not count. The wait is bounded by `manager_ready_timeout`; past it the request goes
    /// ahead and adopts whatever is in flight.
    ///
    /// # Errors
    ///
    /// - [`ControllerError::TooSoon`] inside the rate limit
    /// - [`ControllerError::Request`] if the pre-fetch failed or was canceled
    /// - [`ControllerError::Store`] after shutdown
    pub async fn show_advertisement(&self) -> Result<(), ControllerError> {
        self.check_show_interval(false)?;

        let mut handle = self.current_request().await;
        match tokio::time::timeout(self.config.manager_ready_timeout, handle.wait()).await {
            Ok(Ok(locator)) => {
                tracing::debug!(cycle = handle.cycle(), locator = %locator, "Pre-fetch ready");
            },
            Ok(Err(error)) => return Err(error.into()),
            Err(_) => {
                tracing::debug!(cycle = handle.cycle(), "Pre-fetch still pending, requesting anyway");
            },
        }

        // Only a show that reaches `request_ad` uses up the interval
        self.check_show_interval(true)?;
        self.request_ad().await
    }

    fn check_show_interval(&self, record: bool) -> Result<(), ControllerError> {
        let mut last = self.last_show.lock().unwrap_or_else(PoisonError::into_inner);
        let interval = self.config.ad_request_interval;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < interval {
                return Err(ControllerError::TooSoon {
                    remaining: interval - elapsed,
                });
            }
        }
        if record {
            *last = Some(Instant::now());
        }
        Ok(())
    }

    /// The bus lifecycle events are published on.
    #[must_use]
    pub const fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Subscribe `observer` to `topic`.
    pub fn subscribe<F>(&self, topic: LifecycleTopic, observer: F) -> SubscriptionId
    where
        F: Fn(&LifecycleEvent) -> Result<(), ObserverError> + Send + Sync + 'static,
    {
        self.bus.subscribe(topic, observer)
    }

    /// A handle on the current request cell.
    pub async fn current_request(&self) -> AdRequestHandle {
        self.store.state(|s| s.pipeline.handle()).await
    }

    /// Current phase.
    pub async fn phase(&self) -> LifecyclePhase {
        self.store.state(|s| s.phase).await
    }

    /// Diagnostic snapshot of the lifecycle state.
    pub async fn snapshot(&self) -> AdSnapshot {
        self.store.state(AdState::snapshot).await
    }

    /// Store health plus request-failure health.
    pub async fn health(&self) -> HealthReport {
        let failures = self.store.state(|s| s.consecutive_failures).await;
        let check = if failures >= DEGRADED_AFTER_FAILURES {
            HealthCheck::degraded(
                "ad_requests",
                format!("{failures} consecutive request failures"),
            )
        } else {
            HealthCheck::healthy("ad_requests")
        };
        let requests = check.with_metadata("consecutive_failures", failures.to_string());

        HealthReport::new(vec![self.store.health(), requests])
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &AdStore<C> {
        &self.store
    }

    /// Stop forwarding signals and shut the store down.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownTimeout`] if effects are still running
    /// after `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
        self.pump.abort();
        self.store.shutdown(timeout).await
    }
}

impl<C: Clock + Clone + 'static> Drop for AdController<C> {
    fn drop(&mut self) {
        self.pump.abort();
    }
}
