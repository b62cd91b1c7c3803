//! Controller configuration.
//!
//! Values come from the embedding application; nothing here reads the
//! environment or merges layered sources.

use outstream_core::decision::{DecisionRequest, Locator, Targeting};
use outstream_core::engine::SlotDimensions;
use outstream_runtime::{RetryPolicy, StoreConfig};
use std::time::Duration;

/// Configuration for one [`AdController`](crate::AdController).
#[derive(Debug, Clone)]
pub struct AdConfig {
    /// Host domain, used as an analytics label.
    ///
    /// Default: empty
    pub domain: String,

    /// Ad unit code passed to the decision collaborator.
    pub tag: String,

    /// Targeting parameters passed to the decision collaborator.
    pub targeting: Targeting,

    /// Locale handed to the rendering engine.
    ///
    /// Default: `"en"`
    pub locale: String,

    /// Watchdog armed by `start()`, bounding loader readiness.
    ///
    /// Default: 12 seconds
    pub initial_timeout: Duration,

    /// Watchdog armed when a request begins, bounding the time until the
    /// engine reports ready.
    ///
    /// Default: 12 seconds
    pub manager_ready_timeout: Duration,

    /// Watchdog armed on `LOADED`, bounding the time until playback starts.
    ///
    /// Default: 8 seconds
    pub loaded_timeout: Duration,

    /// In-page slot width in pixels (height is derived at 16:9).
    ///
    /// Default: 640
    pub container_width: u32,

    /// Floating player width in pixels.
    ///
    /// Default: 300
    pub float_width: u32,

    /// Hide transition of the presentation container.
    ///
    /// Default: 500 milliseconds
    pub transition: Duration,

    /// Minimum spacing between `show_advertisement` calls.
    ///
    /// Default: 60 seconds
    pub ad_request_interval: Duration,

    /// Locator served instead of calling the decision collaborator.
    pub debug_locator: Option<Locator>,

    /// Backoff applied to pre-fetches after consecutive request failures.
    ///
    /// Default: `None` (re-request immediately after every cancel)
    pub prefetch_backoff: Option<RetryPolicy>,

    /// Store tuning.
    pub store: StoreConfig,
}

impl AdConfig {
    /// Create a configuration for the ad unit `tag` with default timings.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    /// Set the analytics domain label.
    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    /// Add a targeting parameter.
    #[must_use]
    pub fn with_targeting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.targeting.insert(key.into(), value.into());
        self
    }

    /// Set the engine locale.
    #[must_use]
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    /// Set the `initial` watchdog duration.
    #[must_use]
    pub const fn with_initial_timeout(mut self, timeout: Duration) -> Self {
        self.initial_timeout = timeout;
        self
    }

    /// Set the `manager-ready` watchdog duration.
    #[must_use]
    pub const fn with_manager_ready_timeout(mut self, timeout: Duration) -> Self {
        self.manager_ready_timeout = timeout;
        self
    }

    /// Set the `loaded` watchdog duration.
    #[must_use]
    pub const fn with_loaded_timeout(mut self, timeout: Duration) -> Self {
        self.loaded_timeout = timeout;
        self
    }

    /// Set the in-page slot width.
    #[must_use]
    pub const fn with_container_width(mut self, width: u32) -> Self {
        self.container_width = width;
        self
    }

    /// Set the floating player width.
    #[must_use]
    pub const fn with_float_width(mut self, width: u32) -> Self {
        self.float_width = width;
        self
    }

    /// Set the hide transition.
    #[must_use]
    pub const fn with_transition(mut self, transition: Duration) -> Self {
        self.transition = transition;
        self
    }

    /// Set the minimum spacing between `show_advertisement` calls.
    #[must_use]
    pub const fn with_ad_request_interval(mut self, interval: Duration) -> Self {
        self.ad_request_interval = interval;
        self
    }

    /// Serve `locator` instead of calling the decision collaborator.
    #[must_use]
    pub fn with_debug_locator(mut self, locator: impl Into<Locator>) -> Self {
        self.debug_locator = Some(locator.into());
        self
    }

    /// Back off pre-fetches after consecutive failures.
    #[must_use]
    pub fn with_prefetch_backoff(mut self, policy: RetryPolicy) -> Self {
        self.prefetch_backoff = Some(policy);
        self
    }

    /// Set the store configuration.
    #[must_use]
    pub const fn with_store_config(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    /// The request handed to the decision collaborator.
    #[must_use]
    pub fn decision_request(&self) -> DecisionRequest {
        DecisionRequest {
            tag: self.tag.clone(),
            targeting: self.targeting.clone(),
        }
    }

    /// In-page slot size.
    #[must_use]
    pub const fn container_dimensions(&self) -> SlotDimensions {
        SlotDimensions::from_width(self.container_width)
    }

    /// Floating player size.
    #[must_use]
    pub const fn float_dimensions(&self) -> SlotDimensions {
        SlotDimensions::from_width(self.float_width)
    }
}

impl Default for AdConfig {
    fn default() -> Self {
        Self {
            domain: String::new(),
            tag: String::new(),
            targeting: Targeting::new(),
            locale: "en".to_string(),
            initial_timeout: Duration::from_secs(12),
            manager_ready_timeout: Duration::from_secs(12),
            loaded_timeout: Duration::from_secs(8),
            container_width: 640,
            float_width: 300,
            transition: Duration::from_millis(500),
            ad_request_interval: Duration::from_secs(60),
            debug_locator: None,
            prefetch_backoff: None,
            store: StoreConfig::default(),
        }
    }
}
