//! Lifecycle state types.

use outstream_core::decision::Locator;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;

use crate::pipeline::{RequestOrigin, RequestPipeline};
use crate::presentation::PresentationState;
use crate::watchdog::{Watchdog, WatchdogName};

/// Number of phases remembered in [`AdState::history`].
pub const PHASE_HISTORY_LEN: usize = 32;

/// Where the controller is in the ad lifecycle.
///
/// `Idle` is the only phase that accepts a new request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecyclePhase {
    /// Ready for a request
    #[default]
    Idle,
    /// A request is being resolved or handed to the engine
    Requesting,
    /// The engine has the ad
    Loaded,
    /// The ad is playing
    Playing,
    /// The ad finished normally
    Completed,
    /// Tearing down; always followed by `Idle`
    Canceling,
}

impl LifecyclePhase {
    /// Stable name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Requesting => "requesting",
            Self::Loaded => "loaded",
            Self::Playing => "playing",
            Self::Completed => "completed",
            Self::Canceling => "canceling",
        }
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State owned by the lifecycle reducer.
#[derive(Debug, Clone)]
pub struct AdState {
    /// Current phase
    pub phase: LifecyclePhase,
    /// Recent phases, oldest first, current last
    pub history: VecDeque<LifecyclePhase>,
    /// `start()` has been called
    pub started: bool,
    /// The engine's loader reported ready
    pub loader_ready: bool,
    /// Number of the latest engine session
    pub session: u64,
    /// Whether `session` is live (initialized and not torn down)
    pub engine_active: bool,
    /// Armed watchdogs
    pub watchdog: Watchdog,
    /// Single-flight request gate and request cell
    pub pipeline: RequestPipeline,
    /// Container visibility and float state
    pub presentation: PresentationState,
    /// A pre-fetched locator waiting for `request_ad()`
    pub ready_locator: Option<Locator>,
    /// Request failures since the last success
    pub consecutive_failures: u32,
    /// `request_ad()` calls refused as already in flight
    pub rejected_requests: u64,
    /// Completed cancel cycles
    pub cancel_count: u64,
}

impl Default for AdState {
    fn default() -> Self {
        Self {
            phase: LifecyclePhase::Idle,
            history: VecDeque::from([LifecyclePhase::Idle]),
            started: false,
            loader_ready: false,
            session: 0,
            engine_active: false,
            watchdog: Watchdog::new(),
            pipeline: RequestPipeline::new(),
            presentation: PresentationState::default(),
            ready_locator: None,
            consecutive_failures: 0,
            rejected_requests: 0,
            cancel_count: 0,
        }
    }
}

impl AdState {
    /// Create an idle state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a debug override already stored.
    #[must_use]
    pub fn with_debug_locator(mut self, locator: Option<Locator>) -> Self {
        self.pipeline.set_override(locator);
        self
    }

    /// Move to `to`, recording it in the history.
    pub fn transition(&mut self, to: LifecyclePhase) {
        if self.phase == to {
            return;
        }
        tracing::debug!(from = %self.phase, to = %to, "Phase transition");
        self.phase = to;
        if self.history.len() == PHASE_HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(to);
    }

    /// Recent phases as a vector, oldest first.
    #[must_use]
    pub fn phase_history(&self) -> Vec<LifecyclePhase> {
        self.history.iter().copied().collect()
    }

    /// A serializable summary for diagnostics.
    #[must_use]
    pub fn snapshot(&self) -> AdSnapshot {
        AdSnapshot {
            phase: self.phase,
            started: self.started,
            loader_ready: self.loader_ready,
            session: self.session,
            engine_active: self.engine_active,
            armed_watchdogs: self.watchdog.armed(),
            request_running: self.pipeline.is_running(),
            request_origin: self.pipeline.in_flight().map(|f| f.origin),
            request_cycle: self.pipeline.cycle(),
            ready_locator: self.ready_locator.as_ref().map(|l| l.as_str().to_string()),
            debug_override: self.pipeline.override_locator().is_some(),
            presentation: self.presentation,
            consecutive_failures: self.consecutive_failures,
            rejected_requests: self.rejected_requests,
            cancel_count: self.cancel_count,
        }
    }
}

/// Point-in-time view of [`AdState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdSnapshot {
    /// Current phase
    pub phase: LifecyclePhase,
    /// `start()` has been called
    pub started: bool,
    /// Loader readiness
    pub loader_ready: bool,
    /// Latest engine session
    pub session: u64,
    /// Whether the session is live
    pub engine_active: bool,
    /// Watchdogs currently armed
    pub armed_watchdogs: Vec<WatchdogName>,
    /// Whether a request is in flight
    pub request_running: bool,
    /// Why the in-flight request was issued
    pub request_origin: Option<RequestOrigin>,
    /// Current request cell
    pub request_cycle: u64,
    /// Pre-fetched locator waiting to be played
    pub ready_locator: Option<String>,
    /// Whether a debug override is stored
    pub debug_override: bool,
    /// Container state
    pub presentation: PresentationState,
    /// Request failures since the last success
    pub consecutive_failures: u32,
    /// Refused `request_ad()` calls
    pub rejected_requests: u64,
    /// Completed cancel cycles
    pub cancel_count: u64,
}
