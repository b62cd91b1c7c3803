//! Lifecycle actions.

use outstream_core::decision::{Locator, RequestError};
use outstream_core::engine::{EngineSignal, RenderError};

use crate::watchdog::WatchdogName;

/// Inputs to the lifecycle reducer.
///
/// Commands come from the [`AdController`](crate::AdController) facade;
/// the rest are fed back by effects.
#[derive(Debug, Clone, PartialEq)]
pub enum AdAction {
    // Commands
    /// Arm the `initial` watchdog and prepare the engine
    Start,
    /// Request an ad for playback
    RequestAd,
    /// Run the cancel cycle
    Cancel,
    /// Float the container
    FloatStart,
    /// Return the container in-page
    FloatReset,
    /// Store or clear the debug override
    SetDebugLocator(Option<Locator>),

    // Feedback
    /// The engine's loader is ready
    LoaderReady,
    /// The engine's loader failed
    LoaderFailed {
        /// Why
        error: RenderError,
    },
    /// Issue a pre-fetch once a backoff delay has passed
    Prefetch,
    /// A request settled
    RequestSettled {
        /// Ticket issued when the request began
        ticket: u64,
        /// Outcome
        result: Result<Locator, RequestError>,
    },
    /// A signal from an engine session
    Engine {
        /// Session that emitted it
        session: u64,
        /// The signal
        signal: EngineSignal,
    },
    /// A watchdog countdown ended
    WatchdogExpired {
        /// Which watchdog
        name: WatchdogName,
        /// Generation it was armed with
        generation: u64,
    },
}

impl AdAction {
    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::RequestAd => "request_ad",
            Self::Cancel => "cancel",
            Self::FloatStart => "float_start",
            Self::FloatReset => "float_reset",
            Self::SetDebugLocator(_) => "set_debug_locator",
            Self::LoaderReady => "loader_ready",
            Self::LoaderFailed { .. } => "loader_failed",
            Self::Prefetch => "prefetch",
            Self::RequestSettled { .. } => "request_settled",
            Self::Engine { .. } => "engine",
            Self::WatchdogExpired { .. } => "watchdog_expired",
        }
    }
}
