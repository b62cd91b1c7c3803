//! # Outstream Controller
//!
//! Lifecycle controller for a single outstream video ad.
//!
//! The controller coordinates three independently failing collaborators
//! (the ad-decision call, the rendering engine and the presentation
//! container) into one restartable state machine, and publishes every
//! observable transition on an [`EventBus`](outstream_core::event_bus::EventBus).
//!
//! ## Guarantees
//!
//! - **Single flight**: at most one ad-decision request is outstanding
//! - **Bounded waits**: every phase that waits on a collaborator is covered by a watchdog
//! - **Total cleanup**: every terminal or error path runs the same cancel cycle
//!   and ends in `Idle`, ready for the next request
//! - **Isolated observers**: a failing observer never reaches the controller
//!
//! ## Architecture
//!
//! ```text
//! AdController ──send──▶ Store<AdState, AdAction, AdEnvironment, AdReducer>
//!      ▲                          │
//!      │ SessionSignal            ├── PublishEvent ──▶ EventBus ──▶ observers
//!      │                          ├── Future ──▶ AdDecision / RenderingEngine
//!  signal pump ◀── SignalSink ◀───┤
//!                                 └── Cancellable Delay ──▶ WatchdogExpired
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use outstream_controller::{AdConfig, AdController, Collaborators, attach_log_observer};
//! use outstream_core::environment::SystemClock;
//!
//! let controller = AdController::new(
//!     AdConfig::new("outstream-640").with_domain("example.com"),
//!     SystemClock,
//!     Collaborators::new(decision, engine, presentation),
//! );
//! attach_log_observer(controller.bus());
//!
//! controller.start().await?;
//! controller.show_advertisement().await?;
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod observers;
pub mod pipeline;
pub mod presentation;
pub mod watchdog;

pub use config::AdConfig;
pub use controller::{AdController, DEGRADED_AFTER_FAILURES};
pub use error::ControllerError;
pub use lifecycle::{AdAction, AdSnapshot, AdState, Collaborators, LifecyclePhase};
pub use observers::attach_log_observer;
pub use pipeline::{AdRequestHandle, RequestOrigin, RequestStatus};
pub use watchdog::WatchdogName;
