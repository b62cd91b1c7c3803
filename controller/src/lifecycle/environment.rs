//! Lifecycle environment.
//!
//! Everything the reducer's effects reach outside the state: the clock,
//! configuration, the event bus and the three collaborators.

use outstream_core::decision::AdDecision;
use outstream_core::engine::{RenderingEngine, SessionSignal};
use outstream_core::environment::Clock;
use outstream_core::event_bus::EventBus;
use outstream_core::presentation::Presentation;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::AdConfig;

/// Dependencies injected into the lifecycle reducer.
#[derive(Clone)]
pub struct AdEnvironment<C: Clock> {
    /// Clock for watchdog timestamps and analytics labels
    pub clock: C,
    /// Controller configuration
    pub config: Arc<AdConfig>,
    /// Bus lifecycle events are published on
    pub bus: Arc<EventBus>,
    /// Ad-decision collaborator
    pub decision: Arc<dyn AdDecision>,
    /// Rendering engine collaborator
    pub engine: Arc<dyn RenderingEngine>,
    /// Presentation collaborator
    pub presentation: Arc<dyn Presentation>,
    /// Where engine sessions send their signals
    pub signals: mpsc::UnboundedSender<SessionSignal>,
}

impl<C: Clock> AdEnvironment<C> {
    /// Assemble an environment.
    #[must_use]
    pub fn new(
        clock: C,
        config: Arc<AdConfig>,
        bus: Arc<EventBus>,
        collaborators: Collaborators,
        signals: mpsc::UnboundedSender<SessionSignal>,
    ) -> Self {
        Self {
            clock,
            config,
            bus,
            decision: collaborators.decision,
            engine: collaborators.engine,
            presentation: collaborators.presentation,
            signals,
        }
    }
}

/// The three external collaborators.
#[derive(Clone)]
pub struct Collaborators {
    /// Resolves ad requests into locators
    pub decision: Arc<dyn AdDecision>,
    /// Plays locators
    pub engine: Arc<dyn RenderingEngine>,
    /// Shows, hides and floats the ad container
    pub presentation: Arc<dyn Presentation>,
}

impl Collaborators {
    /// Bundle the collaborators.
    #[must_use]
    pub fn new(
        decision: Arc<dyn AdDecision>,
        engine: Arc<dyn RenderingEngine>,
        presentation: Arc<dyn Presentation>,
    ) -> Self {
        Self {
            decision,
            engine,
            presentation,
        }
    }
}
