//! Presentation container contract.
//!
//! The presentation is the visual region the ad plays in. It has no
//! business logic: the controller decides when to show, hide or float it and
//! tracks which state it is in, so implementations may assume calls arrive
//! only on real transitions.

use crate::engine::SlotDimensions;
use std::time::Duration;

/// The visual container the ad plays in.
pub trait Presentation: Send + Sync {
    /// Make the container visible.
    fn show(&self);

    /// Start hiding the container over `transition`.
    ///
    /// Returns immediately; the controller does not wait for the visual
    /// transition to finish.
    fn hide(&self, transition: Duration);

    /// Detach the container into a floating player of `dimensions`.
    fn float_start(&self, dimensions: SlotDimensions);

    /// Return the container to its in-page position and `dimensions`.
    fn float_reset(&self, dimensions: SlotDimensions);
}

/// A presentation that does nothing, for headless hosts.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlessPresentation;

impl Presentation for HeadlessPresentation {
    fn show(&self) {
        tracing::trace!("headless presentation: show");
    }

    fn hide(&self, transition: Duration) {
        tracing::trace!(transition_ms = transition.as_millis(), "headless presentation: hide");
    }

    fn float_start(&self, dimensions: SlotDimensions) {
        tracing::trace!(width = dimensions.width, "headless presentation: float start");
    }

    fn float_reset(&self, dimensions: SlotDimensions) {
        tracing::trace!(width = dimensions.width, "headless presentation: float reset");
    }
}
