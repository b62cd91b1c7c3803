//! Presentation state tracking.
//!
//! The [`Presentation`] collaborator has no logic of its own. The reducer
//! keeps a [`PresentationState`] so every call it issues is a real
//! transition: showing twice, floating before the container exists, or
//! resetting a container that never floated are all dropped here.

use outstream_core::effect::Effect;
use outstream_core::engine::{RenderingEngine, SlotDimensions};
use outstream_core::presentation::Presentation;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// What the container currently looks like.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PresentationState {
    created: bool,
    shown: bool,
    floating: bool,
}

impl PresentationState {
    /// Whether the container exists.
    #[must_use]
    pub const fn is_created(&self) -> bool {
        self.created
    }

    /// Whether the container is visible.
    #[must_use]
    pub const fn is_shown(&self) -> bool {
        self.shown
    }

    /// Whether the container is floating.
    #[must_use]
    pub const fn is_floating(&self) -> bool {
        self.floating
    }

    /// Mark the container created. Returns `false` if it already was.
    pub fn mark_created(&mut self) -> bool {
        !std::mem::replace(&mut self.created, true)
    }

    /// Record a show. Returns `false` if already visible.
    pub fn show(&mut self) -> bool {
        !std::mem::replace(&mut self.shown, true)
    }

    /// Record a hide. Returns `false` if already hidden.
    pub fn hide(&mut self) -> bool {
        std::mem::replace(&mut self.shown, false)
    }

    /// Record a float. Returns `false` if already floating or not created.
    pub fn float_start(&mut self) -> bool {
        if !self.created || self.floating {
            return false;
        }
        self.floating = true;
        true
    }

    /// Record a float reset. Returns `false` if not floating or not created.
    pub fn float_reset(&mut self) -> bool {
        if !self.created || !self.floating {
            return false;
        }
        self.floating = false;
        true
    }
}

/// A call on the presentation collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentationCommand {
    /// Make the container visible
    Show,
    /// Hide over the given transition
    Hide(Duration),
    /// Float at the given size
    FloatStart(SlotDimensions),
    /// Return in-page at the given size
    FloatReset(SlotDimensions),
}

impl PresentationCommand {
    /// Issue this call from an effect.
    pub fn into_effect<A>(self, presentation: &Arc<dyn Presentation>) -> Effect<A>
    where
        A: Send + 'static,
    {
        let presentation = Arc::clone(presentation);
        outstream_core::async_effect! {
            match self {
                Self::Show => presentation.show(),
                Self::Hide(transition) => presentation.hide(transition),
                Self::FloatStart(dimensions) => presentation.float_start(dimensions),
                Self::FloatReset(dimensions) => presentation.float_reset(dimensions),
            }
            None
        }
    }
}

/// Resize the live engine session from an effect.
pub fn resize_effect<A>(engine: &Arc<dyn RenderingEngine>, dimensions: SlotDimensions) -> Effect<A>
where
    A: Send + 'static,
{
    let engine = Arc::clone(engine);
    outstream_core::async_effect! {
        engine.resize(dimensions);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_show_hide_only_on_transitions() {
        let mut state = PresentationState::default();
        assert!(state.show());
        assert!(!state.show());
        assert!(state.hide());
        assert!(!state.hide());
    }

    #[test]
    fn test_float_requires_created_container() {
        let mut state = PresentationState::default();
        assert!(!state.float_start());
        assert!(!state.float_reset());

        assert!(state.mark_created());
        assert!(!state.mark_created());

        assert!(state.float_start());
        assert!(!state.float_start());
        assert!(state.is_floating());
        assert!(state.float_reset());
        assert!(!state.float_reset());
    }

    #[test]
    fn test_command_effect_is_future() {
        let presentation: Arc<dyn Presentation> =
            Arc::new(outstream_core::presentation::HeadlessPresentation);
        let effect: Effect<()> = PresentationCommand::Show.into_effect(&presentation);
        assert!(matches!(effect, Effect::Future(_)));
    }
}
