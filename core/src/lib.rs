//! # Outstream Core
//!
//! Core traits and types for the outstream ad lifecycle controller.
//!
//! This crate provides the fundamental abstractions the controller is built from:
//! a pure reducer that owns all lifecycle decisions, effect descriptions the
//! runtime executes on its behalf, and the vocabulary shared with observers and
//! collaborators.
//!
//! ## Core Concepts
//!
//! - **State**: The controller's phase, watchdog ledger and request pipeline
//! - **Action**: Every input to the reducer (caller commands, collaborator
//!   completions, engine signals, watchdog expiries)
//! - **Reducer**: Pure function `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: Side effect descriptions (not execution)
//! - **Environment**: Injected collaborators via traits
//!
//! ## Collaborators
//!
//! - [`decision::AdDecision`]: resolves a targeting request into a [`decision::Locator`]
//! - [`engine::RenderingEngine`]: plays a locator and streams [`engine::EngineSignal`]s
//! - [`presentation::Presentation`]: the visual container (show, hide, float)
//!
//! ## Example
//!
//! ```ignore
//! use outstream_core::*;
//!
//! impl Reducer for AdReducer {
//!     type State = AdState;
//!     type Action = AdAction;
//!     type Environment = AdEnvironment;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut AdState,
//!         action: AdAction,
//!         env: &AdEnvironment,
//!     ) -> SmallVec<[Effect<AdAction>; 4]> {
//!         match action {
//!             AdAction::Cancel => self.cancel_cycle(state, env),
//!             _ => smallvec![Effect::None],
//!         }
//!     }
//! }
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

/// Declarative macros for effect construction
pub mod effect_macros;

/// Lifecycle topics and the events broadcast on them
pub mod event;

/// In-process publish/subscribe bus for lifecycle events
pub mod event_bus;

/// Ad-decision collaborator contract
pub mod decision;

/// Rendering engine collaborator contract and its signal vocabulary
pub mod engine;

/// Presentation container contract
pub mod presentation;

/// Reducer module - The core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`
///
/// They contain all lifecycle logic and are deterministic and testable.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    ///
    /// # Example
    ///
    /// ```ignore
    /// impl Reducer for AdReducer {
    ///     type State = AdState;
    ///     type Action = AdAction;
    ///     type Environment = AdEnvironment;
    ///
    ///     fn reduce(
    ///         &self,
    ///         state: &mut AdState,
    ///         action: AdAction,
    ///         env: &AdEnvironment,
    ///     ) -> SmallVec<[Effect<AdAction>; 4]> {
    ///         match action {
    ///             AdAction::Cancel => {
    ///                 state.phase = LifecyclePhase::Idle;
    ///                 smallvec![Effect::None]
    ///             }
    ///             _ => smallvec![Effect::None],
    ///         }
    ///     }
    /// }
    /// ```
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// This is a pure function that:
        /// 1. Validates the action against the current state
        /// 2. Updates state in place
        /// 3. Returns effect descriptions to be executed
        ///
        /// The state must be left consistent before returning: the runtime
        /// releases its lock and only then starts executing the effects.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects describe side effects to be performed by the runtime.
/// They are values (not execution), composable, and cancellable by id.
pub mod effect {
    use crate::event::LifecycleEvent;
    use crate::event_bus::EventBus;
    use std::borrow::Cow;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::time::Duration;

    /// Identifier for a cancellable effect.
    ///
    /// At most one live effect exists per id: registering a new cancellable
    /// effect under an id that is still running aborts the previous one.
    #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct EffectId(Cow<'static, str>);

    impl EffectId {
        /// Create an id from a static string (usable in `const` contexts)
        #[must_use]
        pub const fn from_static(id: &'static str) -> Self {
            Self(Cow::Borrowed(id))
        }

        /// Create an id from an owned string
        #[must_use]
        pub fn new(id: impl Into<String>) -> Self {
            Self(Cow::Owned(id.into()))
        }

        /// The id as a string slice
        #[must_use]
        pub fn as_str(&self) -> &str {
            &self.0
        }
    }

    impl std::fmt::Display for EffectId {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(&self.0)
        }
    }

    /// Effect type - describes a side effect to be executed
    ///
    /// Effects are NOT executed immediately. They are descriptions of what should happen,
    /// returned from reducers and executed by the Store runtime.
    ///
    /// # Type Parameters
    ///
    /// - `Action`: The action type that effects can produce (feedback loop)
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Run effects in parallel
        Parallel(Vec<Effect<Action>>),

        /// Run effects sequentially
        Sequential(Vec<Effect<Action>>),

        /// Delayed action (for timeouts, retries)
        Delay {
            /// How long to wait
            duration: Duration,
            /// Action to dispatch after delay
            action: Box<Action>,
        },

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is fed back into the reducer
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),

        /// Run `effect` under `id` so it can be aborted later
        ///
        /// Only `Delay` and `Future` effects can be made cancellable; other
        /// variants are executed as if they were not wrapped.
        Cancellable {
            /// Key in the runtime's cancellation registry
            id: EffectId,
            /// The wrapped effect
            effect: Box<Effect<Action>>,
        },

        /// Abort the live cancellable effect registered under `id`, if any
        Cancel {
            /// Key in the runtime's cancellation registry
            id: EffectId,
        },

        /// Broadcast a lifecycle event
        ///
        /// Executed synchronously by the runtime, in effect order, before
        /// `send()` returns.
        PublishEvent {
            /// Bus to broadcast on
            bus: Arc<EventBus>,
            /// The event to deliver
            event: LifecycleEvent,
        },
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Parallel(effects) => {
                    f.debug_tuple("Effect::Parallel").field(effects).finish()
                },
                Effect::Sequential(effects) => {
                    f.debug_tuple("Effect::Sequential").field(effects).finish()
                },
                Effect::Delay { duration, action } => f
                    .debug_struct("Effect::Delay")
                    .field("duration", duration)
                    .field("action", action)
                    .finish(),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
                Effect::Cancellable { id, effect } => f
                    .debug_struct("Effect::Cancellable")
                    .field("id", id)
                    .field("effect", effect)
                    .finish(),
                Effect::Cancel { id } => {
                    f.debug_struct("Effect::Cancel").field("id", id).finish()
                },
                Effect::PublishEvent { event, .. } => f
                    .debug_struct("Effect::PublishEvent")
                    .field("topic", &event.topic())
                    .field("severity", &event.severity())
                    .finish_non_exhaustive(),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Combine effects to run in parallel
        #[must_use]
        pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Parallel(effects)
        }

        /// Chain effects to run sequentially
        #[must_use]
        pub const fn chain(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Sequential(effects)
        }

        /// Register this effect under `id` so a later [`Effect::Cancel`] can abort it
        #[must_use]
        pub fn cancellable(self, id: EffectId) -> Effect<Action> {
            Effect::Cancellable {
                id,
                effect: Box::new(self),
            }
        }

        /// Whether this is [`Effect::None`]
        #[must_use]
        pub const fn is_none(&self) -> bool {
            matches!(self, Effect::None)
        }
    }
}

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// via the Environment parameter.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Test - fixed time for deterministic tests
    /// struct FixedClock { time: DateTime<Utc> }
    /// impl Clock for FixedClock {
    ///     fn now(&self) -> DateTime<Utc> {
    ///         self.time
    ///     }
    /// }
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::effect::{Effect, EffectId};
    use super::environment::{Clock, SystemClock};
    use std::time::Duration;

    #[derive(Debug, Clone)]
    enum TestAction {
        Tick,
    }

    #[test]
    fn test_effect_id_static_and_owned_compare_equal() {
        const WATCHDOG: EffectId = EffectId::from_static("watchdog:loaded");
        assert_eq!(WATCHDOG, EffectId::new("watchdog:loaded"));
        assert_eq!(WATCHDOG.to_string(), "watchdog:loaded");
    }

    #[test]
    fn test_cancellable_wraps_effect() {
        let effect = Effect::Delay {
            duration: Duration::from_secs(1),
            action: Box::new(TestAction::Tick),
        }
        .cancellable(EffectId::from_static("tick"));

        match effect {
            Effect::Cancellable { id, effect } => {
                assert_eq!(id.as_str(), "tick");
                assert!(matches!(*effect, Effect::Delay { .. }));
            },
            other => unreachable!("unexpected effect {other:?}"),
        }
    }

    #[test]
    fn test_merge_and_chain() {
        let merged = Effect::<TestAction>::merge(vec![Effect::None, Effect::None]);
        assert!(matches!(merged, Effect::Parallel(ref v) if v.len() == 2));

        let chained = Effect::<TestAction>::chain(vec![Effect::None]);
        assert!(matches!(chained, Effect::Sequential(ref v) if v.len() == 1));
        assert!(Effect::<TestAction>::None.is_none());
    }

    #[test]
    fn test_system_clock_moves_forward() {
        let clock = SystemClock;
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }
}
