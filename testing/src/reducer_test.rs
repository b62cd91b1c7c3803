//! Ergonomic testing utilities for reducers
//!
//! This module provides a fluent API for testing reducers with readable Given-When-Then syntax.

#![allow(clippy::module_name_repetitions)] // ReducerTest is the natural name

use outstream_core::{effect::Effect, reducer::Reducer};

/// Type alias for state assertion functions
type StateAssertion<S> = Box<dyn FnOnce(&S)>;

/// Type alias for effect assertion functions
type EffectAssertion<A> = Box<dyn FnOnce(&[Effect<A>])>;

/// Fluent API for testing reducers with Given-When-Then syntax
///
/// # Example
///
/// ```ignore
/// use outstream_testing::{ReducerTest, assertions};
///
/// ReducerTest::new(AdReducer::new())
///     .with_env(test_environment())
///     .given_state(AdState::default())
///     .when_action(AdAction::Cancel)
///     .then_state(|state| {
///         assert_eq!(state.phase, LifecyclePhase::Idle);
///     })
///     .then_effects(|effects| {
///         assertions::assert_publishes(effects, LifecycleTopic::AdCanceled);
///     })
///     .run();
/// ```
pub struct ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    reducer: R,
    environment: Option<E>,
    initial_state: Option<S>,
    actions: Vec<A>,
    state_assertions: Vec<StateAssertion<S>>,
    effect_assertions: Vec<EffectAssertion<A>>,
}

impl<R, S, A, E> ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    /// Create a new reducer test with the given reducer
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            environment: None,
            initial_state: None,
            actions: Vec::new(),
            state_assertions: Vec::new(),
            effect_assertions: Vec::new(),
        }
    }

    /// Set the environment for the test
    #[must_use]
    pub fn with_env(mut self, env: E) -> Self {
        self.environment = Some(env);
        self
    }

    /// Set the initial state (Given)
    #[must_use]
    pub fn given_state(mut self, state: S) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Add an action to apply before the action under test (Given)
    ///
    /// Effects of these actions are discarded.
    #[must_use]
    pub fn given_action(mut self, action: A) -> Self {
        self.actions.push(action);
        self
    }

    /// Set the action to test (When)
    ///
    /// Effect assertions see only this action's effects.
    #[must_use]
    pub fn when_action(mut self, action: A) -> Self {
        self.actions.push(action);
        self
    }

    /// Add an assertion about the resulting state (Then)
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&S) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Add an assertion about the resulting effects (Then)
    #[must_use]
    pub fn then_effects<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&[Effect<A>]) + 'static,
    {
        self.effect_assertions.push(Box::new(assertion));
        self
    }

    /// Run the test and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if initial state, action, or environment is not set,
    /// or if any assertions fail.
    #[allow(clippy::panic)] // Test code can panic
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn run(self) {
        let mut state = self
            .initial_state
            .expect("Initial state must be set with given_state()");

        assert!(!self.actions.is_empty(), "Action must be set with when_action()");

        let env = self
            .environment
            .expect("Environment must be set with with_env()");

        let mut effects = Vec::new();
        for action in self.actions {
            effects = self.reducer.reduce(&mut state, action, &env).into_vec();
        }

        // Run state assertions
        for assertion in self.state_assertions {
            assertion(&state);
        }

        // Run effect assertions
        for assertion in self.effect_assertions {
            assertion(&effects);
        }
    }
}

/// Helper assertions for effects
///
/// Assertions that look for a kind of effect search nested `Parallel`,
/// `Sequential` and `Cancellable` effects too.
pub mod assertions {
    use outstream_core::effect::{Effect, EffectId};
    use outstream_core::event::{LifecycleEvent, LifecycleTopic};

    fn visit<A>(effects: &[Effect<A>], f: &mut impl FnMut(&Effect<A>)) {
        for effect in effects {
            f(effect);
            match effect {
                Effect::Parallel(inner) | Effect::Sequential(inner) => visit(inner, f),
                Effect::Cancellable { effect, .. } => visit(std::slice::from_ref(&**effect), f),
                _ => {},
            }
        }
    }

    /// Events published by `effects`, in effect order.
    #[must_use]
    pub fn published_events<A>(effects: &[Effect<A>]) -> Vec<LifecycleEvent> {
        let mut events = Vec::new();
        visit(effects, &mut |effect| {
            if let Effect::PublishEvent { event, .. } = effect {
                events.push(event.clone());
            }
        });
        events
    }

    /// Topics published by `effects`, in effect order.
    #[must_use]
    pub fn published_topics<A>(effects: &[Effect<A>]) -> Vec<LifecycleTopic> {
        published_events(effects)
            .iter()
            .map(LifecycleEvent::topic)
            .collect()
    }

    /// Ids registered by `Cancellable` effects.
    #[must_use]
    pub fn armed_ids<A>(effects: &[Effect<A>]) -> Vec<EffectId> {
        let mut ids = Vec::new();
        visit(effects, &mut |effect| {
            if let Effect::Cancellable { id, .. } = effect {
                ids.push(id.clone());
            }
        });
        ids
    }

    /// Ids aborted by `Cancel` effects.
    #[must_use]
    pub fn cancelled_ids<A>(effects: &[Effect<A>]) -> Vec<EffectId> {
        let mut ids = Vec::new();
        visit(effects, &mut |effect| {
            if let Effect::Cancel { id } = effect {
                ids.push(id.clone());
            }
        });
        ids
    }

    /// Assert that there are no effects
    ///
    /// # Panics
    ///
    /// Panics if effects is not empty.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_no_effects<A: std::fmt::Debug>(effects: &[Effect<A>]) {
        assert!(
            effects.iter().all(Effect::is_none),
            "Expected no effects, but found {}: {:?}",
            effects.len(),
            effects
        );
    }

    /// Assert the number of effects
    ///
    /// # Panics
    ///
    /// Panics if the number of effects doesn't match expected.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_effects_count<A>(effects: &[Effect<A>], expected: usize) {
        assert_eq!(
            effects.len(),
            expected,
            "Expected {} effects, but found {}",
            expected,
            effects.len()
        );
    }

    /// Assert that effects contain at least one Future effect
    ///
    /// # Panics
    ///
    /// Panics if no Future effect is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_has_future_effect<A>(effects: &[Effect<A>]) {
        let mut found = false;
        visit(effects, &mut |effect| found |= matches!(effect, Effect::Future(_)));
        assert!(found, "Expected at least one Future effect, but none found");
    }

    /// Assert that effects publish at least one event on `topic`
    ///
    /// # Panics
    ///
    /// Panics if no event on `topic` is published.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_publishes<A>(effects: &[Effect<A>], topic: LifecycleTopic) {
        let topics = published_topics(effects);
        assert!(
            topics.contains(&topic),
            "Expected an event on {topic}, but published {topics:?}"
        );
    }

    /// Assert that effects publish nothing on `topic`
    ///
    /// # Panics
    ///
    /// Panics if an event on `topic` is published.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_does_not_publish<A>(effects: &[Effect<A>], topic: LifecycleTopic) {
        let topics = published_topics(effects);
        assert!(
            !topics.contains(&topic),
            "Expected no event on {topic}, but published {topics:?}"
        );
    }

    /// Assert that effects abort the cancellable registered under `id`
    ///
    /// # Panics
    ///
    /// Panics if no `Cancel` for `id` is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_cancels<A>(effects: &[Effect<A>], id: &EffectId) {
        let ids = cancelled_ids(effects);
        assert!(ids.contains(id), "Expected Cancel for {id}, but cancelled {ids:?}");
    }

    /// Assert that effects register a cancellable under `id`
    ///
    /// # Panics
    ///
    /// Panics if no `Cancellable` for `id` is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_arms<A>(effects: &[Effect<A>], id: &EffectId) {
        let ids = armed_ids(effects);
        assert!(ids.contains(id), "Expected Cancellable {id}, but armed {ids:?}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outstream_core::effect::{Effect, EffectId};
    use outstream_core::event::{LifecycleEvent, LifecycleTopic};
    use outstream_core::event_bus::EventBus;
    use outstream_core::reducer::Reducer;
    use outstream_core::{SmallVec, smallvec};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Clone, Debug)]
    struct TestState {
        count: i32,
    }

    #[derive(Clone, Debug)]
    enum TestAction {
        Increment,
        Decrement,
        Arm,
    }

    struct TestReducer;

    struct TestEnv {
        bus: Arc<EventBus>,
    }

    fn env() -> TestEnv {
        TestEnv { bus: Arc::new(EventBus::new()) }
    }

    impl Reducer for TestReducer {
        type State = TestState;
        type Action = TestAction;
        type Environment = TestEnv;

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]> {
            match action {
                TestAction::Increment => {
                    state.count += 1;
                    smallvec![Effect::None]
                },
                TestAction::Decrement => {
                    state.count -= 1;
                    smallvec![Effect::None]
                },
                TestAction::Arm => smallvec![
                    Effect::Cancel { id: EffectId::from_static("old") },
                    Effect::Sequential(vec![
                        Effect::PublishEvent {
                            bus: Arc::clone(&env.bus),
                            event: LifecycleEvent::success(LifecycleTopic::Started, "go"),
                        },
                        Effect::Delay {
                            duration: Duration::from_secs(1),
                            action: Box::new(TestAction::Decrement),
                        }
                        .cancellable(EffectId::from_static("new")),
                    ]),
                ],
            }
        }
    }

    #[test]
    fn test_reducer_test_increment() {
        ReducerTest::new(TestReducer)
            .with_env(env())
            .given_state(TestState { count: 0 })
            .when_action(TestAction::Increment)
            .then_state(|state| {
                assert_eq!(state.count, 1);
            })
            .then_effects(|effects| {
                assertions::assert_no_effects(effects);
            })
            .run();
    }

    #[test]
    fn test_reducer_test_given_actions() {
        ReducerTest::new(TestReducer)
            .with_env(env())
            .given_state(TestState { count: 5 })
            .given_action(TestAction::Decrement)
            .when_action(TestAction::Decrement)
            .then_state(|state| {
                assert_eq!(state.count, 3);
            })
            .run();
    }

    #[test]
    fn test_assertions_search_nested_effects() {
        ReducerTest::new(TestReducer)
            .with_env(env())
            .given_state(TestState { count: 0 })
            .when_action(TestAction::Arm)
            .then_effects(|effects| {
                assertions::assert_publishes(effects, LifecycleTopic::Started);
                assertions::assert_does_not_publish(effects, LifecycleTopic::AdCanceled);
                assertions::assert_cancels(effects, &EffectId::from_static("old"));
                assertions::assert_arms(effects, &EffectId::from_static("new"));
                assertions::assert_effects_count(effects, 2);
            })
            .run();
    }

    #[test]
    fn test_assertions_no_effects() {
        assertions::assert_no_effects::<TestAction>(&[Effect::None]);
        assertions::assert_no_effects::<TestAction>(&[]);
    }
}
