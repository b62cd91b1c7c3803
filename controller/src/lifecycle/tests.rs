//! Reducer tests for the ad lifecycle.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use super::*;
use crate::config::AdConfig;
use crate::pipeline::RequestOrigin;
use crate::watchdog::WatchdogName;
use outstream_core::decision::{Locator, RequestError};
use outstream_core::effect::Effect;
use outstream_core::engine::{EngineSignal, RenderError};
use outstream_core::event::LifecycleTopic;
use outstream_core::event_bus::EventBus;
use outstream_core::reducer::Reducer;
use outstream_runtime::RetryPolicy;
use outstream_testing::{
    FixedClock, MockEngine, RecordingPresentation, ReducerTest, ScriptedDecision, assertions,
    test_clock,
};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

// ============================================================================
// Test Fixtures
// ============================================================================

type TestReducer = AdReducer<FixedClock>;
type TestEnv = AdEnvironment<FixedClock>;

fn env_with(config: AdConfig) -> TestEnv {
    let (signals, _rx) = mpsc::unbounded_channel();
    AdEnvironment::new(
        test_clock(),
        Arc::new(config),
        Arc::new(EventBus::new()),
        Collaborators::new(
            Arc::new(ScriptedDecision::always(Locator::new("vast-1"))),
            Arc::new(MockEngine::new()),
            Arc::new(RecordingPresentation::new()),
        ),
        signals,
    )
}

fn config() -> AdConfig {
    AdConfig::new("outstream-640").with_domain("example.com")
}

fn env() -> TestEnv {
    env_with(config())
}

fn test() -> ReducerTest<TestReducer, AdState, AdAction, TestEnv> {
    ReducerTest::new(TestReducer::new())
        .with_env(env())
        .given_state(AdState::new())
}

fn resolved(ticket: u64, locator: &str) -> AdAction {
    AdAction::RequestSettled {
        ticket,
        result: Ok(Locator::new(locator)),
    }
}

fn rejected(ticket: u64) -> AdAction {
    AdAction::RequestSettled {
        ticket,
        result: Err(RequestError::Decision("no fill".into())),
    }
}

fn signal(session: u64, signal: EngineSignal) -> AdAction {
    AdAction::Engine { session, signal }
}

fn is_delay_under(effects: &[Effect<AdAction>], id: &outstream_core::effect::EffectId) -> bool {
    effects.iter().any(|effect| {
        matches!(effect, Effect::Cancellable { id: armed, effect }
            if armed == id && matches!(**effect, Effect::Delay { .. }))
    })
}

// ============================================================================
// Start / loader
// ============================================================================

#[test]
fn test_start_arms_initial_watchdog_and_prepares_engine() {
    test()
        .when_action(AdAction::Start)
        .then_state(|state| {
            assert!(state.started);
            assert!(state.watchdog.is_armed(WatchdogName::Initial));
            assert_eq!(state.phase, LifecyclePhase::Idle);
        })
        .then_effects(|effects| {
            assertions::assert_arms(effects, &WatchdogName::Initial.effect_id());
            assertions::assert_has_future_effect(effects);
        })
        .run();
}

#[test]
fn test_second_start_is_ignored() {
    test()
        .given_action(AdAction::Start)
        .when_action(AdAction::Start)
        .then_effects(|effects| assertions::assert_no_effects(effects))
        .run();
}

#[test]
fn test_loader_ready_clears_initial_and_warms_up() {
    test()
        .given_action(AdAction::Start)
        .when_action(AdAction::LoaderReady)
        .then_state(|state| {
            assert!(state.loader_ready);
            assert!(state.presentation.is_created());
            assert!(state.watchdog.is_empty());
            assert_eq!(
                state.pipeline.in_flight().map(|f| f.origin),
                Some(RequestOrigin::WarmUp)
            );
        })
        .then_effects(|effects| {
            assertions::assert_cancels(effects, &WatchdogName::Initial.effect_id());
            assertions::assert_publishes(effects, LifecycleTopic::AdSdkLoaderReady);
            assertions::assert_arms(effects, &AD_REQUEST);
        })
        .run();
}

#[test]
fn test_loader_failure_cancels() {
    test()
        .given_action(AdAction::Start)
        .when_action(AdAction::LoaderFailed {
            error: RenderError::new(900, "sdk blocked"),
        })
        .then_state(|state| {
            assert_eq!(state.phase, LifecyclePhase::Idle);
            assert!(state.watchdog.is_empty());
            assert_eq!(state.cancel_count, 1);
        })
        .then_effects(|effects| {
            assert_eq!(
                assertions::published_topics(effects),
                vec![LifecycleTopic::AdSdkError, LifecycleTopic::AdCanceled]
            );
        })
        .run();
}

// ============================================================================
// Requests
// ============================================================================

#[test]
fn test_request_ad_from_idle() {
    test()
        .when_action(AdAction::RequestAd)
        .then_state(|state| {
            assert_eq!(state.phase, LifecyclePhase::Requesting);
            assert!(state.pipeline.is_running());
            assert!(state.watchdog.is_armed(WatchdogName::ManagerReady));
        })
        .then_effects(|effects| {
            assertions::assert_arms(effects, &WatchdogName::ManagerReady.effect_id());
            assertions::assert_arms(effects, &AD_REQUEST);
        })
        .run();
}

#[test]
fn test_second_request_is_rejected_not_queued() {
    test()
        .given_action(AdAction::RequestAd)
        .when_action(AdAction::RequestAd)
        .then_state(|state| {
            assert_eq!(state.rejected_requests, 1);
            assert_eq!(state.pipeline.in_flight().map(|f| f.ticket), Some(1));
        })
        .then_effects(|effects| assertions::assert_no_effects(effects))
        .run();
}

#[test]
fn test_request_adopts_in_flight_prefetch() {
    test()
        .given_action(AdAction::Start)
        .given_action(AdAction::LoaderReady)
        .when_action(AdAction::RequestAd)
        .then_state(|state| {
            assert_eq!(state.phase, LifecyclePhase::Requesting);
            assert_eq!(
                state.pipeline.in_flight().map(|f| (f.ticket, f.origin)),
                Some((1, RequestOrigin::Play))
            );
        })
        .then_effects(|effects| {
            assert_eq!(
                assertions::armed_ids(effects),
                vec![WatchdogName::ManagerReady.effect_id()]
            );
        })
        .run();
}

#[test]
fn test_resolved_request_is_handed_to_engine() {
    test()
        .given_action(AdAction::RequestAd)
        .when_action(resolved(1, "locator-123"))
        .then_state(|state| {
            assert_eq!(state.phase, LifecyclePhase::Requesting);
            assert_eq!(state.session, 1);
            assert!(state.engine_active);
            assert!(!state.pipeline.is_running());
            assert!(state.watchdog.is_armed(WatchdogName::ManagerReady));
        })
        .then_effects(|effects| {
            let events = assertions::published_events(effects);
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].topic(), LifecycleTopic::AdSdkRequestAds);
            assert_eq!(events[0].message_text(), Some("locator-123"));
            assertions::assert_has_future_effect(effects);
        })
        .run();
}

#[test]
fn test_prefetched_locator_is_played_immediately() {
    test()
        .given_action(AdAction::Start)
        .given_action(AdAction::LoaderReady)
        .given_action(resolved(1, "warm"))
        .when_action(AdAction::RequestAd)
        .then_state(|state| {
            assert!(state.ready_locator.is_none());
            assert_eq!(state.session, 1);
            assert!(!state.pipeline.is_running());
        })
        .then_effects(|effects| {
            assertions::assert_publishes(effects, LifecycleTopic::AdSdkRequestAds);
        })
        .run();
}

#[test]
fn test_stale_settlement_is_ignored() {
    test()
        .given_action(AdAction::RequestAd)
        .given_action(AdAction::Cancel)
        .when_action(resolved(1, "late"))
        .then_state(|state| {
            assert_eq!(state.session, 0);
            assert!(state.ready_locator.is_none());
        })
        .then_effects(|effects| assertions::assert_no_effects(effects))
        .run();
}

#[test]
fn test_rejection_while_requesting_cancels_and_prefetches() {
    test()
        .given_action(AdAction::RequestAd)
        .when_action(rejected(1))
        .then_state(|state| {
            assert_eq!(state.phase, LifecyclePhase::Idle);
            assert!(state.watchdog.is_empty());
            assert_eq!(state.consecutive_failures, 1);
            assert_eq!(
                state.pipeline.in_flight().map(|f| f.origin),
                Some(RequestOrigin::Prefetch)
            );
        })
        .then_effects(|effects| {
            assert_eq!(
                assertions::published_topics(effects),
                vec![LifecycleTopic::AdSdkError, LifecycleTopic::AdCanceled]
            );
            assertions::assert_cancels(effects, &WatchdogName::ManagerReady.effect_id());
            assertions::assert_arms(effects, &AD_REQUEST);
        })
        .run();
}

#[test]
fn test_failed_idle_prefetch_does_not_cancel_again() {
    test()
        .given_action(AdAction::Cancel)
        .when_action(rejected(1))
        .then_state(|state| {
            assert_eq!(state.cancel_count, 1);
            assert!(!state.pipeline.is_running());
            assert_eq!(state.consecutive_failures, 1);
        })
        .then_effects(|effects| {
            assert_eq!(
                assertions::published_topics(effects),
                vec![LifecycleTopic::AdSdkError]
            );
        })
        .run();
}

#[test]
fn test_blank_locator_is_a_request_error() {
    test()
        .given_action(AdAction::RequestAd)
        .when_action(resolved(1, ""))
        .then_state(|state| {
            assert_eq!(state.session, 0);
            assert_eq!(state.phase, LifecyclePhase::Idle);
        })
        .then_effects(|effects| {
            assertions::assert_publishes(effects, LifecycleTopic::AdSdkError);
        })
        .run();
}

#[test]
fn test_debug_locator_still_passes_gate() {
    test()
        .given_action(AdAction::SetDebugLocator(Some(Locator::new("debug-vast"))))
        .given_action(AdAction::RequestAd)
        .when_action(AdAction::RequestAd)
        .then_state(|state| {
            assert_eq!(state.rejected_requests, 1);
            assert_eq!(
                state.pipeline.override_locator(),
                Some(&Locator::new("debug-vast"))
            );
        })
        .run();
}

// ============================================================================
// Engine signals
// ============================================================================

#[test]
fn test_ready_shows_and_enters_loaded() {
    test()
        .given_action(AdAction::RequestAd)
        .given_action(resolved(1, "locator-123"))
        .when_action(signal(1, EngineSignal::Ready))
        .then_state(|state| {
            assert_eq!(state.phase, LifecyclePhase::Loaded);
            assert!(state.presentation.is_shown());
            assert!(state.watchdog.is_empty());
        })
        .then_effects(|effects| {
            assertions::assert_publishes(effects, LifecycleTopic::AdSdkManagerReady);
            assertions::assert_cancels(effects, &WatchdogName::ManagerReady.effect_id());
        })
        .run();
}

#[test]
fn test_loaded_arms_short_watchdog() {
    test()
        .given_action(AdAction::RequestAd)
        .given_action(resolved(1, "locator-123"))
        .given_action(signal(1, EngineSignal::Ready))
        .when_action(signal(1, EngineSignal::Loaded {
            content_type: "video/mp4".into(),
        }))
        .then_state(|state| {
            assert_eq!(state.watchdog.armed(), vec![WatchdogName::Loaded]);
            assert_eq!(
                state.watchdog.get(WatchdogName::Loaded).map(|t| t.duration),
                Some(Duration::from_secs(8))
            );
        })
        .then_effects(|effects| {
            assertions::assert_arms(effects, &WatchdogName::Loaded.effect_id());
        })
        .run();
}

#[test]
fn test_started_enters_playing() {
    test()
        .given_action(AdAction::RequestAd)
        .given_action(resolved(1, "locator-123"))
        .given_action(signal(1, EngineSignal::Ready))
        .given_action(signal(1, EngineSignal::Loaded {
            content_type: "video/mp4".into(),
        }))
        .when_action(signal(1, EngineSignal::Started))
        .then_state(|state| {
            assert_eq!(state.phase, LifecyclePhase::Playing);
            assert!(state.watchdog.is_empty());
            assert_eq!(
                state.phase_history(),
                vec![
                    LifecyclePhase::Idle,
                    LifecyclePhase::Requesting,
                    LifecyclePhase::Loaded,
                    LifecyclePhase::Playing,
                ]
            );
        })
        .then_effects(|effects| {
            assertions::assert_cancels(effects, &WatchdogName::Loaded.effect_id());
            assertions::assert_publishes(effects, LifecycleTopic::Started);
        })
        .run();
}

#[test]
fn test_completion_finishes_then_cancels() {
    test()
        .given_action(AdAction::RequestAd)
        .given_action(resolved(1, "locator-123"))
        .given_action(signal(1, EngineSignal::Ready))
        .given_action(signal(1, EngineSignal::Started))
        .when_action(signal(1, EngineSignal::Complete))
        .then_state(|state| {
            assert_eq!(state.phase, LifecyclePhase::Idle);
            assert!(!state.engine_active);
            assert!(!state.presentation.is_shown());
            let history = state.phase_history();
            assert_eq!(
                &history[history.len() - 3..],
                &[
                    LifecyclePhase::Completed,
                    LifecyclePhase::Canceling,
                    LifecyclePhase::Idle
                ]
            );
        })
        .then_effects(|effects| {
            assert_eq!(
                assertions::published_topics(effects),
                vec![
                    LifecycleTopic::Complete,
                    LifecycleTopic::AdSdkFinished,
                    LifecycleTopic::AdCanceled
                ]
            );
        })
        .run();
}

#[test]
fn test_render_error_while_playing() {
    test()
        .given_action(AdAction::RequestAd)
        .given_action(resolved(1, "locator-123"))
        .given_action(signal(1, EngineSignal::Ready))
        .given_action(signal(1, EngineSignal::Started))
        .when_action(signal(1, EngineSignal::Error(RenderError::new(405, "playback failed"))))
        .then_state(|state| {
            assert_eq!(state.phase, LifecyclePhase::Idle);
            assert!(state.pipeline.is_running());
        })
        .then_effects(|effects| {
            assert_eq!(
                assertions::published_topics(effects),
                vec![LifecycleTopic::AdError, LifecycleTopic::AdCanceled]
            );
            assertions::assert_arms(effects, &AD_REQUEST);
        })
        .run();
}

#[test]
fn test_signal_from_stale_session_is_ignored() {
    test()
        .given_action(AdAction::RequestAd)
        .given_action(resolved(1, "locator-123"))
        .given_action(AdAction::Cancel)
        .when_action(signal(1, EngineSignal::Started))
        .then_state(|state| assert_eq!(state.phase, LifecyclePhase::Idle))
        .then_effects(|effects| assertions::assert_no_effects(effects))
        .run();
}

// ============================================================================
// Watchdogs
// ============================================================================

#[test]
fn test_initial_watchdog_expiry_cancels_from_idle() {
    test()
        .given_action(AdAction::Start)
        .when_action(AdAction::WatchdogExpired {
            name: WatchdogName::Initial,
            generation: 1,
        })
        .then_state(|state| {
            assert_eq!(state.phase, LifecyclePhase::Idle);
            assert_eq!(state.cancel_count, 1);
            assert!(state.watchdog.is_empty());
        })
        .then_effects(|effects| {
            assert_eq!(
                assertions::published_topics(effects),
                vec![LifecycleTopic::AdSafetyTimer, LifecycleTopic::AdCanceled]
            );
        })
        .run();
}

#[test]
fn test_superseded_watchdog_generation_is_ignored() {
    test()
        .given_action(AdAction::RequestAd)
        .given_action(resolved(1, "locator-123"))
        .when_action(AdAction::WatchdogExpired {
            name: WatchdogName::ManagerReady,
            generation: 1,
        })
        .then_state(|state| {
            assert_eq!(state.phase, LifecyclePhase::Requesting);
            assert_eq!(
                state.watchdog.get(WatchdogName::ManagerReady).map(|t| t.generation),
                Some(2)
            );
        })
        .then_effects(|effects| assertions::assert_no_effects(effects))
        .run();
}

// ============================================================================
// Presentation
// ============================================================================

#[test]
fn test_float_is_noop_before_container_exists() {
    test()
        .when_action(AdAction::FloatStart)
        .then_state(|state| assert!(!state.presentation.is_floating()))
        .then_effects(|effects| assertions::assert_no_effects(effects))
        .run();
}

#[test]
fn test_float_is_idempotent() {
    test()
        .given_action(AdAction::Start)
        .given_action(AdAction::LoaderReady)
        .given_action(AdAction::FloatStart)
        .when_action(AdAction::FloatStart)
        .then_state(|state| assert!(state.presentation.is_floating()))
        .then_effects(|effects| assertions::assert_no_effects(effects))
        .run();
}

#[test]
fn test_float_resizes_live_session() {
    test()
        .given_action(AdAction::Start)
        .given_action(AdAction::LoaderReady)
        .given_action(AdAction::RequestAd)
        .given_action(resolved(1, "locator-123"))
        .when_action(AdAction::FloatStart)
        .then_effects(|effects| assertions::assert_effects_count(effects, 2))
        .run();
}

#[test]
fn test_cancel_hides_and_resets_float() {
    test()
        .given_action(AdAction::Start)
        .given_action(AdAction::LoaderReady)
        .given_action(AdAction::RequestAd)
        .given_action(resolved(1, "locator-123"))
        .given_action(signal(1, EngineSignal::Ready))
        .given_action(AdAction::FloatStart)
        .when_action(AdAction::Cancel)
        .then_state(|state| {
            assert!(!state.presentation.is_shown());
            assert!(!state.presentation.is_floating());
            assert!(state.presentation.is_created());
        })
        .run();
}

// ============================================================================
// Backoff
// ============================================================================

#[test]
fn test_backoff_delays_prefetch_after_failure() {
    let config = config().with_prefetch_backoff(
        RetryPolicy::builder()
            .max_retries(2)
            .initial_delay(Duration::from_millis(100))
            .build(),
    );

    ReducerTest::new(TestReducer::new())
        .with_env(env_with(config))
        .given_state(AdState::new())
        .given_action(AdAction::RequestAd)
        .when_action(rejected(1))
        .then_state(|state| {
            assert_eq!(state.phase, LifecyclePhase::Idle);
            assert!(!state.pipeline.is_running());
        })
        .then_effects(|effects| {
            assert!(is_delay_under(effects, &AD_REQUEST));
        })
        .run();
}

#[test]
fn test_backoff_gives_up_after_max_retries() {
    let config = config().with_prefetch_backoff(RetryPolicy::builder().max_retries(1).build());
    let state = AdState {
        consecutive_failures: 1,
        ..AdState::new()
    };

    ReducerTest::new(TestReducer::new())
        .with_env(env_with(config))
        .given_state(state)
        .given_action(AdAction::RequestAd)
        .when_action(rejected(1))
        .then_state(|state| {
            assert_eq!(state.consecutive_failures, 2);
            assert!(!state.pipeline.is_running());
        })
        .then_effects(|effects| {
            assert!(!assertions::armed_ids(effects).contains(&AD_REQUEST));
        })
        .run();
}

#[test]
fn test_prefetch_action_starts_request_when_idle() {
    test()
        .when_action(AdAction::Prefetch)
        .then_state(|state| {
            assert_eq!(
                state.pipeline.in_flight().map(|f| f.origin),
                Some(RequestOrigin::Prefetch)
            );
        })
        .run();
}

// ============================================================================
// Properties
// ============================================================================

#[derive(Debug, Clone)]
enum Trigger {
    Reject,
    RenderError,
    Timeout,
    Cancel,
    Complete,
}

fn arb_setup_action() -> impl Strategy<Value = AdAction> {
    prop_oneof![
        Just(AdAction::Start),
        Just(AdAction::LoaderReady),
        Just(AdAction::RequestAd),
        Just(AdAction::FloatStart),
        (1u64..4).prop_map(|ticket| resolved(ticket, "vast")),
        (1u64..3).prop_map(|session| signal(session, EngineSignal::Ready)),
        (1u64..3).prop_map(|session| signal(session, EngineSignal::Loaded {
            content_type: "video/mp4".into()
        })),
        (1u64..3).prop_map(|session| signal(session, EngineSignal::Started)),
    ]
}

fn arb_trigger() -> impl Strategy<Value = Trigger> {
    prop_oneof![
        Just(Trigger::Reject),
        Just(Trigger::RenderError),
        Just(Trigger::Timeout),
        Just(Trigger::Cancel),
        Just(Trigger::Complete),
    ]
}

/// The action that fires `trigger` in `state`, if it can fire there.
fn trigger_action(state: &AdState, trigger: &Trigger) -> Option<AdAction> {
    match trigger {
        Trigger::Reject => state
            .pipeline
            .in_flight()
            .filter(|_| state.phase == LifecyclePhase::Requesting)
            .map(|f| rejected(f.ticket)),
        Trigger::RenderError => state
            .engine_active
            .then(|| signal(state.session, EngineSignal::Error(RenderError::new(400, "bad")))),
        Trigger::Timeout => state.watchdog.armed().first().and_then(|name| {
            state.watchdog.get(*name).map(|timer| AdAction::WatchdogExpired {
                name: *name,
                generation: timer.generation,
            })
        }),
        Trigger::Cancel => Some(AdAction::Cancel),
        Trigger::Complete => state
            .engine_active
            .then(|| signal(state.session, EngineSignal::AllAdsCompleted)),
    }
}

proptest! {
    /// Every trigger, from every reachable phase, ends in Idle with no watchdog armed
    #[test]
    fn prop_cleanup_is_total(
        setup in prop::collection::vec(arb_setup_action(), 0..12),
        trigger in arb_trigger(),
    ) {
        let reducer = TestReducer::new();
        let env = env();
        let mut state = AdState::new();

        for action in setup {
            let _ = reducer.reduce(&mut state, action, &env);
        }

        if let Some(action) = trigger_action(&state, &trigger) {
            let cancels_before = state.cancel_count;
            let effects = reducer.reduce(&mut state, action, &env);

            prop_assert_eq!(state.phase, LifecyclePhase::Idle);
            prop_assert!(state.watchdog.is_empty());
            prop_assert_eq!(state.cancel_count, cancels_before + 1);
            prop_assert!(!state.engine_active);
            prop_assert!(
                assertions::published_topics(&effects).contains(&LifecycleTopic::AdCanceled)
            );
        }
    }

    /// While a request is in flight no further request is dispatched
    #[test]
    fn prop_single_flight(extra in 1usize..8) {
        let reducer = TestReducer::new();
        let env = env();
        let mut state = AdState::new();

        let _ = reducer.reduce(&mut state, AdAction::RequestAd, &env);
        for _ in 0..extra {
            let effects = reducer.reduce(&mut state, AdAction::RequestAd, &env);
            prop_assert!(!assertions::armed_ids(&effects).contains(&AD_REQUEST));
        }
        prop_assert_eq!(state.rejected_requests, extra as u64);
        prop_assert_eq!(state.pipeline.in_flight().map(|f| f.ticket), Some(1));
    }
}
