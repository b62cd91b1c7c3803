//! The lifecycle reducer.
//!
//! Every failure path, and normal completion, ends in [`cancel_cycle`]:
//! it disarms all watchdogs, aborts the running request, hides and
//! un-floats the container, settles the request cell, publishes
//! `AD_CANCELED` and returns to `Idle` in one pass. Only then are the engine
//! teardown and the next pre-fetch issued, as effects.
//!
//! [`cancel_cycle`]: AdReducer::cancel_cycle

use outstream_core::decision::{Locator, RequestError};
use outstream_core::effect::{Effect, EffectId};
use outstream_core::engine::{EngineSignal, RenderError, SignalSink};
use outstream_core::environment::Clock;
use outstream_core::event::LifecycleEvent;
use outstream_core::reducer::Reducer;
use outstream_core::{SmallVec, async_effect, delay, publish_event};
use outstream_runtime::metrics::AdMetrics;
use std::marker::PhantomData;
use std::sync::Arc;

use super::actions::AdAction;
use super::environment::AdEnvironment;
use super::types::{AdState, LifecyclePhase};
use crate::events;
use crate::pipeline::{Dispatch, RequestOrigin, Settled};
use crate::presentation::{PresentationCommand, resize_effect};
use crate::watchdog::WatchdogName;

/// Key of the effect serving the current request (decision call, debug
/// override or backoff delay).
pub const AD_REQUEST: EffectId = EffectId::from_static("ad-request");

type Effects = SmallVec<[Effect<AdAction>; 4]>;

/// Reducer for the ad lifecycle.
pub struct AdReducer<C> {
    _clock: PhantomData<fn() -> C>,
}

impl<C> AdReducer<C> {
    /// Create the reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _clock: PhantomData,
        }
    }
}

impl<C> Default for AdReducer<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Clone for AdReducer<C> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<C> std::fmt::Debug for AdReducer<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdReducer").finish()
    }
}

impl<C: Clock> AdReducer<C> {
    fn publish(env: &AdEnvironment<C>, event: LifecycleEvent) -> Effect<AdAction> {
        publish_event! {
            bus: env.bus,
            event: event
        }
    }

    fn arm(state: &mut AdState, env: &AdEnvironment<C>, name: WatchdogName) -> Effect<AdAction> {
        let duration = match name {
            WatchdogName::Initial => env.config.initial_timeout,
            WatchdogName::ManagerReady => env.config.manager_ready_timeout,
            WatchdogName::Loaded => env.config.loaded_timeout,
        };
        state
            .watchdog
            .arm(name, duration, env.clock.now(), |generation| AdAction::WatchdogExpired {
                name,
                generation,
            })
    }

    fn show(state: &mut AdState, env: &AdEnvironment<C>, effects: &mut Effects) {
        if state.presentation.show() {
            effects.push(PresentationCommand::Show.into_effect(&env.presentation));
        }
    }

    fn teardown_effect(env: &AdEnvironment<C>) -> Effect<AdAction> {
        let engine = Arc::clone(&env.engine);
        async_effect! {
            engine.destroy().await;
            None
        }
    }

    /// Serve `dispatch`, optionally tearing the engine down first.
    fn request_effect(env: &AdEnvironment<C>, dispatch: Dispatch, teardown: bool) -> Effect<AdAction> {
        let engine = teardown.then(|| Arc::clone(&env.engine));
        let ticket = dispatch.ticket();

        let effect = match dispatch {
            Dispatch::Collaborator { .. } => {
                let decision = Arc::clone(&env.decision);
                let request = env.config.decision_request();
                async_effect! {
                    if let Some(engine) = engine {
                        engine.destroy().await;
                    }
                    let result = decision.request_locator(&request).await;
                    Some(AdAction::RequestSettled { ticket, result })
                }
            },
            Dispatch::Override { locator, .. } => {
                tracing::debug!(ticket, locator = %locator, "Serving debug locator");
                async_effect! {
                    if let Some(engine) = engine {
                        engine.destroy().await;
                    }
                    Some(AdAction::RequestSettled { ticket, result: Ok(locator) })
                }
            },
        };

        effect.cancellable(AD_REQUEST)
    }

    fn begin_request(
        state: &mut AdState,
        env: &AdEnvironment<C>,
        origin: RequestOrigin,
        teardown: bool,
        effects: &mut Effects,
    ) {
        match state.pipeline.begin(origin) {
            Ok(dispatch) => {
                AdMetrics::record_request_started(origin.as_str());
                effects.push(Self::request_effect(env, dispatch, teardown));
            },
            Err(error) => {
                tracing::warn!(%error, origin = origin.as_str(), "Request refused");
                if teardown {
                    effects.push(Self::teardown_effect(env));
                }
            },
        }
    }

    /// Pre-fetch the next locator, honoring the backoff policy.
    fn schedule_prefetch(
        state: &mut AdState,
        env: &AdEnvironment<C>,
        teardown: bool,
        effects: &mut Effects,
    ) {
        let failures = state.consecutive_failures;
        match env.config.prefetch_backoff.as_ref() {
            Some(policy) if failures > 0 => {
                if teardown {
                    effects.push(Self::teardown_effect(env));
                }
                let attempts = usize::try_from(failures).unwrap_or(usize::MAX);
                if !policy.allows(attempts) {
                    tracing::warn!(failures, "Pre-fetch abandoned after repeated failures");
                    return;
                }
                let backoff = policy.jittered_delay(attempts - 1);
                tracing::debug!(
                    failures,
                    backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                    "Delaying pre-fetch"
                );
                effects.push(
                    delay! {
                        duration: backoff,
                        action: AdAction::Prefetch
                    }
                    .cancellable(AD_REQUEST),
                );
            },
            _ => Self::begin_request(state, env, RequestOrigin::Prefetch, teardown, effects),
        }
    }

    fn can_prefetch(state: &AdState) -> bool {
        state.phase == LifecyclePhase::Idle
            && !state.pipeline.is_running()
            && state.ready_locator.is_none()
    }

    fn hand_off(state: &mut AdState, env: &AdEnvironment<C>, locator: Locator, effects: &mut Effects) {
        state.session += 1;
        state.engine_active = true;
        let session = state.session;

        tracing::debug!(session, locator = %locator, "Handing locator to the engine");

        effects.push(Self::arm(state, env, WatchdogName::ManagerReady));
        effects.push(Self::publish(
            env,
            events::request_ads(&locator, &env.config.domain, env.clock.now()),
        ));

        let engine = Arc::clone(&env.engine);
        let sink = SignalSink::new(session, env.signals.clone());
        let dimensions = env.config.container_dimensions();
        effects.push(async_effect! {
            match engine.initialize(&locator, dimensions, sink).await {
                Ok(()) => None,
                Err(error) => Some(AdAction::Engine {
                    session,
                    signal: EngineSignal::Error(error),
                }),
            }
        });
    }

    /// Tear down and return to `Idle`.
    fn cancel_cycle(state: &mut AdState, env: &AdEnvironment<C>, effects: &mut Effects) {
        let from = state.phase;
        state.transition(LifecyclePhase::Canceling);

        effects.extend(state.watchdog.disarm_all());
        effects.push(Effect::Cancel { id: AD_REQUEST });

        if state.presentation.hide() {
            effects.push(
                PresentationCommand::Hide(env.config.transition).into_effect(&env.presentation),
            );
        }
        if state.presentation.float_reset() {
            let dimensions = env.config.container_dimensions();
            effects.push(PresentationCommand::FloatReset(dimensions).into_effect(&env.presentation));
            if state.engine_active {
                effects.push(resize_effect(&env.engine, dimensions));
            }
        }

        state.engine_active = false;
        state.pipeline.renew();
        state.ready_locator = None;
        state.cancel_count += 1;
        AdMetrics::record_cancellation();

        tracing::info!(from = %from, cancel_count = state.cancel_count, "Advertisement canceled");
        effects.push(Self::publish(env, events::canceled(&env.config.domain)));

        state.transition(LifecyclePhase::Idle);
        Self::schedule_prefetch(state, env, true, effects);
    }

    fn start(state: &mut AdState, env: &AdEnvironment<C>, effects: &mut Effects) {
        if state.started {
            tracing::warn!("start() called more than once, ignoring");
            return;
        }
        state.started = true;

        effects.push(Self::arm(state, env, WatchdogName::Initial));

        let engine = Arc::clone(&env.engine);
        effects.push(async_effect! {
            match engine.prepare().await {
                Ok(()) => Some(AdAction::LoaderReady),
                Err(error) => Some(AdAction::LoaderFailed { error }),
            }
        });
    }

    fn loader_ready(state: &mut AdState, env: &AdEnvironment<C>, effects: &mut Effects) {
        if state.loader_ready {
            tracing::trace!("Loader already ready");
            return;
        }
        state.loader_ready = true;
        state.presentation.mark_created();

        effects.push(state.watchdog.disarm(WatchdogName::Initial));
        effects.push(Self::publish(env, events::loader_ready(&env.config, env.clock.now())));

        if Self::can_prefetch(state) {
            Self::begin_request(state, env, RequestOrigin::WarmUp, false, effects);
        }
    }

    fn loader_failed(
        state: &mut AdState,
        env: &AdEnvironment<C>,
        error: &RenderError,
        effects: &mut Effects,
    ) {
        tracing::warn!(%error, "Rendering engine failed to load");
        effects.push(Self::publish(env, events::sdk_error(error.to_string())));
        Self::cancel_cycle(state, env, effects);
    }

    fn request_ad(state: &mut AdState, env: &AdEnvironment<C>, effects: &mut Effects) {
        if state.phase != LifecyclePhase::Idle {
            state.rejected_requests += 1;
            AdMetrics::record_request_rejected();
            tracing::warn!(
                phase = %state.phase,
                error = %RequestError::AlreadyInFlight,
                "Ignoring ad request"
            );
            return;
        }

        state.transition(LifecyclePhase::Requesting);

        if let Some(locator) = state.ready_locator.take() {
            tracing::debug!("Playing pre-fetched locator");
            Self::hand_off(state, env, locator, effects);
        } else if state.pipeline.promote() {
            tracing::debug!("Adopting in-flight pre-fetch");
            effects.push(Self::arm(state, env, WatchdogName::ManagerReady));
        } else {
            effects.push(Self::arm(state, env, WatchdogName::ManagerReady));
            Self::begin_request(state, env, RequestOrigin::Play, false, effects);
        }
    }

    fn request_settled(
        state: &mut AdState,
        env: &AdEnvironment<C>,
        ticket: u64,
        result: Result<Locator, RequestError>,
        effects: &mut Effects,
    ) {
        let Some(Settled {
            origin,
            result,
            elapsed,
        }) = state.pipeline.settle(ticket, result)
        else {
            return;
        };

        match result {
            Ok(locator) => {
                state.consecutive_failures = 0;
                AdMetrics::record_request_resolved(elapsed);

                if origin == RequestOrigin::Play && state.phase == LifecyclePhase::Requesting {
                    Self::hand_off(state, env, locator, effects);
                } else {
                    tracing::debug!(ticket, origin = origin.as_str(), "Pre-fetched locator ready");
                    state.ready_locator = Some(locator);
                }
            },
            Err(error) => {
                state.consecutive_failures = state.consecutive_failures.saturating_add(1);
                AdMetrics::record_request_failed(state.consecutive_failures);
                tracing::warn!(
                    %error,
                    ticket,
                    origin = origin.as_str(),
                    failures = state.consecutive_failures,
                    "Ad request failed"
                );
                effects.push(Self::publish(env, events::sdk_error(error.to_string())));

                if state.phase == LifecyclePhase::Requesting || origin == RequestOrigin::WarmUp {
                    Self::cancel_cycle(state, env, effects);
                } else if env.config.prefetch_backoff.is_some() {
                    Self::schedule_prefetch(state, env, false, effects);
                }
            },
        }
    }

    fn engine_signal(
        state: &mut AdState,
        env: &AdEnvironment<C>,
        session: u64,
        signal: EngineSignal,
        effects: &mut Effects,
    ) {
        if session != state.session || !state.engine_active {
            tracing::trace!(session, live = state.session, "Ignoring signal from a stale session");
            return;
        }

        if let EngineSignal::Error(error) = &signal {
            tracing::warn!(session, code = error.code, message = %error.message, "Engine reported an error");
            effects.push(Self::publish(env, events::render_error(error)));
            Self::cancel_cycle(state, env, effects);
            return;
        }

        let now = env.clock.now();
        effects.push(Self::publish(
            env,
            events::engine_signal(&signal, &env.config.domain, now),
        ));

        if signal.is_terminal() {
            if state.phase == LifecyclePhase::Playing {
                state.transition(LifecyclePhase::Completed);
            }
            effects.push(Self::publish(env, events::finished(&env.config.domain, now)));
            Self::cancel_cycle(state, env, effects);
            return;
        }

        match signal {
            EngineSignal::Ready if state.phase == LifecyclePhase::Requesting => {
                effects.push(state.watchdog.disarm(WatchdogName::ManagerReady));
                Self::show(state, env, effects);
                state.transition(LifecyclePhase::Loaded);
            },
            EngineSignal::Loaded { .. }
                if matches!(state.phase, LifecyclePhase::Requesting | LifecyclePhase::Loaded) =>
            {
                effects.push(state.watchdog.disarm(WatchdogName::ManagerReady));
                effects.push(Self::arm(state, env, WatchdogName::Loaded));
                state.transition(LifecyclePhase::Loaded);
            },
            EngineSignal::ContentPauseRequested
                if matches!(
                    state.phase,
                    LifecyclePhase::Requesting | LifecyclePhase::Loaded | LifecyclePhase::Playing
                ) =>
            {
                Self::show(state, env, effects);
            },
            EngineSignal::Started
                if matches!(state.phase, LifecyclePhase::Requesting | LifecyclePhase::Loaded) =>
            {
                effects.push(state.watchdog.disarm(WatchdogName::ManagerReady));
                effects.push(state.watchdog.disarm(WatchdogName::Loaded));
                Self::show(state, env, effects);
                state.transition(LifecyclePhase::Playing);
            },
            _ => {},
        }
    }

    fn watchdog_expired(
        state: &mut AdState,
        env: &AdEnvironment<C>,
        name: WatchdogName,
        generation: u64,
        effects: &mut Effects,
    ) {
        let Some(timer) = state.watchdog.expire(name, generation) else {
            return;
        };

        tracing::warn!(
            watchdog = %name,
            phase = %state.phase,
            duration_ms = u64::try_from(timer.duration.as_millis()).unwrap_or(u64::MAX),
            "Watchdog expired"
        );
        AdMetrics::record_watchdog_expired(name.as_str());

        effects.push(Self::publish(env, events::safety_timer(&env.config.domain)));
        Self::cancel_cycle(state, env, effects);
    }

    fn float(state: &mut AdState, env: &AdEnvironment<C>, floating: bool, effects: &mut Effects) {
        let (changed, dimensions) = if floating {
            (state.presentation.float_start(), env.config.float_dimensions())
        } else {
            (state.presentation.float_reset(), env.config.container_dimensions())
        };
        if !changed {
            tracing::trace!(floating, "Float state unchanged");
            return;
        }

        let command = if floating {
            PresentationCommand::FloatStart(dimensions)
        } else {
            PresentationCommand::FloatReset(dimensions)
        };
        effects.push(command.into_effect(&env.presentation));
        if state.engine_active {
            effects.push(resize_effect(&env.engine, dimensions));
        }
    }
}

impl<C: Clock> Reducer for AdReducer<C> {
    type State = AdState;
    type Action = AdAction;
    type Environment = AdEnvironment<C>;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        tracing::trace!(action = action.name(), phase = %state.phase, "Reducing");
        let mut effects = Effects::new();

        match action {
            AdAction::Start => Self::start(state, env, &mut effects),
            AdAction::LoaderReady => Self::loader_ready(state, env, &mut effects),
            AdAction::LoaderFailed { error } => Self::loader_failed(state, env, &error, &mut effects),
            AdAction::RequestAd => Self::request_ad(state, env, &mut effects),
            AdAction::Prefetch => {
                if Self::can_prefetch(state) {
                    Self::begin_request(state, env, RequestOrigin::Prefetch, false, &mut effects);
                }
            },
            AdAction::RequestSettled { ticket, result } => {
                Self::request_settled(state, env, ticket, result, &mut effects);
            },
            AdAction::Engine { session, signal } => {
                Self::engine_signal(state, env, session, signal, &mut effects);
            },
            AdAction::WatchdogExpired { name, generation } => {
                Self::watchdog_expired(state, env, name, generation, &mut effects);
            },
            AdAction::Cancel => Self::cancel_cycle(state, env, &mut effects),
            AdAction::FloatStart => Self::float(state, env, true, &mut effects),
            AdAction::FloatReset => Self::float(state, env, false, &mut effects),
            AdAction::SetDebugLocator(locator) => {
                tracing::info!(enabled = locator.is_some(), "Debug locator updated");
                state.pipeline.set_override(locator);
            },
        }

        effects.retain(|effect| !effect.is_none());
        if effects.is_empty() {
            effects.push(Effect::None);
        }
        effects
    }
}
