//! Scriptable collaborators for controller tests
//!
//! Deterministic stand-ins for the three collaborators the controller drives:
//! - [`ScriptedDecision`]: replies to decision requests from a script
//! - [`MockEngine`]: records sessions and lets the test emit engine signals
//! - [`RecordingPresentation`]: records every container call

#![allow(clippy::missing_panics_doc)] // Poisoned locks are recovered, nothing here panics

use outstream_core::decision::{AdDecision, DecisionFuture, DecisionRequest, Locator, RequestError};
use outstream_core::engine::{
    EngineFuture, EngineSignal, RenderError, RenderingEngine, SignalSink, SlotDimensions,
};
use outstream_core::presentation::Presentation;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Decision
// ============================================================================

/// How [`ScriptedDecision`] answers one request.
#[derive(Debug, Clone)]
pub enum DecisionReply {
    /// Resolve immediately with the locator
    Locator(Locator),
    /// Fail immediately
    Fail(RequestError),
    /// Never answer
    Hang,
    /// Resolve with the locator once the test calls [`ScriptedDecision::release`]
    Held(Locator),
}

/// Decision collaborator that answers from a script.
///
/// Scripted replies are consumed in order; once the script runs out every
/// request gets the fallback reply.
///
/// # Example
///
/// ```
/// use outstream_testing::{DecisionReply, ScriptedDecision};
/// use outstream_core::decision::{Locator, RequestError};
///
/// let decision = ScriptedDecision::always(Locator::new("vast-1"))
///     .then(DecisionReply::Fail(RequestError::Decision("timeout".into())));
/// assert_eq!(decision.calls(), 0);
/// ```
#[derive(Debug)]
pub struct ScriptedDecision {
    script: Mutex<VecDeque<DecisionReply>>,
    fallback: Mutex<DecisionReply>,
    calls: AtomicUsize,
    requests: Mutex<Vec<DecisionRequest>>,
    gate: Arc<Semaphore>,
}

impl ScriptedDecision {
    fn with_fallback(fallback: DecisionReply) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(fallback),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            gate: Arc::new(Semaphore::new(0)),
        }
    }

    /// Always resolve with `locator`.
    #[must_use]
    pub fn always(locator: Locator) -> Self {
        Self::with_fallback(DecisionReply::Locator(locator))
    }

    /// Always fail with `error`.
    #[must_use]
    pub fn failing(error: RequestError) -> Self {
        Self::with_fallback(DecisionReply::Fail(error))
    }

    /// Never answer.
    #[must_use]
    pub fn hanging() -> Self {
        Self::with_fallback(DecisionReply::Hang)
    }

    /// Hold every answer until released.
    #[must_use]
    pub fn held(locator: Locator) -> Self {
        Self::with_fallback(DecisionReply::Held(locator))
    }

    /// Queue a reply ahead of the fallback (builder form).
    #[must_use]
    pub fn then(self, reply: DecisionReply) -> Self {
        self.push(reply);
        self
    }

    /// Queue a reply ahead of the fallback.
    pub fn push(&self, reply: DecisionReply) {
        lock(&self.script).push_back(reply);
    }

    /// Replace the fallback reply.
    pub fn set_fallback(&self, reply: DecisionReply) {
        *lock(&self.fallback) = reply;
    }

    /// Let `count` held requests resolve.
    pub fn release(&self, count: usize) {
        self.gate.add_permits(count);
    }

    /// Number of requests received.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received, oldest first.
    #[must_use]
    pub fn requests(&self) -> Vec<DecisionRequest> {
        lock(&self.requests).clone()
    }
}

impl AdDecision for ScriptedDecision {
    fn request_locator(&self, request: &DecisionRequest) -> DecisionFuture<'_> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.requests).push(request.clone());

        let reply = lock(&self.script)
            .pop_front()
            .unwrap_or_else(|| lock(&self.fallback).clone());
        let gate = Arc::clone(&self.gate);

        Box::pin(async move {
            match reply {
                DecisionReply::Locator(locator) => Ok(locator),
                DecisionReply::Fail(error) => Err(error),
                DecisionReply::Hang => futures::future::pending().await,
                DecisionReply::Held(locator) => match gate.acquire().await {
                    Ok(permit) => {
                        permit.forget();
                        Ok(locator)
                    },
                    Err(_) => Err(RequestError::Canceled),
                },
            }
        })
    }
}

// ============================================================================
// Engine
// ============================================================================

/// What [`MockEngine::prepare`](RenderingEngine::prepare) does.
#[derive(Debug, Clone)]
pub enum PrepareBehavior {
    /// Succeed immediately
    Ready,
    /// Fail immediately
    Fail(RenderError),
    /// Never finish
    Hang,
}

/// Rendering engine that records calls and emits signals on demand.
///
/// Every successful [`initialize`](RenderingEngine::initialize) opens a
/// session; [`emit`](Self::emit) sends to the most recent one, the way a real
/// engine only talks through its current ads manager.
#[derive(Debug)]
pub struct MockEngine {
    prepare: Mutex<PrepareBehavior>,
    initialize_error: Mutex<Option<RenderError>>,
    auto_signals: Mutex<Vec<EngineSignal>>,
    sinks: Mutex<Vec<SignalSink>>,
    locators: Mutex<Vec<Locator>>,
    resizes: Mutex<Vec<SlotDimensions>>,
    prepares: AtomicUsize,
    destroys: AtomicUsize,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    /// An engine whose `prepare` succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self {
            prepare: Mutex::new(PrepareBehavior::Ready),
            initialize_error: Mutex::new(None),
            auto_signals: Mutex::new(Vec::new()),
            sinks: Mutex::new(Vec::new()),
            locators: Mutex::new(Vec::new()),
            resizes: Mutex::new(Vec::new()),
            prepares: AtomicUsize::new(0),
            destroys: AtomicUsize::new(0),
        }
    }

    /// Set what `prepare` does (builder form).
    #[must_use]
    pub fn with_prepare(self, behavior: PrepareBehavior) -> Self {
        *lock(&self.prepare) = behavior;
        self
    }

    /// Emit `signals` on every new session right after it is initialized.
    #[must_use]
    pub fn with_auto_signals(self, signals: Vec<EngineSignal>) -> Self {
        *lock(&self.auto_signals) = signals;
        self
    }

    /// Make the next `initialize` calls fail with `error` (`None` to succeed again).
    pub fn fail_initialize(&self, error: Option<RenderError>) {
        *lock(&self.initialize_error) = error;
    }

    /// Emit `signal` on the most recent session.
    ///
    /// Returns `false` when no session exists or the controller is gone.
    pub fn emit(&self, signal: EngineSignal) -> bool {
        lock(&self.sinks)
            .last()
            .is_some_and(|sink| sink.emit(signal))
    }

    /// Emit `signal` on a specific session, live or not.
    pub fn emit_to(&self, session: u64, signal: EngineSignal) -> bool {
        lock(&self.sinks)
            .iter()
            .find(|sink| sink.session() == session)
            .is_some_and(|sink| sink.emit(signal))
    }

    /// Sessions opened so far, oldest first.
    #[must_use]
    pub fn sessions(&self) -> Vec<u64> {
        lock(&self.sinks).iter().map(SignalSink::session).collect()
    }

    /// The most recent session.
    #[must_use]
    pub fn latest_session(&self) -> Option<u64> {
        lock(&self.sinks).last().map(SignalSink::session)
    }

    /// Locators passed to `initialize`, oldest first.
    #[must_use]
    pub fn initialized_locators(&self) -> Vec<Locator> {
        lock(&self.locators).clone()
    }

    /// Dimensions passed to `resize`, oldest first.
    #[must_use]
    pub fn resizes(&self) -> Vec<SlotDimensions> {
        lock(&self.resizes).clone()
    }

    /// Number of `prepare` calls.
    #[must_use]
    pub fn prepare_count(&self) -> usize {
        self.prepares.load(Ordering::SeqCst)
    }

    /// Number of `destroy` calls.
    #[must_use]
    pub fn destroy_count(&self) -> usize {
        self.destroys.load(Ordering::SeqCst)
    }
}

impl RenderingEngine for MockEngine {
    fn prepare(&self) -> EngineFuture<'_, Result<(), RenderError>> {
        self.prepares.fetch_add(1, Ordering::SeqCst);
        let behavior = lock(&self.prepare).clone();
        Box::pin(async move {
            match behavior {
                PrepareBehavior::Ready => Ok(()),
                PrepareBehavior::Fail(error) => Err(error),
                PrepareBehavior::Hang => futures::future::pending().await,
            }
        })
    }

    fn initialize(
        &self,
        locator: &Locator,
        _dimensions: SlotDimensions,
        sink: SignalSink,
    ) -> EngineFuture<'_, Result<(), RenderError>> {
        lock(&self.locators).push(locator.clone());

        let result = match lock(&self.initialize_error).clone() {
            Some(error) => Err(error),
            None => {
                for signal in lock(&self.auto_signals).iter().cloned() {
                    sink.emit(signal);
                }
                lock(&self.sinks).push(sink);
                Ok(())
            },
        };
        Box::pin(async move { result })
    }

    fn resize(&self, dimensions: SlotDimensions) {
        lock(&self.resizes).push(dimensions);
    }

    fn destroy(&self) -> EngineFuture<'_, ()> {
        self.destroys.fetch_add(1, Ordering::SeqCst);
        Box::pin(async {})
    }
}

// ============================================================================
// Presentation
// ============================================================================

/// One call made on a [`RecordingPresentation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentationCall {
    /// `show()`
    Show,
    /// `hide(transition)`
    Hide(Duration),
    /// `float_start(dimensions)`
    FloatStart(SlotDimensions),
    /// `float_reset(dimensions)`
    FloatReset(SlotDimensions),
}

/// Presentation that records every call.
#[derive(Debug, Default)]
pub struct RecordingPresentation {
    calls: Mutex<Vec<PresentationCall>>,
}

impl RecordingPresentation {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All calls, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<PresentationCall> {
        lock(&self.calls).clone()
    }

    /// Number of `show()` calls.
    #[must_use]
    pub fn shows(&self) -> usize {
        self.count(|call| matches!(call, PresentationCall::Show))
    }

    /// Number of `hide()` calls.
    #[must_use]
    pub fn hides(&self) -> usize {
        self.count(|call| matches!(call, PresentationCall::Hide(_)))
    }

    fn count(&self, predicate: impl Fn(&PresentationCall) -> bool) -> usize {
        lock(&self.calls).iter().filter(|call| predicate(call)).count()
    }
}

impl Presentation for RecordingPresentation {
    fn show(&self) {
        lock(&self.calls).push(PresentationCall::Show);
    }

    fn hide(&self, transition: Duration) {
        lock(&self.calls).push(PresentationCall::Hide(transition));
    }

    fn float_start(&self, dimensions: SlotDimensions) {
        lock(&self.calls).push(PresentationCall::FloatStart(dimensions));
    }

    fn float_reset(&self, dimensions: SlotDimensions) {
        lock(&self.calls).push(PresentationCall::FloatReset(dimensions));
    }
}
