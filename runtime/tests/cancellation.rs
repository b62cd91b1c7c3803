//! Integration tests for keyed cancellable effects
//!
//! Exercises the pattern the ad controller relies on: a named timeout that
//! is armed when work starts, re-armed as the work progresses and cancelled
//! once it finishes, racing with the work's own completion.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use outstream_core::{
    SmallVec,
    effect::{Effect, EffectId},
    reducer::Reducer,
    smallvec,
};
use outstream_runtime::{Store, StoreError};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Test Fixtures
// ============================================================================

const TIMEOUT: EffectId = EffectId::from_static("job-timeout");
const WORK: EffectId = EffectId::from_static("job-work");

#[derive(Debug, Clone, PartialEq)]
enum TestAction {
    /// Start a job that takes `work_ms`, guarded by a `timeout_ms` timer
    StartJob { id: u64, work_ms: u64, timeout_ms: u64 },
    /// Job made progress, re-arm the timer
    Progress { id: u64 },
    /// Job finished
    JobDone { id: u64 },
    /// Timer fired
    TimedOut { id: u64 },
    /// Abandon the job
    Abort,
}

#[derive(Debug, Clone, Default)]
struct TestState {
    running: Option<u64>,
    done: Vec<u64>,
    timed_out: Vec<u64>,
    timeout_ms: u64,
}

#[derive(Clone)]
struct TestEnvironment;

#[derive(Clone)]
struct TestReducer;

fn timer(id: u64, timeout_ms: u64) -> Effect<TestAction> {
    Effect::Delay {
        duration: Duration::from_millis(timeout_ms),
        action: Box::new(TestAction::TimedOut { id }),
    }
    .cancellable(TIMEOUT)
}

impl Reducer for TestReducer {
    type State = TestState;
    type Action = TestAction;
    type Environment = TestEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        _env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            TestAction::StartJob { id, work_ms, timeout_ms } => {
                state.running = Some(id);
                state.timeout_ms = timeout_ms;
                smallvec![
                    timer(id, timeout_ms),
                    Effect::Future(Box::pin(async move {
                        tokio::time::sleep(Duration::from_millis(work_ms)).await;
                        Some(TestAction::JobDone { id })
                    }))
                    .cancellable(WORK),
                ]
            },
            TestAction::Progress { id } => {
                if state.running == Some(id) {
                    smallvec![timer(id, state.timeout_ms)]
                } else {
                    smallvec![Effect::None]
                }
            },
            TestAction::JobDone { id } => {
                if state.running != Some(id) {
                    return smallvec![Effect::None];
                }
                state.running = None;
                state.done.push(id);
                smallvec![Effect::Cancel { id: TIMEOUT }]
            },
            TestAction::TimedOut { id } => {
                if state.running != Some(id) {
                    return smallvec![Effect::None];
                }
                state.running = None;
                state.timed_out.push(id);
                smallvec![Effect::Cancel { id: WORK }]
            },
            TestAction::Abort => {
                state.running = None;
                smallvec![Effect::Cancel { id: TIMEOUT }, Effect::Cancel { id: WORK }]
            },
        }
    }
}

fn store() -> Store<TestState, TestAction, TestEnvironment, TestReducer> {
    Store::new(TestState::default(), TestReducer, TestEnvironment)
}

// ============================================================================
// Tests
// ============================================================================

/// Work that beats its timer cancels the timer
#[tokio::test]
async fn test_work_finishing_first_cancels_timer() {
    let store = store();

    let done = store
        .send_and_wait_for(
            TestAction::StartJob { id: 1, work_ms: 10, timeout_ms: 200 },
            |a| matches!(a, TestAction::JobDone { .. }),
            Duration::from_secs(1),
        )
        .await
        .unwrap();
    assert_eq!(done, TestAction::JobDone { id: 1 });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(store.live_cancellables().is_empty());

    tokio::time::sleep(Duration::from_millis(250)).await;
    let (done, timed_out) = store.state(|s| (s.done.clone(), s.timed_out.clone())).await;
    assert_eq!(done, vec![1]);
    assert!(timed_out.is_empty());
}

/// A timer that fires first aborts the work
#[tokio::test]
async fn test_timer_firing_first_aborts_work() {
    let store = store();

    let fired = store
        .send_and_wait_for(
            TestAction::StartJob { id: 2, work_ms: 300, timeout_ms: 20 },
            |a| matches!(a, TestAction::TimedOut { .. }),
            Duration::from_secs(1),
        )
        .await
        .unwrap();
    assert_eq!(fired, TestAction::TimedOut { id: 2 });

    tokio::time::sleep(Duration::from_millis(350)).await;
    let (done, timed_out) = store.state(|s| (s.done.clone(), s.timed_out.clone())).await;
    assert!(done.is_empty());
    assert_eq!(timed_out, vec![2]);
}

/// Progress keeps pushing the deadline out
#[tokio::test]
async fn test_progress_rearms_timer() {
    let store = store();

    store
        .send(TestAction::StartJob { id: 3, work_ms: 150, timeout_ms: 60 })
        .await
        .unwrap();

    for _ in 0..4 {
        tokio::time::sleep(Duration::from_millis(30)).await;
        store.send(TestAction::Progress { id: 3 }).await.unwrap();
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    let (done, timed_out) = store.state(|s| (s.done.clone(), s.timed_out.clone())).await;
    assert_eq!(done, vec![3]);
    assert!(timed_out.is_empty());
}

/// Abort leaves nothing behind
#[tokio::test]
async fn test_abort_cancels_everything() {
    let store = store();

    store
        .send(TestAction::StartJob { id: 4, work_ms: 50, timeout_ms: 50 })
        .await
        .unwrap();
    assert_eq!(store.live_cancellables(), vec![TIMEOUT, WORK]);

    store.send(TestAction::Abort).await.unwrap();
    assert!(store.live_cancellables().is_empty());

    tokio::time::sleep(Duration::from_millis(100)).await;
    let (done, timed_out) = store.state(|s| (s.done.clone(), s.timed_out.clone())).await;
    assert!(done.is_empty());
    assert!(timed_out.is_empty());
}

/// Restarting from many tasks at once still leaves one live timer
#[tokio::test]
async fn test_concurrent_rearm_keeps_single_entry() {
    let store = Arc::new(store());
    store
        .send(TestAction::StartJob { id: 5, work_ms: 10_000, timeout_ms: 10_000 })
        .await
        .unwrap();

    let sends = (0..16).map(|_| {
        let store = Arc::clone(&store);
        async move { store.send(TestAction::Progress { id: 5 }).await.map(|_| ()) }
    });
    let results = futures::future::join_all(sends).await;
    assert!(results.iter().all(Result::is_ok));

    assert_eq!(store.live_cancellables(), vec![TIMEOUT, WORK]);

    store.shutdown(Duration::from_secs(1)).await.unwrap();
    assert!(store.live_cancellables().is_empty());
}

/// Shutdown rejects further actions
#[test]
fn test_send_after_shutdown_is_rejected() {
    tokio_test::block_on(async {
        let store = store();
        store.shutdown(Duration::from_millis(100)).await.unwrap();
        let result = store.send(TestAction::Abort).await;
        assert!(matches!(result, Err(StoreError::ShutdownInProgress)));
    });
}
