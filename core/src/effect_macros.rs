//! Declarative macros for ergonomic effect construction
//!
//! These macros reduce boilerplate when creating `Effect` variants in reducers.

/// Create an `Effect::PublishEvent` that broadcasts a lifecycle event
///
/// # Example
///
/// ```rust,ignore
/// use outstream_core::publish_event;
///
/// publish_event! {
///     bus: env.bus,
///     event: LifecycleEvent::warning(LifecycleTopic::AdCanceled, "Advertisement has been canceled.")
/// }
/// ```
#[macro_export]
macro_rules! publish_event {
    (
        bus: $bus:expr,
        event: $event:expr
    ) => {
        $crate::effect::Effect::PublishEvent {
            bus: ::std::sync::Arc::clone(&$bus),
            event: $event,
        }
    };
}

/// Create an `Effect::Future` from an async block
///
/// # Example
///
/// ```rust,ignore
/// use outstream_core::async_effect;
///
/// async_effect! {
///     engine.destroy().await;
///     None
/// }
/// ```
#[macro_export]
macro_rules! async_effect {
    ($($body:tt)*) => {
        $crate::effect::Effect::Future(
            ::std::boxed::Box::pin(async move { $($body)* })
        )
    };
}

/// Create an `Effect::Delay` for scheduling delayed actions
///
/// # Example
///
/// ```rust,ignore
/// use outstream_core::delay;
/// use std::time::Duration;
///
/// delay! {
///     duration: Duration::from_secs(8),
///     action: AdAction::Prefetch
/// }
/// ```
#[macro_export]
macro_rules! delay {
    (
        duration: $duration:expr,
        action: $action:expr
    ) => {
        $crate::effect::Effect::Delay {
            duration: $duration,
            action: ::std::boxed::Box::new($action),
        }
    };
}

/// Wrap an effect so it can later be aborted with `Effect::Cancel`
///
/// # Example
///
/// ```rust,ignore
/// use outstream_core::{cancellable, delay};
///
/// cancellable! {
///     id: EffectId::from_static("prefetch-backoff"),
///     effect: delay! { duration: backoff, action: AdAction::Prefetch }
/// }
/// ```
#[macro_export]
macro_rules! cancellable {
    (
        id: $id:expr,
        effect: $effect:expr
    ) => {
        $crate::effect::Effect::Cancellable {
            id: $id,
            effect: ::std::boxed::Box::new($effect),
        }
    };
}
