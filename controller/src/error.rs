//! Errors surfaced by the [`AdController`](crate::AdController) facade.
//!
//! Request, render and timeout failures inside the lifecycle never reach the
//! caller as errors: they are published on the event bus and drive the
//! cancel cycle. What is left here is what a caller can act on directly.

use outstream_core::decision::RequestError;
use outstream_runtime::StoreError;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by [`AdController`](crate::AdController) methods.
#[derive(Error, Debug)]
pub enum ControllerError {
    /// The underlying store rejected the action
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The awaited request settled with an error
    #[error(transparent)]
    Request(#[from] RequestError),

    /// `show_advertisement` was called again before the configured interval
    #[error("Too soon to show another advertisement, retry in {remaining:?}")]
    TooSoon {
        /// Time left until the next call is allowed
        remaining: Duration,
    },
}
