//! Ad-decision collaborator contract.
//!
//! The decision collaborator turns a targeting request into a [`Locator`]:
//! an opaque string identifying one ad response, passed to the rendering
//! engine unchanged. How the decision is made (header bidding, an ad server
//! round trip, a static tag) is outside this crate.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Key/value targeting parameters sent with a decision request.
pub type Targeting = BTreeMap<String, String>;

/// Opaque identifier of an ad response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locator(String);

impl Locator {
    /// Wrap a locator string.
    #[must_use]
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    /// The locator string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the locator is empty (or only whitespace).
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Locator {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Locator {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A request for a single ad decision.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DecisionRequest {
    /// Ad unit / tag identifier
    pub tag: String,
    /// Targeting parameters
    pub targeting: Targeting,
}

impl DecisionRequest {
    /// Create a request for `tag` with no targeting.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            targeting: Targeting::new(),
        }
    }

    /// Add a targeting parameter.
    #[must_use]
    pub fn with_targeting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.targeting.insert(key.into(), value.into());
        self
    }
}

/// Errors from the request pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// A request is already running; try again later.
    ///
    /// This is a warning, never a reason to tear anything down.
    #[error("An ad request is already in flight")]
    AlreadyInFlight,

    /// The decision collaborator was unreachable or refused the request
    #[error("Ad decision failed: {0}")]
    Decision(String),

    /// The decision collaborator answered with something unusable
    #[error("Malformed ad decision: {0}")]
    Malformed(String),

    /// The request was abandoned by a cancel cycle
    #[error("Ad request canceled")]
    Canceled,
}

impl RequestError {
    /// Whether this error should be treated as "try later" rather than a failure.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::AlreadyInFlight)
    }
}

/// Future returned by [`AdDecision::request_locator`].
pub type DecisionFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Locator, RequestError>> + Send + 'a>>;

/// The ad-decision collaborator.
///
/// Implementations must not borrow `request` in the returned future; clone
/// what they need.
///
/// # Example
///
/// ```ignore
/// struct StaticTag(Locator);
///
/// impl AdDecision for StaticTag {
///     fn request_locator(&self, _request: &DecisionRequest) -> DecisionFuture<'_> {
///         let locator = self.0.clone();
///         Box::pin(async move { Ok(locator) })
///     }
/// }
/// ```
pub trait AdDecision: Send + Sync {
    /// Resolve `request` into a locator.
    fn request_locator(&self, request: &DecisionRequest) -> DecisionFuture<'_>;
}
