//! Lifecycle topics and the events broadcast on them.
//!
//! Every observable transition of the controller is published as a
//! [`LifecycleEvent`] under a [`LifecycleTopic`]. Topics form a closed set;
//! their string form (`AD_SDK_LOADER_READY`, `STARTED`, ...) is the stable
//! vocabulary observers and analytics pipelines key on, and is what
//! [`LifecycleTopic::as_str`] and the serde representation produce.
//!
//! # Example
//!
//! ```
//! use outstream_core::event::{LifecycleEvent, LifecycleTopic, Severity};
//!
//! let event = LifecycleEvent::warning(
//!     LifecycleTopic::AdSafetyTimer,
//!     "Advertisement took too long to load.",
//! );
//! assert_eq!(event.topic().as_str(), "AD_SAFETY_TIMER");
//! assert_eq!(event.severity(), Severity::Warning);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when parsing an unknown topic name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown lifecycle topic: {0}")]
pub struct UnknownTopic(pub String);

/// The closed set of topics the controller publishes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleTopic {
    /// The rendering engine's loader is ready to accept ad requests
    AdSdkLoaderReady,
    /// The rendering engine accepted a locator and is ready to play it
    AdSdkManagerReady,
    /// A locator was handed to the rendering engine
    AdSdkRequestAds,
    /// The ad-decision collaborator (or loader) failed
    AdSdkError,
    /// Playback finished normally; the controller is ready for new requests
    AdSdkFinished,
    /// The cancel cycle ran; the controller is back to idle
    AdCanceled,
    /// The rendering engine reported an error
    AdError,
    /// A watchdog timer expired
    AdSafetyTimer,
    /// An ad break would have played
    AdBreakReady,
    /// The ads list was loaded
    AdMetadata,
    /// The engine is done playing all ads
    AllAdsCompleted,
    /// The ad was clicked
    Click,
    /// The ad completed playing
    Complete,
    /// Host content should pause
    ContentPauseRequested,
    /// Host content should resume
    ContentResumeRequested,
    /// The ad's duration changed
    DurationChange,
    /// Playhead crossed the first quartile
    FirstQuartile,
    /// The impression was recorded
    Impression,
    /// The ad triggered an interaction callback
    Interaction,
    /// The ad switched between linear and non-linear
    LinearChanged,
    /// The ad creative was loaded
    Loaded,
    /// Non-fatal engine diagnostics
    Log,
    /// Playhead crossed the midpoint
    Midpoint,
    /// The ad was paused
    Paused,
    /// The ad was resumed
    Resumed,
    /// The ad's skippable state changed
    SkippableStateChanged,
    /// The user skipped the ad
    Skipped,
    /// The ad started playing
    Started,
    /// Playhead crossed the third quartile
    ThirdQuartile,
    /// The user closed the ad
    UserClose,
    /// The ad volume changed
    VolumeChanged,
    /// The ad was muted
    VolumeMuted,
}

impl LifecycleTopic {
    /// Every topic, in declaration order.
    pub const ALL: [LifecycleTopic; 32] = [
        Self::AdSdkLoaderReady,
        Self::AdSdkManagerReady,
        Self::AdSdkRequestAds,
        Self::AdSdkError,
        Self::AdSdkFinished,
        Self::AdCanceled,
        Self::AdError,
        Self::AdSafetyTimer,
        Self::AdBreakReady,
        Self::AdMetadata,
        Self::AllAdsCompleted,
        Self::Click,
        Self::Complete,
        Self::ContentPauseRequested,
        Self::ContentResumeRequested,
        Self::DurationChange,
        Self::FirstQuartile,
        Self::Impression,
        Self::Interaction,
        Self::LinearChanged,
        Self::Loaded,
        Self::Log,
        Self::Midpoint,
        Self::Paused,
        Self::Resumed,
        Self::SkippableStateChanged,
        Self::Skipped,
        Self::Started,
        Self::ThirdQuartile,
        Self::UserClose,
        Self::VolumeChanged,
        Self::VolumeMuted,
    ];

    /// The stable wire name of this topic.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AdSdkLoaderReady => "AD_SDK_LOADER_READY",
            Self::AdSdkManagerReady => "AD_SDK_MANAGER_READY",
            Self::AdSdkRequestAds => "AD_SDK_REQUEST_ADS",
            Self::AdSdkError => "AD_SDK_ERROR",
            Self::AdSdkFinished => "AD_SDK_FINISHED",
            Self::AdCanceled => "AD_CANCELED",
            Self::AdError => "AD_ERROR",
            Self::AdSafetyTimer => "AD_SAFETY_TIMER",
            Self::AdBreakReady => "AD_BREAK_READY",
            Self::AdMetadata => "AD_METADATA",
            Self::AllAdsCompleted => "ALL_ADS_COMPLETED",
            Self::Click => "CLICK",
            Self::Complete => "COMPLETE",
            Self::ContentPauseRequested => "CONTENT_PAUSE_REQUESTED",
            Self::ContentResumeRequested => "CONTENT_RESUME_REQUESTED",
            Self::DurationChange => "DURATION_CHANGE",
            Self::FirstQuartile => "FIRST_QUARTILE",
            Self::Impression => "IMPRESSION",
            Self::Interaction => "INTERACTION",
            Self::LinearChanged => "LINEAR_CHANGED",
            Self::Loaded => "LOADED",
            Self::Log => "LOG",
            Self::Midpoint => "MIDPOINT",
            Self::Paused => "PAUSED",
            Self::Resumed => "RESUMED",
            Self::SkippableStateChanged => "SKIPPABLE_STATE_CHANGED",
            Self::Skipped => "SKIPPED",
            Self::Started => "STARTED",
            Self::ThirdQuartile => "THIRD_QUARTILE",
            Self::UserClose => "USER_CLOSE",
            Self::VolumeChanged => "VOLUME_CHANGED",
            Self::VolumeMuted => "VOLUME_MUTED",
        }
    }

    /// Topics the controller itself originates (as opposed to relayed engine signals).
    #[must_use]
    pub const fn is_controller_topic(self) -> bool {
        matches!(
            self,
            Self::AdSdkLoaderReady
                | Self::AdSdkManagerReady
                | Self::AdSdkRequestAds
                | Self::AdSdkError
                | Self::AdSdkFinished
                | Self::AdCanceled
                | Self::AdError
                | Self::AdSafetyTimer
        )
    }
}

impl fmt::Display for LifecycleTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleTopic {
    type Err = UnknownTopic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|topic| topic.as_str() == s)
            .ok_or_else(|| UnknownTopic(s.to_string()))
    }
}

/// Outcome class of an event, used by observers to pick a log level or UI treatment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Normal progress
    Success,
    /// Recoverable problem (timeouts, cancellations, engine errors)
    Warning,
    /// Collaborator failure
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Warning => f.write_str("warning"),
            Self::Error => f.write_str("error"),
        }
    }
}

/// Analytics classification attached to an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsTag {
    /// Event category
    pub category: String,
    /// Event action
    pub action: String,
    /// Event label
    pub label: String,
}

impl AnalyticsTag {
    /// Create a tag from its three parts.
    #[must_use]
    pub fn new(
        category: impl Into<String>,
        action: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            action: action.into(),
            label: label.into(),
        }
    }
}

/// An immutable lifecycle event.
///
/// Events are built once by the controller and handed to observers by
/// reference; there is no way to mutate one after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    topic: LifecycleTopic,
    message: serde_json::Value,
    severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    analytics: Option<AnalyticsTag>,
}

impl LifecycleEvent {
    /// Create an event with an explicit severity.
    #[must_use]
    pub fn new(
        topic: LifecycleTopic,
        message: impl Into<serde_json::Value>,
        severity: Severity,
    ) -> Self {
        Self {
            topic,
            message: message.into(),
            severity,
            analytics: None,
        }
    }

    /// Create a [`Severity::Success`] event.
    #[must_use]
    pub fn success(topic: LifecycleTopic, message: impl Into<serde_json::Value>) -> Self {
        Self::new(topic, message, Severity::Success)
    }

    /// Create a [`Severity::Warning`] event.
    #[must_use]
    pub fn warning(topic: LifecycleTopic, message: impl Into<serde_json::Value>) -> Self {
        Self::new(topic, message, Severity::Warning)
    }

    /// Create a [`Severity::Error`] event.
    #[must_use]
    pub fn error(topic: LifecycleTopic, message: impl Into<serde_json::Value>) -> Self {
        Self::new(topic, message, Severity::Error)
    }

    /// Attach an analytics tag.
    #[must_use]
    pub fn with_analytics(mut self, tag: AnalyticsTag) -> Self {
        self.analytics = Some(tag);
        self
    }

    /// The topic this event is published under.
    #[must_use]
    pub const fn topic(&self) -> LifecycleTopic {
        self.topic
    }

    /// The event payload.
    #[must_use]
    pub const fn message(&self) -> &serde_json::Value {
        &self.message
    }

    /// The payload as text, when it is a JSON string.
    #[must_use]
    pub fn message_text(&self) -> Option<&str> {
        self.message.as_str()
    }

    /// The event's severity.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        self.severity
    }

    /// The analytics tag, if any.
    #[must_use]
    pub const fn analytics(&self) -> Option<&AnalyticsTag> {
        self.analytics.as_ref()
    }
}
