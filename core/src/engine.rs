//! Rendering engine collaborator contract and its signal vocabulary.
//!
//! The engine is an opaque component: given a [`Locator`] and slot size it
//! plays the ad and reports progress as a stream of [`EngineSignal`]s. Each
//! initialization gets a [`SignalSink`] stamped with a session number, so
//! signals emitted by a session the controller already tore down can be told
//! apart from the live one.

use crate::decision::Locator;
use crate::event::LifecycleTopic;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use tokio::sync::mpsc;

/// Future returned by [`RenderingEngine`] methods.
pub type EngineFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Error code and message reported by the engine.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("Render error {code}: {message}")]
pub struct RenderError {
    /// Engine-specific error code
    pub code: u32,
    /// Human-readable description
    pub message: String,
}

impl RenderError {
    /// Create a render error.
    #[must_use]
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Pixel size of the ad slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotDimensions {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl SlotDimensions {
    /// A 16:9 slot for the given width.
    #[must_use]
    pub const fn from_width(width: u32) -> Self {
        Self {
            width,
            height: width * 9 / 16,
        }
    }
}

/// A signal emitted by the rendering engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineSignal {
    /// The engine accepted the locator and is ready to play
    Ready,
    /// An ad break would have played
    AdBreakReady,
    /// The ads list was loaded
    Metadata,
    /// The creative was loaded
    Loaded {
        /// MIME type of the creative
        content_type: String,
    },
    /// Host content should pause
    ContentPauseRequested,
    /// Host content should resume; the engine is done with the slot
    ContentResumeRequested,
    /// Playback started
    Started,
    /// Playback paused
    Paused,
    /// Playback resumed
    Resumed,
    /// Impression recorded
    Impression,
    /// Ad clicked
    Click,
    /// Interaction callback fired
    Interaction,
    /// Duration changed
    DurationChange,
    /// Linear / non-linear switch
    LinearChanged,
    /// Skippable state changed
    SkippableStateChanged,
    /// The user skipped the ad
    Skipped,
    /// First quartile reached
    FirstQuartile,
    /// Midpoint reached
    Midpoint,
    /// Third quartile reached
    ThirdQuartile,
    /// Playback completed
    Complete,
    /// All ads completed
    AllAdsCompleted,
    /// The user closed the ad
    UserClose,
    /// Volume changed
    VolumeChanged,
    /// Volume muted
    VolumeMuted,
    /// Non-fatal diagnostics
    Log {
        /// Diagnostic text
        message: String,
    },
    /// The engine failed
    Error(RenderError),
}

impl EngineSignal {
    /// The topic this signal is published under.
    #[must_use]
    pub const fn topic(&self) -> LifecycleTopic {
        match self {
            Self::Ready => LifecycleTopic::AdSdkManagerReady,
            Self::AdBreakReady => LifecycleTopic::AdBreakReady,
            Self::Metadata => LifecycleTopic::AdMetadata,
            Self::Loaded { .. } => LifecycleTopic::Loaded,
            Self::ContentPauseRequested => LifecycleTopic::ContentPauseRequested,
            Self::ContentResumeRequested => LifecycleTopic::ContentResumeRequested,
            Self::Started => LifecycleTopic::Started,
            Self::Paused => LifecycleTopic::Paused,
            Self::Resumed => LifecycleTopic::Resumed,
            Self::Impression => LifecycleTopic::Impression,
            Self::Click => LifecycleTopic::Click,
            Self::Interaction => LifecycleTopic::Interaction,
            Self::DurationChange => LifecycleTopic::DurationChange,
            Self::LinearChanged => LifecycleTopic::LinearChanged,
            Self::SkippableStateChanged => LifecycleTopic::SkippableStateChanged,
            Self::Skipped => LifecycleTopic::Skipped,
            Self::FirstQuartile => LifecycleTopic::FirstQuartile,
            Self::Midpoint => LifecycleTopic::Midpoint,
            Self::ThirdQuartile => LifecycleTopic::ThirdQuartile,
            Self::Complete => LifecycleTopic::Complete,
            Self::AllAdsCompleted => LifecycleTopic::AllAdsCompleted,
            Self::UserClose => LifecycleTopic::UserClose,
            Self::VolumeChanged => LifecycleTopic::VolumeChanged,
            Self::VolumeMuted => LifecycleTopic::VolumeMuted,
            Self::Log { .. } => LifecycleTopic::Log,
            Self::Error(_) => LifecycleTopic::AdError,
        }
    }

    /// Human-readable description used as the event message.
    #[must_use]
    pub fn description(&self) -> String {
        let text = match self {
            Self::Ready => "Ad manager is ready.",
            Self::AdBreakReady => {
                "Fired when an ad rule or a VMAP ad break would have played if autoPlayAdBreaks is false."
            },
            Self::Metadata => "Fired when an ads list is loaded.",
            Self::Loaded { content_type } => return content_type.clone(),
            Self::ContentPauseRequested => {
                "Fired when content should be paused. This usually happens right before an ad is about to cover the content."
            },
            Self::ContentResumeRequested => {
                "Fired when content should be resumed. This usually happens when an ad finishes or collapses."
            },
            Self::Started => "Fired when the ad starts playing.",
            Self::Paused => "Fired when the ad is paused.",
            Self::Resumed => "Fired when the ad is resumed.",
            Self::Impression => "Fired when the impression URL has been pinged.",
            Self::Click => "Fired when the ad is clicked.",
            Self::Interaction => {
                "Fired when an ad triggers the interaction callback. Ad interactions contain an interaction ID string in the ad data."
            },
            Self::DurationChange => "Fired when the ad's duration changes.",
            Self::LinearChanged => {
                "Fired when the displayed ad changes from linear to nonlinear, or vice versa."
            },
            Self::SkippableStateChanged => "Fired when the displayed ads skippable state is changed.",
            Self::Skipped => "Fired when the ad is skipped by the user.",
            Self::FirstQuartile => "Fired when the ad playhead crosses first quartile.",
            Self::Midpoint => "Fired when the ad playhead crosses midpoint.",
            Self::ThirdQuartile => "Fired when the ad playhead crosses third quartile.",
            Self::Complete => "Fired when the ad completes playing.",
            Self::AllAdsCompleted => "Fired when the ads manager is done playing all the ads.",
            Self::UserClose => "Fired when the ad is closed by the user.",
            Self::VolumeChanged => "Fired when the ad volume has changed.",
            Self::VolumeMuted => "Fired when the ad volume has been muted.",
            Self::Log { message } => return message.clone(),
            Self::Error(error) => return error.message.clone(),
        };
        text.to_string()
    }

    /// Whether this signal ends the ad normally.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Complete
                | Self::AllAdsCompleted
                | Self::UserClose
                | Self::Skipped
                | Self::ContentResumeRequested
        )
    }
}

/// A signal tagged with the engine session that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSignal {
    /// Session number assigned when the engine was initialized
    pub session: u64,
    /// The signal
    pub signal: EngineSignal,
}

/// Channel end handed to the engine on initialization.
#[derive(Debug, Clone)]
pub struct SignalSink {
    session: u64,
    tx: mpsc::UnboundedSender<SessionSignal>,
}

impl SignalSink {
    /// Create a sink that stamps every signal with `session`.
    #[must_use]
    pub const fn new(session: u64, tx: mpsc::UnboundedSender<SessionSignal>) -> Self {
        Self { session, tx }
    }

    /// The session this sink belongs to.
    #[must_use]
    pub const fn session(&self) -> u64 {
        self.session
    }

    /// Emit a signal. Returns `false` if the controller is gone.
    pub fn emit(&self, signal: EngineSignal) -> bool {
        self.tx
            .send(SessionSignal {
                session: self.session,
                signal,
            })
            .is_ok()
    }
}

/// The rendering engine collaborator.
///
/// # Example
///
/// ```ignore
/// impl RenderingEngine for ImaBridge {
///     fn prepare(&self) -> EngineFuture<'_, Result<(), RenderError>> {
///         Box::pin(async move { self.load_sdk().await })
///     }
///
///     fn initialize(
///         &self,
///         locator: &Locator,
///         dimensions: SlotDimensions,
///         sink: SignalSink,
///     ) -> EngineFuture<'_, Result<(), RenderError>> {
///         let locator = locator.clone();
///         Box::pin(async move { self.request_ads(locator, dimensions, sink).await })
///     }
///
///     fn resize(&self, dimensions: SlotDimensions) {
///         self.manager_resize(dimensions);
///     }
///
///     fn destroy(&self) -> EngineFuture<'_, ()> {
///         Box::pin(async move { self.teardown().await })
///     }
/// }
/// ```
pub trait RenderingEngine: Send + Sync {
    /// Load whatever the engine needs before it can accept locators.
    ///
    /// # Errors
    ///
    /// Returns a [`RenderError`] if the engine cannot be loaded.
    fn prepare(&self) -> EngineFuture<'_, Result<(), RenderError>>;

    /// Start playing `locator` in a slot of `dimensions`, reporting through `sink`.
    ///
    /// # Errors
    ///
    /// Returns a [`RenderError`] if the engine rejects the locator outright.
    fn initialize(
        &self,
        locator: &Locator,
        dimensions: SlotDimensions,
        sink: SignalSink,
    ) -> EngineFuture<'_, Result<(), RenderError>>;

    /// Resize the live session, if any.
    fn resize(&self, dimensions: SlotDimensions);

    /// Release the current session. Must be safe when nothing was initialized.
    fn destroy(&self) -> EngineFuture<'_, ()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_height_is_sixteen_by_nine() {
        assert_eq!(SlotDimensions::from_width(640), SlotDimensions { width: 640, height: 360 });
        assert_eq!(SlotDimensions::from_width(300).height, 168);
    }

    #[test]
    fn test_terminal_signals() {
        assert!(EngineSignal::Complete.is_terminal());
        assert!(EngineSignal::UserClose.is_terminal());
        assert!(EngineSignal::ContentResumeRequested.is_terminal());
        assert!(!EngineSignal::Started.is_terminal());
        assert!(!EngineSignal::Error(RenderError::new(1009, "empty VAST")).is_terminal());
    }

    #[test]
    fn test_signal_topics() {
        assert_eq!(EngineSignal::Ready.topic(), LifecycleTopic::AdSdkManagerReady);
        assert_eq!(
            EngineSignal::Loaded { content_type: "video/mp4".into() }.topic(),
            LifecycleTopic::Loaded
        );
        assert_eq!(
            EngineSignal::Error(RenderError::new(400, "bad")).topic(),
            LifecycleTopic::AdError
        );
    }

    #[test]
    fn test_loaded_description_is_content_type() {
        let signal = EngineSignal::Loaded { content_type: "video/mp4".into() };
        assert_eq!(signal.description(), "video/mp4");
    }

    #[tokio::test]
    async fn test_sink_stamps_session() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = SignalSink::new(7, tx);
        assert!(sink.emit(EngineSignal::Started));

        let received = rx.recv().await;
        assert_eq!(
            received,
            Some(SessionSignal { session: 7, signal: EngineSignal::Started })
        );

        drop(rx);
        assert!(!sink.emit(EngineSignal::Complete));
    }
}
