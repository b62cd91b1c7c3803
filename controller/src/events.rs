//! Lifecycle event builders.
//!
//! Each controller topic has a fixed message, severity and analytics tag
//! shape. Engine-originated events are labelled with the time of day,
//! controller events with the host domain.

use chrono::{DateTime, Datelike, Local, TimeZone, Timelike, Utc};
use outstream_core::decision::Locator;
use outstream_core::engine::{EngineSignal, RenderError};
use outstream_core::event::{AnalyticsTag, LifecycleEvent, LifecycleTopic};
use serde_json::json;

use crate::config::AdConfig;

const AD_CATEGORY: &str = "AD";

/// Analytics label for engine events: `h{hour} d{day} m{month0} y{year}`,
/// read in the timezone `now` carries.
#[must_use]
pub fn time_label<Tz: TimeZone>(now: DateTime<Tz>) -> String {
    format!("h{} d{} m{} y{}", now.hour(), now.day(), now.month0(), now.year())
}

fn engine_tag(topic: LifecycleTopic, domain: &str, now: DateTime<Utc>) -> AnalyticsTag {
    AnalyticsTag::new(topic.as_str(), domain, time_label(now.with_timezone(&Local)))
}

fn controller_tag(topic: LifecycleTopic, domain: &str) -> AnalyticsTag {
    AnalyticsTag::new(AD_CATEGORY, topic.as_str(), domain)
}

/// `AD_SDK_LOADER_READY`, carrying the settings the engine was loaded with.
#[must_use]
pub fn loader_ready(config: &AdConfig, now: DateTime<Utc>) -> LifecycleEvent {
    let topic = LifecycleTopic::AdSdkLoaderReady;
    LifecycleEvent::success(
        topic,
        json!({
            "tag": config.tag,
            "locale": config.locale,
            "width": config.container_width,
            "height": config.container_dimensions().height,
        }),
    )
    .with_analytics(engine_tag(topic, &config.domain, now))
}

/// `AD_SDK_REQUEST_ADS`, carrying the locator handed to the engine.
#[must_use]
pub fn request_ads(locator: &Locator, domain: &str, now: DateTime<Utc>) -> LifecycleEvent {
    let topic = LifecycleTopic::AdSdkRequestAds;
    LifecycleEvent::success(topic, locator.as_str())
        .with_analytics(engine_tag(topic, domain, now))
}

/// Any engine signal other than an error, on its own topic.
#[must_use]
pub fn engine_signal(signal: &EngineSignal, domain: &str, now: DateTime<Utc>) -> LifecycleEvent {
    let topic = signal.topic();
    LifecycleEvent::success(topic, signal.description())
        .with_analytics(engine_tag(topic, domain, now))
}

/// `AD_ERROR`, for an error reported by the engine.
#[must_use]
pub fn render_error(error: &RenderError) -> LifecycleEvent {
    let topic = LifecycleTopic::AdError;
    LifecycleEvent::warning(topic, error.message.as_str()).with_analytics(AnalyticsTag::new(
        topic.as_str(),
        error.code.to_string(),
        error.message.as_str(),
    ))
}

/// `AD_SDK_ERROR`, for a failed request or engine load.
#[must_use]
pub fn sdk_error(message: impl Into<String>) -> LifecycleEvent {
    let topic = LifecycleTopic::AdSdkError;
    let message = message.into();
    LifecycleEvent::error(topic, message.as_str()).with_analytics(AnalyticsTag::new(
        AD_CATEGORY,
        topic.as_str(),
        message,
    ))
}

/// `AD_SDK_FINISHED`, after normal termination.
#[must_use]
pub fn finished(domain: &str, now: DateTime<Utc>) -> LifecycleEvent {
    let topic = LifecycleTopic::AdSdkFinished;
    LifecycleEvent::success(topic, "IMA is ready for new requests.")
        .with_analytics(engine_tag(topic, domain, now))
}

/// `AD_SAFETY_TIMER`, when a watchdog expires.
#[must_use]
pub fn safety_timer(domain: &str) -> LifecycleEvent {
    let topic = LifecycleTopic::AdSafetyTimer;
    LifecycleEvent::warning(topic, "Advertisement took too long to load.")
        .with_analytics(controller_tag(topic, domain))
}

/// `AD_CANCELED`, at the end of every cancel cycle.
#[must_use]
pub fn canceled(domain: &str) -> LifecycleEvent {
    let topic = LifecycleTopic::AdCanceled;
    LifecycleEvent::warning(topic, "Advertisement has been canceled.")
        .with_analytics(controller_tag(topic, domain))
}
