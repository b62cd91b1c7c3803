//! Built-in bus observers.

use outstream_core::event::{LifecycleEvent, Severity};
use outstream_core::event_bus::{EventBus, SubscriptionId};

/// Log every lifecycle event at a level matching its severity.
///
/// Success events log at `info`, warnings at `warn`, errors at `error`.
pub fn attach_log_observer(bus: &EventBus) -> SubscriptionId {
    bus.subscribe_all(|event: &LifecycleEvent| {
        let topic = event.topic().as_str();
        let message = event.message();
        match event.severity() {
            Severity::Success => tracing::info!(topic, %message, "Lifecycle event"),
            Severity::Warning => tracing::warn!(topic, %message, "Lifecycle event"),
            Severity::Error => tracing::error!(topic, %message, "Lifecycle event"),
        }
        Ok(())
    })
}
