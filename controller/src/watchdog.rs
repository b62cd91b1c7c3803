//! Named watchdog timers.
//!
//! The ledger lives in the reducer state; the countdowns themselves are
//! cancellable `Delay` effects keyed by [`WatchdogName::effect_id`], so the
//! store aborts a timer the moment it is re-armed or disarmed. Every arm
//! carries a fresh generation number that comes back with the expiry action:
//! a delay that slipped past its abort (or fired just before a re-arm was
//! reduced) no longer matches the ledger and is discarded by [`Watchdog::expire`].

use chrono::{DateTime, Utc};
use outstream_core::effect::{Effect, EffectId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// The watchdogs the lifecycle uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WatchdogName {
    /// Armed by `start()`, cleared by loader readiness
    Initial,
    /// Armed when a request begins, cleared when the engine reports ready
    ManagerReady,
    /// Armed on `LOADED`, cleared when playback starts
    Loaded,
}

impl WatchdogName {
    /// Every watchdog.
    pub const ALL: [Self; 3] = [Self::Initial, Self::ManagerReady, Self::Loaded];

    /// Stable name used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::ManagerReady => "manager-ready",
            Self::Loaded => "loaded",
        }
    }

    /// Key of the cancellable delay backing this watchdog.
    #[must_use]
    pub const fn effect_id(self) -> EffectId {
        match self {
            Self::Initial => EffectId::from_static("watchdog:initial"),
            Self::ManagerReady => EffectId::from_static("watchdog:manager-ready"),
            Self::Loaded => EffectId::from_static("watchdog:loaded"),
        }
    }
}

impl fmt::Display for WatchdogName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A live timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchdogTimer {
    /// Which watchdog
    pub name: WatchdogName,
    /// Countdown length
    pub duration: Duration,
    /// When it was armed
    pub armed_at: DateTime<Utc>,
    /// Arm generation, echoed back on expiry
    pub generation: u64,
    /// Set on the record returned by [`Watchdog::expire`]
    pub fired: bool,
}

/// Ledger of armed watchdogs, at most one per name.
#[derive(Debug, Clone, Default)]
pub struct Watchdog {
    timers: BTreeMap<WatchdogName, WatchdogTimer>,
    next_generation: u64,
}

impl Watchdog {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `name` for `duration`, replacing any live timer of that name.
    ///
    /// `on_expire` builds the action delivered when the countdown ends; it
    /// receives the generation to hand back to [`Watchdog::expire`].
    pub fn arm<A, F>(
        &mut self,
        name: WatchdogName,
        duration: Duration,
        now: DateTime<Utc>,
        on_expire: F,
    ) -> Effect<A>
    where
        F: FnOnce(u64) -> A,
    {
        self.next_generation += 1;
        let generation = self.next_generation;

        let replaced = self
            .timers
            .insert(
                name,
                WatchdogTimer {
                    name,
                    duration,
                    armed_at: now,
                    generation,
                    fired: false,
                },
            )
            .is_some();

        tracing::debug!(
            watchdog = %name,
            generation,
            duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            replaced,
            "Armed watchdog"
        );

        Effect::Delay {
            duration,
            action: Box::new(on_expire(generation)),
        }
        .cancellable(name.effect_id())
    }

    /// Disarm `name`. A name with no live timer yields `Effect::None`.
    pub fn disarm<A>(&mut self, name: WatchdogName) -> Effect<A> {
        match self.timers.remove(&name) {
            Some(timer) => {
                tracing::debug!(watchdog = %name, generation = timer.generation, "Disarmed watchdog");
                Effect::Cancel {
                    id: name.effect_id(),
                }
            },
            None => Effect::None,
        }
    }

    /// Disarm every live timer.
    pub fn disarm_all<A>(&mut self) -> Vec<Effect<A>> {
        self.armed()
            .into_iter()
            .map(|name| self.disarm(name))
            .collect()
    }

    /// Consume an expiry. Returns the fired timer, or `None` if the
    /// generation is stale or the watchdog was already disarmed.
    pub fn expire(&mut self, name: WatchdogName, generation: u64) -> Option<WatchdogTimer> {
        match self.timers.get(&name) {
            Some(timer) if timer.generation == generation => {
                let mut timer = self.timers.remove(&name)?;
                timer.fired = true;
                Some(timer)
            },
            live => {
                tracing::trace!(
                    watchdog = %name,
                    generation,
                    live_generation = live.map(|t| t.generation),
                    "Ignoring stale watchdog expiry"
                );
                None
            },
        }
    }

    /// Whether `name` has a live timer.
    #[must_use]
    pub fn is_armed(&self, name: WatchdogName) -> bool {
        self.timers.contains_key(&name)
    }

    /// Names with a live timer, in declaration order.
    #[must_use]
    pub fn armed(&self) -> Vec<WatchdogName> {
        self.timers.keys().copied().collect()
    }

    /// Whether nothing is armed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// The live timer for `name`.
    #[must_use]
    pub fn get(&self, name: WatchdogName) -> Option<&WatchdogTimer> {
        self.timers.get(&name)
    }
}
