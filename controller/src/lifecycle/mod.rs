//! Ad lifecycle state machine.
//!
//! ```text
//! Idle ──request_ad──▶ Requesting ──ready──▶ Loaded ──started──▶ Playing ──complete──▶ Completed
//!   ▲                      │                   │                    │                     │
//!   └──────────────────────┴──── error / watchdog / cancel ────────┴─────────────────────┘
//!                                        via Canceling
//! ```
//!
//! The reducer owns the phase, the watchdog ledger, the request pipeline and
//! the presentation state. Collaborators are only touched from effects.

mod actions;
mod environment;
mod reducer;
mod types;

#[cfg(test)]
mod tests;

pub use actions::AdAction;
pub use environment::{AdEnvironment, Collaborators};
pub use reducer::{AD_REQUEST, AdReducer};
pub use types::{AdSnapshot, AdState, LifecyclePhase, PHASE_HISTORY_LEN};
