//! Single-flight ad request pipeline.
//!
//! The pipeline is plain data owned by the reducer: it hands out tickets,
//! refuses a second request while one is running, and settles the shared
//! request cell callers await on. The collaborator call itself is an effect
//! built by the reducer from the returned [`Dispatch`].
//!
//! The cell is a `tokio::sync::watch` channel. A cancel cycle settles the
//! pending cell `Canceled` and swaps in a fresh one, so a caller holding the
//! old [`AdRequestHandle`] can never observe the next cycle's result.

use outstream_core::decision::{Locator, RequestError};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Why a request was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestOrigin {
    /// First pre-fetch after loader readiness
    WarmUp,
    /// Pre-fetch at the tail of a cancel cycle
    Prefetch,
    /// Issued by `request_ad()`
    Play,
}

impl RequestOrigin {
    /// Stable name used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WarmUp => "warm-up",
            Self::Prefetch => "prefetch",
            Self::Play => "play",
        }
    }
}

/// Resolution state of a request cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestStatus {
    /// Not settled yet
    Pending,
    /// Settled with a locator
    Resolved(Locator),
    /// Settled with an error
    Rejected(RequestError),
}

impl RequestStatus {
    /// Whether the cell has settled.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Debug, Clone)]
struct Slot {
    status: RequestStatus,
    started_at: Option<Instant>,
    settled_at: Option<Instant>,
}

impl Slot {
    const fn idle() -> Self {
        Self {
            status: RequestStatus::Pending,
            started_at: None,
            settled_at: None,
        }
    }
}

/// A caller's view of one request cycle.
#[derive(Debug, Clone)]
pub struct AdRequestHandle {
    cycle: u64,
    rx: watch::Receiver<Slot>,
}

impl AdRequestHandle {
    /// Which cell this handle observes.
    #[must_use]
    pub const fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Current resolution state.
    #[must_use]
    pub fn status(&self) -> RequestStatus {
        self.rx.borrow().status.clone()
    }

    /// Whether a request is running on this cell.
    #[must_use]
    pub fn is_active(&self) -> bool {
        let slot = self.rx.borrow();
        slot.started_at.is_some() && !slot.status.is_settled()
    }

    /// Time since the request started, frozen once it settles.
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        let slot = self.rx.borrow();
        slot.started_at.map(|started| {
            slot.settled_at
                .unwrap_or_else(Instant::now)
                .saturating_duration_since(started)
        })
    }

    /// Wait until this cell settles.
    ///
    /// # Errors
    ///
    /// Returns the [`RequestError`] the cell was rejected with, or
    /// [`RequestError::Canceled`] if the controller was dropped first.
    pub async fn wait(&mut self) -> Result<Locator, RequestError> {
        let slot = self
            .rx
            .wait_for(|slot| slot.status.is_settled())
            .await
            .map_err(|_| RequestError::Canceled)?;

        match &slot.status {
            RequestStatus::Resolved(locator) => Ok(locator.clone()),
            RequestStatus::Rejected(error) => Err(error.clone()),
            RequestStatus::Pending => Err(RequestError::Canceled),
        }
    }
}

/// The request currently in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InFlight {
    /// Ticket the settlement must echo
    pub ticket: u64,
    /// Why it was issued
    pub origin: RequestOrigin,
}

/// How a request that passed the gate should be served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Call the decision collaborator
    Collaborator {
        /// Ticket to settle with
        ticket: u64,
    },
    /// Serve the debug override without calling the collaborator
    Override {
        /// Ticket to settle with
        ticket: u64,
        /// The override
        locator: Locator,
    },
}

impl Dispatch {
    /// Ticket of this dispatch.
    #[must_use]
    pub const fn ticket(&self) -> u64 {
        match self {
            Self::Collaborator { ticket } | Self::Override { ticket, .. } => *ticket,
        }
    }
}

/// A request that settled on its live ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settled {
    /// Why it was issued
    pub origin: RequestOrigin,
    /// Outcome, with blank locators already turned into errors
    pub result: Result<Locator, RequestError>,
    /// Time from start to settlement
    pub elapsed: Duration,
}

/// Single-flight gate plus the shared request cell.
#[derive(Debug, Clone)]
pub struct RequestPipeline {
    cell: Arc<watch::Sender<Slot>>,
    cycle: u64,
    next_ticket: u64,
    in_flight: Option<InFlight>,
    override_locator: Option<Locator>,
}

impl Default for RequestPipeline {
    fn default() -> Self {
        Self {
            cell: Arc::new(watch::channel(Slot::idle()).0),
            cycle: 1,
            next_ticket: 0,
            in_flight: None,
            override_locator: None,
        }
    }
}

impl RequestPipeline {
    /// Create an idle pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a request is running.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.in_flight.is_some()
    }

    /// The running request.
    #[must_use]
    pub const fn in_flight(&self) -> Option<InFlight> {
        self.in_flight
    }

    /// Current cell number.
    #[must_use]
    pub const fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Resolution state of the current cell.
    #[must_use]
    pub fn status(&self) -> RequestStatus {
        self.cell.borrow().status.clone()
    }

    /// A handle on the current cell.
    #[must_use]
    pub fn handle(&self) -> AdRequestHandle {
        AdRequestHandle {
            cycle: self.cycle,
            rx: self.cell.subscribe(),
        }
    }

    /// Store or clear the debug override.
    pub fn set_override(&mut self, locator: Option<Locator>) {
        self.override_locator = locator;
    }

    /// The debug override, if any.
    #[must_use]
    pub const fn override_locator(&self) -> Option<&Locator> {
        self.override_locator.as_ref()
    }

    /// Pass the single-flight gate.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::AlreadyInFlight`] while another request runs.
    pub fn begin(&mut self, origin: RequestOrigin) -> Result<Dispatch, RequestError> {
        if let Some(running) = self.in_flight {
            tracing::debug!(
                ticket = running.ticket,
                running = running.origin.as_str(),
                requested = origin.as_str(),
                "Request already in flight"
            );
            return Err(RequestError::AlreadyInFlight);
        }

        if self.cell.borrow().status.is_settled() {
            self.replace_cell();
        }
        self.cell.send_modify(|slot| {
            slot.status = RequestStatus::Pending;
            slot.started_at = Some(Instant::now());
            slot.settled_at = None;
        });

        self.next_ticket += 1;
        let ticket = self.next_ticket;
        self.in_flight = Some(InFlight { ticket, origin });

        tracing::debug!(ticket, origin = origin.as_str(), cycle = self.cycle, "Request started");

        Ok(match &self.override_locator {
            Some(locator) => Dispatch::Override {
                ticket,
                locator: locator.clone(),
            },
            None => Dispatch::Collaborator { ticket },
        })
    }

    /// Re-label the running request as serving `request_ad()`.
    ///
    /// Returns `false` if nothing is running.
    pub fn promote(&mut self) -> bool {
        match self.in_flight.as_mut() {
            Some(running) => {
                running.origin = RequestOrigin::Play;
                true
            },
            None => false,
        }
    }

    /// Settle the running request. The gate reopens whatever the outcome.
    ///
    /// Returns `None` for a ticket that is no longer live (the request was
    /// superseded by a cancel cycle); the cell is left untouched.
    pub fn settle(
        &mut self,
        ticket: u64,
        result: Result<Locator, RequestError>,
    ) -> Option<Settled> {
        let running = match self.in_flight {
            Some(running) if running.ticket == ticket => running,
            _ => {
                tracing::trace!(ticket, "Ignoring settlement of a stale request");
                return None;
            },
        };
        self.in_flight = None;

        let result = result.and_then(|locator| {
            if locator.is_blank() {
                Err(RequestError::Malformed("empty locator".to_string()))
            } else {
                Ok(locator)
            }
        });

        let now = Instant::now();
        let mut elapsed = Duration::ZERO;
        self.cell.send_modify(|slot| {
            slot.status = match &result {
                Ok(locator) => RequestStatus::Resolved(locator.clone()),
                Err(error) => RequestStatus::Rejected(error.clone()),
            };
            slot.settled_at = Some(now);
            if let Some(started) = slot.started_at {
                elapsed = now.saturating_duration_since(started);
            }
        });

        Some(Settled {
            origin: running.origin,
            result,
            elapsed,
        })
    }

    /// End the current cycle: reject a pending cell with
    /// [`RequestError::Canceled`], drop the running request and issue a
    /// fresh cell.
    pub fn renew(&mut self) {
        self.in_flight = None;
        self.cell.send_if_modified(|slot| {
            if slot.status.is_settled() {
                false
            } else {
                slot.status = RequestStatus::Rejected(RequestError::Canceled);
                slot.settled_at = Some(Instant::now());
                true
            }
        });
        self.replace_cell();
    }

    fn replace_cell(&mut self) {
        self.cycle += 1;
        self.cell = Arc::new(watch::channel(Slot::idle()).0);
    }
}
