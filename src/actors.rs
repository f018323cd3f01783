//! The server and client actors, and the context they share with the controller.

use tracing::info;

use crate::interrupt::Interrupt;
use crate::payload::PayloadGenerator;
use crate::state::FuzzState;
use crate::telemetry::{InvariantChecker, InvariantViolation};
use crate::transport::{Host, HostEvent, TransportError};

/// Client actor: connect, reconnect, echo.
pub mod client;
/// Server actor: churn, serve, disconnect.
pub mod server;

pub use client::ClientActor;
pub use server::ServerActor;

/// Everything the actors of one run share.
pub struct FuzzContext {
    /// Run counters.
    pub state: FuzzState,
    /// Source of echo payloads.
    pub payloads: PayloadGenerator,
    interrupt: Box<dyn Interrupt>,
    interrupted: bool,
}

impl FuzzContext {
    /// Bundles the shared pieces of a run.
    #[must_use]
    pub fn new(state: FuzzState, payloads: PayloadGenerator, interrupt: Box<dyn Interrupt>) -> Self {
        Self {
            state,
            payloads,
            interrupt,
            interrupted: false,
        }
    }

    /// Polls the interrupt. Once it fired, stays `true`.
    pub fn interrupted(&mut self) -> bool {
        if !self.interrupted && self.interrupt.is_pending() {
            info!("interrupt received, parking actors");
            self.interrupted = true;
        }
        self.interrupted
    }
}

impl std::fmt::Debug for FuzzContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FuzzContext")
            .field("state", &self.state)
            .field("payloads", &self.payloads)
            .field("interrupted", &self.interrupted)
            .finish_non_exhaustive()
    }
}

impl InvariantChecker for FuzzContext {
    fn check_invariants(&self) -> Result<(), InvariantViolation> {
        self.state.check_invariants()
    }
}

/// Hands out the events of one turn: everything already buffered, then at most one
/// service call, then whatever that service call buffered.
#[derive(Debug, Default)]
pub(crate) struct TurnEvents {
    serviced: bool,
}

impl TurnEvents {
    pub(crate) fn next<H: Host>(&mut self, host: &mut H) -> Result<Option<HostEvent>, TransportError> {
        if let Some(event) = host.check_events() {
            return Ok(Some(event));
        }
        if self.serviced {
            return Ok(None);
        }
        self.serviced = true;
        host.service()
    }
}
