//! Run phases and the controller actor that walks through them.
//!
//! A run passes through four phases in order:
//!
//! 1. **Spawning**: every client took its first turn.
//! 2. **Connections**: the server rejected the churn target's worth of connections,
//!    observed as many disconnections, and then saw every client connected at once.
//! 3. **Transmission**: the exchange target's worth of packets was received.
//! 4. **Disconnections**: every client saw its final disconnect.
//!
//! The [`PhaseController`] is the first actor in the rotation. On each turn it renders
//! the current phase and advances through every phase whose condition already holds.
//! It hands [`RunOutcome::Completed`] to the root after the last phase, or
//! [`RunOutcome::Aborted`] once the server and all clients parked.

use std::fmt;

use serde::Serialize;
use tracing::{info, warn};

use crate::actors::FuzzContext;
use crate::scheduler::{Actor, Turn};
use crate::state::{FuzzState, FuzzStats};
use crate::FuzzError;

/// One of the four run phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Waiting for every client to start.
    Spawning,
    /// Connection churn.
    Connections,
    /// Echo traffic.
    Transmission,
    /// Final disconnections.
    Disconnection,
}

impl Phase {
    /// All phases in run order.
    pub const ALL: [Self; 4] = [
        Self::Spawning,
        Self::Connections,
        Self::Transmission,
        Self::Disconnection,
    ];

    /// 1-based position in the run.
    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            Self::Spawning => 1,
            Self::Connections => 2,
            Self::Transmission => 3,
            Self::Disconnection => 4,
        }
    }

    /// Display label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Spawning => "Spawning",
            Self::Connections => "Connections",
            Self::Transmission => "Transmission",
            Self::Disconnection => "Disconnections",
        }
    }

    /// The phase after this one.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Spawning => Some(Self::Connections),
            Self::Connections => Some(Self::Transmission),
            Self::Transmission => Some(Self::Disconnection),
            Self::Disconnection => None,
        }
    }

    /// Returns `true` if `state` satisfies this phase's completion condition.
    #[must_use]
    pub fn is_complete(self, state: &FuzzState) -> bool {
        let stats = state.stats();
        let targets = state.targets();
        match self {
            Self::Spawning => stats.clients_spawned == state.client_count(),
            Self::Connections => {
                stats.connection_iterations == targets.connection_iterations
                    && stats.disconnection_iterations == targets.connection_iterations
                    && stats.clients_connected == state.client_count()
            },
            Self::Transmission => stats.messages_exchanged == state.exchange_target(),
            Self::Disconnection => stats.clients_disconnected == state.client_count(),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Phase {}: {}", self.number(), self.label())
    }
}

/// How far the current phase has come.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PhaseProgress {
    /// The phase being reported.
    pub phase: Phase,
    /// Progress counter of the phase.
    pub current: u64,
    /// Value of `current` at which the counter is done.
    pub target: u64,
}

impl PhaseProgress {
    /// Reads the progress of `phase` from `state`.
    #[must_use]
    pub fn of(phase: Phase, state: &FuzzState) -> Self {
        let stats = state.stats();
        let (current, target) = match phase {
            Phase::Spawning => (stats.clients_spawned, state.client_count()),
            Phase::Connections => (
                stats.disconnection_iterations,
                state.targets().connection_iterations,
            ),
            Phase::Transmission => (stats.messages_exchanged, state.exchange_target()),
            Phase::Disconnection => (stats.clients_disconnected, state.client_count()),
        };
        Self {
            phase,
            current,
            target,
        }
    }
}

impl fmt::Display for PhaseProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}/{})", self.phase, self.current, self.target)
    }
}

/// The controller's verdict after looking at the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseStep {
    /// Nothing to do yet; yield.
    Continue,
    /// The current phase is done.
    PhaseComplete,
    /// Everyone parked; end the run.
    AbortRequested,
}

impl PhaseStep {
    /// Decides the step for `phase`. Completion wins over an abort.
    #[must_use]
    pub fn evaluate(phase: Phase, state: &FuzzState) -> Self {
        if phase.is_complete(state) {
            Self::PhaseComplete
        } else if state.all_parked() {
            Self::AbortRequested
        } else {
            Self::Continue
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// All four phases completed.
    Completed,
    /// The operator interrupted the run during `phase`.
    Aborted {
        /// Phase that was active when the run ended.
        phase: Phase,
    },
}

/// Presents phase progress to the operator.
pub trait PhaseRenderer {
    /// Shows the progress of the current phase. Called on every controller turn.
    fn render(&mut self, progress: &PhaseProgress);

    /// A phase just completed with these counters.
    fn phase_completed(&mut self, progress: &PhaseProgress, stats: &FuzzStats) {
        let _ = (progress, stats);
    }

    /// The run is over.
    fn finish(&mut self, outcome: &RunOutcome);
}

impl<R: PhaseRenderer + ?Sized> PhaseRenderer for Box<R> {
    fn render(&mut self, progress: &PhaseProgress) {
        (**self).render(progress);
    }

    fn phase_completed(&mut self, progress: &PhaseProgress, stats: &FuzzStats) {
        (**self).phase_completed(progress, stats);
    }

    fn finish(&mut self, outcome: &RunOutcome) {
        (**self).finish(outcome);
    }
}

/// Walks the phases and hands the outcome back to the root.
#[derive(Debug)]
pub struct PhaseController<R> {
    renderer: R,
    phase: Phase,
}

impl<R: PhaseRenderer> PhaseController<R> {
    /// Creates a controller starting at [`Phase::Spawning`].
    #[must_use]
    pub const fn new(renderer: R) -> Self {
        Self {
            renderer,
            phase: Phase::Spawning,
        }
    }

    /// The phase currently being waited on.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    fn end(&mut self, outcome: RunOutcome) -> Turn {
        self.renderer.finish(&outcome);
        Turn::Return(outcome)
    }
}

impl<R: PhaseRenderer> Actor<FuzzContext> for PhaseController<R> {
    fn name(&self) -> &str {
        "controller"
    }

    fn turn(&mut self, ctx: &mut FuzzContext) -> Result<Turn, FuzzError> {
        loop {
            let progress = PhaseProgress::of(self.phase, &ctx.state);
            self.renderer.render(&progress);
            match PhaseStep::evaluate(self.phase, &ctx.state) {
                PhaseStep::Continue => return Ok(Turn::Yield),
                PhaseStep::PhaseComplete => {
                    info!(phase = self.phase.label(), current = progress.current, "phase complete");
                    crate::debug_check_invariants!(ctx.state, self.phase.label());
                    self.renderer.phase_completed(&progress, &ctx.state.stats());
                    match self.phase.next() {
                        Some(next) => self.phase = next,
                        None => return Ok(self.end(RunOutcome::Completed)),
                    }
                },
                PhaseStep::AbortRequested => {
                    warn!(phase = self.phase.label(), "every actor parked, aborting run");
                    let phase = self.phase;
                    return Ok(self.end(RunOutcome::Aborted { phase }));
                },
            }
        }
    }
}
