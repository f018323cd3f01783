//! Cooperative round-robin scheduler.
//!
//! Actors are state machines that run one turn at a time on the caller's thread. The
//! rotation is a queue of actor ids: [`Scheduler::schedule`] moves the front id to the
//! back and runs that actor's turn, so every live actor gets exactly one turn per
//! rotation, in spawn order. A parked actor is dropped from the rotation and never runs
//! again. A turn may also hand a [`RunOutcome`] back to the root, which ends the run.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::phase::RunOutcome;
use crate::report_violation_to;
use crate::telemetry::{InvariantChecker, ViolationKind, ViolationObserver, ViolationSeverity};
use crate::FuzzError;

/// What an actor wants after its turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Turn {
    /// Keep the actor in the rotation.
    Yield,
    /// Remove the actor from the rotation for good.
    Park,
    /// Return control to the root with this outcome.
    Return(RunOutcome),
}

/// A participant in the rotation.
pub trait Actor<C> {
    /// Name used in logs and violation reports.
    fn name(&self) -> &str;

    /// Runs one turn against the shared context.
    fn turn(&mut self, ctx: &mut C) -> Result<Turn, FuzzError>;
}

/// Index of an actor in spawn order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActorId(usize);

impl ActorId {
    /// Position of the actor in spawn order.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor#{}", self.0)
    }
}

/// Runs actors in FIFO rotation until one returns an outcome.
pub struct Scheduler<C> {
    actors: Vec<Box<dyn Actor<C>>>,
    rotation: VecDeque<ActorId>,
    current: Option<ActorId>,
    turns: u64,
    turn_limit: Option<u64>,
    violation_observer: Option<Arc<dyn ViolationObserver>>,
}

impl<C> fmt::Debug for Scheduler<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("actors", &self.actors.len())
            .field("rotation", &self.rotation)
            .field("current", &self.current)
            .field("turns", &self.turns)
            .field("turn_limit", &self.turn_limit)
            .finish_non_exhaustive()
    }
}

impl<C> Default for Scheduler<C> {
    fn default() -> Self {
        Self {
            actors: Vec::new(),
            rotation: VecDeque::new(),
            current: None,
            turns: 0,
            turn_limit: None,
            violation_observer: None,
        }
    }
}

impl<C: InvariantChecker> Scheduler<C> {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the run with [`FuzzError::TurnLimitExceeded`] after `limit` turns.
    #[must_use]
    pub fn with_turn_limit(mut self, limit: u64) -> Self {
        self.turn_limit = Some(limit);
        self
    }

    /// Forwards scheduler anomalies and context invariant failures to `observer` as well
    /// as to the log.
    #[must_use]
    pub fn with_violation_observer(mut self, observer: Arc<dyn ViolationObserver>) -> Self {
        self.violation_observer = Some(observer);
        self
    }

    /// Adds an actor to the back of the rotation.
    pub fn spawn(&mut self, actor: Box<dyn Actor<C>>) -> ActorId {
        let id = ActorId(self.actors.len());
        trace!(%id, name = actor.name(), "spawned");
        self.actors.push(actor);
        self.rotation.push_back(id);
        id
    }

    /// Moves the front actor to the back of the rotation and runs its turn.
    ///
    /// Returns the outcome if the turn handed control back to the root.
    pub fn schedule(&mut self, ctx: &mut C) -> Result<Option<RunOutcome>, FuzzError> {
        let id = self
            .rotation
            .pop_front()
            .ok_or(FuzzError::RotationExhausted { turns: self.turns })?;
        self.rotation.push_back(id);
        self.current = Some(id);

        if let Some(limit) = self.turn_limit {
            if self.turns >= limit {
                return Err(FuzzError::TurnLimitExceeded { limit });
            }
        }
        self.turns += 1;

        let actor = self.actors.get_mut(id.0).ok_or_else(|| {
            report_violation_to!(
                self.violation_observer.as_ref(),
                ViolationSeverity::Critical,
                ViolationKind::Scheduler,
                "{} is in the rotation but was never spawned",
                id
            );
            FuzzError::RotationExhausted { turns: self.turns }
        })?;
        let turn = actor.turn(ctx)?;

        #[cfg(any(debug_assertions, feature = "paranoid"))]
        self.check_context(ctx, id);

        match turn {
            Turn::Yield => Ok(None),
            Turn::Park => {
                self.park_current();
                Ok(None)
            },
            Turn::Return(outcome) => Ok(Some(outcome)),
        }
    }

    /// Parks the actor that most recently ran, then gives the next actor its turn.
    pub fn suspend(&mut self, ctx: &mut C) -> Result<Option<RunOutcome>, FuzzError> {
        self.park_current();
        self.schedule(ctx)
    }

    /// Schedules turns until an actor returns an outcome.
    pub fn run(&mut self, ctx: &mut C) -> Result<RunOutcome, FuzzError> {
        loop {
            if let Some(outcome) = self.schedule(ctx)? {
                debug!(turns = self.turns, ?outcome, "control returned to root");
                return Ok(outcome);
            }
        }
    }

    /// Number of turns run so far.
    #[must_use]
    pub const fn turns(&self) -> u64 {
        self.turns
    }

    /// Number of actors still in the rotation.
    #[must_use]
    pub fn live_actors(&self) -> usize {
        self.rotation.len()
    }

    /// Returns `true` if `id` was parked.
    #[must_use]
    pub fn is_parked(&self, id: ActorId) -> bool {
        id.0 < self.actors.len() && !self.rotation.contains(&id)
    }

    /// Returns the optional violation observer.
    #[must_use]
    pub fn violation_observer(&self) -> Option<&Arc<dyn ViolationObserver>> {
        self.violation_observer.as_ref()
    }

    fn park_current(&mut self) {
        let Some(current) = self.current.take() else {
            return;
        };
        if self.rotation.back() == Some(&current) {
            self.rotation.pop_back();
        } else if let Some(position) = self.rotation.iter().position(|id| *id == current) {
            report_violation_to!(
                self.violation_observer.as_ref(),
                ViolationSeverity::Warning,
                ViolationKind::Scheduler,
                "parking {} which is not at the back of the rotation",
                current
            );
            self.rotation.remove(position);
        }
        let name = self.actors.get(current.0).map_or("?", |actor| actor.name());
        debug!(id = %current, name, remaining = self.rotation.len(), "parked");
    }

    #[cfg(any(debug_assertions, feature = "paranoid"))]
    fn check_context(&self, ctx: &C, id: ActorId) {
        use crate::telemetry::{report_to_observer, Violation};

        if let Err(err) = ctx.check_invariants() {
            let name = self.actors.get(id.0).map_or("?", |actor| actor.name());
            let violation = Violation::new(
                ViolationSeverity::Critical,
                ViolationKind::Invariant,
                err.to_string(),
                concat!(file!(), ":", line!()),
            )
            .with_actor(name)
            .with_context("turn", self.turns.to_string());
            report_to_observer(self.violation_observer.as_ref(), &violation);
        }
    }
}
