//! Common test infrastructure shared across integration tests.
//!
//! - [`RecordingRenderer`]: captures everything the phase controller shows
//! - [`ScriptedInterrupt`]: fires after a fixed number of polls
//! - [`small_config`]: a quick, seeded configuration
//!
//! ```ignore
//! mod common;
//! use common::{small_config, RecordingRenderer};
//! ```

#![allow(dead_code, clippy::unwrap_used)]

use std::cell::RefCell;
use std::rc::Rc;

use netfuzz::config::{FuzzConfig, FuzzConfigBuilder};
use netfuzz::interrupt::Interrupt;
use netfuzz::phase::{Phase, PhaseProgress, PhaseRenderer, RunOutcome};
use netfuzz::state::FuzzStats;

/// Seed shared by the deterministic scenarios.
pub const TEST_SEED: u64 = 0x5eed;

/// A seeded builder with small targets.
pub fn small_builder(clients: usize) -> FuzzConfigBuilder {
    FuzzConfig::builder()
        .clients(clients)
        .connection_iterations(12)
        .message_iterations(6)
        .seed(TEST_SEED)
}

/// A seeded configuration with small targets.
pub fn small_config(clients: usize) -> FuzzConfig {
    small_builder(clients).build().unwrap()
}

/// What a [`RecordingRenderer`] saw.
#[derive(Debug, Default)]
pub struct RenderLog {
    /// Every progress value passed to `render`, in order.
    pub progress: Vec<PhaseProgress>,
    /// Completed phases with the counters at completion time.
    pub completed: Vec<(PhaseProgress, FuzzStats)>,
    /// The final outcome, once the run is over.
    pub outcome: Option<RunOutcome>,
}

impl RenderLog {
    /// Phases in completion order.
    pub fn completed_phases(&self) -> Vec<Phase> {
        self.completed.iter().map(|(progress, _)| progress.phase).collect()
    }

    /// Counters captured when `phase` completed.
    pub fn stats_at(&self, phase: Phase) -> Option<FuzzStats> {
        self.completed
            .iter()
            .find(|(progress, _)| progress.phase == phase)
            .map(|(_, stats)| *stats)
    }
}

/// Renderer that records into a shared [`RenderLog`].
#[derive(Debug, Clone, Default)]
pub struct RecordingRenderer {
    log: Rc<RefCell<RenderLog>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the log, readable after the renderer was moved into a run.
    pub fn log(&self) -> Rc<RefCell<RenderLog>> {
        Rc::clone(&self.log)
    }
}

impl PhaseRenderer for RecordingRenderer {
    fn render(&mut self, progress: &PhaseProgress) {
        self.log.borrow_mut().progress.push(*progress);
    }

    fn phase_completed(&mut self, progress: &PhaseProgress, stats: &FuzzStats) {
        self.log.borrow_mut().completed.push((*progress, *stats));
    }

    fn finish(&mut self, outcome: &RunOutcome) {
        self.log.borrow_mut().outcome = Some(*outcome);
    }
}

/// Fires on poll number `after + 1` and stays fired.
#[derive(Debug)]
pub struct ScriptedInterrupt {
    remaining: u64,
    polls: Rc<RefCell<u64>>,
}

impl ScriptedInterrupt {
    pub fn after(polls: u64) -> Self {
        Self {
            remaining: polls,
            polls: Rc::default(),
        }
    }

    /// Handle to the poll counter.
    pub fn polls(&self) -> Rc<RefCell<u64>> {
        Rc::clone(&self.polls)
    }
}

impl Interrupt for ScriptedInterrupt {
    fn is_pending(&mut self) -> bool {
        *self.polls.borrow_mut() += 1;
        if self.remaining == 0 {
            return true;
        }
        self.remaining -= 1;
        false
    }
}
