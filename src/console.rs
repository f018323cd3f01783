//! Terminal collaborators: phase display and keypress interrupt.
//!
//! [`ConsoleRenderer`] redraws one fixed line per phase in place. [`PlainRenderer`]
//! writes a line per completed phase and suits pipes and log files.
//! [`KeypressInterrupt`] fires on the first key press.

use std::io::{self, Stdout, Write};
use std::time::Duration;

use crossterm::cursor::{self, MoveTo};
use crossterm::event::{self, Event, KeyEventKind};
use crossterm::style::Print;
use crossterm::terminal::{self, Clear, ClearType};
use crossterm::{execute, queue};
use tracing::warn;

use crate::interrupt::Interrupt;
use crate::phase::{Phase, PhaseProgress, PhaseRenderer, RunOutcome};
use crate::state::FuzzStats;
use crate::FuzzError;

/// Line printed when every phase completed.
pub const COMPLETION_MARKER: &str = "Done!";

fn outcome_line(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::Completed => COMPLETION_MARKER.to_owned(),
        RunOutcome::Aborted { phase } => format!("Aborted during {}", phase),
    }
}

/// Rows the display occupies: one per phase and the outcome line.
const DISPLAY_ROWS: u16 = Phase::ALL.len() as u16 + 1;

/// Redraws phase progress in place on the terminal.
#[derive(Debug)]
pub struct ConsoleRenderer {
    out: Stdout,
    origin: u16,
    last: Option<PhaseProgress>,
    failed: bool,
}

impl ConsoleRenderer {
    /// Reserves the display rows below the cursor and hides the cursor.
    pub fn new() -> Result<Self, FuzzError> {
        let mut out = io::stdout();
        for _ in 0..DISPLAY_ROWS {
            writeln!(out)?;
        }
        out.flush()?;
        let (_, row) = cursor::position()?;
        execute!(out, cursor::Hide)?;
        Ok(Self {
            out,
            origin: row.saturating_sub(DISPLAY_ROWS),
            last: None,
            failed: false,
        })
    }

    fn draw(&mut self, row: u16, text: &str) {
        let result = queue!(
            self.out,
            MoveTo(0, self.origin.saturating_add(row)),
            Clear(ClearType::CurrentLine),
            Print(text)
        )
        .and_then(|()| self.out.flush());
        if let Err(err) = result {
            if !self.failed {
                warn!(%err, "console update failed");
                self.failed = true;
            }
        }
    }
}

impl PhaseRenderer for ConsoleRenderer {
    fn render(&mut self, progress: &PhaseProgress) {
        if self.last.as_ref() == Some(progress) {
            return;
        }
        self.last = Some(*progress);
        let row = u16::from(progress.phase.number() - 1);
        self.draw(row, &progress.to_string());
    }

    fn finish(&mut self, outcome: &RunOutcome) {
        self.draw(DISPLAY_ROWS - 1, &outcome_line(outcome));
        let below = self.origin.saturating_add(DISPLAY_ROWS);
        if let Err(err) = execute!(self.out, MoveTo(0, below), cursor::Show) {
            warn!(%err, "failed to restore the cursor");
        }
    }
}

impl Drop for ConsoleRenderer {
    fn drop(&mut self) {
        let _ = execute!(self.out, cursor::Show);
    }
}

/// Writes one line per completed phase.
#[derive(Debug)]
pub struct PlainRenderer<W: Write> {
    out: W,
    failed: bool,
}

impl<W: Write> PlainRenderer<W> {
    /// Renders into `out`.
    pub const fn new(out: W) -> Self {
        Self { out, failed: false }
    }

    /// Returns the writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: &str) {
        if let Err(err) = writeln!(self.out, "{}", text).and_then(|()| self.out.flush()) {
            if !self.failed {
                warn!(%err, "progress output failed");
                self.failed = true;
            }
        }
    }
}

impl<W: Write> PhaseRenderer for PlainRenderer<W> {
    fn render(&mut self, _progress: &PhaseProgress) {}

    fn phase_completed(&mut self, progress: &PhaseProgress, _stats: &FuzzStats) {
        self.line(&progress.to_string());
    }

    fn finish(&mut self, outcome: &RunOutcome) {
        self.line(&outcome_line(outcome));
    }
}

/// Fires once any key is pressed. Holds the terminal in raw mode while alive.
#[derive(Debug)]
pub struct KeypressInterrupt {
    fired: bool,
    failed: bool,
}

impl KeypressInterrupt {
    /// Switches the terminal to raw mode so single key presses are visible.
    pub fn new() -> Result<Self, FuzzError> {
        terminal::enable_raw_mode()?;
        Ok(Self {
            fired: false,
            failed: false,
        })
    }
}

impl Interrupt for KeypressInterrupt {
    fn is_pending(&mut self) -> bool {
        if self.fired || self.failed {
            return self.fired;
        }
        let polled = event::poll(Duration::ZERO).and_then(|ready| {
            if ready {
                event::read().map(Some)
            } else {
                Ok(None)
            }
        });
        match polled {
            Ok(Some(Event::Key(key))) if key.kind == KeyEventKind::Press => self.fired = true,
            Ok(_) => {},
            Err(err) => {
                warn!(%err, "keyboard polling failed, interrupts disabled");
                self.failed = true;
            },
        }
        self.fired
    }
}

impl Drop for KeypressInterrupt {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}
