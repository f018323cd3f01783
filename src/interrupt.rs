//! Operator interrupt signals.
//!
//! The server and every client poll an [`Interrupt`] once per turn. Once it reports
//! `true` they release their host and park; the run then ends as aborted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Non-blocking check for an operator interrupt.
pub trait Interrupt {
    /// Returns `true` if an interrupt is pending. Must not block.
    fn is_pending(&mut self) -> bool;
}

/// Never fires.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInterrupt;

impl Interrupt for NoInterrupt {
    fn is_pending(&mut self) -> bool {
        false
    }
}

/// A shareable flag, raised from anywhere (another thread, a signal handler, a test).
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag {
    raised: Arc<AtomicBool>,
}

impl InterruptFlag {
    /// Creates a lowered flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag. Every clone observes it.
    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once the flag was raised.
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }
}

impl Interrupt for InterruptFlag {
    fn is_pending(&mut self) -> bool {
        self.is_raised()
    }
}

impl<I: Interrupt + ?Sized> Interrupt for Box<I> {
    fn is_pending(&mut self) -> bool {
        (**self).is_pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_is_shared_between_clones() {
        let flag = InterruptFlag::new();
        let mut observer = flag.clone();
        assert!(!observer.is_pending());
        flag.raise();
        assert!(observer.is_pending());
    }

    #[test]
    fn boxed_interrupts_delegate() {
        let mut boxed: Box<dyn Interrupt> = Box::new(NoInterrupt);
        assert!(!boxed.is_pending());
    }
}
