//! Cancellation and resource limits.
//!
//! The host drives deadlines: a watchdog thread sets the [`CancelFlag`] and
//! the interpreter observes it at every loop back-edge and function call.
//! The recursion cap protects the Rust call stack; the output cap lives in
//! the sink (`io::CappedPrint`). Memory limits are best-effort and not part
//! of the contract.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use crate::{
    error::Exception,
    token::CodeLoc,
};

/// Recursion cap applied when the host does not configure one.
///
/// The tree-walking interpreter spends several Rust frames per language
/// call, so the cap is well below the Rust stack's capacity.
#[cfg(not(debug_assertions))]
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 500;
/// Debug builds use much larger stack frames.
#[cfg(debug_assertions)]
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 100;

/// Shared flag a host watchdog raises to abort an execution.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag. Safe to call from another thread.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Why execution was stopped by the resource layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitError {
    /// The host raised the cancel flag (or the deadline passed).
    Cancelled,
    /// The call stack reached the recursion cap.
    Recursion { limit: usize },
}

impl LimitError {
    /// Converts the limit violation into an exception at the position the
    /// interpreter last executed.
    #[must_use]
    pub fn into_exception(self, loc: CodeLoc) -> Exception {
        match self {
            Self::Cancelled => Exception::cancelled(loc),
            Self::Recursion { limit } => Exception::stack_overflow(limit, loc),
        }
    }
}

/// Checked at loop back-edges and call boundaries during execution.
pub trait ResourceTracker {
    /// Called at every loop back-edge and before every function call.
    fn check_cancel(&mut self) -> Result<(), LimitError>;

    /// Called before pushing a call frame; `depth` is the depth before the
    /// push.
    fn check_recursion_depth(&self, depth: usize) -> Result<(), LimitError>;
}

/// Tracker with no cancellation source and the default recursion cap.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLimitTracker;

impl ResourceTracker for NoLimitTracker {
    #[inline]
    fn check_cancel(&mut self) -> Result<(), LimitError> {
        Ok(())
    }

    #[inline]
    fn check_recursion_depth(&self, depth: usize) -> Result<(), LimitError> {
        if depth >= DEFAULT_MAX_RECURSION_DEPTH {
            return Err(LimitError::Recursion {
                limit: DEFAULT_MAX_RECURSION_DEPTH,
            });
        }
        Ok(())
    }
}

/// Tracker honouring a cancel flag, an optional deadline, and a recursion cap.
#[derive(Debug, Clone)]
pub struct LimitedTracker {
    cancel: CancelFlag,
    deadline: Option<Instant>,
    max_recursion_depth: usize,
}

impl LimitedTracker {
    #[must_use]
    pub fn new(cancel: CancelFlag) -> Self {
        Self {
            cancel,
            deadline: None,
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
        }
    }

    /// Adds a wall-clock deadline relative to now.
    #[must_use]
    pub fn with_deadline(mut self, budget: Duration) -> Self {
        self.deadline = Some(Instant::now() + budget);
        self
    }

    #[must_use]
    pub fn with_max_recursion_depth(mut self, limit: usize) -> Self {
        self.max_recursion_depth = limit;
        self
    }
}

impl ResourceTracker for LimitedTracker {
    #[inline]
    fn check_cancel(&mut self) -> Result<(), LimitError> {
        if self.cancel.is_cancelled() {
            return Err(LimitError::Cancelled);
        }
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            return Err(LimitError::Cancelled);
        }
        Ok(())
    }

    #[inline]
    fn check_recursion_depth(&self, depth: usize) -> Result<(), LimitError> {
        if depth >= self.max_recursion_depth {
            return Err(LimitError::Recursion {
                limit: self.max_recursion_depth,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_flag_is_observed() {
        let flag = CancelFlag::new();
        let mut tracker = LimitedTracker::new(flag.clone());
        assert!(tracker.check_cancel().is_ok());
        flag.cancel();
        assert_eq!(tracker.check_cancel(), Err(LimitError::Cancelled));
    }

    #[test]
    fn recursion_cap_is_enforced() {
        let tracker = LimitedTracker::new(CancelFlag::new()).with_max_recursion_depth(8);
        assert!(tracker.check_recursion_depth(7).is_ok());
        assert_eq!(
            tracker.check_recursion_depth(8),
            Err(LimitError::Recursion { limit: 8 })
        );
    }
}
