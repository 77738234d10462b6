//! Run options and cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Which backend `verify` constructs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverChoice {
    #[default]
    Z3,
    Cvc5,
}

/// Options for a verification run.
#[derive(Debug, Clone, Default)]
pub struct PdrOptions {
    pub solver: SolverChoice,
    /// Overall wall-clock budget in seconds; zero means unlimited.
    pub timeout_secs: u64,
    /// External shutdown flag, polled at loop iteration boundaries.
    pub stop: Option<Arc<AtomicBool>>,
}

impl PdrOptions {
    /// Freeze the deadline and stop flag for one run.
    pub fn cancel_signal(&self) -> CancelSignal {
        CancelSignal {
            deadline: deadline_from_timeout_secs(self.timeout_secs),
            stop: self.stop.clone(),
        }
    }
}

/// Snapshot of the cancellation sources for a single run. Every potentially
/// long-running loop polls this at each iteration boundary.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    deadline: Option<Instant>,
    stop: Option<Arc<AtomicBool>>,
}

impl CancelSignal {
    /// A signal that never fires, for tests and subordinate queries.
    pub fn none() -> Self {
        Self {
            deadline: None,
            stop: None,
        }
    }

    pub fn requested(&self) -> bool {
        if deadline_exceeded(self.deadline) {
            return true;
        }
        match &self.stop {
            Some(flag) => flag.load(Ordering::Relaxed),
            None => false,
        }
    }
}

pub(crate) fn deadline_exceeded(deadline: Option<Instant>) -> bool {
    match deadline {
        Some(deadline) => Instant::now() >= deadline,
        None => false,
    }
}

pub(crate) fn deadline_from_timeout_secs(timeout_secs: u64) -> Option<Instant> {
    if timeout_secs == 0 {
        None
    } else {
        Instant::now().checked_add(Duration::from_secs(timeout_secs))
    }
}
