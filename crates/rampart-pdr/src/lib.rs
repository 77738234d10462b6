#![doc = include_str!("../README.md")]

pub mod driver;
pub mod frames;
pub mod obligations;
pub mod options;
pub mod predicates;
pub mod queries;
pub mod stats;
pub mod transition;

use rampart_cfa::Block;
use rampart_smt::terms::SmtTerm;
use thiserror::Error;

pub use driver::{run_pdr, run_pdr_with_stats, verify};
pub use options::{CancelSignal, PdrOptions, SolverChoice};
pub use stats::PdrStats;

/// Tool-level failures that abort a verification run.
///
/// Internal invariant violations are deliberately not represented here: a
/// generalization that implies an initial state, or a lifting query that
/// stays satisfiable after refinement, indicates a bug in the engine and is
/// handled by a fatal assertion rather than a recoverable error.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The external solver failed or could not answer a query. The run is
    /// aborted; no soundness guarantee exists past an unanswered check.
    #[error("solver failure: {0}")]
    Solver(String),
    /// The block bundle violates the interface contract (e.g. an SSA index
    /// of zero, or a block variable missing from the typing map).
    #[error("malformed transition system: {0}")]
    InvalidSystem(String),
}

pub(crate) fn solver_err(err: impl std::error::Error) -> EngineError {
    EngineError::Solver(err.to_string())
}

/// Terminal result of a verification run.
#[derive(Debug, Clone)]
pub enum VerificationOutcome {
    /// A fixpoint was reached; the invariant certifies safety.
    Safe { invariant: InductiveInvariant },
    /// A counterexample exists; `trace` is the ordered block chain from the
    /// entry location to a target location, handed off for replay.
    Unsafe { trace: Vec<Block> },
    /// The shutdown signal or deadline was observed mid-search.
    Cancelled,
}

/// An inductive invariant proving the safety property: the clause set of the
/// converged frame level, conjoined with the safety property itself.
#[derive(Debug, Clone)]
pub struct InductiveInvariant {
    pub clauses: Vec<SmtTerm>,
    pub safety_property: SmtTerm,
}

impl InductiveInvariant {
    /// The invariant as a single formula over unprimed state variables.
    pub fn formula(&self) -> SmtTerm {
        let mut parts = self.clauses.clone();
        parts.push(self.safety_property.clone());
        SmtTerm::and(parts)
    }
}
