//! Run statistics, reported alongside the outcome.

/// Counters accumulated over one verification run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PdrStats {
    /// Satisfiability checks issued to the backend.
    pub sat_checks: u64,
    /// Counterexamples-to-inductiveness discovered at the frontier.
    pub ctis_found: u64,
    /// Proof obligations popped from the scheduler queue.
    pub obligations_processed: u64,
    /// Clauses added to frames by blocking.
    pub clauses_blocked: u64,
    /// Clauses pushed forward during propagation.
    pub clauses_propagated: u64,
    /// Clauses removed by subsumption during propagation or insertion.
    pub clauses_subsumed: u64,
    /// Abstraction predicates added by refinement.
    pub predicates_added: u64,
    /// Refinement rounds triggered by a too-coarse abstraction.
    pub refinements: u64,
    /// Frames opened by the main loop.
    pub frames_opened: u64,
}
