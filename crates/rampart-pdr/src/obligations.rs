//! Proof-obligation scheduling.
//!
//! Obligations live in an arena and point back at the obligation they are a
//! predecessor of, so a finished counterexample can be read off the cause
//! links without reference cycles. A min-heap keyed on frame level keeps the
//! search depth-first towards the initial states; ties break in insertion
//! order.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use rampart_cfa::Block;
use rampart_smt::solver::SmtSolver;
use tracing::debug;

use crate::frames::FrameSet;
use crate::options::CancelSignal;
use crate::predicates::PredicateAbstractionManager;
use crate::queries::{consecution, is_initial, ConsecutionOutcome, StatesWithLocation};
use crate::stats::PdrStats;
use crate::transition::TransitionSystem;
use crate::EngineError;

/// Index into the obligation arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ObligationId(usize);

struct Obligation {
    state: StatesWithLocation,
    /// The obligation this one must step into; `None` for the CTI itself.
    cause: Option<ObligationId>,
}

/// Result of blocking one CTI and every obligation it spawns.
#[derive(Debug)]
pub enum BlockResult {
    /// The CTI and all derived obligations were blocked into the frames.
    Blocked,
    /// An initial state reaches the error locations. Carries the block chain
    /// of the abstract counterexample in execution order.
    Counterexample(Vec<Block>),
    /// The cancellation signal fired.
    Cancelled,
}

/// Drive a frontier CTI down to either a counterexample or a set of blocking
/// clauses. Blocked obligations below the frontier are re-enqueued one level
/// up so the same cube cannot resurface there.
pub fn block_all_obligations<S: SmtSolver, F: FrameSet>(
    solver: &mut S,
    ts: &TransitionSystem,
    frames: &mut F,
    predicates: &mut PredicateAbstractionManager,
    cti: StatesWithLocation,
    cancel: &CancelSignal,
    stats: &mut PdrStats,
) -> Result<BlockResult, EngineError> {
    let mut arena = vec![Obligation {
        state: cti,
        cause: None,
    }];
    let mut queue: BinaryHeap<Reverse<(usize, u64, usize)>> = BinaryHeap::new();
    let mut seq: u64 = 0;
    queue.push(Reverse((frames.frontier(), seq, 0)));

    while let Some(Reverse((level, _, id))) = queue.pop() {
        if cancel.requested() {
            return Ok(BlockResult::Cancelled);
        }
        stats.obligations_processed += 1;
        let state = arena[id].state.clone();

        if level == 0 || is_initial(ts, &state.concrete) {
            debug!(level, "obligation reached the initial states");
            return Ok(BlockResult::Counterexample(assemble_trace(ts, &arena, id)));
        }

        match consecution(solver, ts, frames, predicates, level, &state, stats)? {
            ConsecutionOutcome::Blocked { generalized } => {
                debug!(level, %state.location, "obligation blocked");
                frames.block_states(&generalized, level, stats);
                stats.clauses_blocked += 1;
                if level < frames.frontier() {
                    seq += 1;
                    queue.push(Reverse((level + 1, seq, id)));
                }
            }
            ConsecutionOutcome::Predecessor { state: predecessor } => {
                debug!(level, %predecessor.location, "predecessor found");
                let predecessor_id = arena.len();
                arena.push(Obligation {
                    state: predecessor,
                    cause: Some(ObligationId(id)),
                });
                seq += 1;
                queue.push(Reverse((level - 1, seq, predecessor_id)));
                // The original obligation stays pending at its own level.
                seq += 1;
                queue.push(Reverse((level, seq, id)));
            }
        }
    }
    Ok(BlockResult::Blocked)
}

/// Read the abstract counterexample off the cause links: each obligation
/// recorded the block its model stepped through, so the chain from the
/// initial obligation to the CTI is exactly the execution order, closed by
/// the CTI's own block into a target.
fn assemble_trace(ts: &TransitionSystem, arena: &[Obligation], initial_id: usize) -> Vec<Block> {
    let mut trace = Vec::new();
    let mut current = Some(initial_id);
    while let Some(id) = current {
        trace.push(ts.block(arena[id].state.block_index).clone());
        current = arena[id].cause.map(|ObligationId(cause)| cause);
    }
    trace
}
