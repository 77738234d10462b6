//! The main loop: base cases, frame growth, CTI blocking, propagation.

use rampart_cfa::ReachableBlocks;
use rampart_smt::backends::cvc5_backend::Cvc5Solver;
use rampart_smt::backends::z3_backend::Z3Solver;
use rampart_smt::solver::{SatResult, SmtSolver, SolverScope};
use tracing::info;

use crate::frames::{DeltaFrameSet, FrameSet, PropagationStatus};
use crate::obligations::{block_all_obligations, BlockResult};
use crate::options::{PdrOptions, SolverChoice};
use crate::predicates::PredicateAbstractionManager;
use crate::queries::get_cti;
use crate::solver_err;
use crate::stats::PdrStats;
use crate::transition::TransitionSystem;
use crate::{EngineError, InductiveInvariant, VerificationOutcome};

/// Verify a block bundle with a freshly constructed backend.
pub fn verify(
    bundle: &ReachableBlocks,
    options: &PdrOptions,
) -> Result<VerificationOutcome, EngineError> {
    match options.solver {
        SolverChoice::Z3 => {
            let mut solver = Z3Solver::with_timeout_secs(options.timeout_secs);
            run_pdr(&mut solver, bundle, options)
        }
        SolverChoice::Cvc5 => {
            let mut solver =
                Cvc5Solver::with_timeout_secs(options.timeout_secs).map_err(solver_err)?;
            run_pdr(&mut solver, bundle, options)
        }
    }
}

/// Run the engine on an already constructed solver.
pub fn run_pdr<S: SmtSolver>(
    solver: &mut S,
    bundle: &ReachableBlocks,
    options: &PdrOptions,
) -> Result<VerificationOutcome, EngineError> {
    run_pdr_with_stats(solver, bundle, options).map(|(outcome, _)| outcome)
}

/// Like [`run_pdr`], but also reports the run counters.
pub fn run_pdr_with_stats<S: SmtSolver>(
    solver: &mut S,
    bundle: &ReachableBlocks,
    options: &PdrOptions,
) -> Result<(VerificationOutcome, PdrStats), EngineError> {
    let ts = TransitionSystem::from_blocks(bundle)?;
    let cancel = options.cancel_signal();
    let mut stats = PdrStats::default();

    if ts.targets().is_empty() {
        info!("no target locations, trivially safe");
        let invariant = InductiveInvariant {
            clauses: Vec::new(),
            safety_property: ts.safety_property().clone(),
        };
        return Ok((VerificationOutcome::Safe { invariant }, stats));
    }
    if ts.targets().contains(&ts.entry()) {
        info!("the entry location is a target");
        return Ok((VerificationOutcome::Unsafe { trace: Vec::new() }, stats));
    }

    ts.declare_vars(solver).map_err(solver_err)?;

    // One-step base case: a satisfiable block from the entry straight into a
    // target is already a counterexample.
    for corrected in ts.corrected_blocks() {
        if corrected.pred != ts.entry() || !ts.targets().contains(&corrected.succ) {
            continue;
        }
        let mut scope = SolverScope::open(solver).map_err(solver_err)?;
        scope.assert(&corrected.formula).map_err(solver_err)?;
        for constraint in ts.domain_constraints() {
            scope.assert(&constraint).map_err(solver_err)?;
        }
        stats.sat_checks += 1;
        let result = scope.check_sat().map_err(solver_err)?;
        scope.close().map_err(solver_err)?;
        match result {
            SatResult::Sat => {
                info!("one-step counterexample at the entry");
                let trace = vec![ts.block(corrected.block_index).clone()];
                return Ok((VerificationOutcome::Unsafe { trace }, stats));
            }
            SatResult::Unsat => {}
            SatResult::Unknown(reason) => return Err(EngineError::Solver(reason)),
        }
    }

    let mut frames = DeltaFrameSet::new(&ts);
    let mut predicates = PredicateAbstractionManager::new(&ts);

    loop {
        if cancel.requested() {
            return Ok((VerificationOutcome::Cancelled, stats));
        }
        frames.open_next_frame();
        stats.frames_opened += 1;
        info!(frontier = frames.frontier(), "frontier advanced");

        // Block every counterexample to inductiveness at this frontier.
        loop {
            if cancel.requested() {
                return Ok((VerificationOutcome::Cancelled, stats));
            }
            let cti = match get_cti(solver, &ts, &frames, &mut predicates, &mut stats)? {
                Some(cti) => cti,
                None => break,
            };
            match block_all_obligations(
                solver,
                &ts,
                &mut frames,
                &mut predicates,
                cti,
                &cancel,
                &mut stats,
            )? {
                BlockResult::Blocked => {}
                BlockResult::Counterexample(trace) => {
                    info!(steps = trace.len(), "counterexample found");
                    return Ok((VerificationOutcome::Unsafe { trace }, stats));
                }
                BlockResult::Cancelled => return Ok((VerificationOutcome::Cancelled, stats)),
            }
        }

        match frames.propagate(solver, &ts, &cancel, &mut stats)? {
            PropagationStatus::Converged { level } => {
                info!(level, "fixpoint reached");
                let invariant = InductiveInvariant {
                    clauses: frames.states_at(level),
                    safety_property: ts.safety_property().clone(),
                };
                return Ok((VerificationOutcome::Safe { invariant }, stats));
            }
            PropagationStatus::Open => {}
            PropagationStatus::Cancelled => return Ok((VerificationOutcome::Cancelled, stats)),
        }
    }
}
