//! End-to-end verification runs over small control-flow graphs.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use rampart_cfa::{Block, LocationId, ReachableBlocks, SsaContext, VarType};
use rampart_pdr::transition::TransitionSystem;
use rampart_pdr::{run_pdr_with_stats, verify, PdrOptions, VerificationOutcome};
use rampart_smt::backends::z3_backend::Z3Solver;
use rampart_smt::solver::{SatResult, SmtSolver};
use rampart_smt::terms::{SmtSort, SmtTerm};

const ENTRY: LocationId = LocationId(0);
const LOOP_HEAD: LocationId = LocationId(1);
const ERROR: LocationId = LocationId(2);

/// Entry initializes `c` to zero, the loop head increments it (optionally
/// capped), and the error location sits behind a guard on `c`.
fn counter_bundle(loop_guard: Option<i64>, error_guard: SmtTerm) -> ReachableBlocks {
    let mut variables = BTreeMap::new();
    variables.insert("c".to_string(), VarType::Uint);
    let mut loop_parts = vec![SmtTerm::var("c__2").eq(SmtTerm::var("c__1").add(SmtTerm::int(1)))];
    if let Some(bound) = loop_guard {
        loop_parts.push(SmtTerm::var("c__1").lt(SmtTerm::int(bound)));
    }
    ReachableBlocks {
        blocks: vec![
            Block {
                pred: ENTRY,
                succ: LOOP_HEAD,
                formula: SmtTerm::var("c__2").eq(SmtTerm::int(0)),
                pre: SsaContext::new(),
                post: SsaContext::new().with_var("c", 2),
            },
            Block {
                pred: LOOP_HEAD,
                succ: LOOP_HEAD,
                formula: SmtTerm::and(loop_parts),
                pre: SsaContext::new().with_var("c", 1),
                post: SsaContext::new().with_var("c", 2),
            },
            Block {
                pred: LOOP_HEAD,
                succ: ERROR,
                formula: error_guard,
                pre: SsaContext::new().with_var("c", 1),
                post: SsaContext::new(),
            },
        ],
        entry: ENTRY,
        targets: BTreeSet::from([ERROR]),
        variables,
    }
}

/// Conjoin the raw block formulas of a trace, with each step's SSA instances
/// renamed apart and adjacent steps linked on the counter value.
fn path_is_satisfiable(trace: &[Block]) -> bool {
    let mut solver = Z3Solver::new();

    let in_index = |block: &Block| block.pre.index_of("c").unwrap_or(1);
    let out_index = |block: &Block| {
        block
            .post
            .index_of("c")
            .unwrap_or_else(|| in_index(block))
    };

    for (step, block) in trace.iter().enumerate() {
        let mut renaming = HashMap::new();
        for k in 1..=2u64 {
            let local = format!("s{step}_c__{k}");
            solver.declare_var(&local, &SmtSort::Int).unwrap();
            solver
                .assert(&SmtTerm::var(local.clone()).ge(SmtTerm::int(0)))
                .unwrap();
            renaming.insert(format!("c__{k}"), local);
        }
        solver.assert(&block.formula.rename_vars(&renaming)).unwrap();
    }
    for (step, pair) in trace.windows(2).enumerate() {
        let out = format!("s{step}_c__{}", out_index(&pair[0]));
        let next_in = format!("s{}_c__{}", step + 1, in_index(&pair[1]));
        solver
            .assert(&SmtTerm::var(out).eq(SmtTerm::var(next_in)))
            .unwrap();
    }
    solver.check_sat().unwrap() == SatResult::Sat
}

#[test]
fn unguarded_counter_reaches_the_error_location() {
    let bundle = counter_bundle(None, SmtTerm::var("c__1").eq(SmtTerm::int(3)));
    let mut solver = Z3Solver::new();
    let (outcome, stats) =
        run_pdr_with_stats(&mut solver, &bundle, &PdrOptions::default()).unwrap();

    let trace = match outcome {
        VerificationOutcome::Unsafe { trace } => trace,
        other => panic!("expected unsafe, got {other:?}"),
    };
    assert!(!trace.is_empty());
    assert_eq!(trace[0].pred, ENTRY);
    for pair in trace.windows(2) {
        assert_eq!(pair[0].succ, pair[1].pred, "trace blocks do not chain");
    }
    assert_eq!(trace.last().unwrap().succ, ERROR);
    // The abstract counterexample corresponds to a real execution: three
    // increments from zero are needed before the error guard opens.
    assert!(path_is_satisfiable(&trace));
    assert!(trace.len() >= 5);
    assert!(stats.frames_opened <= 5, "search ran long: {stats:?}");
}

#[test]
fn guarded_counter_is_safe_with_an_inductive_invariant() {
    let bundle = counter_bundle(Some(3), SmtTerm::var("c__1").ge(SmtTerm::int(5)));
    let mut solver = Z3Solver::new();
    let (outcome, stats) =
        run_pdr_with_stats(&mut solver, &bundle, &PdrOptions::default()).unwrap();

    let invariant = match outcome {
        VerificationOutcome::Safe { invariant } => invariant,
        other => panic!("expected safe, got {other:?}"),
    };
    assert!(stats.frames_opened <= 5, "search ran long: {stats:?}");

    let ts = TransitionSystem::from_blocks(&bundle).unwrap();
    let mut checker = Z3Solver::new();
    ts.declare_vars(&mut checker).unwrap();
    let formula = invariant.formula();

    // Initiation: every initial state satisfies the invariant.
    checker.push().unwrap();
    checker.assert(ts.initial_condition()).unwrap();
    for constraint in ts.domain_constraints() {
        checker.assert(&constraint).unwrap();
    }
    checker.assert(&formula.clone().not()).unwrap();
    assert_eq!(checker.check_sat().unwrap(), SatResult::Unsat);
    checker.pop().unwrap();

    // Consecution: the invariant is closed under the transition relation.
    checker.push().unwrap();
    checker.assert(&formula).unwrap();
    for constraint in ts.domain_constraints() {
        checker.assert(&constraint).unwrap();
    }
    checker.assert(ts.transition_relation()).unwrap();
    checker.assert(&ts.prime(&formula).not()).unwrap();
    assert_eq!(checker.check_sat().unwrap(), SatResult::Unsat);
    checker.pop().unwrap();

    // The invariant rules out every target location.
    checker.push().unwrap();
    checker.assert(&formula).unwrap();
    checker.assert(&ts.safety_property().clone().not()).unwrap();
    assert_eq!(checker.check_sat().unwrap(), SatResult::Unsat);
    checker.pop().unwrap();
}

#[test]
fn verify_builds_its_own_backend() {
    let bundle = counter_bundle(Some(3), SmtTerm::var("c__1").ge(SmtTerm::int(5)));
    let outcome = verify(&bundle, &PdrOptions::default()).unwrap();
    assert!(matches!(outcome, VerificationOutcome::Safe { .. }));
}

#[test]
fn preset_stop_flag_cancels_before_any_frontier_work() {
    let bundle = counter_bundle(Some(3), SmtTerm::var("c__1").ge(SmtTerm::int(5)));
    let mut solver = Z3Solver::new();
    let options = PdrOptions {
        stop: Some(Arc::new(AtomicBool::new(true))),
        ..Default::default()
    };
    let (outcome, stats) = run_pdr_with_stats(&mut solver, &bundle, &options).unwrap();
    assert!(matches!(outcome, VerificationOutcome::Cancelled));
    assert_eq!(stats.frames_opened, 0);
    assert_eq!(stats.sat_checks, 0);
}
