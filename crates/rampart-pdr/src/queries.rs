//! The satisfiability queries at the heart of the engine: frontier CTI
//! extraction, relative consecution with unsat-core generalization, and
//! predecessor lifting.
//!
//! Lifting widens a concrete predecessor into a cube of states that all step
//! into the successor cube through the block the model actually took. The
//! pre-image of that block is computed by substituting defining equalities
//! (and model values where no equality exists) for the non-state SSA
//! instances, so the widened cube never picks up states the block cannot
//! fire from.

use rampart_cfa::LocationId;
use rampart_smt::interpolate::{InterpolatingScope, InterpolationOutcome};
use rampart_smt::solver::{Model, SatResult, SmtSolver, SolverScope};
use rampart_smt::terms::{SmtSort, SmtTerm};
use tracing::debug;

use crate::frames::FrameSet;
use crate::predicates::PredicateAbstractionManager;
use crate::solver_err;
use crate::stats::PdrStats;
use crate::transition::TransitionSystem;
use crate::EngineError;

/// A cube of states tied to one CFA location, in both its abstracted and
/// concrete forms. The abstracted form drives blocking; the concrete form
/// seeds refinement when the abstraction turns out too coarse.
#[derive(Debug, Clone)]
pub struct StatesWithLocation {
    pub abstracted: SmtTerm,
    pub concrete: SmtTerm,
    pub location: LocationId,
    /// Index of the source block the model stepped through out of this cube.
    /// Trace assembly replays exactly these blocks, so parallel edges between
    /// the same location pair never get confused.
    pub block_index: usize,
}

/// A concrete state read off a model, together with the transition endpoints
/// the model witnessed.
#[derive(Debug, Clone)]
pub struct ConcreteState {
    pub formula: SmtTerm,
    pub location: LocationId,
    pub successor: LocationId,
}

/// Result of a relative consecution check.
#[derive(Debug, Clone)]
pub enum ConsecutionOutcome {
    /// The cube is unreachable in one step; its generalization can be
    /// blocked at the queried level.
    Blocked { generalized: SmtTerm },
    /// A one-step predecessor inside the context frame.
    Predecessor { state: StatesWithLocation },
}

/// Whether a state formula covers initial states. States carry their
/// location literal verbatim, so a syntactic check suffices.
pub fn is_initial(ts: &TransitionSystem, state: &SmtTerm) -> bool {
    state.conjuncts().contains(ts.initial_condition())
}

/// Look for a frontier state with a one-step path into the error locations.
/// A found state is lifted before it is returned.
pub fn get_cti<S: SmtSolver, F: FrameSet>(
    solver: &mut S,
    ts: &TransitionSystem,
    frames: &F,
    predicates: &mut PredicateAbstractionManager,
    stats: &mut PdrStats,
) -> Result<Option<StatesWithLocation>, EngineError> {
    let model_vars = ts.all_model_vars();
    let extracted = {
        let mut scope = SolverScope::open(solver).map_err(solver_err)?;
        for clause in frames.states_at(frames.frontier()) {
            scope.assert(&clause).map_err(solver_err)?;
        }
        for constraint in ts.domain_constraints() {
            scope.assert(&constraint).map_err(solver_err)?;
        }
        scope.assert(ts.transition_relation()).map_err(solver_err)?;
        scope
            .assert(&ts.prime(&ts.safety_property().clone().not()))
            .map_err(solver_err)?;

        let refs: Vec<(&str, &SmtSort)> =
            model_vars.iter().map(|(n, s)| (n.as_str(), s)).collect();
        stats.sat_checks += 1;
        let (result, model) = scope.check_sat_with_model(&refs).map_err(solver_err)?;
        scope.close().map_err(solver_err)?;
        match result {
            SatResult::Unsat => None,
            SatResult::Sat => Some(model.ok_or_else(|| {
                EngineError::Solver("satisfiable frontier query returned no model".into())
            })?),
            SatResult::Unknown(reason) => return Err(EngineError::Solver(reason)),
        }
    };

    let model = match extracted {
        Some(model) => model,
        None => return Ok(None),
    };
    let (formula, location, successor) = ts.state_from_model(&model)?;
    let successor = successor.ok_or_else(|| {
        EngineError::Solver("frontier model does not assign the primed program counter".into())
    })?;
    stats.ctis_found += 1;
    debug!(%location, %successor, "counterexample to inductiveness found");

    let state = ConcreteState {
        formula,
        location,
        successor,
    };
    let bad_states = ts.safety_property().clone().not();
    let lifted = abstract_lift(solver, ts, predicates, state, &bad_states, &model, stats)?;
    Ok(Some(lifted))
}

/// Check whether `states` is unreachable in one step from the frame below
/// `level`. On success the blocked cube is generalized from the unsat core;
/// on failure the predecessor is extracted and, unless it is initial, lifted.
pub fn consecution<S: SmtSolver, F: FrameSet>(
    solver: &mut S,
    ts: &TransitionSystem,
    frames: &F,
    predicates: &mut PredicateAbstractionManager,
    level: usize,
    states: &StatesWithLocation,
    stats: &mut PdrStats,
) -> Result<ConsecutionOutcome, EngineError> {
    assert!(level >= 1, "consecution needs a predecessor frame");

    enum Raw {
        Blocked(SmtTerm),
        Predecessor(Model),
    }

    let pc_name = ts.pc_unprimed();
    let model_vars = ts.all_model_vars();
    let conjuncts = states.abstracted.conjuncts();

    let raw = {
        let mut scope = SolverScope::open(solver).map_err(solver_err)?;
        for clause in frames.states_at(level - 1) {
            scope.assert(&clause).map_err(solver_err)?;
        }
        for constraint in ts.domain_constraints() {
            scope.assert(&constraint).map_err(solver_err)?;
        }
        scope
            .assert(&states.abstracted.clone().not())
            .map_err(solver_err)?;
        scope.assert(ts.transition_relation()).map_err(solver_err)?;

        let refs: Vec<(&str, &SmtSort)> =
            model_vars.iter().map(|(n, s)| (n.as_str(), s)).collect();

        let raw = if scope.supports_assumption_unsat_core() {
            let mut names = Vec::with_capacity(conjuncts.len());
            for (i, conjunct) in conjuncts.iter().enumerate() {
                let marker = format!("__con_m{i}");
                scope
                    .declare_var(&marker, &SmtSort::Bool)
                    .map_err(solver_err)?;
                scope
                    .assert(&SmtTerm::var(marker.clone()).implies(ts.prime(conjunct)))
                    .map_err(solver_err)?;
                names.push(marker);
            }
            stats.sat_checks += 1;
            match scope.check_sat_assuming(&names).map_err(solver_err)? {
                SatResult::Unsat => {
                    let core = scope.get_unsat_core_assumptions().map_err(solver_err)?;
                    let pinned: Vec<bool> =
                        conjuncts.iter().map(|c| c.mentions_var(&pc_name)).collect();
                    let keep: Vec<bool> = conjuncts
                        .iter()
                        .zip(&names)
                        .zip(&pinned)
                        .map(|((_, name), pin)| *pin || core.contains(name))
                        .collect();
                    let keep = minimize_assumptions(&mut *scope, &names, keep, &pinned, stats)?;
                    let kept: Vec<SmtTerm> = conjuncts
                        .iter()
                        .zip(&keep)
                        .filter(|(_, keep)| **keep)
                        .map(|(conjunct, _)| conjunct.clone())
                        .collect();
                    Raw::Blocked(SmtTerm::and(kept))
                }
                SatResult::Sat => {
                    // Re-run with the assumptions pinned down so the model
                    // satisfies the primed successor cube.
                    for name in &names {
                        scope
                            .assert(&SmtTerm::var(name.clone()))
                            .map_err(solver_err)?;
                    }
                    stats.sat_checks += 1;
                    let (result, model) =
                        scope.check_sat_with_model(&refs).map_err(solver_err)?;
                    match result {
                        SatResult::Sat => Raw::Predecessor(model.ok_or_else(|| {
                            EngineError::Solver(
                                "satisfiable consecution query returned no model".into(),
                            )
                        })?),
                        SatResult::Unsat => {
                            return Err(EngineError::Solver(
                                "consecution model vanished when assumptions were asserted"
                                    .into(),
                            ))
                        }
                        SatResult::Unknown(reason) => return Err(EngineError::Solver(reason)),
                    }
                }
                SatResult::Unknown(reason) => return Err(EngineError::Solver(reason)),
            }
        } else {
            scope
                .assert(&ts.prime(&states.abstracted))
                .map_err(solver_err)?;
            stats.sat_checks += 1;
            let (result, model) = scope.check_sat_with_model(&refs).map_err(solver_err)?;
            match result {
                SatResult::Unsat => Raw::Blocked(states.abstracted.clone()),
                SatResult::Sat => Raw::Predecessor(model.ok_or_else(|| {
                    EngineError::Solver("satisfiable consecution query returned no model".into())
                })?),
                SatResult::Unknown(reason) => return Err(EngineError::Solver(reason)),
            }
        };
        scope.close().map_err(solver_err)?;
        raw
    };

    match raw {
        Raw::Blocked(generalized) => {
            assert!(
                !is_initial(ts, &generalized),
                "generalized cube covers an initial state"
            );
            Ok(ConsecutionOutcome::Blocked { generalized })
        }
        Raw::Predecessor(model) => {
            let (formula, location, _) = ts.state_from_model(&model)?;
            let state = ConcreteState {
                formula,
                location,
                successor: states.location,
            };
            if is_initial(ts, &state.formula) {
                let (block_index, _) =
                    witnessed_pre_image(solver, ts, &state, &states.abstracted, &model, stats)?;
                return Ok(ConsecutionOutcome::Predecessor {
                    state: StatesWithLocation {
                        abstracted: state.formula.clone(),
                        concrete: state.formula,
                        location,
                        block_index,
                    },
                });
            }
            let lifted =
                abstract_lift(solver, ts, predicates, state, &states.abstracted, &model, stats)?;
            Ok(ConsecutionOutcome::Predecessor { state: lifted })
        }
    }
}

/// Widen a concrete state into an abstract cube whose members all step into
/// `successor_states` through the block the model took.
///
/// The abstraction is checked against the block's pre-image; if it is too
/// coarse the predicate set is refined from an interpolant and the check is
/// repeated. One refinement round must suffice: the refined predicates cover
/// every interpolant atom, so a second coarse round is a programming error.
pub fn abstract_lift<S: SmtSolver>(
    solver: &mut S,
    ts: &TransitionSystem,
    predicates: &mut PredicateAbstractionManager,
    state: ConcreteState,
    successor_states: &SmtTerm,
    model: &Model,
    stats: &mut PdrStats,
) -> Result<StatesWithLocation, EngineError> {
    let pc_name = ts.pc_unprimed();
    let (block_index, pre_image) =
        witnessed_pre_image(solver, ts, &state, successor_states, model, stats)?;
    let mut abstraction = predicates.compute_abstraction(solver, ts, &state.formula, stats)?;

    for attempt in 0..2 {
        let conjuncts = abstraction.conjuncts();
        let kept = {
            let mut scope = SolverScope::open(solver).map_err(solver_err)?;
            for constraint in ts.domain_constraints() {
                scope.assert(&constraint).map_err(solver_err)?;
            }
            scope
                .assert(&pre_image.clone().not())
                .map_err(solver_err)?;

            let kept = if scope.supports_assumption_unsat_core() {
                let mut names = Vec::with_capacity(conjuncts.len());
                for (i, conjunct) in conjuncts.iter().enumerate() {
                    let marker = format!("__lift{attempt}_m{i}");
                    scope
                        .declare_var(&marker, &SmtSort::Bool)
                        .map_err(solver_err)?;
                    scope
                        .assert(&SmtTerm::var(marker.clone()).implies(conjunct.clone()))
                        .map_err(solver_err)?;
                    names.push(marker);
                }
                stats.sat_checks += 1;
                match scope.check_sat_assuming(&names).map_err(solver_err)? {
                    SatResult::Unsat => {
                        let core = scope.get_unsat_core_assumptions().map_err(solver_err)?;
                        let pinned: Vec<bool> =
                            conjuncts.iter().map(|c| c.mentions_var(&pc_name)).collect();
                        let keep: Vec<bool> = conjuncts
                            .iter()
                            .zip(&names)
                            .zip(&pinned)
                            .map(|((_, name), pin)| *pin || core.contains(name))
                            .collect();
                        let keep =
                            minimize_assumptions(&mut *scope, &names, keep, &pinned, stats)?;
                        Some(
                            conjuncts
                                .iter()
                                .zip(&keep)
                                .filter(|(_, keep)| **keep)
                                .map(|(conjunct, _)| conjunct.clone())
                                .collect::<Vec<_>>(),
                        )
                    }
                    SatResult::Sat => None,
                    SatResult::Unknown(reason) => return Err(EngineError::Solver(reason)),
                }
            } else {
                for conjunct in &conjuncts {
                    scope.assert(conjunct).map_err(solver_err)?;
                }
                stats.sat_checks += 1;
                match scope.check_sat().map_err(solver_err)? {
                    SatResult::Unsat => Some(conjuncts.clone()),
                    SatResult::Sat => None,
                    SatResult::Unknown(reason) => return Err(EngineError::Solver(reason)),
                }
            };
            scope.close().map_err(solver_err)?;
            kept
        };

        match kept {
            Some(kept) => {
                let abstracted = SmtTerm::and(kept);
                assert!(
                    !is_initial(ts, &abstracted),
                    "lifted cube covers an initial state"
                );
                return Ok(StatesWithLocation {
                    abstracted,
                    concrete: state.formula.clone(),
                    location: state.location,
                    block_index,
                });
            }
            None => {
                assert!(
                    attempt == 0,
                    "abstraction is still too coarse after refinement"
                );
                stats.refinements += 1;
                debug!(%state.location, "abstraction too coarse, refining");

                let outcome = {
                    let mut itp = InterpolatingScope::open(solver).map_err(solver_err)?;
                    itp.mark_prefix(&state.formula).map_err(solver_err)?;
                    for constraint in ts.domain_constraints() {
                        itp.assert(&constraint).map_err(solver_err)?;
                    }
                    itp.assert(&pre_image.clone().not()).map_err(solver_err)?;
                    stats.sat_checks += 1;
                    let outcome = itp.compute().map_err(solver_err)?;
                    itp.close().map_err(solver_err)?;
                    outcome
                };
                match outcome {
                    InterpolationOutcome::Interpolant(interpolant) => {
                        abstraction = predicates.refine_and_compute_abstraction(
                            solver,
                            ts,
                            &state.formula,
                            &interpolant,
                            stats,
                        )?;
                    }
                    InterpolationOutcome::Satisfiable => {
                        return Err(EngineError::Solver(
                            "lifting refutation disappeared during refinement".into(),
                        ))
                    }
                    InterpolationOutcome::Inconclusive(reason) => {
                        return Err(EngineError::Solver(reason))
                    }
                }
            }
        }
    }
    unreachable!("lifting exits within one refinement round");
}

/// Shrink a refuting assumption set to an inclusion-minimal one, so dropped
/// literals leave the widest cube the refutation supports. Backend cores are
/// not minimal; without this pass a split equality can survive as both of
/// its bounds and pin the cube to a single value. Pinned entries never drop.
fn minimize_assumptions<S: SmtSolver>(
    solver: &mut S,
    names: &[String],
    mut keep: Vec<bool>,
    pinned: &[bool],
    stats: &mut PdrStats,
) -> Result<Vec<bool>, EngineError> {
    for i in 0..names.len() {
        if !keep[i] || pinned[i] {
            continue;
        }
        keep[i] = false;
        let subset: Vec<String> = names
            .iter()
            .zip(&keep)
            .filter(|(_, keep)| **keep)
            .map(|(name, _)| name.clone())
            .collect();
        stats.sat_checks += 1;
        match solver.check_sat_assuming(&subset).map_err(solver_err)? {
            SatResult::Unsat => {}
            SatResult::Sat => keep[i] = true,
            SatResult::Unknown(reason) => return Err(EngineError::Solver(reason)),
        }
    }
    Ok(keep)
}

/// The block the model took and its pre-image, as a formula over unprimed
/// variables that contains the extracted state. Parallel blocks between the
/// same locations are disambiguated by checking containment.
fn witnessed_pre_image<S: SmtSolver>(
    solver: &mut S,
    ts: &TransitionSystem,
    state: &ConcreteState,
    successor_states: &SmtTerm,
    model: &Model,
    stats: &mut PdrStats,
) -> Result<(usize, SmtTerm), EngineError> {
    for block in ts.corrected_blocks() {
        if block.pred != state.location || block.succ != state.successor {
            continue;
        }
        let candidate = pre_image(ts, &block.formula, successor_states, model);

        let mut scope = SolverScope::open(solver).map_err(solver_err)?;
        scope.assert(&state.formula).map_err(solver_err)?;
        for constraint in ts.domain_constraints() {
            scope.assert(&constraint).map_err(solver_err)?;
        }
        scope
            .assert(&candidate.clone().not())
            .map_err(solver_err)?;
        stats.sat_checks += 1;
        let result = scope.check_sat().map_err(solver_err)?;
        scope.close().map_err(solver_err)?;
        match result {
            SatResult::Unsat => return Ok((block.block_index, candidate)),
            SatResult::Sat => {}
            SatResult::Unknown(reason) => return Err(EngineError::Solver(reason)),
        }
    }
    panic!(
        "extracted state fires no block from {} to {}",
        state.location, state.successor
    );
}

/// Project the primed and intermediate SSA instances out of
/// `block ∧ successor'`. Instances with a defining top-level equality are
/// substituted by their definition; the rest are pinned to their model
/// values, which keeps the result an under-approximation of the projection
/// that still contains the extracted state.
fn pre_image(
    ts: &TransitionSystem,
    block_formula: &SmtTerm,
    successor_states: &SmtTerm,
    model: &Model,
) -> SmtTerm {
    let mut formula = SmtTerm::and(vec![block_formula.clone(), ts.prime(successor_states)]);
    let mut pending = ts.eliminable_vars();

    loop {
        let mut progressed = false;
        pending.retain(|(name, _)| match defining_equality(&formula, name) {
            Some(definition) => {
                formula = formula.substitute_var(name, &definition);
                progressed = true;
                false
            }
            None => true,
        });
        if !progressed {
            break;
        }
    }

    for (name, sort) in pending {
        let value = match sort {
            SmtSort::Int => model.get_int(&name).map(SmtTerm::int),
            SmtSort::Bool => model.get_bool(&name).map(SmtTerm::bool),
        };
        if let Some(value) = value {
            formula = formula.substitute_var(&name, &value);
        }
    }
    formula
}

/// A top-level equality conjunct defining `name` by a term free of it.
fn defining_equality(formula: &SmtTerm, name: &str) -> Option<SmtTerm> {
    for conjunct in formula.conjuncts() {
        if let SmtTerm::Eq(lhs, rhs) = &conjunct {
            match (&**lhs, &**rhs) {
                (SmtTerm::Var(v), t) if v == name && !t.mentions_var(name) => {
                    return Some(t.clone())
                }
                (t, SmtTerm::Var(v)) if v == name && !t.mentions_var(name) => {
                    return Some(t.clone())
                }
                _ => {}
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::DeltaFrameSet;
    use rampart_cfa::{Block, LocationId, ReachableBlocks, SsaContext, VarType};
    use rampart_smt::backends::z3_backend::Z3Solver;
    use std::collections::{BTreeMap, BTreeSet};

    /// Entry -> loop head -> error location, with a counter starting at 0.
    /// The guarded variant caps the counter below the error bound; the
    /// unguarded one counts straight into it.
    fn counter_system(loop_guarded: bool, error_bound: i64) -> TransitionSystem {
        let mut variables = BTreeMap::new();
        variables.insert("c".to_string(), VarType::Uint);
        let mut loop_parts =
            vec![SmtTerm::var("c__2").eq(SmtTerm::var("c__1").add(SmtTerm::int(1)))];
        if loop_guarded {
            loop_parts.push(SmtTerm::var("c__1").lt(SmtTerm::int(3)));
        }
        let bundle = ReachableBlocks {
            blocks: vec![
                Block {
                    pred: LocationId(0),
                    succ: LocationId(1),
                    formula: SmtTerm::var("c__2").eq(SmtTerm::int(0)),
                    pre: SsaContext::new(),
                    post: SsaContext::new().with_var("c", 2),
                },
                Block {
                    pred: LocationId(1),
                    succ: LocationId(1),
                    formula: SmtTerm::and(loop_parts),
                    pre: SsaContext::new().with_var("c", 1),
                    post: SsaContext::new().with_var("c", 2),
                },
                Block {
                    pred: LocationId(1),
                    succ: LocationId(2),
                    formula: SmtTerm::var("c__1").ge(SmtTerm::int(error_bound)),
                    pre: SsaContext::new().with_var("c", 1),
                    post: SsaContext::new(),
                },
            ],
            entry: LocationId(0),
            targets: BTreeSet::from([LocationId(2)]),
            variables,
        };
        TransitionSystem::from_blocks(&bundle).unwrap()
    }

    fn unsafe_counter() -> TransitionSystem {
        counter_system(false, 3)
    }

    fn safe_counter() -> TransitionSystem {
        counter_system(true, 5)
    }

    fn cube(pc: i64, bound: i64) -> SmtTerm {
        SmtTerm::and(vec![
            SmtTerm::var("__pc__1").eq(SmtTerm::int(pc)),
            SmtTerm::var("c__1").ge(SmtTerm::int(bound)),
        ])
    }

    fn implies(
        solver: &mut Z3Solver,
        ts: &TransitionSystem,
        antecedent: &SmtTerm,
        consequent: &SmtTerm,
    ) -> bool {
        solver.push().unwrap();
        solver.assert(antecedent).unwrap();
        for constraint in ts.domain_constraints() {
            solver.assert(&constraint).unwrap();
        }
        solver.assert(&consequent.clone().not()).unwrap();
        let unsat = solver.check_sat().unwrap() == SatResult::Unsat;
        solver.pop().unwrap();
        unsat
    }

    #[test]
    fn is_initial_recognizes_the_entry_literal() {
        let ts = unsafe_counter();
        let at_entry = SmtTerm::and(vec![
            ts.initial_condition().clone(),
            SmtTerm::var("c__1").eq(SmtTerm::int(4)),
        ]);
        assert!(is_initial(&ts, &at_entry));
        assert!(!is_initial(&ts, &cube(1, 0)));
    }

    #[test]
    fn pre_image_substitutes_update_equalities() {
        let ts = unsafe_counter();
        let model = Model {
            values: std::collections::HashMap::new(),
        };
        // Loop block: c' = c + 1, so the pre-image of c >= 3 is c + 1 >= 3.
        let loop_block = &ts.corrected_blocks()[1];
        let phi = pre_image(&ts, &loop_block.formula, &cube(1, 3), &model);
        assert!(!phi.mentions_var("c__2"));
        assert!(!phi.mentions_var("__pc__2"));

        let mut solver = Z3Solver::new();
        ts.declare_vars(&mut solver).unwrap();
        let want = SmtTerm::var("c__1").add(SmtTerm::int(1)).ge(SmtTerm::int(3));
        assert!(implies(&mut solver, &ts, &phi, &want));
        assert!(implies(
            &mut solver,
            &ts,
            &SmtTerm::and(vec![cube(1, 2), want]),
            &phi
        ));
    }

    #[test]
    fn frontier_cti_is_found_and_lifted_past_the_guard() {
        let ts = unsafe_counter();
        let mut solver = Z3Solver::new();
        ts.declare_vars(&mut solver).unwrap();
        let mut frames = DeltaFrameSet::new(&ts);
        frames.open_next_frame();
        let mut predicates = PredicateAbstractionManager::new(&ts);
        let mut stats = PdrStats::default();

        let cti = get_cti(&mut solver, &ts, &frames, &mut predicates, &mut stats)
            .unwrap()
            .expect("the unguarded counter reaches the target");
        assert_eq!(cti.location, LocationId(1));
        assert_eq!(cti.block_index, 2, "the CTI fires the error block");
        assert_eq!(stats.ctis_found, 1);
        // No seed predicates exist for a single variable, so the first
        // abstraction is the bare location literal and must be refined.
        assert!(stats.refinements >= 1);
        // Every state in the lifted cube satisfies the error guard.
        assert!(implies(
            &mut solver,
            &ts,
            &cti.abstracted,
            &SmtTerm::var("c__1").ge(SmtTerm::int(3))
        ));
    }

    #[test]
    fn no_cti_once_the_frontier_blocks_the_guard() {
        let ts = safe_counter();
        let mut solver = Z3Solver::new();
        ts.declare_vars(&mut solver).unwrap();
        let mut frames = DeltaFrameSet::new(&ts);
        frames.open_next_frame();
        let mut stats = PdrStats::default();
        frames.block_states(&cube(1, 5), 1, &mut stats);
        let mut predicates = PredicateAbstractionManager::new(&ts);

        let cti = get_cti(&mut solver, &ts, &frames, &mut predicates, &mut stats).unwrap();
        assert!(cti.is_none());
        assert_eq!(stats.ctis_found, 0);
    }

    #[test]
    fn consecution_blocks_and_generalizes_soundly() {
        let ts = safe_counter();
        let mut solver = Z3Solver::new();
        ts.declare_vars(&mut solver).unwrap();
        let mut frames = DeltaFrameSet::new(&ts);
        frames.open_next_frame();
        let mut predicates = PredicateAbstractionManager::new(&ts);
        let mut stats = PdrStats::default();

        let states = StatesWithLocation {
            abstracted: cube(1, 5),
            concrete: cube(1, 5),
            location: LocationId(1),
            block_index: 2,
        };
        let outcome = consecution(
            &mut solver,
            &ts,
            &frames,
            &mut predicates,
            1,
            &states,
            &mut stats,
        )
        .unwrap();
        let generalized = match outcome {
            ConsecutionOutcome::Blocked { generalized } => generalized,
            other => panic!("expected a blocked cube, got {other:?}"),
        };
        assert!(generalized.mentions_var("__pc__1"));

        // Soundness of the successful check: F(0) ∧ ¬g ∧ T ∧ g' stays unsat.
        solver.push().unwrap();
        for clause in frames.states_at(0) {
            solver.assert(&clause).unwrap();
        }
        for constraint in ts.domain_constraints() {
            solver.assert(&constraint).unwrap();
        }
        solver.assert(&generalized.clone().not()).unwrap();
        solver.assert(ts.transition_relation()).unwrap();
        solver.assert(&ts.prime(&generalized)).unwrap();
        assert_eq!(solver.check_sat().unwrap(), SatResult::Unsat);
        solver.pop().unwrap();

        // The generalization never leaks into the initial states.
        solver.push().unwrap();
        solver.assert(ts.initial_condition()).unwrap();
        solver.assert(&generalized).unwrap();
        assert_eq!(solver.check_sat().unwrap(), SatResult::Unsat);
        solver.pop().unwrap();
    }

    #[test]
    fn consecution_lifts_non_initial_predecessors() {
        let ts = unsafe_counter();
        let mut solver = Z3Solver::new();
        ts.declare_vars(&mut solver).unwrap();
        let mut frames = DeltaFrameSet::new(&ts);
        frames.open_next_frame();
        frames.open_next_frame();
        let mut predicates = PredicateAbstractionManager::new(&ts);
        let mut stats = PdrStats::default();

        let states = StatesWithLocation {
            abstracted: cube(1, 3),
            concrete: cube(1, 3),
            location: LocationId(1),
            block_index: 2,
        };
        let outcome = consecution(
            &mut solver,
            &ts,
            &frames,
            &mut predicates,
            2,
            &states,
            &mut stats,
        )
        .unwrap();
        let state = match outcome {
            ConsecutionOutcome::Predecessor { state } => state,
            other => panic!("expected a predecessor, got {other:?}"),
        };
        assert_eq!(state.location, LocationId(1));
        assert_eq!(state.block_index, 1, "the predecessor fires the loop block");
        assert!(!is_initial(&ts, &state.concrete));
        // Only the loop block reaches c >= 3 at the loop head, so every
        // lifted state must be one increment away.
        assert!(implies(
            &mut solver,
            &ts,
            &state.abstracted,
            &SmtTerm::var("c__1").ge(SmtTerm::int(2))
        ));
    }

    #[test]
    fn consecution_returns_initial_predecessors_unlifted() {
        let ts = unsafe_counter();
        let mut solver = Z3Solver::new();
        ts.declare_vars(&mut solver).unwrap();
        let mut frames = DeltaFrameSet::new(&ts);
        frames.open_next_frame();
        let mut predicates = PredicateAbstractionManager::new(&ts);
        let mut stats = PdrStats::default();

        // Reaching c = 0 at the loop head only works from the entry block.
        let states = StatesWithLocation {
            abstracted: SmtTerm::and(vec![
                SmtTerm::var("__pc__1").eq(SmtTerm::int(1)),
                SmtTerm::var("c__1").eq(SmtTerm::int(0)),
            ]),
            concrete: SmtTerm::and(vec![
                SmtTerm::var("__pc__1").eq(SmtTerm::int(1)),
                SmtTerm::var("c__1").eq(SmtTerm::int(0)),
            ]),
            location: LocationId(1),
            block_index: 1,
        };
        let outcome = consecution(
            &mut solver,
            &ts,
            &frames,
            &mut predicates,
            1,
            &states,
            &mut stats,
        )
        .unwrap();
        let state = match outcome {
            ConsecutionOutcome::Predecessor { state } => state,
            other => panic!("expected a predecessor, got {other:?}"),
        };
        assert!(is_initial(&ts, &state.concrete));
        assert_eq!(state.location, ts.entry());
        assert_eq!(state.block_index, 0, "only the entry block reaches c = 0");
        assert_eq!(state.abstracted, state.concrete);
    }
}
