//! Delta-encoded over-approximation frames.
//!
//! A clause lives in exactly one frame: the highest level at which it is
//! proven. The states blocked at a level are the union of the clause sets of
//! all frames at that level or above, so a clause added at level i is visible
//! to every query at levels <= i without being copied downward.

use rampart_smt::solver::{SatResult, SmtSolver, SolverScope};
use rampart_smt::terms::SmtTerm;
use tracing::debug;

use crate::options::CancelSignal;
use crate::solver_err;
use crate::stats::PdrStats;
use crate::transition::TransitionSystem;
use crate::EngineError;

/// Result of a forward-propagation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropagationStatus {
    /// Some level's exact clause set emptied out: a fixpoint.
    Converged { level: usize },
    /// No fixpoint yet.
    Open,
    /// The cancellation signal fired mid-pass.
    Cancelled,
}

/// Frame storage as seen by the engine. Delta-encoded storage is the one
/// implementation provided; the interface leaves room for others.
pub trait FrameSet {
    /// Index of the highest frame.
    fn frontier(&self) -> usize;

    /// Append a new frame seeded with the safety property. The caller must
    /// have justified that assumption beforehand; no check is performed.
    fn open_next_frame(&mut self);

    /// All clauses holding at `level`: the union over frames >= `level`.
    /// `level` may exceed the frontier by one, yielding the empty set.
    fn states_at(&self, level: usize) -> Vec<SmtTerm>;

    /// The clauses stored exactly at `level`, not the delta union.
    fn clauses_at(&self, level: usize) -> &[SmtTerm];

    /// Add ¬`states` as a clause at exactly `level`. Clauses dropped or
    /// skipped by insert-time subsumption are counted in `stats`.
    fn block_states(&mut self, states: &SmtTerm, level: usize, stats: &mut PdrStats);

    /// Push clauses forward and drop subsumed ones, level by level.
    fn propagate<S: SmtSolver>(
        &mut self,
        solver: &mut S,
        ts: &TransitionSystem,
        cancel: &CancelSignal,
        stats: &mut PdrStats,
    ) -> Result<PropagationStatus, EngineError>;
}

/// The delta-encoded implementation. Frame 0 holds the initial condition;
/// frames 1.. are seeded with the safety property when opened.
pub struct DeltaFrameSet {
    frames: Vec<Vec<SmtTerm>>,
    safety_property: SmtTerm,
}

impl DeltaFrameSet {
    pub fn new(ts: &TransitionSystem) -> Self {
        Self {
            frames: vec![vec![ts.initial_condition().clone()]],
            safety_property: ts.safety_property().clone(),
        }
    }

    /// The literals of the cube a clause blocks, for structural subsumption.
    /// Only negated-conjunction clauses participate; seeds and other shapes
    /// are compared by equality alone.
    fn cube_literals(clause: &SmtTerm) -> Option<Vec<SmtTerm>> {
        match clause {
            SmtTerm::Not(inner) => Some(inner.conjuncts()),
            _ => None,
        }
    }

    /// A cube with fewer literals blocks more states: its clause subsumes
    /// any clause whose cube is a superset.
    fn subsumes(stronger: &SmtTerm, weaker: &SmtTerm) -> bool {
        match (Self::cube_literals(stronger), Self::cube_literals(weaker)) {
            (Some(a), Some(b)) => a.iter().all(|lit| b.contains(lit)),
            _ => stronger == weaker,
        }
    }

    /// Insert `clause` at `level`, dropping stored clauses it subsumes and
    /// skipping the insert when a stored clause already subsumes it.
    fn insert_clause(&mut self, clause: SmtTerm, level: usize, stats: &mut PdrStats) {
        let frame = &mut self.frames[level];
        if frame.iter().any(|existing| Self::subsumes(existing, &clause)) {
            stats.clauses_subsumed += 1;
            return;
        }
        let before = frame.len();
        frame.retain(|existing| !Self::subsumes(&clause, existing));
        stats.clauses_subsumed += (before - frame.len()) as u64;
        frame.push(clause);
    }
}

impl FrameSet for DeltaFrameSet {
    fn frontier(&self) -> usize {
        self.frames.len() - 1
    }

    fn open_next_frame(&mut self) {
        self.frames.push(vec![self.safety_property.clone()]);
    }

    fn states_at(&self, level: usize) -> Vec<SmtTerm> {
        assert!(
            level <= self.frontier() + 1,
            "frame query at level {level} exceeds frontier {} + 1",
            self.frontier()
        );
        self.frames
            .iter()
            .skip(level)
            .flat_map(|frame| frame.iter().cloned())
            .collect()
    }

    fn clauses_at(&self, level: usize) -> &[SmtTerm] {
        &self.frames[level]
    }

    fn block_states(&mut self, states: &SmtTerm, level: usize, stats: &mut PdrStats) {
        self.insert_clause(states.clone().not(), level, stats);
    }

    fn propagate<S: SmtSolver>(
        &mut self,
        solver: &mut S,
        ts: &TransitionSystem,
        cancel: &CancelSignal,
        stats: &mut PdrStats,
    ) -> Result<PropagationStatus, EngineError> {
        for level in 1..self.frontier() {
            if cancel.requested() {
                return Ok(PropagationStatus::Cancelled);
            }

            // One scope per level: F(level) ∧ T, with per-clause pushes for
            // the primed negation.
            let mut moved = Vec::new();
            {
                let mut scope = SolverScope::open(solver).map_err(solver_err)?;
                for clause in self.states_at(level) {
                    scope.assert(&clause).map_err(solver_err)?;
                }
                for constraint in ts.domain_constraints() {
                    scope.assert(&constraint).map_err(solver_err)?;
                }
                scope.assert(ts.transition_relation()).map_err(solver_err)?;

                for clause in self.frames[level].clone() {
                    if cancel.requested() {
                        return Ok(PropagationStatus::Cancelled);
                    }
                    let mut clause_scope = SolverScope::open(&mut *scope).map_err(solver_err)?;
                    clause_scope
                        .assert(&ts.prime(&clause.clone().not()))
                        .map_err(solver_err)?;
                    stats.sat_checks += 1;
                    match clause_scope.check_sat().map_err(solver_err)? {
                        SatResult::Unsat => moved.push(clause),
                        SatResult::Sat => {}
                        SatResult::Unknown(reason) => {
                            return Err(EngineError::Solver(reason));
                        }
                    }
                    clause_scope.close().map_err(solver_err)?;
                }
                scope.close().map_err(solver_err)?;
            }

            for clause in moved {
                self.frames[level].retain(|c| c != &clause);
                debug!(level = level + 1, "clause propagated forward");
                stats.clauses_propagated += 1;
                self.insert_clause(clause, level + 1, stats);
            }

            // Drop clauses at this level that a higher level already implies.
            // Drops are only applied after the full scan, so cancellation and
            // error returns leave the frame's clause set untouched.
            let next_states = self.states_at(level + 1);
            let mut keep = vec![true; self.frames[level].len()];
            for (i, clause) in self.frames[level].iter().enumerate() {
                if cancel.requested() {
                    return Ok(PropagationStatus::Cancelled);
                }
                for next_clause in &next_states {
                    let mut scope = SolverScope::open(solver).map_err(solver_err)?;
                    scope.assert(next_clause).map_err(solver_err)?;
                    scope.assert(&clause.clone().not()).map_err(solver_err)?;
                    stats.sat_checks += 1;
                    let result = scope.check_sat().map_err(solver_err)?;
                    scope.close().map_err(solver_err)?;
                    match result {
                        SatResult::Unsat => {
                            keep[i] = false;
                            break;
                        }
                        SatResult::Sat => {}
                        SatResult::Unknown(reason) => {
                            return Err(EngineError::Solver(reason));
                        }
                    }
                }
            }
            stats.clauses_subsumed += keep.iter().filter(|kept| !**kept).count() as u64;
            let mut index = 0;
            self.frames[level].retain(|_| {
                let kept = keep[index];
                index += 1;
                kept
            });

            if self.frames[level].is_empty() {
                debug!(level, "frame emptied: fixpoint reached");
                return Ok(PropagationStatus::Converged { level });
            }
        }
        Ok(PropagationStatus::Open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rampart_cfa::{Block, LocationId, ReachableBlocks, SsaContext, VarType};
    use rampart_smt::backends::z3_backend::{Z3Error, Z3Solver};
    use rampart_smt::solver::Model;
    use rampart_smt::terms::SmtSort;
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn guarded_counter() -> TransitionSystem {
        // Single location, c incremented only while c < 3.
        let mut variables = BTreeMap::new();
        variables.insert("c".to_string(), VarType::Uint);
        let bundle = ReachableBlocks {
            blocks: vec![Block {
                pred: LocationId(0),
                succ: LocationId(0),
                formula: SmtTerm::and(vec![
                    SmtTerm::var("c__1").lt(SmtTerm::int(3)),
                    SmtTerm::var("c__2").eq(SmtTerm::var("c__1").add(SmtTerm::int(1))),
                ]),
                pre: SsaContext::new().with_var("c", 1),
                post: SsaContext::new().with_var("c", 2),
            }],
            entry: LocationId(0),
            targets: BTreeSet::new(),
            variables,
        };
        TransitionSystem::from_blocks(&bundle).unwrap()
    }

    fn cube(pc: i64, bound: i64) -> SmtTerm {
        SmtTerm::and(vec![
            SmtTerm::var("__pc__1").eq(SmtTerm::int(pc)),
            SmtTerm::var("c__1").ge(SmtTerm::int(bound)),
        ])
    }

    #[test]
    fn open_next_frame_seeds_safety_and_bumps_frontier() {
        let ts = guarded_counter();
        let mut frames = DeltaFrameSet::new(&ts);
        assert_eq!(frames.frontier(), 0);
        frames.open_next_frame();
        assert_eq!(frames.frontier(), 1);
        assert_eq!(frames.clauses_at(1), &[ts.safety_property().clone()]);
    }

    #[test]
    fn blocked_clause_is_visible_at_all_lower_levels() {
        let ts = guarded_counter();
        let mut frames = DeltaFrameSet::new(&ts);
        frames.open_next_frame();
        frames.open_next_frame();

        let states = cube(0, 5);
        frames.block_states(&states, 2, &mut PdrStats::default());
        let clause = states.clone().not();
        for level in 0..=2 {
            assert!(
                frames.states_at(level).contains(&clause),
                "clause missing at level {level}"
            );
        }
        assert!(!frames.clauses_at(1).contains(&clause));
    }

    #[test]
    fn states_one_past_the_frontier_are_empty() {
        let ts = guarded_counter();
        let mut frames = DeltaFrameSet::new(&ts);
        frames.open_next_frame();
        assert!(frames.states_at(frames.frontier() + 1).is_empty());
    }

    #[test]
    #[should_panic(expected = "exceeds frontier")]
    fn states_two_past_the_frontier_panic() {
        let ts = guarded_counter();
        let frames = DeltaFrameSet::new(&ts);
        let _ = frames.states_at(2);
    }

    #[test]
    fn stronger_cube_subsumes_weaker_on_insert() {
        let ts = guarded_counter();
        let mut frames = DeltaFrameSet::new(&ts);
        frames.open_next_frame();
        let mut stats = PdrStats::default();

        // Blocking the bigger cube first, then a sub-cube of it.
        let weaker = SmtTerm::and(vec![
            SmtTerm::var("__pc__1").eq(SmtTerm::int(0)),
            SmtTerm::var("c__1").ge(SmtTerm::int(5)),
            SmtTerm::var("c__1").le(SmtTerm::int(9)),
        ]);
        let stronger = cube(0, 5);
        frames.block_states(&weaker, 1, &mut stats);
        assert_eq!(stats.clauses_subsumed, 0);
        frames.block_states(&stronger, 1, &mut stats);
        assert_eq!(stats.clauses_subsumed, 1);

        let clauses = frames.clauses_at(1);
        assert!(clauses.contains(&stronger.clone().not()));
        assert!(!clauses.contains(&weaker.clone().not()));

        // Re-blocking something already subsumed is a counted no-op.
        frames.block_states(&weaker, 1, &mut stats);
        assert!(!frames.clauses_at(1).contains(&weaker.not()));
        assert_eq!(stats.clauses_subsumed, 2);
    }

    #[test]
    fn propagate_pushes_inductive_clauses_forward() {
        let ts = guarded_counter();
        let mut solver = Z3Solver::new();
        ts.declare_vars(&mut solver).unwrap();

        let mut frames = DeltaFrameSet::new(&ts);
        frames.open_next_frame();
        frames.open_next_frame();

        // c never exceeds 3 under the guard, so blocking c >= 5 at level 1
        // is inductive and must move forward.
        let mut stats = PdrStats::default();
        let states = cube(0, 5);
        frames.block_states(&states, 1, &mut stats);

        let before: Vec<usize> = (0..=frames.frontier())
            .map(|l| frames.clauses_at(l).len())
            .collect();
        let status = frames
            .propagate(&mut solver, &ts, &CancelSignal::none(), &mut stats)
            .unwrap();

        // The clause moved to level 2 and level 1 emptied (the trivial
        // safety seed also moves), which is a fixpoint.
        assert_eq!(status, PropagationStatus::Converged { level: 1 });
        assert!(frames.states_at(2).contains(&states.not()));
        assert!(stats.clauses_propagated >= 1);

        // Monotonicity: no level gained clauses it did not have before.
        for level in 0..=frames.frontier() {
            let now = frames.clauses_at(level).len();
            if level < 2 {
                assert!(now <= before[level]);
            }
        }
    }

    #[test]
    fn propagate_observes_cancellation() {
        let ts = guarded_counter();
        let mut solver = Z3Solver::new();
        ts.declare_vars(&mut solver).unwrap();

        let mut frames = DeltaFrameSet::new(&ts);
        frames.open_next_frame();
        frames.open_next_frame();
        frames.block_states(&cube(0, 5), 1, &mut PdrStats::default());

        let flag = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(true));
        let options = crate::PdrOptions {
            stop: Some(flag),
            ..Default::default()
        };
        let mut stats = PdrStats::default();
        let status = frames
            .propagate(&mut solver, &ts, &options.cancel_signal(), &mut stats)
            .unwrap();
        assert_eq!(status, PropagationStatus::Cancelled);
        assert_eq!(stats.sat_checks, 0);
    }

    /// Delegates to Z3 and raises a stop flag once a fixed number of
    /// satisfiability checks has run.
    struct TrippingSolver {
        inner: Z3Solver,
        flag: Arc<AtomicBool>,
        checks_left: usize,
    }

    impl SmtSolver for TrippingSolver {
        type Error = Z3Error;

        fn declare_var(&mut self, name: &str, sort: &SmtSort) -> Result<(), Z3Error> {
            self.inner.declare_var(name, sort)
        }

        fn assert(&mut self, term: &SmtTerm) -> Result<(), Z3Error> {
            self.inner.assert(term)
        }

        fn push(&mut self) -> Result<(), Z3Error> {
            self.inner.push()
        }

        fn pop(&mut self) -> Result<(), Z3Error> {
            self.inner.pop()
        }

        fn check_sat(&mut self) -> Result<SatResult, Z3Error> {
            let result = self.inner.check_sat();
            if self.checks_left > 0 {
                self.checks_left -= 1;
                if self.checks_left == 0 {
                    self.flag.store(true, Ordering::Relaxed);
                }
            }
            result
        }

        fn check_sat_with_model(
            &mut self,
            var_names: &[(&str, &SmtSort)],
        ) -> Result<(SatResult, Option<Model>), Z3Error> {
            self.inner.check_sat_with_model(var_names)
        }

        fn reset(&mut self) -> Result<(), Z3Error> {
            self.inner.reset()
        }
    }

    /// The guarded increment as independent self-loops at two locations, so
    /// two non-inductive clauses can sit in the same frame.
    fn two_location_counter() -> TransitionSystem {
        let step = SmtTerm::and(vec![
            SmtTerm::var("c__1").lt(SmtTerm::int(3)),
            SmtTerm::var("c__2").eq(SmtTerm::var("c__1").add(SmtTerm::int(1))),
        ]);
        let mut variables = BTreeMap::new();
        variables.insert("c".to_string(), VarType::Uint);
        let bundle = ReachableBlocks {
            blocks: vec![
                Block {
                    pred: LocationId(0),
                    succ: LocationId(0),
                    formula: step.clone(),
                    pre: SsaContext::new().with_var("c", 1),
                    post: SsaContext::new().with_var("c", 2),
                },
                Block {
                    pred: LocationId(1),
                    succ: LocationId(1),
                    formula: step,
                    pre: SsaContext::new().with_var("c", 1),
                    post: SsaContext::new().with_var("c", 2),
                },
            ],
            entry: LocationId(0),
            targets: BTreeSet::new(),
            variables,
        };
        TransitionSystem::from_blocks(&bundle).unwrap()
    }

    #[test]
    fn cancellation_mid_scan_keeps_every_blocked_clause() {
        let ts = two_location_counter();
        let flag = Arc::new(AtomicBool::new(false));
        let mut solver = TrippingSolver {
            inner: Z3Solver::new(),
            flag: flag.clone(),
            // The move loop checks the trivial seed plus both blocked
            // clauses; the flag trips right before the subsumption scan.
            checks_left: 3,
        };
        ts.declare_vars(&mut solver).unwrap();

        let mut frames = DeltaFrameSet::new(&ts);
        frames.open_next_frame();
        frames.open_next_frame();
        let mut stats = PdrStats::default();
        frames.block_states(&cube(0, 2), 1, &mut stats);
        frames.block_states(&cube(1, 2), 1, &mut stats);

        let options = crate::PdrOptions {
            stop: Some(flag),
            ..Default::default()
        };
        let status = frames
            .propagate(&mut solver, &ts, &options.cancel_signal(), &mut stats)
            .unwrap();
        assert_eq!(status, PropagationStatus::Cancelled);

        // Neither non-inductive clause may vanish from the frame.
        let clauses = frames.clauses_at(1);
        assert!(clauses.contains(&cube(0, 2).not()));
        assert!(clauses.contains(&cube(1, 2).not()));
    }

    proptest! {
        #[test]
        fn delta_invariant_holds_for_arbitrary_blocking(
            ops in prop::collection::vec((1usize..4, 3i64..20), 0..12)
        ) {
            let ts = guarded_counter();
            let mut frames = DeltaFrameSet::new(&ts);
            let mut stats = PdrStats::default();
            for _ in 0..3 {
                frames.open_next_frame();
            }
            for (level, bound) in ops {
                frames.block_states(&cube(0, bound), level, &mut stats);
            }
            // Every clause stored at level j is visible at every i <= j.
            for j in 0..=frames.frontier() {
                for clause in frames.clauses_at(j).iter() {
                    for i in 0..=j {
                        prop_assert!(frames.states_at(i).contains(clause));
                    }
                }
            }
        }
    }
}
