//! Cartesian predicate abstraction with a run-scoped, growing predicate set.
//!
//! Predicates live over unprimed state variables. Abstraction of a concrete
//! state keeps the program-counter literal verbatim and replaces the rest by
//! the strongest conjunction of predicates (or their negations) it implies.

use rampart_smt::solver::{SatResult, SmtSolver, SolverScope};
use rampart_smt::terms::SmtTerm;
use tracing::debug;

use crate::solver_err;
use crate::stats::PdrStats;
use crate::transition::TransitionSystem;
use crate::EngineError;

/// Owns the abstraction predicates for one verification run. The set only
/// ever grows; refinement never invalidates an earlier abstraction.
pub struct PredicateAbstractionManager {
    predicates: Vec<SmtTerm>,
}

impl PredicateAbstractionManager {
    /// Seed with one `v1 < v2` predicate per pair of same-typed numeric
    /// variables.
    pub fn new(ts: &TransitionSystem) -> Self {
        let mut predicates = Vec::new();
        let numeric: Vec<(&String, _)> = ts
            .variables()
            .iter()
            .filter(|(_, t)| t.is_numeric())
            .collect();
        for (i, (v1, t1)) in numeric.iter().enumerate() {
            for (v2, t2) in numeric.iter().skip(i + 1) {
                if t1 == t2 {
                    predicates.push(
                        SmtTerm::var(ts.unprimed_name(v1)).lt(SmtTerm::var(ts.unprimed_name(v2))),
                    );
                }
            }
        }
        Self { predicates }
    }

    pub fn predicate_count(&self) -> usize {
        self.predicates.len()
    }

    /// Split a state formula into its program-counter literal and the rest.
    fn split_pc<'t>(
        ts: &TransitionSystem,
        conjuncts: &'t [SmtTerm],
    ) -> (Vec<&'t SmtTerm>, Vec<&'t SmtTerm>) {
        let pc_name = ts.pc_unprimed();
        conjuncts
            .iter()
            .partition(|c| c.mentions_var(&pc_name))
    }

    /// Abstract `state` to the strongest conjunction of known predicates and
    /// negated predicates it implies, with the pc literal carried unchanged.
    pub fn compute_abstraction<S: SmtSolver>(
        &self,
        solver: &mut S,
        ts: &TransitionSystem,
        state: &SmtTerm,
        stats: &mut PdrStats,
    ) -> Result<SmtTerm, EngineError> {
        let conjuncts = state.conjuncts();
        let (pc_parts, body) = Self::split_pc(ts, &conjuncts);

        let mut kept: Vec<SmtTerm> = pc_parts.into_iter().cloned().collect();

        let mut scope = SolverScope::open(solver).map_err(solver_err)?;
        for conjunct in &body {
            scope.assert(conjunct).map_err(solver_err)?;
        }
        for constraint in ts.domain_constraints() {
            scope.assert(&constraint).map_err(solver_err)?;
        }

        for predicate in &self.predicates {
            // body ⟹ p iff body ∧ ¬p is unsat; likewise for ¬p.
            for (candidate, test) in [
                (predicate.clone(), predicate.clone().not()),
                (predicate.clone().not(), predicate.clone()),
            ] {
                let mut inner = SolverScope::open(&mut *scope).map_err(solver_err)?;
                inner.assert(&test).map_err(solver_err)?;
                stats.sat_checks += 1;
                let result = inner.check_sat().map_err(solver_err)?;
                inner.close().map_err(solver_err)?;
                match result {
                    SatResult::Unsat => {
                        kept.push(candidate);
                        break;
                    }
                    SatResult::Sat => {}
                    SatResult::Unknown(reason) => return Err(EngineError::Solver(reason)),
                }
            }
        }
        scope.close().map_err(solver_err)?;

        Ok(SmtTerm::and(kept))
    }

    /// Grow the predicate set from an interpolant, then abstract `state`
    /// under the enlarged set.
    pub fn refine_and_compute_abstraction<S: SmtSolver>(
        &mut self,
        solver: &mut S,
        ts: &TransitionSystem,
        state: &SmtTerm,
        interpolant: &SmtTerm,
        stats: &mut PdrStats,
    ) -> Result<SmtTerm, EngineError> {
        self.refine(ts, interpolant, stats);
        self.compute_abstraction(solver, ts, state, stats)
    }

    /// Add predicates derived from an interpolant. Purely conjunctive parts
    /// contribute one predicate per atom, with numeral equalities split into
    /// the two bounding inequalities; anything containing a disjunction is
    /// taken whole. The program-counter literal never becomes a predicate.
    pub fn refine(&mut self, ts: &TransitionSystem, interpolant: &SmtTerm, stats: &mut PdrStats) {
        let pc_name = ts.pc_unprimed();
        for conjunct in interpolant.conjuncts() {
            if conjunct.mentions_var(&pc_name) {
                continue;
            }
            if conjunct.is_purely_conjunctive() {
                for atom in conjunct.conjuncts() {
                    match &atom {
                        SmtTerm::Eq(lhs, rhs) if is_numeric_operand(lhs) || is_numeric_operand(rhs) => {
                            self.add_predicate((**lhs).clone().le((**rhs).clone()), stats);
                            self.add_predicate((**lhs).clone().ge((**rhs).clone()), stats);
                        }
                        _ => self.add_predicate(atom, stats),
                    }
                }
            } else {
                self.add_predicate(conjunct, stats);
            }
        }
    }

    fn add_predicate(&mut self, predicate: SmtTerm, stats: &mut PdrStats) {
        if self.predicates.contains(&predicate) {
            return;
        }
        debug!(total = self.predicates.len() + 1, "abstraction predicate added");
        stats.predicates_added += 1;
        self.predicates.push(predicate);
    }
}

/// True for operands that are certainly integer-sorted without a typing
/// lookup: literals and arithmetic. Variables alone stay conservative.
fn is_numeric_operand(term: &SmtTerm) -> bool {
    matches!(
        term,
        SmtTerm::IntLit(_) | SmtTerm::Add(_, _) | SmtTerm::Sub(_, _) | SmtTerm::Mul(_, _)
    )
}
