//! Unsat-core-based interpolation.
//!
//! For a conjunctive prefix A and an arbitrary suffix B with A ∧ B unsat, the
//! conjunction of the A-conjuncts appearing in the unsat core is an
//! interpolant: it is implied by A, inconsistent with B, and mentions only
//! variables A shares with the query. Backends without assumption cores fall
//! back to the whole prefix, which satisfies the same three properties.

use crate::solver::{SatResult, SmtSolver};
use crate::terms::{SmtSort, SmtTerm};

/// Result of an interpolation attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum InterpolationOutcome {
    /// Prefix and suffix were jointly unsat; the separating formula.
    Interpolant(SmtTerm),
    /// The combined assertions are satisfiable; no interpolant exists.
    Satisfiable,
    /// The backend could not decide the query.
    Inconclusive(String),
}

/// A solver scope that tracks a marked prefix for interpolant extraction.
///
/// Opens a solver scope on construction and pops it on drop, so an early
/// return cannot leak assertions or marker declarations into the caller's
/// context.
pub struct InterpolatingScope<'a, S: SmtSolver> {
    solver: &'a mut S,
    open: bool,
    markers: Vec<(String, SmtTerm)>,
    use_cores: bool,
}

impl<'a, S: SmtSolver> InterpolatingScope<'a, S> {
    pub fn open(solver: &'a mut S) -> Result<Self, S::Error> {
        let use_cores = solver.supports_assumption_unsat_core();
        solver.push()?;
        Ok(Self {
            solver,
            open: true,
            markers: Vec::new(),
            use_cores,
        })
    }

    /// Assert `term` as part of the marked prefix (the A side). Each conjunct
    /// is tracked individually so the interpolant keeps only the conjuncts
    /// the refutation actually uses.
    pub fn mark_prefix(&mut self, term: &SmtTerm) -> Result<(), S::Error> {
        for conjunct in term.conjuncts() {
            if self.use_cores {
                let marker = format!("__itp_m{}", self.markers.len());
                self.solver.declare_var(&marker, &SmtSort::Bool)?;
                self.solver
                    .assert(&SmtTerm::var(marker.clone()).implies(conjunct.clone()))?;
                self.markers.push((marker, conjunct));
            } else {
                self.solver.assert(&conjunct)?;
                self.markers.push((String::new(), conjunct));
            }
        }
        Ok(())
    }

    /// Assert `term` as part of the remainder (the B side).
    pub fn assert(&mut self, term: &SmtTerm) -> Result<(), S::Error> {
        self.solver.assert(term)
    }

    /// Check the combined assertions and, if unsat, extract the interpolant.
    pub fn compute(&mut self) -> Result<InterpolationOutcome, S::Error> {
        if self.use_cores {
            let names: Vec<String> = self.markers.iter().map(|(n, _)| n.clone()).collect();
            match self.solver.check_sat_assuming(&names)? {
                SatResult::Sat => Ok(InterpolationOutcome::Satisfiable),
                SatResult::Unknown(reason) => Ok(InterpolationOutcome::Inconclusive(reason)),
                SatResult::Unsat => {
                    let core = self.solver.get_unsat_core_assumptions()?;
                    let kept: Vec<SmtTerm> = self
                        .markers
                        .iter()
                        .filter(|(name, _)| core.iter().any(|c| c == name))
                        .map(|(_, conjunct)| conjunct.clone())
                        .collect();
                    Ok(InterpolationOutcome::Interpolant(SmtTerm::and(kept)))
                }
            }
        } else {
            match self.solver.check_sat()? {
                SatResult::Sat => Ok(InterpolationOutcome::Satisfiable),
                SatResult::Unknown(reason) => Ok(InterpolationOutcome::Inconclusive(reason)),
                SatResult::Unsat => {
                    let all: Vec<SmtTerm> =
                        self.markers.iter().map(|(_, c)| c.clone()).collect();
                    Ok(InterpolationOutcome::Interpolant(SmtTerm::and(all)))
                }
            }
        }
    }

    pub fn close(mut self) -> Result<(), S::Error> {
        self.open = false;
        self.solver.pop()
    }
}

impl<S: SmtSolver> Drop for InterpolatingScope<'_, S> {
    fn drop(&mut self) {
        if self.open {
            let _ = self.solver.pop();
        }
    }
}
