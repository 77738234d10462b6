use std::collections::HashMap;

use thiserror::Error;
use z3::SatResult as Z3SatResult;

use crate::solver::{Model, ModelValue, SatResult, SmtSolver};
use crate::terms::{SmtSort, SmtTerm};

#[derive(Debug, Error)]
pub enum Z3Error {
    #[error("Z3 error: {0}")]
    Internal(String),
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),
}

/// In-process Z3 backend over the `z3` crate's thread-local context.
pub struct Z3Solver {
    solver: z3::Solver,
    int_vars: HashMap<String, z3::ast::Int>,
    bool_vars: HashMap<String, z3::ast::Bool>,
    last_assumption_names: Vec<String>,
    last_assumption_terms: Vec<z3::ast::Bool>,
    params: Option<z3::Params>,
}

enum Ast {
    Int(z3::ast::Int),
    Bool(z3::ast::Bool),
}

impl Ast {
    fn int(self) -> Result<z3::ast::Int, Z3Error> {
        match self {
            Ast::Int(i) => Ok(i),
            Ast::Bool(_) => Err(Z3Error::Internal("expected Int, got Bool".into())),
        }
    }

    fn bool(self) -> Result<z3::ast::Bool, Z3Error> {
        match self {
            Ast::Bool(b) => Ok(b),
            Ast::Int(_) => Err(Z3Error::Internal("expected Bool, got Int".into())),
        }
    }
}

impl Z3Solver {
    pub fn new() -> Self {
        Self {
            solver: z3::Solver::new(),
            int_vars: HashMap::new(),
            bool_vars: HashMap::new(),
            last_assumption_names: Vec::new(),
            last_assumption_terms: Vec::new(),
            params: None,
        }
    }

    /// Build a solver whose individual checks give up after `timeout_secs`.
    /// A zero timeout means no limit.
    pub fn with_timeout_secs(timeout_secs: u64) -> Self {
        let mut this = Self::new();
        if timeout_secs == 0 {
            return this;
        }
        let mut params = z3::Params::new();
        let timeout_ms = timeout_secs.saturating_mul(1000);
        params.set_u32("timeout", timeout_ms as u32);
        params.set_u32("solver2_timeout", timeout_ms as u32);
        this.solver.set_params(&params);
        this.params = Some(params);
        this
    }

    fn int_operands(&self, lhs: &SmtTerm, rhs: &SmtTerm) -> Result<(z3::ast::Int, z3::ast::Int), Z3Error> {
        Ok((self.translate(lhs)?.int()?, self.translate(rhs)?.int()?))
    }

    fn bool_operands(&self, terms: &[SmtTerm]) -> Result<Vec<z3::ast::Bool>, Z3Error> {
        terms
            .iter()
            .map(|t| self.translate(t).and_then(Ast::bool))
            .collect()
    }

    fn translate(&self, term: &SmtTerm) -> Result<Ast, Z3Error> {
        match term {
            SmtTerm::Var(name) => {
                if let Some(v) = self.int_vars.get(name) {
                    Ok(Ast::Int(v.clone()))
                } else if let Some(v) = self.bool_vars.get(name) {
                    Ok(Ast::Bool(v.clone()))
                } else {
                    Err(Z3Error::UnknownVariable(name.clone()))
                }
            }
            SmtTerm::IntLit(n) => Ok(Ast::Int(z3::ast::Int::from_i64(*n))),
            SmtTerm::BoolLit(b) => Ok(Ast::Bool(z3::ast::Bool::from_bool(*b))),
            SmtTerm::Add(l, r) => {
                let (l, r) = self.int_operands(l, r)?;
                Ok(Ast::Int(&l + &r))
            }
            SmtTerm::Sub(l, r) => {
                let (l, r) = self.int_operands(l, r)?;
                Ok(Ast::Int(&l - &r))
            }
            SmtTerm::Mul(l, r) => {
                let (l, r) = self.int_operands(l, r)?;
                Ok(Ast::Int(&l * &r))
            }
            SmtTerm::Eq(l, r) => match (self.translate(l)?, self.translate(r)?) {
                (Ast::Int(li), Ast::Int(ri)) => Ok(Ast::Bool(li.eq(&ri))),
                (Ast::Bool(lb), Ast::Bool(rb)) => Ok(Ast::Bool(lb.eq(&rb))),
                _ => Err(Z3Error::Internal("sort mismatch in equality".into())),
            },
            SmtTerm::Lt(l, r) => {
                let (l, r) = self.int_operands(l, r)?;
                Ok(Ast::Bool(l.lt(&r)))
            }
            SmtTerm::Le(l, r) => {
                let (l, r) = self.int_operands(l, r)?;
                Ok(Ast::Bool(l.le(&r)))
            }
            SmtTerm::Gt(l, r) => {
                let (l, r) = self.int_operands(l, r)?;
                Ok(Ast::Bool(l.gt(&r)))
            }
            SmtTerm::Ge(l, r) => {
                let (l, r) = self.int_operands(l, r)?;
                Ok(Ast::Bool(l.ge(&r)))
            }
            SmtTerm::And(ts) => {
                let bools = self.bool_operands(ts)?;
                let refs: Vec<&z3::ast::Bool> = bools.iter().collect();
                Ok(Ast::Bool(z3::ast::Bool::and(&refs)))
            }
            SmtTerm::Or(ts) => {
                let bools = self.bool_operands(ts)?;
                let refs: Vec<&z3::ast::Bool> = bools.iter().collect();
                Ok(Ast::Bool(z3::ast::Bool::or(&refs)))
            }
            SmtTerm::Not(inner) => Ok(Ast::Bool(self.translate(inner)?.bool()?.not())),
            SmtTerm::Implies(l, r) => {
                let l = self.translate(l)?.bool()?;
                let r = self.translate(r)?.bool()?;
                Ok(Ast::Bool(l.implies(&r)))
            }
            SmtTerm::Ite(c, t, e) => {
                let c = self.translate(c)?.bool()?;
                match (self.translate(t)?, self.translate(e)?) {
                    (Ast::Int(ti), Ast::Int(ei)) => Ok(Ast::Int(c.ite(&ti, &ei))),
                    (Ast::Bool(tb), Ast::Bool(eb)) => Ok(Ast::Bool(c.ite(&tb, &eb))),
                    _ => Err(Z3Error::Internal("sort mismatch in ite".into())),
                }
            }
        }
    }

    fn map_result(result: Z3SatResult) -> SatResult {
        match result {
            Z3SatResult::Sat => SatResult::Sat,
            Z3SatResult::Unsat => SatResult::Unsat,
            Z3SatResult::Unknown => SatResult::Unknown("Z3 returned unknown".into()),
        }
    }
}

impl Default for Z3Solver {
    fn default() -> Self {
        Self::new()
    }
}

impl SmtSolver for Z3Solver {
    type Error = Z3Error;

    fn declare_var(&mut self, name: &str, sort: &SmtSort) -> Result<(), Z3Error> {
        match sort {
            SmtSort::Int => {
                self.int_vars
                    .insert(name.to_string(), z3::ast::Int::new_const(name));
            }
            SmtSort::Bool => {
                self.bool_vars
                    .insert(name.to_string(), z3::ast::Bool::new_const(name));
            }
        }
        Ok(())
    }

    fn assert(&mut self, term: &SmtTerm) -> Result<(), Z3Error> {
        let ast = self.translate(term)?.bool()?;
        self.solver.assert(&ast);
        Ok(())
    }

    fn push(&mut self) -> Result<(), Z3Error> {
        self.solver.push();
        Ok(())
    }

    fn pop(&mut self) -> Result<(), Z3Error> {
        self.solver.pop(1);
        Ok(())
    }

    fn check_sat(&mut self) -> Result<SatResult, Z3Error> {
        Ok(Self::map_result(self.solver.check()))
    }

    fn check_sat_with_model(
        &mut self,
        var_names: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), Z3Error> {
        match self.solver.check() {
            Z3SatResult::Sat => {
                let z3_model = self
                    .solver
                    .get_model()
                    .ok_or_else(|| Z3Error::Internal("SAT but no model available".into()))?;
                let mut values = HashMap::new();
                for &(name, sort) in var_names {
                    match sort {
                        SmtSort::Int => {
                            if let Some(v) = self.int_vars.get(name) {
                                if let Some(n) =
                                    z3_model.eval::<z3::ast::Int>(v, true).and_then(|a| a.as_i64())
                                {
                                    values.insert(name.to_string(), ModelValue::Int(n));
                                }
                            }
                        }
                        SmtSort::Bool => {
                            if let Some(v) = self.bool_vars.get(name) {
                                if let Some(b) = z3_model
                                    .eval::<z3::ast::Bool>(v, true)
                                    .and_then(|a| a.as_bool())
                                {
                                    values.insert(name.to_string(), ModelValue::Bool(b));
                                }
                            }
                        }
                    }
                }
                Ok((SatResult::Sat, Some(Model { values })))
            }
            Z3SatResult::Unsat => Ok((SatResult::Unsat, None)),
            Z3SatResult::Unknown => Ok((SatResult::Unknown("Z3 returned unknown".into()), None)),
        }
    }

    fn supports_assumption_unsat_core(&self) -> bool {
        true
    }

    fn check_sat_assuming(&mut self, assumptions: &[String]) -> Result<SatResult, Z3Error> {
        let mut asts = Vec::with_capacity(assumptions.len());
        for name in assumptions {
            let Some(var) = self.bool_vars.get(name) else {
                return Err(Z3Error::UnknownVariable(name.clone()));
            };
            asts.push(var.clone());
        }
        self.last_assumption_names = assumptions.to_vec();
        self.last_assumption_terms = asts.clone();
        Ok(Self::map_result(self.solver.check_assumptions(&asts)))
    }

    fn get_unsat_core_assumptions(&mut self) -> Result<Vec<String>, Z3Error> {
        let core = self.solver.get_unsat_core();
        let mut out = Vec::new();
        for core_lit in core {
            if let Some((idx, _)) = self
                .last_assumption_terms
                .iter()
                .enumerate()
                .find(|(_, lit)| **lit == core_lit)
            {
                out.push(self.last_assumption_names[idx].clone());
            }
        }
        Ok(out)
    }

    fn reset(&mut self) -> Result<(), Z3Error> {
        self.solver.reset();
        // Z3 may drop per-solver parameters on reset; reapply if configured.
        if let Some(params) = &self.params {
            self.solver.set_params(params);
        }
        self.int_vars.clear();
        self.bool_vars.clear();
        self.last_assumption_names.clear();
        self.last_assumption_terms.clear();
        Ok(())
    }
}
