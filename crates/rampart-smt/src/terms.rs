use std::collections::HashMap;

/// SMT sorts used by the engine (QF_LIA only).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SmtSort {
    Bool,
    Int,
}

impl std::fmt::Display for SmtSort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SmtSort::Bool => write!(f, "Bool"),
            SmtSort::Int => write!(f, "Int"),
        }
    }
}

/// Abstract SMT term representation, solver-agnostic.
#[derive(Debug, Clone, PartialEq)]
pub enum SmtTerm {
    /// Variable reference by name.
    Var(String),
    /// Integer literal.
    IntLit(i64),
    /// Boolean literal.
    BoolLit(bool),

    // Arithmetic
    Add(Box<SmtTerm>, Box<SmtTerm>),
    Sub(Box<SmtTerm>, Box<SmtTerm>),
    Mul(Box<SmtTerm>, Box<SmtTerm>),

    // Comparison
    Eq(Box<SmtTerm>, Box<SmtTerm>),
    Lt(Box<SmtTerm>, Box<SmtTerm>),
    Le(Box<SmtTerm>, Box<SmtTerm>),
    Gt(Box<SmtTerm>, Box<SmtTerm>),
    Ge(Box<SmtTerm>, Box<SmtTerm>),

    // Boolean logic
    And(Vec<SmtTerm>),
    Or(Vec<SmtTerm>),
    Not(Box<SmtTerm>),
    Implies(Box<SmtTerm>, Box<SmtTerm>),

    // If-then-else
    Ite(Box<SmtTerm>, Box<SmtTerm>, Box<SmtTerm>),
}

#[allow(clippy::should_implement_trait)]
impl SmtTerm {
    pub fn var(name: impl Into<String>) -> Self {
        SmtTerm::Var(name.into())
    }

    pub fn int(n: i64) -> Self {
        SmtTerm::IntLit(n)
    }

    pub fn bool(b: bool) -> Self {
        SmtTerm::BoolLit(b)
    }

    pub fn add(self, other: SmtTerm) -> Self {
        SmtTerm::Add(Box::new(self), Box::new(other))
    }

    pub fn sub(self, other: SmtTerm) -> Self {
        SmtTerm::Sub(Box::new(self), Box::new(other))
    }

    pub fn mul(self, other: SmtTerm) -> Self {
        SmtTerm::Mul(Box::new(self), Box::new(other))
    }

    pub fn eq(self, other: SmtTerm) -> Self {
        SmtTerm::Eq(Box::new(self), Box::new(other))
    }

    pub fn lt(self, other: SmtTerm) -> Self {
        SmtTerm::Lt(Box::new(self), Box::new(other))
    }

    pub fn le(self, other: SmtTerm) -> Self {
        SmtTerm::Le(Box::new(self), Box::new(other))
    }

    pub fn gt(self, other: SmtTerm) -> Self {
        SmtTerm::Gt(Box::new(self), Box::new(other))
    }

    pub fn ge(self, other: SmtTerm) -> Self {
        SmtTerm::Ge(Box::new(self), Box::new(other))
    }

    pub fn and(terms: Vec<SmtTerm>) -> Self {
        SmtTerm::And(terms)
    }

    pub fn or(terms: Vec<SmtTerm>) -> Self {
        SmtTerm::Or(terms)
    }

    pub fn not(self) -> Self {
        SmtTerm::Not(Box::new(self))
    }

    pub fn implies(self, other: SmtTerm) -> Self {
        SmtTerm::Implies(Box::new(self), Box::new(other))
    }

    /// Rename every variable occurrence according to `renaming`; names absent
    /// from the map are left untouched.
    pub fn rename_vars(&self, renaming: &HashMap<String, String>) -> SmtTerm {
        let rec = |t: &SmtTerm| Box::new(t.rename_vars(renaming));
        match self {
            SmtTerm::Var(name) => match renaming.get(name) {
                Some(new_name) => SmtTerm::Var(new_name.clone()),
                None => SmtTerm::Var(name.clone()),
            },
            SmtTerm::IntLit(_) | SmtTerm::BoolLit(_) => self.clone(),
            SmtTerm::Add(l, r) => SmtTerm::Add(rec(l), rec(r)),
            SmtTerm::Sub(l, r) => SmtTerm::Sub(rec(l), rec(r)),
            SmtTerm::Mul(l, r) => SmtTerm::Mul(rec(l), rec(r)),
            SmtTerm::Eq(l, r) => SmtTerm::Eq(rec(l), rec(r)),
            SmtTerm::Lt(l, r) => SmtTerm::Lt(rec(l), rec(r)),
            SmtTerm::Le(l, r) => SmtTerm::Le(rec(l), rec(r)),
            SmtTerm::Gt(l, r) => SmtTerm::Gt(rec(l), rec(r)),
            SmtTerm::Ge(l, r) => SmtTerm::Ge(rec(l), rec(r)),
            SmtTerm::And(ts) => SmtTerm::And(ts.iter().map(|t| t.rename_vars(renaming)).collect()),
            SmtTerm::Or(ts) => SmtTerm::Or(ts.iter().map(|t| t.rename_vars(renaming)).collect()),
            SmtTerm::Not(t) => SmtTerm::Not(rec(t)),
            SmtTerm::Implies(l, r) => SmtTerm::Implies(rec(l), rec(r)),
            SmtTerm::Ite(c, t, e) => SmtTerm::Ite(rec(c), rec(t), rec(e)),
        }
    }

    /// Replace every occurrence of the variable `name` by `replacement`.
    pub fn substitute_var(&self, name: &str, replacement: &SmtTerm) -> SmtTerm {
        let rec = |t: &SmtTerm| Box::new(t.substitute_var(name, replacement));
        match self {
            SmtTerm::Var(v) if v == name => replacement.clone(),
            SmtTerm::Var(_) | SmtTerm::IntLit(_) | SmtTerm::BoolLit(_) => self.clone(),
            SmtTerm::Add(l, r) => SmtTerm::Add(rec(l), rec(r)),
            SmtTerm::Sub(l, r) => SmtTerm::Sub(rec(l), rec(r)),
            SmtTerm::Mul(l, r) => SmtTerm::Mul(rec(l), rec(r)),
            SmtTerm::Eq(l, r) => SmtTerm::Eq(rec(l), rec(r)),
            SmtTerm::Lt(l, r) => SmtTerm::Lt(rec(l), rec(r)),
            SmtTerm::Le(l, r) => SmtTerm::Le(rec(l), rec(r)),
            SmtTerm::Gt(l, r) => SmtTerm::Gt(rec(l), rec(r)),
            SmtTerm::Ge(l, r) => SmtTerm::Ge(rec(l), rec(r)),
            SmtTerm::And(ts) => SmtTerm::And(
                ts.iter()
                    .map(|t| t.substitute_var(name, replacement))
                    .collect(),
            ),
            SmtTerm::Or(ts) => SmtTerm::Or(
                ts.iter()
                    .map(|t| t.substitute_var(name, replacement))
                    .collect(),
            ),
            SmtTerm::Not(t) => SmtTerm::Not(rec(t)),
            SmtTerm::Implies(l, r) => SmtTerm::Implies(rec(l), rec(r)),
            SmtTerm::Ite(c, t, e) => SmtTerm::Ite(rec(c), rec(t), rec(e)),
        }
    }

    /// Flatten nested conjunctions into a list of conjuncts. A term that is
    /// not an `And` is its own single conjunct.
    pub fn conjuncts(&self) -> Vec<SmtTerm> {
        fn walk(term: &SmtTerm, out: &mut Vec<SmtTerm>) {
            match term {
                SmtTerm::And(ts) => {
                    for t in ts {
                        walk(t, out);
                    }
                }
                other => out.push(other.clone()),
            }
        }
        let mut out = Vec::new();
        walk(self, &mut out);
        out
    }

    /// True iff the variable `name` occurs anywhere in the term.
    pub fn mentions_var(&self, name: &str) -> bool {
        match self {
            SmtTerm::Var(v) => v == name,
            SmtTerm::IntLit(_) | SmtTerm::BoolLit(_) => false,
            SmtTerm::Add(l, r)
            | SmtTerm::Sub(l, r)
            | SmtTerm::Mul(l, r)
            | SmtTerm::Eq(l, r)
            | SmtTerm::Lt(l, r)
            | SmtTerm::Le(l, r)
            | SmtTerm::Gt(l, r)
            | SmtTerm::Ge(l, r)
            | SmtTerm::Implies(l, r) => l.mentions_var(name) || r.mentions_var(name),
            SmtTerm::And(ts) | SmtTerm::Or(ts) => ts.iter().any(|t| t.mentions_var(name)),
            SmtTerm::Not(t) => t.mentions_var(name),
            SmtTerm::Ite(c, t, e) => {
                c.mentions_var(name) || t.mentions_var(name) || e.mentions_var(name)
            }
        }
    }

    /// True iff the term contains a disjunction, implication, or ite, i.e. it
    /// is not a plain conjunction of atoms.
    pub fn is_purely_conjunctive(&self) -> bool {
        match self {
            SmtTerm::Or(_) | SmtTerm::Implies(_, _) | SmtTerm::Ite(_, _, _) => false,
            SmtTerm::And(ts) => ts.iter().all(|t| t.is_purely_conjunctive()),
            SmtTerm::Not(t) => t.is_purely_conjunctive(),
            SmtTerm::Var(_) | SmtTerm::IntLit(_) | SmtTerm::BoolLit(_) => true,
            SmtTerm::Add(l, r)
            | SmtTerm::Sub(l, r)
            | SmtTerm::Mul(l, r)
            | SmtTerm::Eq(l, r)
            | SmtTerm::Lt(l, r)
            | SmtTerm::Le(l, r)
            | SmtTerm::Gt(l, r)
            | SmtTerm::Ge(l, r) => l.is_purely_conjunctive() && r.is_purely_conjunctive(),
        }
    }
}
