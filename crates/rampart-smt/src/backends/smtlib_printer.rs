use crate::terms::{SmtSort, SmtTerm};

/// Print a term in SMT-LIB2 syntax.
pub fn to_smtlib(term: &SmtTerm) -> String {
    let mut out = String::new();
    write_term(term, &mut out);
    out
}

fn write_binary(op: &str, lhs: &SmtTerm, rhs: &SmtTerm, out: &mut String) {
    out.push('(');
    out.push_str(op);
    out.push(' ');
    write_term(lhs, out);
    out.push(' ');
    write_term(rhs, out);
    out.push(')');
}

fn write_nary(op: &str, terms: &[SmtTerm], neutral: &str, out: &mut String) {
    match terms {
        [] => out.push_str(neutral),
        [single] => write_term(single, out),
        many => {
            out.push('(');
            out.push_str(op);
            for t in many {
                out.push(' ');
                write_term(t, out);
            }
            out.push(')');
        }
    }
}

fn write_term(term: &SmtTerm, out: &mut String) {
    match term {
        SmtTerm::Var(name) => out.push_str(name),
        SmtTerm::IntLit(n) => {
            if *n < 0 {
                out.push_str(&format!("(- {})", -n));
            } else {
                out.push_str(&n.to_string());
            }
        }
        SmtTerm::BoolLit(b) => out.push_str(if *b { "true" } else { "false" }),
        SmtTerm::Add(l, r) => write_binary("+", l, r, out),
        SmtTerm::Sub(l, r) => write_binary("-", l, r, out),
        SmtTerm::Mul(l, r) => write_binary("*", l, r, out),
        SmtTerm::Eq(l, r) => write_binary("=", l, r, out),
        SmtTerm::Lt(l, r) => write_binary("<", l, r, out),
        SmtTerm::Le(l, r) => write_binary("<=", l, r, out),
        SmtTerm::Gt(l, r) => write_binary(">", l, r, out),
        SmtTerm::Ge(l, r) => write_binary(">=", l, r, out),
        SmtTerm::And(ts) => write_nary("and", ts, "true", out),
        SmtTerm::Or(ts) => write_nary("or", ts, "false", out),
        SmtTerm::Not(inner) => {
            out.push_str("(not ");
            write_term(inner, out);
            out.push(')');
        }
        SmtTerm::Implies(l, r) => write_binary("=>", l, r, out),
        SmtTerm::Ite(c, t, e) => {
            out.push_str("(ite ");
            write_term(c, out);
            out.push(' ');
            write_term(t, out);
            out.push(' ');
            write_term(e, out);
            out.push(')');
        }
    }
}

/// Print a sort in SMT-LIB2 syntax.
pub fn sort_to_smtlib(sort: &SmtSort) -> &'static str {
    match sort {
        SmtSort::Bool => "Bool",
        SmtSort::Int => "Int",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prints_comparison_over_arithmetic() {
        let term = SmtTerm::var("c__1").add(SmtTerm::int(1)).ge(SmtTerm::int(0));
        assert_eq!(to_smtlib(&term), "(>= (+ c__1 1) 0)");
    }

    #[test]
    fn prints_negative_literal_in_prefix_form() {
        let term = SmtTerm::var("x").eq(SmtTerm::int(-7));
        assert_eq!(to_smtlib(&term), "(= x (- 7))");
    }

    #[test]
    fn empty_and_or_print_as_units() {
        assert_eq!(to_smtlib(&SmtTerm::and(vec![])), "true");
        assert_eq!(to_smtlib(&SmtTerm::or(vec![])), "false");
    }

    #[test]
    fn singleton_conjunction_drops_the_operator() {
        let term = SmtTerm::and(vec![SmtTerm::var("p")]);
        assert_eq!(to_smtlib(&term), "p");
    }

    #[test]
    fn prints_negated_cube() {
        let cube = SmtTerm::and(vec![
            SmtTerm::var("pc__1").eq(SmtTerm::int(2)),
            SmtTerm::var("c__1").ge(SmtTerm::int(3)),
        ]);
        assert_eq!(
            to_smtlib(&cube.not()),
            "(not (and (= pc__1 2) (>= c__1 3)))"
        );
    }
}
