use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, Stdio};

use thiserror::Error;

use crate::backends::smtlib_printer::{sort_to_smtlib, to_smtlib};
use crate::solver::{Model, ModelValue, SatResult, SmtSolver};
use crate::terms::{SmtSort, SmtTerm};

#[derive(Debug, Error)]
pub enum Cvc5Error {
    #[error("cvc5 I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cvc5 not found: {0}")]
    NotFound(String),
    #[error("cvc5 error: {0}")]
    SolverError(String),
}

/// Process-based cvc5 backend speaking SMT-LIB2 over pipes.
pub struct Cvc5Solver {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    stderr: BufReader<ChildStderr>,
    vars: HashMap<String, SmtSort>,
    last_assumptions: Vec<String>,
}

impl Cvc5Solver {
    pub fn new() -> Result<Self, Cvc5Error> {
        Self::with_command_and_timeout("cvc5", None)
    }

    /// Per-check wall-clock limit, in seconds; zero means no limit.
    pub fn with_timeout_secs(timeout_secs: u64) -> Result<Self, Cvc5Error> {
        let timeout_ms = match timeout_secs {
            0 => None,
            secs => Some(secs.saturating_mul(1000)),
        };
        Self::with_command_and_timeout("cvc5", timeout_ms)
    }

    pub fn with_command_and_timeout(cmd: &str, timeout_ms: Option<u64>) -> Result<Self, Cvc5Error> {
        let mut args = vec![
            "--lang".to_string(),
            "smt2".to_string(),
            "--incremental".to_string(),
            "--produce-models".to_string(),
            "--produce-unsat-assumptions".to_string(),
        ];
        if let Some(ms) = timeout_ms {
            args.push(format!("--tlimit={ms}"));
        }

        let mut child = Command::new(cmd)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Cvc5Error::NotFound(format!("{cmd}: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Cvc5Error::SolverError("failed to capture cvc5 stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Cvc5Error::SolverError("failed to capture cvc5 stdout".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Cvc5Error::SolverError("failed to capture cvc5 stderr".into()))?;

        let mut solver = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            stderr: BufReader::new(stderr),
            vars: HashMap::new(),
            last_assumptions: Vec::new(),
        };
        solver.send("(set-logic QF_LIA)")?;
        Ok(solver)
    }

    /// Send a command that produces no output on success.
    fn send(&mut self, cmd: &str) -> Result<(), Cvc5Error> {
        writeln!(self.stdin, "{cmd}")?;
        self.stdin.flush()?;
        Ok(())
    }

    /// Send a command and read its single-line response.
    fn query(&mut self, cmd: &str) -> Result<String, Cvc5Error> {
        writeln!(self.stdin, "{cmd}")?;
        self.stdin.flush()?;

        let mut response = String::new();
        self.stdout.read_line(&mut response)?;
        if response.is_empty() {
            let mut diagnostics = String::new();
            let _ = self.stderr.read_line(&mut diagnostics);
            return Err(Cvc5Error::SolverError(format!(
                "no response from cvc5 for `{cmd}`. stderr: {}",
                diagnostics.trim()
            )));
        }
        Ok(response.trim_end().to_string())
    }

    fn parse_check_sat(response: &str) -> Result<SatResult, Cvc5Error> {
        match response {
            "sat" => Ok(SatResult::Sat),
            "unsat" => Ok(SatResult::Unsat),
            "unknown" => Ok(SatResult::Unknown("cvc5 returned unknown".into())),
            other => Err(Cvc5Error::SolverError(other.to_string())),
        }
    }
}

impl Drop for Cvc5Solver {
    fn drop(&mut self) {
        let _ = writeln!(self.stdin, "(exit)");
        let _ = self.stdin.flush();
        let _ = self.child.wait();
    }
}

impl SmtSolver for Cvc5Solver {
    type Error = Cvc5Error;

    fn declare_var(&mut self, name: &str, sort: &SmtSort) -> Result<(), Cvc5Error> {
        self.send(&format!("(declare-const {name} {})", sort_to_smtlib(sort)))?;
        self.vars.insert(name.to_string(), sort.clone());
        Ok(())
    }

    fn assert(&mut self, term: &SmtTerm) -> Result<(), Cvc5Error> {
        self.send(&format!("(assert {})", to_smtlib(term)))
    }

    fn push(&mut self) -> Result<(), Cvc5Error> {
        self.send("(push 1)")
    }

    fn pop(&mut self) -> Result<(), Cvc5Error> {
        self.send("(pop 1)")
    }

    fn check_sat(&mut self) -> Result<SatResult, Cvc5Error> {
        let response = self.query("(check-sat)")?;
        Self::parse_check_sat(&response)
    }

    fn check_sat_with_model(
        &mut self,
        var_names: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), Cvc5Error> {
        let result = self.check_sat()?;
        if result != SatResult::Sat {
            return Ok((result, None));
        }

        let mut values = HashMap::new();
        for &(name, sort) in var_names {
            let response = self.query(&format!("(get-value ({name}))"))?;
            if let Some(val) = parse_value(&response, sort) {
                values.insert(name.to_string(), val);
            }
        }
        Ok((SatResult::Sat, Some(Model { values })))
    }

    fn supports_assumption_unsat_core(&self) -> bool {
        true
    }

    fn check_sat_assuming(&mut self, assumptions: &[String]) -> Result<SatResult, Cvc5Error> {
        for name in assumptions {
            match self.vars.get(name) {
                Some(SmtSort::Bool) => {}
                Some(_) => {
                    return Err(Cvc5Error::SolverError(format!(
                        "assumption `{name}` is not declared as Bool"
                    )));
                }
                None => {
                    return Err(Cvc5Error::SolverError(format!(
                        "assumption `{name}` is not declared"
                    )));
                }
            }
        }
        self.last_assumptions = assumptions.to_vec();
        let response = self.query(&format!("(check-sat-assuming ({}))", assumptions.join(" ")))?;
        Self::parse_check_sat(&response)
    }

    fn get_unsat_core_assumptions(&mut self) -> Result<Vec<String>, Cvc5Error> {
        let response = self.query("(get-unsat-assumptions)")?;
        Ok(parse_symbol_list(&response)
            .into_iter()
            .filter(|name| self.last_assumptions.iter().any(|a| a == name))
            .collect())
    }

    fn reset(&mut self) -> Result<(), Cvc5Error> {
        self.send("(reset)")?;
        self.send("(set-logic QF_LIA)")?;
        self.vars.clear();
        self.last_assumptions.clear();
        Ok(())
    }
}

/// Parse a `(get-value ((name value)))` response into a typed value.
fn parse_value(response: &str, sort: &SmtSort) -> Option<ModelValue> {
    let inner = response
        .trim()
        .trim_start_matches('(')
        .trim_end_matches(')');
    let (_, val_str) = inner.split_once(' ')?;
    let val_str = val_str.trim().trim_end_matches(')').trim();

    match sort {
        SmtSort::Int => {
            if let Some(num) = val_str.strip_prefix("(- ") {
                let num = num.trim_end_matches(')');
                num.parse::<i64>().ok().map(|n| ModelValue::Int(-n))
            } else {
                val_str.parse::<i64>().ok().map(ModelValue::Int)
            }
        }
        SmtSort::Bool => match val_str {
            "true" => Some(ModelValue::Bool(true)),
            "false" => Some(ModelValue::Bool(false)),
            _ => None,
        },
    }
}

/// Split an S-expression list of symbols, honoring `|quoted symbols|`.
fn parse_symbol_list(response: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut buf = String::new();
    let mut in_quoted_symbol = false;
    for ch in response.trim().chars() {
        match ch {
            '(' | ')' if !in_quoted_symbol => {
                if !buf.is_empty() {
                    out.push(std::mem::take(&mut buf));
                }
            }
            '|' => {
                in_quoted_symbol = !in_quoted_symbol;
                if !buf.is_empty() {
                    out.push(std::mem::take(&mut buf));
                }
            }
            c if c.is_whitespace() && !in_quoted_symbol => {
                if !buf.is_empty() {
                    out.push(std::mem::take(&mut buf));
                }
            }
            other => buf.push(other),
        }
    }
    if !buf.is_empty() {
        out.push(buf);
    }
    out
}
