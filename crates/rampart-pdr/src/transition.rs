//! Transition-system assembly from reachable CFA blocks.
//!
//! Each block formula is corrected so the global relation is total over the
//! full variable set: untouched variables get frame-axiom equalities, partial
//! SSA indices get chain equalities up to the global primed index, and the
//! program counter is fixed to the block's endpoint locations. The corrected
//! formulas are then disjoined into one relation.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use rampart_cfa::{ssa_name, Block, LocationId, ReachableBlocks, VarType, PC_VAR};
use rampart_smt::solver::{Model, SmtSolver};
use rampart_smt::terms::{SmtSort, SmtTerm};

use crate::EngineError;

/// A block formula after correction, still tied to its source block.
#[derive(Debug, Clone)]
pub struct CorrectedBlock {
    pub pred: LocationId,
    pub succ: LocationId,
    pub formula: SmtTerm,
    pub block_index: usize,
}

/// Immutable formula bundle for one verification run.
#[derive(Debug, Clone)]
pub struct TransitionSystem {
    initial_condition: SmtTerm,
    safety_property: SmtTerm,
    transition_relation: SmtTerm,
    corrected_blocks: Vec<CorrectedBlock>,
    blocks: Vec<Block>,
    entry: LocationId,
    targets: BTreeSet<LocationId>,
    variables: BTreeMap<String, VarType>,
    highest_ssa: u64,
}

impl TransitionSystem {
    pub fn from_blocks(bundle: &ReachableBlocks) -> Result<Self, EngineError> {
        let highest_ssa = bundle.highest_ssa();

        for block in &bundle.blocks {
            for (name, index) in block.pre.iter().chain(block.post.iter()) {
                if index == 0 {
                    return Err(EngineError::InvalidSystem(format!(
                        "block {} -> {} uses SSA index 0 for `{name}`",
                        block.pred, block.succ
                    )));
                }
                if !bundle.variables.contains_key(name) {
                    return Err(EngineError::InvalidSystem(format!(
                        "block {} -> {} mentions untyped variable `{name}`",
                        block.pred, block.succ
                    )));
                }
            }
        }

        let mut corrected_blocks = Vec::with_capacity(bundle.blocks.len());
        for (block_index, block) in bundle.blocks.iter().enumerate() {
            let mut parts = vec![block.formula.clone()];

            for name in bundle.variables.keys() {
                match block.post.index_of(name) {
                    // Untouched by this block: frame axiom.
                    None => {
                        parts.push(
                            SmtTerm::var(ssa_name(name, 1))
                                .eq(SmtTerm::var(ssa_name(name, highest_ssa))),
                        );
                    }
                    // Written, but below the global primed index: chain up.
                    Some(post_index) => {
                        for k in post_index..highest_ssa {
                            parts.push(
                                SmtTerm::var(ssa_name(name, k))
                                    .eq(SmtTerm::var(ssa_name(name, k + 1))),
                            );
                        }
                    }
                }
                // Read above the global unprimed index: chain down to 1.
                if let Some(pre_index) = block.pre.index_of(name) {
                    for k in 1..pre_index {
                        parts.push(
                            SmtTerm::var(ssa_name(name, k))
                                .eq(SmtTerm::var(ssa_name(name, k + 1))),
                        );
                    }
                }
            }

            parts.push(SmtTerm::var(ssa_name(PC_VAR, 1)).eq(SmtTerm::int(block.pred.0 as i64)));
            parts.push(SmtTerm::var(ssa_name(PC_VAR, 2)).eq(SmtTerm::int(block.succ.0 as i64)));

            corrected_blocks.push(CorrectedBlock {
                pred: block.pred,
                succ: block.succ,
                formula: SmtTerm::and(parts),
                block_index,
            });
        }

        let transition_relation =
            SmtTerm::or(corrected_blocks.iter().map(|b| b.formula.clone()).collect());
        let initial_condition =
            SmtTerm::var(ssa_name(PC_VAR, 1)).eq(SmtTerm::int(bundle.entry.0 as i64));
        let safety_property = SmtTerm::and(
            bundle
                .targets
                .iter()
                .map(|t| {
                    SmtTerm::var(ssa_name(PC_VAR, 1))
                        .eq(SmtTerm::int(t.0 as i64))
                        .not()
                })
                .collect(),
        );

        Ok(Self {
            initial_condition,
            safety_property,
            transition_relation,
            corrected_blocks,
            blocks: bundle.blocks.clone(),
            entry: bundle.entry,
            targets: bundle.targets.clone(),
            variables: bundle.variables.clone(),
            highest_ssa,
        })
    }

    pub fn initial_condition(&self) -> &SmtTerm {
        &self.initial_condition
    }

    pub fn safety_property(&self) -> &SmtTerm {
        &self.safety_property
    }

    pub fn transition_relation(&self) -> &SmtTerm {
        &self.transition_relation
    }

    pub fn corrected_blocks(&self) -> &[CorrectedBlock] {
        &self.corrected_blocks
    }

    pub fn block(&self, index: usize) -> &Block {
        &self.blocks[index]
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn entry(&self) -> LocationId {
        self.entry
    }

    pub fn targets(&self) -> &BTreeSet<LocationId> {
        &self.targets
    }

    pub fn variables(&self) -> &BTreeMap<String, VarType> {
        &self.variables
    }

    pub fn highest_ssa(&self) -> u64 {
        self.highest_ssa
    }

    pub fn pc_unprimed(&self) -> String {
        ssa_name(PC_VAR, 1)
    }

    pub fn pc_primed(&self) -> String {
        ssa_name(PC_VAR, 2)
    }

    pub fn unprimed_name(&self, var: &str) -> String {
        ssa_name(var, 1)
    }

    pub fn primed_name(&self, var: &str) -> String {
        ssa_name(var, self.highest_ssa)
    }

    /// Rewrite a state formula over unprimed variables into its primed copy.
    pub fn prime(&self, term: &SmtTerm) -> SmtTerm {
        let mut renaming = HashMap::new();
        for name in self.variables.keys() {
            renaming.insert(self.unprimed_name(name), self.primed_name(name));
        }
        renaming.insert(self.pc_unprimed(), self.pc_primed());
        term.rename_vars(&renaming)
    }

    /// Declare every SSA instance of every variable, plus both program
    /// counters. Called once per run, outside all scopes.
    pub fn declare_vars<S: SmtSolver>(&self, solver: &mut S) -> Result<(), S::Error> {
        for (name, var_type) in &self.variables {
            for index in 1..=self.highest_ssa {
                solver.declare_var(&ssa_name(name, index), &var_type.sort())?;
            }
        }
        solver.declare_var(&ssa_name(PC_VAR, 1), &SmtSort::Int)?;
        solver.declare_var(&ssa_name(PC_VAR, 2), &SmtSort::Int)?;
        Ok(())
    }

    /// Domain constraints for unsigned variables, over every SSA instance.
    pub fn domain_constraints(&self) -> Vec<SmtTerm> {
        let mut out = Vec::new();
        for (name, var_type) in &self.variables {
            if matches!(var_type, VarType::Uint) {
                for index in 1..=self.highest_ssa {
                    out.push(SmtTerm::var(ssa_name(name, index)).ge(SmtTerm::int(0)));
                }
            }
        }
        out
    }

    /// Variables to read off a model when extracting a concrete state: the
    /// unprimed program variables plus both program counters.
    pub fn model_vars(&self) -> Vec<(String, SmtSort)> {
        let mut out: Vec<(String, SmtSort)> = self
            .variables
            .iter()
            .map(|(name, var_type)| (self.unprimed_name(name), var_type.sort()))
            .collect();
        out.push((self.pc_unprimed(), SmtSort::Int));
        out.push((self.pc_primed(), SmtSort::Int));
        out
    }

    /// Every SSA instance of every variable plus both program counters, for
    /// full-model extraction during lifting.
    pub fn all_model_vars(&self) -> Vec<(String, SmtSort)> {
        let mut out = Vec::new();
        for (name, var_type) in &self.variables {
            for index in 1..=self.highest_ssa {
                out.push((ssa_name(name, index), var_type.sort()));
            }
        }
        out.push((ssa_name(PC_VAR, 1), SmtSort::Int));
        out.push((ssa_name(PC_VAR, 2), SmtSort::Int));
        out
    }

    /// The variables a pre-image computation must eliminate: every SSA
    /// instance above the unprimed one, plus the primed program counter.
    pub fn eliminable_vars(&self) -> Vec<(String, SmtSort)> {
        let mut out = Vec::new();
        for (name, var_type) in &self.variables {
            for index in 2..=self.highest_ssa {
                out.push((ssa_name(name, index), var_type.sort()));
            }
        }
        out.push((ssa_name(PC_VAR, 2), SmtSort::Int));
        out
    }

    /// Read a concrete unprimed state off a model: one equality per program
    /// variable plus the location literal. Also reports the successor
    /// location when the model assigns the primed program counter.
    pub fn state_from_model(
        &self,
        model: &Model,
    ) -> Result<(SmtTerm, LocationId, Option<LocationId>), EngineError> {
        let pc = model.get_int(&self.pc_unprimed()).ok_or_else(|| {
            EngineError::Solver("model does not assign the program counter".into())
        })?;
        let location = LocationId(pc as u64);
        let successor = model.get_int(&self.pc_primed()).map(|v| LocationId(v as u64));

        let mut conjuncts = vec![SmtTerm::var(self.pc_unprimed()).eq(SmtTerm::int(pc))];
        for (name, var_type) in &self.variables {
            let unprimed = self.unprimed_name(name);
            match var_type {
                VarType::Bool => {
                    if let Some(b) = model.get_bool(&unprimed) {
                        conjuncts.push(SmtTerm::var(unprimed).eq(SmtTerm::bool(b)));
                    }
                }
                VarType::Int | VarType::Uint => {
                    if let Some(n) = model.get_int(&unprimed) {
                        conjuncts.push(SmtTerm::var(unprimed).eq(SmtTerm::int(n)));
                    }
                }
            }
        }
        Ok((SmtTerm::and(conjuncts), location, successor))
    }
}
