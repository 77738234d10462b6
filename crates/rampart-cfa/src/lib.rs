#![doc = include_str!("../README.md")]

use std::collections::{BTreeMap, BTreeSet};

use rampart_smt::terms::{SmtSort, SmtTerm};

/// Program-counter variable name; indexed like any other variable.
pub const PC_VAR: &str = "__pc";

/// Canonical name of `name` at SSA index `index`.
pub fn ssa_name(name: &str, index: u64) -> String {
    format!("{name}__{index}")
}

/// A CFA location, identified by its integer id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocationId(pub u64);

impl std::fmt::Display for LocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Declared type of a program variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarType {
    Bool,
    Int,
    /// Non-negative integer; carries a `>= 0` domain constraint.
    Uint,
}

impl VarType {
    pub fn sort(&self) -> SmtSort {
        match self {
            VarType::Bool => SmtSort::Bool,
            VarType::Int | VarType::Uint => SmtSort::Int,
        }
    }

    /// Numeric types can be compared against each other of the same kind.
    pub fn is_numeric(&self) -> bool {
        matches!(self, VarType::Int | VarType::Uint)
    }
}

/// Variable-name → SSA-index map describing one side of a block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SsaContext {
    indices: BTreeMap<String, u64>,
}

impl SsaContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_var(mut self, name: impl Into<String>, index: u64) -> Self {
        self.indices.insert(name.into(), index);
        self
    }

    pub fn index_of(&self, name: &str) -> Option<u64> {
        self.indices.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.indices.iter().map(|(n, i)| (n.as_str(), *i))
    }

    pub fn max_index(&self) -> u64 {
        self.indices.values().copied().max().unwrap_or(1)
    }
}

/// One atomic CFA edge: a formula over SSA-indexed variables together with
/// the variable indices it reads (`pre`) and writes (`post`).
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub pred: LocationId,
    pub succ: LocationId,
    pub formula: SmtTerm,
    pub pre: SsaContext,
    pub post: SsaContext,
}

/// The blocks forward-reachable from the entry location, as produced by the
/// external block enumeration, plus the variable typing shared by all blocks.
#[derive(Debug, Clone)]
pub struct ReachableBlocks {
    pub blocks: Vec<Block>,
    pub entry: LocationId,
    pub targets: BTreeSet<LocationId>,
    pub variables: BTreeMap<String, VarType>,
}

impl ReachableBlocks {
    /// Highest SSA index appearing in any block context; at least 2 so that
    /// a distinct primed index always exists.
    pub fn highest_ssa(&self) -> u64 {
        self.blocks
            .iter()
            .flat_map(|b| [b.pre.max_index(), b.post.max_index()])
            .max()
            .unwrap_or(2)
            .max(2)
    }
}
