use serde::{Deserialize, Serialize};

use crate::define_entity;

use super::inst::Inst;

define_entity!(BlockId);

/// How control enters a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BeginKind {
    /// Reached from more than one forward predecessor.
    Merge,
    #[default]
    Plain,
}

/// Key of one switch arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaseKey {
    Value(i64),
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchCase {
    pub key: CaseKey,
    pub target: BlockId,
}

/// How control leaves a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndKind {
    /// Two-way conditional. Successors are `[on_true, on_false]`.
    Branch { on_true: BlockId, on_false: BlockId },
    /// Multi-way dispatch. Successors are the distinct case targets in
    /// first-appearance order; several keys may share a target.
    Switch { cases: Vec<SwitchCase> },
    Return,
    /// Unconditional transfer to the single successor.
    Fallthrough,
}

impl EndKind {
    /// Distinct switch targets in first-appearance order.
    pub fn case_targets(&self) -> Vec<BlockId> {
        let EndKind::Switch { cases } = self else {
            return Vec::new();
        };
        let mut targets: Vec<BlockId> = Vec::with_capacity(cases.len());
        for case in cases {
            if !targets.contains(&case.target) {
                targets.push(case.target);
            }
        }
        targets
    }
}

/// A basic block together with every annotation the emitter relies on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    #[serde(default)]
    pub preds: Vec<BlockId>,
    #[serde(default)]
    pub succs: Vec<BlockId>,
    /// Immediate dominator; `None` only for the entry.
    #[serde(default)]
    pub dominator: Option<BlockId>,
    /// Immediate post-dominator, if any real block post-dominates this one.
    #[serde(default)]
    pub post_dominator: Option<BlockId>,
    /// Head of this block's dominator-tree children.
    #[serde(default)]
    pub first_dominated: Option<BlockId>,
    /// Next child of the same dominator.
    #[serde(default)]
    pub dominated_sibling: Option<BlockId>,
    #[serde(default)]
    pub begin: BeginKind,
    pub end: EndKind,
    #[serde(default)]
    pub is_loop_header: bool,
    /// The block owns the back edge of its loop.
    #[serde(default)]
    pub is_loop_end: bool,
    #[serde(default)]
    pub insts: Vec<Inst>,
}

impl Block {
    pub fn new(end: EndKind) -> Self {
        Block {
            preds: Vec::new(),
            succs: Vec::new(),
            dominator: None,
            post_dominator: None,
            first_dominated: None,
            dominated_sibling: None,
            begin: BeginKind::Plain,
            end,
            is_loop_header: false,
            is_loop_end: false,
            insts: Vec::new(),
        }
    }

    pub fn is_merge(&self) -> bool {
        self.begin == BeginKind::Merge
    }

    pub fn is_branch(&self) -> bool {
        matches!(self.end, EndKind::Branch { .. })
    }

    pub fn is_switch(&self) -> bool {
        matches!(self.end, EndKind::Switch { .. })
    }

    pub fn true_successor(&self) -> Option<BlockId> {
        match self.end {
            EndKind::Branch { on_true, .. } => Some(on_true),
            _ => None,
        }
    }

    pub fn false_successor(&self) -> Option<BlockId> {
        match self.end {
            EndKind::Branch { on_false, .. } => Some(on_false),
            _ => None,
        }
    }
}
