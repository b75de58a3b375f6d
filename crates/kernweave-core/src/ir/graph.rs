use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::entity::{EntityRef, PrimaryMap};
use crate::error::{CoreError, StructuralCheck, UnsupportedPattern};

use super::block::{Block, BlockId, CaseKey, EndKind};
use super::dominators::{reverse_postorder, Digraph};
use super::inst::{Var, VarId};

/// An annotated control-flow graph: the body of one method.
///
/// Blocks are owned by the arena and refer to each other by id. Annotations
/// (dominators, child chains, loop flags, begin kinds) are either supplied by
/// the upstream optimizer or computed by [`super::GraphBuilder`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Graph {
    pub blocks: PrimaryMap<BlockId, Block>,
    #[serde(default)]
    pub vars: PrimaryMap<VarId, Var>,
    pub entry: BlockId,
}

/// Dominator-tree children of one block, in sibling-chain order.
pub struct DominatedChildren<'a> {
    graph: &'a Graph,
    next: Option<BlockId>,
    remaining: usize,
}

impl Iterator for DominatedChildren<'_> {
    type Item = BlockId;

    fn next(&mut self) -> Option<BlockId> {
        let cur = self.next?;
        if self.remaining == 0 || !self.graph.blocks.contains(cur) {
            self.next = None;
            return None;
        }
        self.remaining -= 1;
        self.next = self.graph.blocks[cur].dominated_sibling;
        Some(cur)
    }
}

impl Graph {
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id]
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Block ends in a two-way conditional.
    pub fn is_if_block(&self, id: BlockId) -> bool {
        self.blocks.get(id).is_some_and(Block::is_branch)
    }

    /// Block ends in a multi-way dispatch.
    pub fn is_switch_block(&self, id: BlockId) -> bool {
        self.blocks.get(id).is_some_and(Block::is_switch)
    }

    pub fn dominated_children(&self, id: BlockId) -> DominatedChildren<'_> {
        DominatedChildren {
            graph: self,
            next: self.blocks.get(id).and_then(|b| b.first_dominated),
            remaining: self.blocks.len(),
        }
    }

    /// Position of `block` among the successors of `switch`.
    pub fn case_index_of(&self, block: BlockId, switch: BlockId) -> Option<usize> {
        let sw = self.blocks.get(switch)?;
        if !sw.is_switch() {
            return None;
        }
        sw.succs.iter().position(|&s| s == block)
    }

    /// Number of distinct case bodies of `switch`.
    pub fn case_count(&self, switch: BlockId) -> usize {
        match self.blocks.get(switch) {
            Some(sw) if sw.is_switch() => sw.succs.len(),
            _ => 0,
        }
    }

    /// Every key of `switch` that dispatches to `target`, in declaration order.
    pub fn case_keys(&self, switch: BlockId, target: BlockId) -> Vec<CaseKey> {
        match self.blocks.get(switch).map(|b| &b.end) {
            Some(EndKind::Switch { cases }) => cases
                .iter()
                .filter(|c| c.target == target)
                .map(|c| c.key)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Whether `a` dominates `b`. Every block dominates itself.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        let mut cur = b;
        for _ in 0..=self.blocks.len() {
            if cur == a {
                return true;
            }
            match self.blocks.get(cur).and_then(|blk| blk.dominator) {
                Some(up) => cur = up,
                None => return false,
            }
        }
        false
    }

    /// Reverse post-order of the blocks reachable from the entry.
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        let mut g = Digraph::with_nodes(self.blocks.len());
        for (id, block) in self.blocks.iter() {
            for &succ in &block.succs {
                if self.blocks.contains(succ) {
                    g.add_edge(id.index() as usize, succ.index() as usize);
                }
            }
        }
        reverse_postorder(&g, self.entry.index() as usize)
            .into_iter()
            .map(|i| BlockId::new(i as u32))
            .collect()
    }

    /// Check every block-level invariant the emitter relies on.
    ///
    /// Loop-shape checks live in [`super::LoopForest::compute`].
    pub fn validate(&self) -> Result<(), CoreError> {
        if !self.blocks.contains(self.entry) {
            return Err(CoreError::structural(
                self.entry,
                StructuralCheck::UnknownBlock(self.entry),
            ));
        }
        for (id, block) in self.blocks.iter() {
            self.validate_references(id, block)?;
        }

        if self.blocks[self.entry].dominator.is_some() {
            return Err(CoreError::structural(
                self.entry,
                StructuralCheck::EntryHasDominator,
            ));
        }

        let reachable: HashSet<BlockId> = self.reverse_postorder().into_iter().collect();
        for (id, block) in self.blocks.iter() {
            if !reachable.contains(&id) {
                return Err(CoreError::structural(id, StructuralCheck::Unreachable));
            }
            if id != self.entry {
                if block.dominator.is_none() {
                    return Err(CoreError::structural(id, StructuralCheck::MissingDominator));
                }
                if !self.dominates(self.entry, id) {
                    return Err(CoreError::structural(id, StructuralCheck::DominatorCycle));
                }
            }
        }
        for (id, block) in self.blocks.iter() {
            self.validate_end(id, block)?;
            self.validate_children(id)?;
        }
        Ok(())
    }

    fn validate_references(&self, id: BlockId, block: &Block) -> Result<(), CoreError> {
        let mut refs: Vec<BlockId> = Vec::new();
        refs.extend(&block.preds);
        refs.extend(&block.succs);
        refs.extend(block.dominator);
        refs.extend(block.post_dominator);
        refs.extend(block.first_dominated);
        refs.extend(block.dominated_sibling);
        match &block.end {
            EndKind::Branch { on_true, on_false } => refs.extend([*on_true, *on_false]),
            EndKind::Switch { cases } => refs.extend(cases.iter().map(|c| c.target)),
            EndKind::Return | EndKind::Fallthrough => {}
        }
        if let Some(bad) = refs.into_iter().find(|r| !self.blocks.contains(*r)) {
            return Err(CoreError::structural(id, StructuralCheck::UnknownBlock(bad)));
        }

        let vars = block
            .insts
            .iter()
            .flat_map(|inst| inst.reads.iter().copied().chain(inst.writes()));
        for var in vars {
            if !self.vars.contains(var) {
                return Err(CoreError::structural(id, StructuralCheck::UnknownVar(var)));
            }
        }
        Ok(())
    }

    fn validate_end(&self, id: BlockId, block: &Block) -> Result<(), CoreError> {
        match &block.end {
            EndKind::Branch { on_true, on_false } => {
                if on_true == on_false || block.succs != [*on_true, *on_false] {
                    return Err(CoreError::structural(
                        id,
                        StructuralCheck::BranchTargetMismatch,
                    ));
                }
            }
            EndKind::Switch { cases } => {
                if block.succs != block.end.case_targets() {
                    return Err(CoreError::structural(id, StructuralCheck::SwitchCaseMismatch));
                }
                let defaults = cases.iter().filter(|c| c.key == CaseKey::Default).count();
                if defaults != 1 {
                    return Err(CoreError::structural(
                        id,
                        StructuralCheck::SwitchDefaultCount(defaults),
                    ));
                }
                let mut seen = HashSet::new();
                for case in cases {
                    if let CaseKey::Value(v) = case.key {
                        if !seen.insert(v) {
                            return Err(CoreError::structural(
                                id,
                                StructuralCheck::DuplicateCaseKey(v),
                            ));
                        }
                    }
                }
                for &target in &block.succs {
                    if self.blocks[target].is_merge() {
                        return Err(CoreError::unsupported(
                            target,
                            UnsupportedPattern::SwitchCaseIsMerge,
                        ));
                    }
                }
            }
            EndKind::Return => {
                if !block.succs.is_empty() {
                    return Err(CoreError::structural(id, StructuralCheck::ReturnWithSuccessors));
                }
            }
            EndKind::Fallthrough => {
                if block.succs.len() != 1 {
                    return Err(CoreError::structural(
                        id,
                        StructuralCheck::FallthroughTargetCount(block.succs.len()),
                    ));
                }
            }
        }
        Ok(())
    }

    fn validate_children(&self, id: BlockId) -> Result<(), CoreError> {
        let mut cur = self.blocks[id].first_dominated;
        let mut steps = 0;
        while let Some(child) = cur {
            steps += 1;
            if steps > self.blocks.len() {
                return Err(CoreError::structural(id, StructuralCheck::ChildChainCycle));
            }
            if self.blocks[child].dominator != Some(id) {
                return Err(CoreError::structural(
                    id,
                    StructuralCheck::ChildChainMismatch(child),
                ));
            }
            cur = self.blocks[child].dominated_sibling;
        }
        Ok(())
    }
}
