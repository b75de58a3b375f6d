use crate::entity::{EntityRef, PrimaryMap};
use crate::error::{CoreError, StructuralCheck};

use super::block::{BeginKind, Block, BlockId, CaseKey, EndKind, SwitchCase};
use super::dominators::{
    dominates, immediate_dominators, immediate_post_dominators, reverse_postorder, Digraph,
};
use super::graph::Graph;
use super::inst::{Inst, Stmt, Var, VarId};

#[derive(Debug, Default)]
struct PendingBlock {
    insts: Vec<Inst>,
    end: Option<EndKind>,
    succs: Vec<BlockId>,
}

/// Builder for annotated graphs.
///
/// Blocks are filled one at a time like a cursor; `build` derives
/// predecessors, dominators, post-dominators, dominator-tree child chains,
/// loop flags and merge kinds from the terminators alone.
///
/// ```ignore
/// let mut gb = GraphBuilder::new();
/// let x = gb.var("x", "int");
/// let (then_b, else_b, merge) = (gb.create_block(), gb.create_block(), gb.create_block());
/// gb.branch("x > 0", &[x], then_b, else_b);
/// ```
pub struct GraphBuilder {
    blocks: PrimaryMap<BlockId, PendingBlock>,
    vars: PrimaryMap<VarId, Var>,
    current: BlockId,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    /// A builder positioned at a fresh entry block.
    pub fn new() -> Self {
        let mut blocks = PrimaryMap::new();
        let entry = blocks.push(PendingBlock::default());
        GraphBuilder {
            blocks,
            vars: PrimaryMap::new(),
            current: entry,
        }
    }

    pub fn entry(&self) -> BlockId {
        BlockId::new(0)
    }

    pub fn current_block(&self) -> BlockId {
        self.current
    }

    pub fn var(&mut self, name: &str, ty: &str) -> VarId {
        self.vars.push(Var {
            name: name.to_string(),
            ty: ty.to_string(),
        })
    }

    pub fn create_block(&mut self) -> BlockId {
        self.blocks.push(PendingBlock::default())
    }

    pub fn switch_to_block(&mut self, block: BlockId) {
        self.current = block;
    }

    pub fn push(&mut self, inst: Inst) {
        self.blocks[self.current].insts.push(inst);
    }

    pub fn assign(&mut self, dst: VarId, expr: &str, reads: &[VarId]) {
        self.push(
            Inst::new(Stmt::Assign {
                dst,
                expr: expr.to_string(),
            })
            .with_reads(reads),
        );
    }

    pub fn expr(&mut self, expr: &str, reads: &[VarId]) {
        self.push(
            Inst::new(Stmt::Expr {
                expr: expr.to_string(),
            })
            .with_reads(reads),
        );
    }

    pub fn loop_init(&mut self, init: &str) {
        self.push(Inst::new(Stmt::LoopInit {
            init: init.to_string(),
        }));
    }

    pub fn loop_post(&mut self, update: &str, reads: &[VarId]) {
        self.push(
            Inst::new(Stmt::LoopPost {
                update: update.to_string(),
            })
            .with_reads(reads),
        );
    }

    /// Statements pushed after this run when the current block's scope
    /// closes.
    pub fn relocate_marker(&mut self) {
        self.push(Inst::new(Stmt::RelocateMarker));
    }

    pub fn brk(&mut self) {
        self.push(Inst::new(Stmt::Break));
    }

    // ---- terminators without a statement ----

    pub fn set_jump(&mut self, target: BlockId) {
        self.terminate(EndKind::Fallthrough, vec![target]);
    }

    pub fn set_branch(&mut self, on_true: BlockId, on_false: BlockId) {
        self.terminate(
            EndKind::Branch { on_true, on_false },
            vec![on_true, on_false],
        );
    }

    pub fn set_switch(&mut self, cases: &[(CaseKey, BlockId)]) {
        let end = EndKind::Switch {
            cases: cases
                .iter()
                .map(|&(key, target)| SwitchCase { key, target })
                .collect(),
        };
        let succs = end.case_targets();
        self.terminate(end, succs);
    }

    pub fn set_return(&mut self) {
        self.terminate(EndKind::Return, Vec::new());
    }

    // ---- terminators with their statement ----

    pub fn jump(&mut self, target: BlockId) {
        self.set_jump(target);
    }

    /// `if (cond)` to `on_true`, otherwise `on_false`.
    pub fn branch(&mut self, cond: &str, reads: &[VarId], on_true: BlockId, on_false: BlockId) {
        self.push(
            Inst::new(Stmt::If {
                cond: cond.to_string(),
            })
            .with_reads(reads),
        );
        self.set_branch(on_true, on_false);
    }

    /// Loop test: stay in `body` while `cond` holds, otherwise leave to
    /// `exit`. The exit is the branch's true edge.
    pub fn loop_condition(&mut self, cond: &str, reads: &[VarId], exit: BlockId, body: BlockId) {
        self.push(
            Inst::new(Stmt::LoopCondition {
                cond: cond.to_string(),
            })
            .with_reads(reads),
        );
        self.set_branch(exit, body);
    }

    pub fn switch(&mut self, value: &str, reads: &[VarId], cases: &[(CaseKey, BlockId)]) {
        self.push(
            Inst::new(Stmt::Switch {
                value: value.to_string(),
            })
            .with_reads(reads),
        );
        self.set_switch(cases);
    }

    pub fn ret(&mut self, value: Option<&str>, reads: &[VarId]) {
        self.push(
            Inst::new(Stmt::Return {
                value: value.map(str::to_string),
            })
            .with_reads(reads),
        );
        self.set_return();
    }

    fn terminate(&mut self, end: EndKind, succs: Vec<BlockId>) {
        let block = &mut self.blocks[self.current];
        block.end = Some(end);
        block.succs = succs;
    }

    /// Compute every annotation and validate the result.
    pub fn build(self) -> Result<Graph, CoreError> {
        let n = self.blocks.len();
        let mut digraph = Digraph::with_nodes(n);
        for (id, pending) in self.blocks.iter() {
            if pending.end.is_none() {
                return Err(CoreError::structural(id, StructuralCheck::MissingTerminator));
            }
            for &succ in &pending.succs {
                if !self.blocks.contains(succ) {
                    return Err(CoreError::structural(id, StructuralCheck::UnknownBlock(succ)));
                }
                digraph.add_edge(id.index() as usize, succ.index() as usize);
            }
        }

        let rpo = reverse_postorder(&digraph, 0);
        if rpo.len() != n {
            let mut reached = vec![false; n];
            for &i in &rpo {
                reached[i] = true;
            }
            if let Some(missing) = reached.iter().position(|r| !r) {
                return Err(CoreError::structural(
                    BlockId::new(missing as u32),
                    StructuralCheck::Unreachable,
                ));
            }
        }

        let idom = immediate_dominators(&digraph, 0);
        let exits: Vec<usize> = self
            .blocks
            .iter()
            .filter(|(_, p)| matches!(p.end, Some(EndKind::Return)))
            .map(|(id, _)| id.index() as usize)
            .collect();
        let ipdom = immediate_post_dominators(&digraph, &exits);
        let to_id = |i: usize| BlockId::new(i as u32);

        let mut blocks: PrimaryMap<BlockId, Block> = PrimaryMap::new();
        for (id, pending) in self.blocks.iter() {
            let i = id.index() as usize;
            let mut block = Block::new(pending.end.clone().unwrap_or(EndKind::Return));
            block.insts = pending.insts.clone();
            block.succs = pending.succs.clone();
            block.preds = digraph.preds[i].iter().copied().map(to_id).collect();
            block.dominator = idom[i].map(to_id);
            block.post_dominator = ipdom[i].map(to_id);
            blocks.push(block);
        }

        for src in 0..n {
            for &dst in &digraph.succs[src] {
                if dominates(dst, src, &idom) {
                    blocks[to_id(dst)].is_loop_header = true;
                    blocks[to_id(src)].is_loop_end = true;
                }
            }
        }

        for dst in 0..n {
            let forward = digraph.preds[dst]
                .iter()
                .filter(|&&src| !dominates(dst, src, &idom))
                .count();
            if forward > 1 {
                blocks[to_id(dst)].begin = BeginKind::Merge;
            }
        }

        // Child chains follow reverse post-order.
        let mut last_child: Vec<Option<usize>> = vec![None; n];
        for &node in &rpo {
            let Some(parent) = idom[node] else {
                continue;
            };
            match last_child[parent] {
                None => blocks[to_id(parent)].first_dominated = Some(to_id(node)),
                Some(prev) => blocks[to_id(prev)].dominated_sibling = Some(to_id(node)),
            }
            last_child[parent] = Some(node);
        }

        let graph = Graph {
            blocks,
            vars: self.vars,
            entry: BlockId::new(0),
        };
        graph.validate()?;
        Ok(graph)
    }
}
