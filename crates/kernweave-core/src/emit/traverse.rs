//! Structured traversal of the dominator tree.
//!
//! Each block is visited once, in dominator-tree order. On entry a block
//! opens whatever scope its position implies (else arm, case label, loop
//! header), then emits its statements; its dominated children follow; on
//! exit it closes exactly what it opened. Loop headers visit their in-loop
//! children first, close the loop, then continue with the code after it.
//! Statements behind a relocation marker are held back and emitted once the
//! block's own scope has closed.

use std::collections::{HashMap, HashSet};

use log::{debug, trace};

use crate::error::{CoreError, StructuralCheck, UnsupportedPattern};
use crate::ir::{Block, BlockId, EndKind, Graph, Inst, LoopForest, Stmt, VarId};
use crate::pipeline::EmitConfig;

use super::canonicalize::canonicalize_loop_header;
use super::classify::{classify, InstKind, LoopMarkers};
use super::scope::{ScopeEvent, ScopeWriter};

/// Mutable bookkeeping of one traversal.
#[derive(Debug, Default)]
pub struct TraversalState {
    pub visited: HashSet<BlockId>,
    pub merges_opened: HashSet<BlockId>,
    /// Case bodies that printed a label and still owe a `break`.
    pub switch_bodies_opened: HashSet<BlockId>,
    /// Switch blocks whose closing brace has been emitted.
    pub switch_closed: HashSet<BlockId>,
    /// If/else arms that opened a brace on entry.
    pub arms_opened: HashSet<BlockId>,
    /// Merge block -> loop exit that must be emitted before it.
    pub pending: HashMap<BlockId, BlockId>,
    pub rescheduled: HashSet<BlockId>,
    pub loop_depth_entered: usize,
    pub loop_depth_exited: usize,
    /// Header of the loop whose scaffolding is suppressed.
    pub unwrapped_loop: Option<BlockId>,
    /// Statements held back until their block's scope closes.
    pub relocated: HashMap<BlockId, Vec<Inst>>,
}

/// What a finished traversal did, for callers and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraversalSummary {
    pub blocks_visited: usize,
    pub loops_entered: usize,
    pub loops_exited: usize,
    pub rescheduled: Vec<BlockId>,
}

/// Source text of one method body plus its scope token stream.
#[derive(Debug, Clone)]
pub struct EmitOutput {
    pub text: String,
    pub events: Vec<ScopeEvent>,
    pub summary: TraversalSummary,
}

pub(crate) struct Traversal<'a> {
    graph: &'a Graph,
    loops: &'a LoopForest,
    config: &'a EmitConfig,
    out: ScopeWriter,
    state: TraversalState,
    last_block: BlockId,
}

impl<'a> Traversal<'a> {
    pub fn new(graph: &'a Graph, loops: &'a LoopForest, config: &'a EmitConfig) -> Self {
        Traversal {
            graph,
            loops,
            config,
            out: ScopeWriter::new(config.indent_width),
            state: TraversalState::default(),
            last_block: graph.entry,
        }
    }

    pub fn run(mut self) -> Result<EmitOutput, CoreError> {
        let graph = self.graph;
        self.walk(graph.entry)?;

        if let Some(missed) = graph.blocks.keys().find(|b| !self.state.visited.contains(b)) {
            return Err(CoreError::structural(
                missed,
                StructuralCheck::NotInDominatorTree,
            ));
        }

        let mut rescheduled: Vec<BlockId> = self.state.rescheduled.iter().copied().collect();
        rescheduled.sort();
        let summary = TraversalSummary {
            blocks_visited: self.state.visited.len(),
            loops_entered: self.state.loop_depth_entered,
            loops_exited: self.state.loop_depth_exited,
            rescheduled,
        };
        let block = self.last_block;
        let (text, events) = self
            .out
            .finish()
            .map_err(|error| CoreError::Scope { block, error })?;
        Ok(EmitOutput {
            text,
            events,
            summary,
        })
    }

    fn close(&mut self, block: BlockId) -> Result<(), CoreError> {
        self.out
            .close_brace()
            .map_err(|error| CoreError::Scope { block, error })
    }

    fn walk(&mut self, id: BlockId) -> Result<(), CoreError> {
        if let Some(deferred) = self.state.pending.remove(&id) {
            if !self.state.visited.contains(&deferred) {
                debug!("emitting loop exit {deferred} ahead of merge {id}");
                self.walk(deferred)?;
                self.state.rescheduled.insert(deferred);
            }
        }

        self.enter(id)?;
        self.state.visited.insert(id);

        let graph = self.graph;
        if graph.block(id).is_loop_header {
            self.walk_loop_children(id)?;
        } else {
            for child in graph.dominated_children(id) {
                if !self.state.visited.contains(&child) {
                    self.walk(child)?;
                }
            }
        }

        self.exit(id)
    }

    fn walk_loop_children(&mut self, header: BlockId) -> Result<(), CoreError> {
        let graph = self.graph;
        let loops = self.loops;
        let lp = loops.get(header).ok_or_else(|| {
            CoreError::structural(header, StructuralCheck::LoopHeaderWithoutBackEdge)
        })?;
        let exit_on_true = graph.block(header).true_successor();

        let mut inside = Vec::new();
        let mut after = Vec::new();
        let mut deferred = Vec::new();
        for child in graph.dominated_children(header) {
            if lp.contains(child) {
                inside.push(child);
                continue;
            }
            let merge = graph
                .block(child)
                .post_dominator
                .filter(|&m| graph.block(m).is_merge() && !self.state.visited.contains(&m));
            match merge {
                Some(m) if Some(child) == exit_on_true => {
                    // The exit is emitted right behind the loop, where a
                    // `break` lands too.
                    if self.subtree_has_statements(child) {
                        return Err(CoreError::unsupported(
                            child,
                            UnsupportedPattern::ExitSharedWithBreak,
                        ));
                    }
                    self.state.pending.insert(m, child);
                    deferred.push(child);
                }
                _ => after.push(child),
            }
        }

        for child in inside {
            if !self.state.visited.contains(&child) {
                self.walk(child)?;
            }
        }
        self.close_loop(header, lp.latch)?;
        self.emit_relocated(header)?;
        for child in after.into_iter().chain(deferred) {
            if !self.state.visited.contains(&child) {
                self.walk(child)?;
            }
        }
        Ok(())
    }

    fn subtree_has_statements(&self, root: BlockId) -> bool {
        let graph = self.graph;
        let mut seen = HashSet::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            if !graph.block(id).insts.is_empty() {
                return true;
            }
            stack.extend(graph.dominated_children(id));
        }
        false
    }

    fn close_loop(&mut self, header: BlockId, latch: BlockId) -> Result<(), CoreError> {
        trace!("loop end {latch} closes loop {header}");
        self.state.loop_depth_exited += 1;
        if self.state.unwrapped_loop == Some(header) {
            return Ok(());
        }
        self.close(latch)
    }

    fn enter(&mut self, id: BlockId) -> Result<(), CoreError> {
        let graph = self.graph;
        let block = graph.block(id);
        trace!("enter block {id}");
        self.last_block = id;

        if block.is_merge() {
            self.state.merges_opened.insert(id);
        }
        if block.is_loop_header {
            self.state.loop_depth_entered += 1;
            if self.config.unwrap_outermost_loop && self.state.unwrapped_loop.is_none() {
                debug!("unwrapping outermost loop at block {id}");
                self.state.unwrapped_loop = Some(id);
            }
        }
        if !block.is_merge() {
            self.open_arm(id, block)?;
        }
        if self.config.trace_blocks {
            self.out.emit_comment(&trace_comment(id, block));
        }
        self.emit_statements(id, block)
    }

    /// Open the if/else arm or case body this block starts, if any.
    fn open_arm(&mut self, id: BlockId, block: &Block) -> Result<(), CoreError> {
        let Some(dom) = block.dominator else {
            return Ok(());
        };
        let graph = self.graph;
        let parent = graph.block(dom);
        if parent.is_loop_header {
            return Ok(());
        }
        match &parent.end {
            EndKind::Branch { on_true, on_false } => {
                if id == *on_true {
                    self.out.open_brace();
                } else if id == *on_false {
                    let then_pending = !graph.block(*on_true).is_merge()
                        && !self.state.visited.contains(on_true);
                    if then_pending {
                        return Err(CoreError::unsupported(id, UnsupportedPattern::ElseBeforeThen));
                    }
                    if block.insts.is_empty() && block.first_dominated.is_none() {
                        trace!("dropping empty else arm {id}");
                        return Ok(());
                    }
                    self.out.emit_else();
                    self.out.open_brace();
                } else {
                    return Err(CoreError::unsupported(id, UnsupportedPattern::UnclassifiedArm));
                }
                self.state.arms_opened.insert(id);
            }
            EndKind::Switch { .. } => {
                if self.state.switch_closed.contains(&dom) {
                    return Err(CoreError::unsupported(
                        id,
                        UnsupportedPattern::CaseAfterSwitchClosed,
                    ));
                }
                if graph.case_index_of(id, dom).is_none() {
                    return Err(CoreError::unsupported(id, UnsupportedPattern::UnclassifiedArm));
                }
                self.out.emit_case_label(&graph.case_keys(dom, id));
                self.state.switch_bodies_opened.insert(id);
            }
            EndKind::Return | EndKind::Fallthrough => {}
        }
        Ok(())
    }

    fn emit_statements(&mut self, id: BlockId, block: &Block) -> Result<(), CoreError> {
        let graph = self.graph;
        let mut insts = block.insts.clone();
        if let Some(at) = insts.iter().position(|i| classify(i) == InstKind::RelocateMarker) {
            let mut tail = insts.split_off(at);
            tail.remove(0);
            self.hold_back(id, block, tail)?;
        }

        let is_header = block.is_loop_header;
        let markers = if is_header {
            canonicalize_loop_header(&mut insts, &self.loop_writes(id));
            LoopMarkers::scan(&insts)
        } else {
            LoopMarkers::default()
        };
        let unwrap = self.state.unwrapped_loop == Some(id);

        // The `for` line replaces the update (or the init when there is no
        // update); without either it opens the block.
        let header_at = markers.post.or(markers.init);
        if is_header && header_at.is_none() {
            self.open_loop(unwrap, "", "", "");
        }

        let mut pending_break = false;
        for (idx, inst) in insts.iter().enumerate() {
            match classify(inst) {
                InstKind::LoopInit | InstKind::LoopPost => {
                    if is_header && Some(idx) == header_at {
                        let clause = |at: Option<usize>| match at.map(|i| &insts[i].stmt) {
                            Some(Stmt::LoopInit { init }) => init.as_str(),
                            Some(Stmt::LoopPost { update }) => update.as_str(),
                            Some(Stmt::LoopCondition { cond }) => cond.as_str(),
                            _ => "",
                        };
                        let cond = markers.cond.filter(|&c| insts[c].header_clause);
                        self.open_loop(
                            unwrap,
                            clause(markers.init),
                            clause(cond),
                            clause(markers.post),
                        );
                    }
                }
                InstKind::LoopCondition => {
                    if (inst.header_clause && header_at.is_some()) || unwrap {
                        continue;
                    }
                    if let Stmt::LoopCondition { cond } = &inst.stmt {
                        self.out.emit_header(&format!("if (!({cond}))"));
                        self.out.open_brace();
                        self.out.emit_statement("break;");
                        self.close(id)?;
                    }
                }
                InstKind::ExplicitBreak => pending_break = true,
                InstKind::RelocateMarker => {}
                InstKind::Plain => match &inst.stmt {
                    Stmt::If { cond } => {
                        if is_header {
                            return Err(CoreError::unsupported(id, UnsupportedPattern::LoopHeaderIf));
                        }
                        self.out.emit_header(&format!("if ({cond})"));
                    }
                    Stmt::Switch { value } => {
                        self.out.emit_header(&format!("switch ({value})"));
                        self.out.open_brace();
                    }
                    _ => self.emit_inst(id, inst)?,
                },
            }
        }
        if pending_break {
            self.out.emit_statement("break;");
        }

        // A then arm that starts at a merge has no body of its own; print an
        // empty one so a following else stays attached to the `if`.
        if let EndKind::Branch { on_true, .. } = block.end {
            if !is_header && graph.block(on_true).is_merge() {
                self.out.open_brace();
                self.close(id)?;
            }
        }
        Ok(())
    }

    fn emit_inst(&mut self, id: BlockId, inst: &Inst) -> Result<(), CoreError> {
        let rendered = inst
            .render(&self.graph.vars)
            .map_err(|check| CoreError::structural(id, check))?;
        if let Some(line) = rendered {
            self.out.emit_statement(&line);
        }
        Ok(())
    }

    /// Every variable assigned in the loop headed by `header`, outside the
    /// header itself.
    fn loop_writes(&self, header: BlockId) -> HashSet<VarId> {
        let graph = self.graph;
        let Some(lp) = self.loops.get(header) else {
            return HashSet::new();
        };
        lp.body
            .iter()
            .filter(|&&b| b != header)
            .flat_map(|&b| graph.block(b).insts.iter().filter_map(Inst::writes))
            .collect()
    }

    /// Park the statements after a relocation marker until `id` closes.
    fn hold_back(&mut self, id: BlockId, block: &Block, tail: Vec<Inst>) -> Result<(), CoreError> {
        let plain = |inst: &Inst| {
            matches!(
                inst.stmt,
                Stmt::Assign { .. } | Stmt::Expr { .. } | Stmt::Return { .. }
            )
        };
        if !tail.iter().all(plain) {
            return Err(CoreError::unsupported(id, UnsupportedPattern::RelocatedControlFlow));
        }

        // Behind a case body's `break` the statements would be dead; behind a
        // then arm they would split the `if` from its `else`. A loop header
        // emits them inside its arm, right after the loop.
        let graph = self.graph;
        let splits_arms = !block.is_merge()
            && !block.is_loop_header
            && block.dominator.is_some_and(|dom| {
                let parent = graph.block(dom);
                match parent.end {
                    _ if parent.is_loop_header => false,
                    EndKind::Branch { on_true, on_false } => {
                        on_true == id && !graph.block(on_false).is_merge()
                    }
                    EndKind::Switch { .. } => true,
                    EndKind::Return | EndKind::Fallthrough => false,
                }
            });
        if splits_arms {
            return Err(CoreError::unsupported(id, UnsupportedPattern::MisplacedRelocation));
        }

        if !tail.is_empty() {
            debug!("holding back {} statement(s) of block {id}", tail.len());
            self.state.relocated.insert(id, tail);
        }
        Ok(())
    }

    fn emit_relocated(&mut self, id: BlockId) -> Result<(), CoreError> {
        let Some(tail) = self.state.relocated.remove(&id) else {
            return Ok(());
        };
        for inst in &tail {
            self.emit_inst(id, inst)?;
        }
        Ok(())
    }

    fn open_loop(&mut self, unwrap: bool, init: &str, cond: &str, post: &str) {
        if unwrap {
            return;
        }
        self.out.emit_header(&for_header(init, cond, post));
        self.out.open_brace();
    }

    fn exit(&mut self, id: BlockId) -> Result<(), CoreError> {
        if self.state.rescheduled.contains(&id) {
            return Ok(());
        }
        let graph = self.graph;
        if self.state.switch_bodies_opened.contains(&id) {
            self.out.emit_break_statement();
            if let Some(switch) = graph.block(id).dominator {
                let last = graph.case_count(switch).checked_sub(1);
                if graph.case_index_of(id, switch) == last && self.state.switch_closed.insert(switch)
                {
                    self.close(id)?;
                }
            }
        } else if self.state.arms_opened.contains(&id) {
            self.close(id)?;
        }
        self.emit_relocated(id)?;
        trace!("exit block {id}");
        Ok(())
    }
}

/// `for (init; cond; post)`, with empty clauses collapsed (`for (;;)`).
fn for_header(init: &str, cond: &str, post: &str) -> String {
    let mut s = String::from("for (");
    s.push_str(init);
    s.push(';');
    if !cond.is_empty() {
        s.push(' ');
        s.push_str(cond);
    }
    s.push(';');
    if !post.is_empty() {
        s.push(' ');
        s.push_str(post);
    }
    s.push(')');
    s
}

fn trace_comment(id: BlockId, block: &Block) -> String {
    if !block.is_merge() {
        return format!("BLOCK {id}");
    }
    let preds: Vec<String> = block.preds.iter().map(|p| p.to_string()).collect();
    format!("BLOCK {id} MERGES [{}]", preds.join(" "))
}
