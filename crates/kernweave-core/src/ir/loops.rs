//! Natural loop membership.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::{CoreError, StructuralCheck, UnsupportedPattern};

use super::block::{BlockId, EndKind};
use super::graph::Graph;

/// A natural loop: header, its single latch, and every block in between.
#[derive(Debug, Clone)]
pub struct NaturalLoop {
    pub header: BlockId,
    /// Source of the loop's back edge.
    pub latch: BlockId,
    pub body: HashSet<BlockId>,
}

impl NaturalLoop {
    pub fn contains(&self, block: BlockId) -> bool {
        self.body.contains(&block)
    }
}

/// All loops of a graph, keyed by header.
#[derive(Debug, Clone, Default)]
pub struct LoopForest {
    loops: HashMap<BlockId, NaturalLoop>,
}

impl LoopForest {
    /// Find back edges, check them against the loop flags, and collect each
    /// loop's body by walking predecessors backward from the latch.
    ///
    /// Rejects irreducible flow: a retreating edge (in reverse post-order)
    /// whose target does not dominate its source.
    pub fn compute(graph: &Graph) -> Result<Self, CoreError> {
        let rpo = graph.reverse_postorder();
        let position: HashMap<BlockId, usize> =
            rpo.iter().enumerate().map(|(i, &b)| (b, i)).collect();

        let mut preds: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
        let mut latches: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
        for &src in &rpo {
            let block = graph.block(src);
            for &dst in &block.succs {
                preds.entry(dst).or_default().push(src);
                if graph.dominates(dst, src) {
                    if !graph.block(dst).is_loop_header {
                        return Err(CoreError::structural(
                            dst,
                            StructuralCheck::BackEdgeIntoNonHeader(src),
                        ));
                    }
                    if !block.is_loop_end {
                        return Err(CoreError::structural(src, StructuralCheck::UnflaggedLoopEnd));
                    }
                    if !matches!(block.end, EndKind::Fallthrough) {
                        return Err(CoreError::unsupported(
                            src,
                            UnsupportedPattern::ConditionalBackEdge,
                        ));
                    }
                    latches.entry(dst).or_default().push(src);
                } else if position.get(&dst) <= position.get(&src) {
                    return Err(CoreError::unsupported(dst, UnsupportedPattern::Irreducible(src)));
                }
            }
        }

        let mut loops = HashMap::new();
        for (id, block) in graph.blocks.iter() {
            if block.is_loop_end && !latches.values().any(|l| l.contains(&id)) {
                return Err(CoreError::structural(
                    id,
                    StructuralCheck::LoopEndWithoutBackEdge,
                ));
            }
            if !block.is_loop_header {
                continue;
            }
            let latch = match latches.get(&id).map(Vec::as_slice) {
                None | Some([]) => {
                    return Err(CoreError::structural(
                        id,
                        StructuralCheck::LoopHeaderWithoutBackEdge,
                    ))
                }
                Some([latch]) => *latch,
                Some(many) => {
                    return Err(CoreError::unsupported(
                        id,
                        UnsupportedPattern::MultipleBackEdges(many.len()),
                    ))
                }
            };
            let body = natural_loop_body(&preds, id, latch);
            loops.insert(id, NaturalLoop { header: id, latch, body });
        }
        Ok(LoopForest { loops })
    }

    pub fn get(&self, header: BlockId) -> Option<&NaturalLoop> {
        self.loops.get(&header)
    }

    pub fn len(&self) -> usize {
        self.loops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }
}

fn natural_loop_body(
    preds: &HashMap<BlockId, Vec<BlockId>>,
    header: BlockId,
    latch: BlockId,
) -> HashSet<BlockId> {
    let mut body = HashSet::from([header]);
    let mut queue = VecDeque::new();
    if body.insert(latch) {
        queue.push_back(latch);
    }
    while let Some(cur) = queue.pop_front() {
        for &pred in preds.get(&cur).into_iter().flatten() {
            if body.insert(pred) {
                queue.push_back(pred);
            }
        }
    }
    body
}
