//! Dominator, post-dominator and ordering analyses over dense node indices.
//!
//! The graph builder maps block ids to `0..n` and runs these on plain
//! adjacency lists; post-dominators run the same algorithm on the reversed
//! graph with one extra virtual exit node.

/// Adjacency lists indexed by node number.
#[derive(Debug, Clone, Default)]
pub(crate) struct Digraph {
    pub succs: Vec<Vec<usize>>,
    pub preds: Vec<Vec<usize>>,
}

impl Digraph {
    pub fn with_nodes(n: usize) -> Self {
        Digraph {
            succs: vec![Vec::new(); n],
            preds: vec![Vec::new(); n],
        }
    }

    pub fn len(&self) -> usize {
        self.succs.len()
    }

    pub fn add_edge(&mut self, from: usize, to: usize) {
        self.succs[from].push(to);
        self.preds[to].push(from);
    }

    /// The same graph with every edge flipped.
    pub fn reversed(&self) -> Digraph {
        Digraph {
            succs: self.preds.clone(),
            preds: self.succs.clone(),
        }
    }
}

const ROOT: usize = usize::MAX;

/// Path compression for the Lengauer-Tarjan link/eval forest.
fn compress(v: usize, ancestor: &mut [usize], label: &mut [usize], semi: &[usize]) {
    let mut path = Vec::new();
    let mut u = v;
    while ancestor[u] != ROOT && ancestor[ancestor[u]] != ROOT {
        path.push(u);
        u = ancestor[u];
    }
    for &node in path.iter().rev() {
        let a = ancestor[node];
        if semi[label[a]] < semi[label[node]] {
            label[node] = label[a];
        }
        ancestor[node] = ancestor[a];
    }
}

fn eval(v: usize, ancestor: &mut [usize], label: &mut [usize], semi: &[usize]) -> usize {
    if ancestor[v] == ROOT {
        return v;
    }
    compress(v, ancestor, label, semi);
    label[v]
}

/// Immediate dominators by Lengauer-Tarjan.
///
/// `result[root]` and the entries of nodes unreachable from `root` are
/// `None`. The DFS is iterative so deep graphs cannot overflow the stack.
pub(crate) fn immediate_dominators(graph: &Digraph, root: usize) -> Vec<Option<usize>> {
    let n = graph.len();
    let mut result = vec![None; n];
    if root >= n {
        return result;
    }

    // DFS preorder numbering. `order[i]` is the node with number `i`.
    let mut number = vec![ROOT; n];
    let mut order: Vec<usize> = Vec::with_capacity(n);
    let mut parent: Vec<usize> = Vec::with_capacity(n);
    let mut stack = vec![(root, ROOT)];
    while let Some((node, from)) = stack.pop() {
        if number[node] != ROOT {
            continue;
        }
        number[node] = order.len();
        parent.push(from);
        let here = order.len();
        order.push(node);
        for &succ in graph.succs[node].iter().rev() {
            if number[succ] == ROOT {
                stack.push((succ, here));
            }
        }
    }

    let count = order.len();
    let mut semi: Vec<usize> = (0..count).collect();
    let mut idom: Vec<usize> = vec![0; count];
    let mut ancestor = vec![ROOT; count];
    let mut label: Vec<usize> = (0..count).collect();
    let mut bucket: Vec<Vec<usize>> = vec![Vec::new(); count];

    for w in (1..count).rev() {
        for &pred in &graph.preds[order[w]] {
            let v = number[pred];
            if v == ROOT {
                continue;
            }
            let u = eval(v, &mut ancestor, &mut label, &semi);
            semi[w] = semi[w].min(semi[u]);
        }
        bucket[semi[w]].push(w);
        let p = parent[w];
        ancestor[w] = p;
        for v in std::mem::take(&mut bucket[p]) {
            let u = eval(v, &mut ancestor, &mut label, &semi);
            idom[v] = if semi[u] < semi[v] { u } else { p };
        }
    }

    for w in 1..count {
        if idom[w] != semi[w] {
            idom[w] = idom[idom[w]];
        }
        result[order[w]] = Some(order[idom[w]]);
    }
    result
}

/// Immediate post-dominators.
///
/// All `exits` flow into a virtual exit node; dominators are computed on the
/// reversed graph rooted there. Nodes whose immediate post-dominator is the
/// virtual exit, and nodes that cannot reach any exit, map to `None`.
pub(crate) fn immediate_post_dominators(graph: &Digraph, exits: &[usize]) -> Vec<Option<usize>> {
    let n = graph.len();
    let mut reversed = graph.reversed();
    reversed.succs.push(Vec::new());
    reversed.preds.push(Vec::new());
    let virtual_exit = n;
    for &exit in exits {
        reversed.add_edge(virtual_exit, exit);
    }
    let mut ipdom = immediate_dominators(&reversed, virtual_exit);
    ipdom.truncate(n);
    for entry in &mut ipdom {
        if *entry == Some(virtual_exit) {
            *entry = None;
        }
    }
    ipdom
}

/// Reverse post-order of the nodes reachable from `root`.
///
/// Successors are explored last-to-first, so when two successors lead to a
/// common node the earlier successor precedes the later one and both precede
/// the common node.
pub(crate) fn reverse_postorder(graph: &Digraph, root: usize) -> Vec<usize> {
    let n = graph.len();
    let mut seen = vec![false; n];
    let mut post = Vec::with_capacity(n);
    if root >= n {
        return post;
    }
    // (node, number of successors already explored)
    let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
    seen[root] = true;
    while let Some(top) = stack.last_mut() {
        let (node, explored) = *top;
        let succs = &graph.succs[node];
        if explored < succs.len() {
            top.1 += 1;
            let next = succs[succs.len() - 1 - explored];
            if !seen[next] {
                seen[next] = true;
                stack.push((next, 0));
            }
        } else {
            post.push(node);
            stack.pop();
        }
    }
    post.reverse();
    post
}

/// Whether `a` dominates `b` under the immediate-dominator table `idom`.
pub(crate) fn dominates(a: usize, b: usize, idom: &[Option<usize>]) -> bool {
    let mut cur = b;
    loop {
        if cur == a {
            return true;
        }
        match idom[cur] {
            Some(up) => cur = up,
            None => return false,
        }
    }
}
