//! Directed graph over dense vertex ids, with the cycle tooling sweep
//! orderings need: Kahn ordering, Tarjan strongly connected components and
//! feedback-arc removal.
//!
//! Everything here is deterministic: ties are always resolved towards the
//! smallest vertex id, so every rank that builds the same graph gets the same
//! order and removes the same edges.

use crate::sweep_error::SweepError;
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};

/// Adjacency-set digraph. Self loops are never stored.
#[derive(Clone, Debug, Default)]
pub struct DirectedGraph {
    succ: Vec<BTreeSet<usize>>,
    pred: Vec<BTreeSet<usize>>,
}

impl DirectedGraph {
    pub fn new(num_vertices: usize) -> Self {
        Self {
            succ: vec![BTreeSet::new(); num_vertices],
            pred: vec![BTreeSet::new(); num_vertices],
        }
    }

    pub fn num_vertices(&self) -> usize {
        self.succ.len()
    }

    pub fn num_edges(&self) -> usize {
        self.succ.iter().map(BTreeSet::len).sum()
    }

    /// Insert `from → to`; returns false for self loops and duplicates.
    pub fn add_edge(&mut self, from: usize, to: usize) -> bool {
        if from == to {
            return false;
        }
        let inserted = self.succ[from].insert(to);
        self.pred[to].insert(from);
        inserted
    }

    pub fn remove_edge(&mut self, from: usize, to: usize) -> bool {
        let removed = self.succ[from].remove(&to);
        self.pred[to].remove(&from);
        removed
    }

    pub fn has_edge(&self, from: usize, to: usize) -> bool {
        self.succ[from].contains(&to)
    }

    pub fn successors(&self, v: usize) -> impl Iterator<Item = usize> + '_ {
        self.succ[v].iter().copied()
    }

    pub fn predecessors(&self, v: usize) -> impl Iterator<Item = usize> + '_ {
        self.pred[v].iter().copied()
    }

    /// Kahn ordering, or `None` if the graph has a cycle.
    pub fn topological_order(&self) -> Option<Vec<usize>> {
        let n = self.num_vertices();
        let mut indeg: Vec<usize> = self.pred.iter().map(BTreeSet::len).collect();
        let mut ready: BinaryHeap<Reverse<usize>> =
            (0..n).filter(|&v| indeg[v] == 0).map(Reverse).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(Reverse(v)) = ready.pop() {
            order.push(v);
            for &w in &self.succ[v] {
                indeg[w] -= 1;
                if indeg[w] == 0 {
                    ready.push(Reverse(w));
                }
            }
        }
        (order.len() == n).then_some(order)
    }

    /// Longest-path level of every vertex (sources are level 0).
    /// Returns `None` if the graph has a cycle.
    pub fn levels(&self) -> Option<Vec<usize>> {
        let order = self.topological_order()?;
        let mut level = vec![0usize; self.num_vertices()];
        for v in order {
            for &w in &self.succ[v] {
                level[w] = level[w].max(level[v] + 1);
            }
        }
        Some(level)
    }

    /// Strongly connected components with at least two vertices.
    pub fn cyclic_components(&self) -> Vec<Vec<usize>> {
        let active = vec![true; self.num_vertices()];
        self.tarjan(&active)
            .into_iter()
            .filter(|c| c.len() > 1)
            .collect()
    }

    /// Remove edges until the graph is acyclic; returns the removed edges.
    pub fn remove_cycles(&mut self) -> Vec<(usize, usize)> {
        let mut removed = Vec::new();
        loop {
            let comps = self.cyclic_components();
            if comps.is_empty() {
                return removed;
            }
            for comp in comps {
                for (u, v) in self.edges_to_break(&comp) {
                    if self.remove_edge(u, v) {
                        removed.push((u, v));
                    }
                }
            }
        }
    }

    /// Kahn ordering that breaks cycles whenever extraction stalls.
    ///
    /// On a stall the unplaced subgraph is split into strongly connected
    /// components and edges are removed from each (see
    /// [`DirectedGraph::edges_to_break`]); extraction then resumes. The removed
    /// edges are returned alongside the order and are no longer in the graph.
    pub fn order_breaking_cycles(
        &mut self,
    ) -> Result<(Vec<usize>, Vec<(usize, usize)>), SweepError> {
        let n = self.num_vertices();
        let mut indeg: Vec<usize> = self.pred.iter().map(BTreeSet::len).collect();
        let mut ready: BinaryHeap<Reverse<usize>> =
            (0..n).filter(|&v| indeg[v] == 0).map(Reverse).collect();
        let mut placed = vec![false; n];
        let mut order = Vec::with_capacity(n);
        let mut removed = Vec::new();

        loop {
            while let Some(Reverse(v)) = ready.pop() {
                placed[v] = true;
                order.push(v);
                for &w in &self.succ[v] {
                    indeg[w] -= 1;
                    if indeg[w] == 0 {
                        ready.push(Reverse(w));
                    }
                }
            }
            if order.len() == n {
                return Ok((order, removed));
            }

            let active: Vec<bool> = placed.iter().map(|p| !p).collect();
            let mut broke = 0usize;
            for comp in self.tarjan(&active).into_iter().filter(|c| c.len() > 1) {
                for (u, v) in self.edges_to_break(&comp) {
                    if self.remove_edge(u, v) {
                        log::trace!("breaking cyclic dependency {u} -> {v}");
                        removed.push((u, v));
                        broke += 1;
                        indeg[v] -= 1;
                        if indeg[v] == 0 {
                            ready.push(Reverse(v));
                        }
                    }
                }
            }
            if broke == 0 {
                return Err(SweepError::UnbreakableCycle {
                    remaining: n - order.len(),
                });
            }
        }
    }

    /// Edges to drop from one strongly connected component.
    ///
    /// Two vertices: the edge from the lower to the higher id. Three
    /// vertices: the first internal edge. Larger: every edge running backward
    /// in an approximate minimum feedback-arc sequence.
    pub fn edges_to_break(&self, comp: &[usize]) -> Vec<(usize, usize)> {
        match comp.len() {
            0 | 1 => Vec::new(),
            2 => {
                let (a, b) = (comp[0], comp[1]);
                if self.has_edge(a, b) {
                    vec![(a, b)]
                } else if self.has_edge(b, a) {
                    vec![(b, a)]
                } else {
                    Vec::new()
                }
            }
            3 => {
                let inside: BTreeSet<usize> = comp.iter().copied().collect();
                for &u in comp {
                    if let Some(&w) = self.succ[u].iter().find(|&w| inside.contains(w)) {
                        return vec![(u, w)];
                    }
                }
                Vec::new()
            }
            _ => {
                let seq = self.feedback_arc_sequence(comp);
                let pos: HashMap<usize, usize> =
                    seq.iter().enumerate().map(|(i, &v)| (v, i)).collect();
                let mut back = Vec::new();
                for &u in comp {
                    for &w in &self.succ[u] {
                        if let Some(&pw) = pos.get(&w) {
                            if pw < pos[&u] {
                                back.push((u, w));
                            }
                        }
                    }
                }
                back
            }
        }
    }

    /// Eades–Lin–Smyth vertex sequence for the subgraph induced by `comp`.
    /// Edges pointing backward in the sequence form a small feedback arc set.
    pub fn feedback_arc_sequence(&self, comp: &[usize]) -> Vec<usize> {
        let mut remaining: BTreeSet<usize> = comp.iter().copied().collect();
        let mut outdeg: HashMap<usize, isize> = HashMap::new();
        let mut indeg: HashMap<usize, isize> = HashMap::new();
        for &v in comp {
            outdeg.insert(
                v,
                self.succ[v].iter().filter(|&w| remaining.contains(w)).count() as isize,
            );
            indeg.insert(
                v,
                self.pred[v].iter().filter(|&w| remaining.contains(w)).count() as isize,
            );
        }

        let mut s1 = Vec::with_capacity(comp.len());
        let mut s2 = Vec::new();
        let take = |v: usize,
                    remaining: &mut BTreeSet<usize>,
                    outdeg: &mut HashMap<usize, isize>,
                    indeg: &mut HashMap<usize, isize>| {
            remaining.remove(&v);
            for &w in &self.succ[v] {
                if remaining.contains(&w) {
                    *indeg.entry(w).or_default() -= 1;
                }
            }
            for &p in &self.pred[v] {
                if remaining.contains(&p) {
                    *outdeg.entry(p).or_default() -= 1;
                }
            }
        };

        while !remaining.is_empty() {
            loop {
                let sinks: Vec<usize> = remaining
                    .iter()
                    .copied()
                    .filter(|v| outdeg[v] == 0)
                    .collect();
                if sinks.is_empty() {
                    break;
                }
                for v in sinks {
                    take(v, &mut remaining, &mut outdeg, &mut indeg);
                    s2.push(v);
                }
            }
            loop {
                let sources: Vec<usize> = remaining
                    .iter()
                    .copied()
                    .filter(|v| indeg[v] == 0)
                    .collect();
                if sources.is_empty() {
                    break;
                }
                for v in sources {
                    take(v, &mut remaining, &mut outdeg, &mut indeg);
                    s1.push(v);
                }
            }
            let best = remaining
                .iter()
                .copied()
                .max_by_key(|v| (outdeg[v] - indeg[v], Reverse(*v)));
            if let Some(u) = best {
                take(u, &mut remaining, &mut outdeg, &mut indeg);
                s1.push(u);
            }
        }

        s2.reverse();
        s1.extend(s2);
        s1
    }

    /// Iterative Tarjan over the vertices flagged in `active`.
    fn tarjan(&self, active: &[bool]) -> Vec<Vec<usize>> {
        const UNVISITED: usize = usize::MAX;
        let n = self.num_vertices();
        let mut index = vec![UNVISITED; n];
        let mut low = vec![0usize; n];
        let mut on_stack = vec![false; n];
        let mut stack = Vec::new();
        let mut comps = Vec::new();
        let mut next = 0usize;

        let active_succ = |v: usize| -> Vec<usize> {
            self.succ[v].iter().copied().filter(|&w| active[w]).collect()
        };

        for root in 0..n {
            if !active[root] || index[root] != UNVISITED {
                continue;
            }
            index[root] = next;
            low[root] = next;
            next += 1;
            stack.push(root);
            on_stack[root] = true;
            let mut call: Vec<(usize, Vec<usize>, usize)> = vec![(root, active_succ(root), 0)];

            while let Some(frame) = call.last_mut() {
                let v = frame.0;
                if frame.2 < frame.1.len() {
                    let w = frame.1[frame.2];
                    frame.2 += 1;
                    if index[w] == UNVISITED {
                        index[w] = next;
                        low[w] = next;
                        next += 1;
                        stack.push(w);
                        on_stack[w] = true;
                        call.push((w, active_succ(w), 0));
                    } else if on_stack[w] {
                        low[v] = low[v].min(index[w]);
                    }
                } else {
                    call.pop();
                    if let Some(parent) = call.last() {
                        let p = parent.0;
                        low[p] = low[p].min(low[v]);
                    }
                    if low[v] == index[v] {
                        let mut comp = Vec::new();
                        while let Some(w) = stack.pop() {
                            on_stack[w] = false;
                            comp.push(w);
                            if w == v {
                                break;
                            }
                        }
                        comp.sort_unstable();
                        comps.push(comp);
                    }
                }
            }
        }
        comps
    }
}
