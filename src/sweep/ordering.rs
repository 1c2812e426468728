//! Per-direction sweep ordering of the local cells (the local half of an SPDS).
//!
//! For a direction ω every local face is classified, a local dependency
//! graph is built (an edge `N → C` means `C` needs the outgoing flux of `N`),
//! and the cells are ordered so every dependency precedes its dependent.
//! Cycles, which appear on non-convex or badly shaped cells, are broken by
//! dropping edges; the dropped edges are reported as [`CyclicEdge`]s and the
//! flux across them is lagged to the previous sweep.
//!
//! Dependencies on other ranks are only summarised here (which ranks feed
//! this one, which ranks this one feeds); the rank-level graph lives in
//! [`crate::sweep::location_graph`].

use std::collections::{BTreeSet, HashSet};

use super::orientation::{FaceOrientation, classify_cell};
use crate::algs::digraph::DirectedGraph;
use crate::sweep_error::SweepError;
use crate::topology::{FaceNeighbor, SweepGrid, Vector3};

/// A local dependency dropped to break a cycle.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CyclicEdge {
    pub from_cell: usize,
    pub to_cell: usize,
}

#[derive(Clone, Debug)]
pub struct SweepOrdering {
    omega: Vector3,
    visitation_order: Vec<usize>,
    order_index: Vec<usize>,
    cyclic_edges: Vec<CyclicEdge>,
    cyclic_pairs: HashSet<(usize, usize)>,
    face_orientations: Vec<Vec<FaceOrientation>>,
    location_dependencies: Vec<usize>,
    location_successors: Vec<usize>,
}

impl SweepOrdering {
    /// Order the local cells of `grid` for direction `omega`.
    ///
    /// Always succeeds on a well-formed grid: cycles are broken, never
    /// reported. `UnbreakableCycle` means the dependency graph itself is
    /// corrupt.
    pub fn build<G: SweepGrid + ?Sized>(grid: &G, omega: Vector3) -> Result<Self, SweepError> {
        let cells = grid.local_cells();
        let n = cells.len();
        let mut graph = DirectedGraph::new(n);
        let mut deps = BTreeSet::new();
        let mut succs = BTreeSet::new();
        let mut face_orientations = Vec::with_capacity(n);

        for cell in cells {
            let orientations = classify_cell(omega, cell);
            for (face, o) in cell.faces.iter().zip(&orientations) {
                match (face.neighbor, o) {
                    (FaceNeighbor::Local { cell: nb }, FaceOrientation::Incoming) => {
                        graph.add_edge(nb, cell.local_id);
                    }
                    (FaceNeighbor::Local { cell: nb }, FaceOrientation::Outgoing) => {
                        graph.add_edge(cell.local_id, nb);
                    }
                    (FaceNeighbor::Remote { rank, .. }, FaceOrientation::Incoming) => {
                        deps.insert(rank);
                    }
                    (FaceNeighbor::Remote { rank, .. }, FaceOrientation::Outgoing) => {
                        succs.insert(rank);
                    }
                    _ => {}
                }
            }
            face_orientations.push(orientations);
        }

        let (visitation_order, removed) = graph.order_breaking_cycles().inspect_err(|e| {
            log::error!("[rank {}] sweep ordering for {omega:?} failed: {e}", grid.rank());
        })?;

        let mut order_index = vec![0usize; n];
        for (i, &c) in visitation_order.iter().enumerate() {
            order_index[c] = i;
        }
        let cyclic_edges: Vec<CyclicEdge> = removed
            .into_iter()
            .map(|(from_cell, to_cell)| CyclicEdge { from_cell, to_cell })
            .collect();
        let cyclic_pairs = cyclic_edges
            .iter()
            .map(|e| (e.from_cell.min(e.to_cell), e.from_cell.max(e.to_cell)))
            .collect();
        if !cyclic_edges.is_empty() {
            log::debug!(
                "[rank {}] direction {omega:?}: {} local cyclic dependencies lagged",
                grid.rank(),
                cyclic_edges.len()
            );
        }

        Ok(Self {
            omega,
            visitation_order,
            order_index,
            cyclic_edges,
            cyclic_pairs,
            face_orientations,
            location_dependencies: deps.into_iter().collect(),
            location_successors: succs.into_iter().collect(),
        })
    }

    pub fn omega(&self) -> Vector3 {
        self.omega
    }

    /// Local cell ids in sweep order.
    pub fn visitation_order(&self) -> &[usize] {
        &self.visitation_order
    }

    pub fn num_cells(&self) -> usize {
        self.visitation_order.len()
    }

    /// Position of local cell `cell` in the visitation order.
    pub fn order_index_of(&self, cell: usize) -> usize {
        self.order_index[cell]
    }

    pub fn cyclic_edges(&self) -> &[CyclicEdge] {
        &self.cyclic_edges
    }

    /// Whether the dependency between `a` and `b` (either direction) was lagged.
    pub fn is_cyclic_pair(&self, a: usize, b: usize) -> bool {
        self.cyclic_pairs.contains(&(a.min(b), a.max(b)))
    }

    pub fn face_orientations(&self, cell: usize) -> &[FaceOrientation] {
        &self.face_orientations[cell]
    }

    /// Ranks this rank receives upwind flux from.
    pub fn location_dependencies(&self) -> &[usize] {
        &self.location_dependencies
    }

    /// Ranks this rank sends downwind flux to.
    pub fn location_successors(&self) -> &[usize] {
        &self.location_successors
    }
}
