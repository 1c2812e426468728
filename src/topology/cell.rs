//! Cells and faces as handed to the sweep layer by the mesh provider.
//!
//! A face knows its outward normal, its vertex ids (global, shared across
//! ranks) and what lies on the other side. Exactly one of "local cell",
//! "remote cell" or "boundary" holds, which [`FaceNeighbor`] makes
//! unrepresentable otherwise.
//!
//! Face unknowns are nodal: a face with `k` vertices carries `k` dofs, in
//! vertex order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::vector::Vector3;

/// Global cell id, unique across all ranks.
pub type GlobalCellId = u64;

/// What sits across a face.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaceNeighbor {
    /// A cell on this rank (local index).
    Local { cell: usize },
    /// A cell owned by another rank.
    Remote { rank: usize, global_id: GlobalCellId },
    /// Domain boundary with the given boundary id.
    Boundary { id: u64 },
}

/// Cell shape tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellShape {
    Slab,
    Polygon,
    Polyhedron,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Face {
    pub normal: Vector3,
    pub vertex_ids: Vec<u64>,
    pub neighbor: FaceNeighbor,
    pub area: f64,
}

impl Face {
    pub fn new(normal: Vector3, vertex_ids: Vec<u64>, neighbor: FaceNeighbor) -> Self {
        Self {
            normal,
            vertex_ids,
            neighbor,
            area: 1.0,
        }
    }

    #[inline]
    pub fn num_dofs(&self) -> usize {
        self.vertex_ids.len()
    }

    pub fn is_boundary(&self) -> bool {
        matches!(self.neighbor, FaceNeighbor::Boundary { .. })
    }

    /// Same vertex set as `vertex_ids`, irrespective of order.
    pub fn matches_vertices(&self, vertex_ids: &[u64]) -> bool {
        if self.vertex_ids.len() != vertex_ids.len() {
            return false;
        }
        let a: BTreeSet<u64> = self.vertex_ids.iter().copied().collect();
        let b: BTreeSet<u64> = vertex_ids.iter().copied().collect();
        a == b
    }

    /// For each of this face's vertices, its position in `other`.
    ///
    /// Returns the first vertex missing from `other` on failure.
    pub fn dof_map_onto(&self, other: &[u64]) -> Result<Vec<usize>, u64> {
        self.vertex_ids
            .iter()
            .map(|v| other.iter().position(|o| o == v).ok_or(*v))
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub global_id: GlobalCellId,
    pub local_id: usize,
    /// Owning rank.
    pub partition: usize,
    pub shape: CellShape,
    pub faces: Vec<Face>,
}

impl Cell {
    /// Index of the face of `neighbor` that shares this face's vertex set.
    pub fn associated_face(&self, face: usize, neighbor: &Cell) -> Option<usize> {
        let ids = &self.faces.get(face)?.vertex_ids;
        neighbor.faces.iter().position(|f| f.matches_vertices(ids))
    }

    /// Total face dofs over all faces.
    pub fn num_face_dofs(&self) -> usize {
        self.faces.iter().map(Face::num_dofs).sum()
    }
}
