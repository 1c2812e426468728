//! The per-cell solve contract.
//!
//! The scheduler owns the data movement; the numerical work for one cell and
//! one direction is delegated to a [`SweepChunk`]. It receives the upwind
//! values of every incoming face and must return the downwind values of
//! every outgoing face.

use crate::topology::{Cell, Vector3};

/// Values on one face: `num_dofs * num_groups` entries, dof-major (all
/// groups of dof 0 first), in the face's own vertex order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FaceValues {
    pub face: usize,
    pub psi: Vec<f64>,
}

impl FaceValues {
    pub fn new(face: usize, psi: Vec<f64>) -> Self {
        Self { face, psi }
    }
}

#[derive(Debug)]
pub struct CellSolveRequest<'a> {
    pub cell: &'a Cell,
    /// Direction index in the quadrature.
    pub angle: usize,
    pub omega: Vector3,
    pub group_start: usize,
    pub num_groups: usize,
    /// One entry per incoming face.
    pub upwind: &'a [FaceValues],
    /// Faces whose values the kernel must return.
    pub outgoing: &'a [usize],
}

impl CellSolveRequest<'_> {
    /// Upwind values of face `face`, if it is incoming.
    pub fn upwind_face(&self, face: usize) -> Option<&FaceValues> {
        self.upwind.iter().find(|v| v.face == face)
    }

    /// Expected `psi` length for face `face`.
    pub fn face_len(&self, face: usize) -> usize {
        self.cell.faces.get(face).map_or(0, |f| f.num_dofs()) * self.num_groups
    }
}

pub trait SweepChunk {
    fn solve(&mut self, request: &CellSolveRequest<'_>) -> Vec<FaceValues>;
}

impl<F> SweepChunk for F
where
    F: FnMut(&CellSolveRequest<'_>) -> Vec<FaceValues>,
{
    fn solve(&mut self, request: &CellSolveRequest<'_>) -> Vec<FaceValues> {
        self(request)
    }
}
