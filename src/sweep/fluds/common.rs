//! Immutable face-layout data shared by every angle set built on one plan.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::alpha::{AlphaPass, CellFaceSlots, UpwindSource};
use super::beta::{BetaPass, BetaStats, resolve_remote_faces};
use crate::algs::communicator::{Communicator, ExchangeTags};
use crate::debug_invariants::DebugInvariants;
use crate::sweep::plan::SweepPlan;
use crate::sweep_error::SweepError;
use crate::topology::{FaceHistogram, SweepGrid};

/// Result of the alpha and beta passes for one sweep plan.
///
/// Built once, then only read: angle sets hold it behind an `Arc` and size
/// their own data buffers from it.
#[derive(Debug)]
pub struct FludsCommonData {
    plan: Arc<SweepPlan>,
    histogram: FaceHistogram,
    cells: Vec<CellFaceSlots>,
    local_slot_counts: Vec<usize>,
    delayed_slot_count: usize,
    delayed_stride: usize,
    deploc_face_dof_count: Vec<usize>,
    preloc_face_dof_count: Vec<usize>,
    delayed_preloc_face_dof_count: Vec<usize>,
    boundary_dependencies: BTreeSet<u64>,
    beta_stats: BetaStats,
}

impl FludsCommonData {
    /// Run the alpha pass locally, then negotiate non-local faces with the
    /// neighbouring ranks. Collective over `comm`.
    pub fn build<G, C>(
        grid: &G,
        plan: Arc<SweepPlan>,
        histogram: &FaceHistogram,
        comm: &C,
        tags: ExchangeTags,
    ) -> Result<Self, SweepError>
    where
        G: SweepGrid + ?Sized,
        C: Communicator,
    {
        let mut alpha = AlphaPass::run(grid, &plan, histogram)?;
        log::debug!(
            "[rank {}] alpha pass: slots per category {:?}, {} delayed",
            comm.rank(),
            alpha.local_slot_counts,
            alpha.delayed_slot_count
        );

        let negotiation = BetaPass::new(
            comm,
            tags,
            plan.locations(),
            &alpha.deploc_cell_views,
            &alpha.deploc_face_dof_count,
        )?
        .run()?;
        resolve_remote_faces(grid, &mut alpha.cells, plan.locations(), &negotiation)?;

        let common = Self {
            histogram: histogram.clone(),
            cells: alpha.cells,
            local_slot_counts: alpha.local_slot_counts,
            delayed_slot_count: alpha.delayed_slot_count,
            delayed_stride: alpha.delayed_stride,
            deploc_face_dof_count: alpha.deploc_face_dof_count,
            preloc_face_dof_count: negotiation.prelocs.iter().map(|p| p.face_dof_count).collect(),
            delayed_preloc_face_dof_count: negotiation
                .delayed_prelocs
                .iter()
                .map(|p| p.face_dof_count)
                .collect(),
            boundary_dependencies: alpha.boundary_dependencies,
            beta_stats: negotiation.stats,
            plan,
        };
        common.validate_invariants().inspect_err(|e| {
            log::error!("[rank {}] inconsistent face layout: {e}", comm.rank());
        })?;
        Ok(common)
    }

    pub fn plan(&self) -> &Arc<SweepPlan> {
        &self.plan
    }

    pub fn histogram(&self) -> &FaceHistogram {
        &self.histogram
    }

    /// Slot plans in sweep order.
    pub fn cells(&self) -> &[CellFaceSlots] {
        &self.cells
    }

    pub fn local_slot_counts(&self) -> &[usize] {
        &self.local_slot_counts
    }

    pub fn delayed_slot_count(&self) -> usize {
        self.delayed_slot_count
    }

    pub fn delayed_stride(&self) -> usize {
        self.delayed_stride
    }

    pub fn deploc_face_dof_count(&self) -> &[usize] {
        &self.deploc_face_dof_count
    }

    pub fn preloc_face_dof_count(&self) -> &[usize] {
        &self.preloc_face_dof_count
    }

    pub fn delayed_preloc_face_dof_count(&self) -> &[usize] {
        &self.delayed_preloc_face_dof_count
    }

    /// Boundary ids read by this plan.
    pub fn boundary_dependencies(&self) -> &BTreeSet<u64> {
        &self.boundary_dependencies
    }

    pub fn beta_stats(&self) -> &BetaStats {
        &self.beta_stats
    }
}

impl DebugInvariants for FludsCommonData {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "FludsCommonData");
    }

    fn validate_invariants(&self) -> Result<(), SweepError> {
        for slots in &self.cells {
            for inc in &slots.incoming {
                if let UpwindSource::AwaitingNegotiation { neighbor, .. } = inc.source {
                    log::error!(
                        "remote face {} of cell {} (neighbour {neighbor}) never resolved",
                        inc.face,
                        slots.global_id
                    );
                    return Err(SweepError::UnresolvedRemoteFace {
                        cell: slots.global_id,
                        face: inc.face,
                    });
                }
            }
        }
        let locations = self.plan.locations();
        if self.preloc_face_dof_count.len() != locations.location_dependencies().len()
            || self.delayed_preloc_face_dof_count.len()
                != locations.delayed_location_dependencies().len()
            || self.deploc_face_dof_count.len() != locations.location_successors().len()
        {
            return Err(SweepError::InvalidGrid(
                "face dof counts do not match the location graph".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;
    use crate::sweep::fluds::beta::BETA_TAGS;
    use crate::topology::generators::slab_chain;
    use crate::topology::{Cell, CellShape, Face, FaceNeighbor, GridAttributes, LocalGrid, Vector3};

    #[test]
    fn serial_chain_has_no_remote_traffic() {
        let g = slab_chain(4, |_| 0, 0).unwrap();
        let plan = Arc::new(SweepPlan::build(&g, Vector3::X, &NoComm, true).unwrap());
        let h = FaceHistogram::from_grid(&g);
        let common = FludsCommonData::build(&g, plan, &h, &NoComm, BETA_TAGS).unwrap();
        assert_eq!(common.cells().len(), 4);
        assert_eq!(common.local_slot_counts(), &[1]);
        assert!(common.preloc_face_dof_count().is_empty());
        assert_eq!(common.beta_stats(), &BetaStats::default());
    }

    #[test]
    fn unresolved_faces_name_the_global_cell() {
        let slab = |gid: u64, local: usize, faces| Cell {
            global_id: gid,
            local_id: local,
            partition: 0,
            shape: CellShape::Slab,
            faces,
        };
        let cells = vec![
            slab(
                10,
                0,
                vec![
                    Face::new(-Vector3::X, vec![0], FaceNeighbor::Boundary { id: 0 }),
                    Face::new(Vector3::X, vec![1], FaceNeighbor::Local { cell: 1 }),
                ],
            ),
            slab(
                11,
                1,
                vec![
                    Face::new(-Vector3::X, vec![1], FaceNeighbor::Local { cell: 0 }),
                    Face::new(Vector3::X, vec![2], FaceNeighbor::Boundary { id: 1 }),
                ],
            ),
        ];
        let attributes = GridAttributes {
            dimension: 1,
            orthogonal: true,
            extruded: false,
        };
        let g = LocalGrid::new(0, attributes, cells).unwrap();
        let plan = Arc::new(SweepPlan::build(&g, Vector3::X, &NoComm, true).unwrap());
        let h = FaceHistogram::from_grid(&g);
        let mut common = FludsCommonData::build(&g, plan, &h, &NoComm, BETA_TAGS).unwrap();
        assert_eq!(common.cells[1].global_id, 11);

        common.cells[1].incoming[0].source = UpwindSource::AwaitingNegotiation {
            rank: 1,
            neighbor: 10,
        };
        assert!(matches!(
            common.validate_invariants(),
            Err(SweepError::UnresolvedRemoteFace { cell: 11, face: 0 })
        ));
    }
}
