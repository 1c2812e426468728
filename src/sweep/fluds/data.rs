//! Per-angle-set flux data buffers.
//!
//! Every buffer is laid out `angle · slot · dof · group`: the values of all
//! groups of one face dof are contiguous, and each angle of the set owns a
//! contiguous block. Non-local buffers use the dof offset assigned during
//! the alpha pass (send side) or announced by the predecessor during the
//! beta pass (receive side) instead of a slot index.
//!
//! Lagged data lives in new/old pairs: the sweep writes `new` and reads
//! `old`, and [`Fluds::commit_delayed`] copies `new` into `old` between
//! sweeps.

use std::sync::Arc;

use super::alpha::{DownwindTarget, UpwindSource};
use super::common::FludsCommonData;
use crate::sweep_error::SweepError;
use crate::topology::FaceCategory;

fn out_of_range(what: impl Into<String>) -> SweepError {
    SweepError::BufferIndexOutOfRange(what.into())
}

fn group_block(buf: &[f64], start: usize, len: usize) -> Result<&[f64], SweepError> {
    buf.get(start..start + len)
        .ok_or_else(|| out_of_range(format!("{start}..{} of {}", start + len, buf.len())))
}

fn group_block_mut(buf: &mut [f64], start: usize, len: usize) -> Result<&mut [f64], SweepError> {
    let n = buf.len();
    buf.get_mut(start..start + len)
        .ok_or_else(|| out_of_range(format!("{start}..{} of {n}", start + len)))
}

fn mapped(dof_map: &[usize], dof: usize) -> Result<usize, SweepError> {
    dof_map
        .get(dof)
        .copied()
        .ok_or_else(|| out_of_range(format!("face dof {dof} of {}", dof_map.len())))
}

#[derive(Clone, Debug)]
pub struct Fluds {
    common: Arc<FludsCommonData>,
    num_groups: usize,
    num_angles: usize,
    local: Vec<Vec<f64>>,
    delayed_new: Vec<f64>,
    delayed_old: Vec<f64>,
    deploc: Vec<Vec<f64>>,
    preloc: Vec<Vec<f64>>,
    delayed_preloc_new: Vec<Vec<f64>>,
    delayed_preloc_old: Vec<Vec<f64>>,
}

impl Fluds {
    /// Allocate every buffer for `num_angles` angles of `num_groups` groups.
    pub fn new(common: Arc<FludsCommonData>, num_groups: usize, num_angles: usize) -> Self {
        let per_angle = num_groups * num_angles;
        let local = common
            .histogram()
            .categories()
            .map(|cat| {
                let slots = common.local_slot_counts()[cat.index()];
                vec![0.0; slots * common.histogram().stride(cat) * per_angle]
            })
            .collect();
        let delayed = common.delayed_slot_count() * common.delayed_stride() * per_angle;
        let sized = |counts: &[usize]| -> Vec<Vec<f64>> {
            counts.iter().map(|&c| vec![0.0; c * per_angle]).collect()
        };
        Self {
            local,
            delayed_new: vec![0.0; delayed],
            delayed_old: vec![0.0; delayed],
            deploc: sized(common.deploc_face_dof_count()),
            preloc: sized(common.preloc_face_dof_count()),
            delayed_preloc_new: sized(common.delayed_preloc_face_dof_count()),
            delayed_preloc_old: sized(common.delayed_preloc_face_dof_count()),
            common,
            num_groups,
            num_angles,
        }
    }

    pub fn common(&self) -> &Arc<FludsCommonData> {
        &self.common
    }

    pub fn num_groups(&self) -> usize {
        self.num_groups
    }

    pub fn num_angles(&self) -> usize {
        self.num_angles
    }

    fn local_index(&self, category: FaceCategory, slot: usize, angle: usize, dof: usize) -> usize {
        let stride = self.common.histogram().stride(category);
        let slots = self.common.local_slot_counts()[category.index()];
        ((angle * slots + slot) * stride + dof) * self.num_groups
    }

    fn delayed_index(&self, slot: usize, angle: usize, dof: usize) -> usize {
        let stride = self.common.delayed_stride();
        let slots = self.common.delayed_slot_count();
        ((angle * slots + slot) * stride + dof) * self.num_groups
    }

    fn block_index(count: usize, offset: usize, angle: usize, dof: usize, g: usize) -> usize {
        (angle * count + offset + dof) * g
    }

    /// Group values of `dof` (in the reading face's vertex order) for one
    /// incoming face.
    pub fn upwind_psi(
        &self,
        source: &UpwindSource,
        angle: usize,
        dof: usize,
    ) -> Result<&[f64], SweepError> {
        let g = self.num_groups;
        match source {
            UpwindSource::Local {
                category,
                slot,
                dof_map,
            } => {
                let i = self.local_index(*category, slot.get(), angle, mapped(dof_map, dof)?);
                group_block(&self.local[category.index()], i, g)
            }
            UpwindSource::Delayed { slot, dof_map } => {
                let i = self.delayed_index(slot.get(), angle, mapped(dof_map, dof)?);
                group_block(&self.delayed_old, i, g)
            }
            UpwindSource::NonLocal {
                predecessor,
                offset,
                dof_map,
            } => {
                let count = self.common.preloc_face_dof_count()[*predecessor];
                let i = Self::block_index(count, *offset, angle, mapped(dof_map, dof)?, g);
                group_block(&self.preloc[*predecessor], i, g)
            }
            UpwindSource::DelayedNonLocal {
                predecessor,
                offset,
                dof_map,
            } => {
                let count = self.common.delayed_preloc_face_dof_count()[*predecessor];
                let i = Self::block_index(count, *offset, angle, mapped(dof_map, dof)?, g);
                group_block(&self.delayed_preloc_old[*predecessor], i, g)
            }
            UpwindSource::Boundary { id } => {
                Err(out_of_range(format!("boundary {id} has no flux buffer")))
            }
            UpwindSource::AwaitingNegotiation { rank, neighbor } => Err(out_of_range(format!(
                "face of cell {neighbor} on rank {rank} was never negotiated"
            ))),
        }
    }

    /// Group values of `dof` (in the writing face's vertex order) for one
    /// outgoing face.
    pub fn outgoing_psi_mut(
        &mut self,
        target: &DownwindTarget,
        angle: usize,
        dof: usize,
    ) -> Result<&mut [f64], SweepError> {
        let g = self.num_groups;
        match target {
            DownwindTarget::Local { category, slot } => {
                let i = self.local_index(*category, slot.get(), angle, dof);
                group_block_mut(&mut self.local[category.index()], i, g)
            }
            DownwindTarget::Delayed { slot } => {
                let i = self.delayed_index(slot.get(), angle, dof);
                group_block_mut(&mut self.delayed_new, i, g)
            }
            DownwindTarget::NonLocal { successor, offset } => {
                let count = self.common.deploc_face_dof_count()[*successor];
                let i = Self::block_index(count, *offset, angle, dof, g);
                group_block_mut(&mut self.deploc[*successor], i, g)
            }
            DownwindTarget::Boundary { id } => {
                Err(out_of_range(format!("boundary {id} has no flux buffer")))
            }
        }
    }

    /// Receive buffer of predecessor `i`.
    pub fn preloc_block_mut(&mut self, i: usize) -> Result<&mut [f64], SweepError> {
        let n = self.preloc.len();
        self.preloc
            .get_mut(i)
            .map(Vec::as_mut_slice)
            .ok_or_else(|| out_of_range(format!("predecessor {i} of {n}")))
    }

    /// Receive buffer of delayed predecessor `i`, read next sweep.
    pub fn delayed_preloc_block_mut(&mut self, i: usize) -> Result<&mut [f64], SweepError> {
        let n = self.delayed_preloc_new.len();
        self.delayed_preloc_new
            .get_mut(i)
            .map(Vec::as_mut_slice)
            .ok_or_else(|| out_of_range(format!("delayed predecessor {i} of {n}")))
    }

    /// Send buffer of successor `i`.
    pub fn deploc_buffer(&self, i: usize) -> Result<&[f64], SweepError> {
        self.deploc
            .get(i)
            .map(Vec::as_slice)
            .ok_or_else(|| out_of_range(format!("successor {i} of {}", self.deploc.len())))
    }

    /// Make this sweep's lagged values the ones the next sweep reads.
    pub fn commit_delayed(&mut self) {
        self.delayed_old.copy_from_slice(&self.delayed_new);
        for (old, new) in self
            .delayed_preloc_old
            .iter_mut()
            .zip(&self.delayed_preloc_new)
        {
            old.copy_from_slice(new);
        }
    }

    /// Zero the lagged values the next sweep will read.
    pub fn zero_incoming_delayed(&mut self) {
        self.delayed_old.fill(0.0);
        self.delayed_preloc_old.iter_mut().for_each(|b| b.fill(0.0));
    }

    /// Zero the lagged values written by this sweep.
    pub fn zero_outgoing_delayed(&mut self) {
        self.delayed_new.fill(0.0);
        self.delayed_preloc_new.iter_mut().for_each(|b| b.fill(0.0));
    }
}
