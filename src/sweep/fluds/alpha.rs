//! Alpha pass: local slot allocation along the sweep order.
//!
//! Cells are visited in sweep order. For each cell the incoming faces are
//! handled first, so slots their upstream neighbours claimed are freed before
//! the cell's own outgoing faces claim new ones. Outgoing faces to another
//! rank or to the boundary never occupy lock-box slots: remote ones are laid
//! out in the per-successor send buffer (and described by compact cell views
//! for the beta pass), boundary ones are handed to the boundary.
//!
//! Faces across a lagged (cyclic) local dependency use the delayed lock box.
//! Their consumer may be visited before their producer, so incoming delayed
//! faces are resolved after the whole pass.

use std::collections::BTreeSet;

use super::compact_view::{CompactCellView, CompactFaceView};
use super::lockbox::{FaceTag, LockBox, SlotIndex};
use crate::debug_invariants::DebugInvariants;
use crate::sweep::orientation::FaceOrientation;
use crate::sweep::plan::SweepPlan;
use crate::sweep_error::SweepError;
use crate::topology::{Cell, FaceCategory, FaceHistogram, FaceNeighbor, GlobalCellId, SweepGrid};

/// Where a cell reads the upwind values of one incoming face.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpwindSource {
    /// Slot of a local category buffer written earlier this sweep.
    Local {
        category: FaceCategory,
        slot: SlotIndex,
        dof_map: Vec<usize>,
    },
    /// Slot of the delayed local buffer, written last sweep.
    Delayed { slot: SlotIndex, dof_map: Vec<usize> },
    /// Block received from predecessor `predecessor` (prelocI) this sweep.
    NonLocal {
        predecessor: usize,
        offset: usize,
        dof_map: Vec<usize>,
    },
    /// Block received from delayed predecessor `predecessor` last sweep.
    DelayedNonLocal {
        predecessor: usize,
        offset: usize,
        dof_map: Vec<usize>,
    },
    Boundary { id: u64 },
    /// Remote face not yet matched against the predecessor's cell views.
    AwaitingNegotiation { rank: usize, neighbor: GlobalCellId },
}

/// Where a cell writes the downwind values of one outgoing face.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DownwindTarget {
    Local { category: FaceCategory, slot: SlotIndex },
    Delayed { slot: SlotIndex },
    /// Dof offset in the send buffer of successor `successor` (deplocI).
    NonLocal { successor: usize, offset: usize },
    Boundary { id: u64 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncomingFace {
    pub face: usize,
    pub num_dofs: usize,
    pub source: UpwindSource,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingFace {
    pub face: usize,
    pub num_dofs: usize,
    pub target: DownwindTarget,
}

/// Slot plan of one cell, stored at the cell's position in the sweep order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CellFaceSlots {
    pub cell: usize,
    pub global_id: GlobalCellId,
    pub incoming: Vec<IncomingFace>,
    pub outgoing: Vec<OutgoingFace>,
}

struct DeferredIncoming {
    order_index: usize,
    face: usize,
    num_dofs: usize,
    tag: FaceTag,
    dof_map: Vec<usize>,
    upstream: GlobalCellId,
}

/// Everything the alpha pass produces.
#[derive(Clone, Debug, Default)]
pub struct AlphaPassOutput {
    pub cells: Vec<CellFaceSlots>,
    /// Slots per face category.
    pub local_slot_counts: Vec<usize>,
    pub delayed_slot_count: usize,
    /// Dofs per delayed slot (largest delayed face).
    pub delayed_stride: usize,
    pub deploc_face_dof_count: Vec<usize>,
    pub deploc_cell_views: Vec<Vec<CompactCellView>>,
    pub boundary_dependencies: BTreeSet<u64>,
}

/// Steppable alpha pass over one sweep plan.
pub struct AlphaPass<'a, G: SweepGrid + ?Sized> {
    grid: &'a G,
    plan: &'a SweepPlan,
    histogram: &'a FaceHistogram,
    lock_boxes: Vec<LockBox>,
    delayed: LockBox,
    cells: Vec<CellFaceSlots>,
    deferred: Vec<DeferredIncoming>,
    deploc_face_dof_count: Vec<usize>,
    deploc_cell_views: Vec<Vec<CompactCellView>>,
    boundary_dependencies: BTreeSet<u64>,
    delayed_stride: usize,
}

impl<'a, G: SweepGrid + ?Sized> AlphaPass<'a, G> {
    pub fn new(grid: &'a G, plan: &'a SweepPlan, histogram: &'a FaceHistogram) -> Self {
        let num_succ = plan.locations().location_successors().len();
        Self {
            grid,
            plan,
            histogram,
            lock_boxes: vec![LockBox::new(); histogram.num_categories()],
            delayed: LockBox::new(),
            cells: Vec::with_capacity(plan.ordering().num_cells()),
            deferred: Vec::new(),
            deploc_face_dof_count: vec![0; num_succ],
            deploc_cell_views: vec![Vec::new(); num_succ],
            boundary_dependencies: BTreeSet::new(),
            delayed_stride: 0,
        }
    }

    /// Run the whole pass.
    pub fn run(
        grid: &'a G,
        plan: &'a SweepPlan,
        histogram: &'a FaceHistogram,
    ) -> Result<AlphaPassOutput, SweepError> {
        Self::new(grid, plan, histogram).finish()
    }

    /// Process the next cell in sweep order; `Ok(false)` once all are done.
    pub fn step(&mut self) -> Result<bool, SweepError> {
        let (grid, plan) = (self.grid, self.plan);
        let order_index = self.cells.len();
        let Some(&local) = plan.ordering().visitation_order().get(order_index) else {
            return Ok(false);
        };
        let cell = grid.cell(local)?;
        let mut slots = CellFaceSlots {
            cell: local,
            global_id: cell.global_id,
            ..Default::default()
        };
        self.incoming_faces(order_index, cell, &mut slots)?;
        self.outgoing_faces(cell, &mut slots)?;
        self.cells.push(slots);
        Ok(true)
    }

    /// Cells processed so far, in sweep order.
    pub fn processed(&self) -> &[CellFaceSlots] {
        &self.cells
    }

    pub fn lock_box(&self, category: FaceCategory) -> &LockBox {
        &self.lock_boxes[category.index()]
    }

    pub fn delayed_lock_box(&self) -> &LockBox {
        &self.delayed
    }

    /// Claimed slots over every category lock box.
    pub fn num_claimed(&self) -> usize {
        self.lock_boxes.iter().map(LockBox::num_claimed).sum()
    }

    /// Finish the remaining cells, resolve delayed faces and check that no
    /// slot is left claimed.
    pub fn finish(mut self) -> Result<AlphaPassOutput, SweepError> {
        while self.step()? {}

        for d in std::mem::take(&mut self.deferred) {
            let slot = self.delayed.lookup(d.tag).ok_or_else(|| {
                let cell = self.cells[d.order_index].cell;
                let gid = self.grid.cell(cell).map_or(0, |c| c.global_id);
                log::error!(
                    "[rank {}] delayed face {} of cell {gid} has no producer",
                    self.grid.rank(),
                    d.face
                );
                SweepError::DelayedSlotNotFound {
                    cell: gid,
                    face: d.face,
                    upstream_cell: d.upstream,
                }
            })?;
            self.cells[d.order_index].incoming.push(IncomingFace {
                face: d.face,
                num_dofs: d.num_dofs,
                source: UpwindSource::Delayed {
                    slot,
                    dof_map: d.dof_map,
                },
            });
        }

        for (c, lb) in self.lock_boxes.iter().enumerate() {
            lb.debug_assert_invariants();
            if lb.num_claimed() != 0 {
                return Err(SweepError::UnconsumedSlots {
                    category: c,
                    count: lb.num_claimed(),
                });
            }
        }
        self.delayed.debug_assert_invariants();

        Ok(AlphaPassOutput {
            local_slot_counts: self.lock_boxes.iter().map(LockBox::len).collect(),
            delayed_slot_count: self.delayed.len(),
            delayed_stride: self.delayed_stride,
            cells: self.cells,
            deploc_face_dof_count: self.deploc_face_dof_count,
            deploc_cell_views: self.deploc_cell_views,
            boundary_dependencies: self.boundary_dependencies,
        })
    }

    fn incoming_faces(
        &mut self,
        order_index: usize,
        cell: &Cell,
        slots: &mut CellFaceSlots,
    ) -> Result<(), SweepError> {
        let (grid, plan) = (self.grid, self.plan);
        let orientations = plan.ordering().face_orientations(cell.local_id);
        for (f, face) in cell.faces.iter().enumerate() {
            if orientations[f] != FaceOrientation::Incoming {
                continue;
            }
            let num_dofs = face.num_dofs();
            let source = match face.neighbor {
                FaceNeighbor::Boundary { id } => {
                    self.boundary_dependencies.insert(id);
                    UpwindSource::Boundary { id }
                }
                FaceNeighbor::Remote { rank, global_id } => UpwindSource::AwaitingNegotiation {
                    rank,
                    neighbor: global_id,
                },
                FaceNeighbor::Local { cell: nb } => {
                    let upstream = grid.cell(nb)?;
                    let up_face = cell.associated_face(f, upstream).ok_or(
                        SweepError::AssociatedFaceNotFound {
                            cell: cell.global_id,
                            face: f,
                            neighbor: upstream.global_id,
                        },
                    )?;
                    let dof_map = face
                        .dof_map_onto(&upstream.faces[up_face].vertex_ids)
                        .map_err(|vertex| SweepError::AssociatedVertexNotFound {
                            cell: cell.global_id,
                            face: f,
                            vertex,
                        })?;
                    let tag = FaceTag {
                        cell: cell.global_id,
                        face: f,
                    };
                    if plan.ordering().is_cyclic_pair(cell.local_id, nb) {
                        self.deferred.push(DeferredIncoming {
                            order_index,
                            face: f,
                            num_dofs,
                            tag,
                            dof_map,
                            upstream: upstream.global_id,
                        });
                        continue;
                    }
                    let category = self.histogram.category(num_dofs)?;
                    let slot = self.lock_boxes[category.index()].release(tag).ok_or_else(|| {
                        log::error!(
                            "[rank {}] cell {} face {f}: upstream cell {} never claimed a slot",
                            grid.rank(),
                            cell.global_id,
                            upstream.global_id
                        );
                        SweepError::LockBoxSlotNotFound {
                            cell: cell.global_id,
                            face: f,
                            upstream_cell: upstream.global_id,
                            upstream_face: up_face,
                            category: category.index(),
                        }
                    })?;
                    UpwindSource::Local {
                        category,
                        slot,
                        dof_map,
                    }
                }
            };
            slots.incoming.push(IncomingFace {
                face: f,
                num_dofs,
                source,
            });
        }
        Ok(())
    }

    fn outgoing_faces(&mut self, cell: &Cell, slots: &mut CellFaceSlots) -> Result<(), SweepError> {
        let (grid, plan) = (self.grid, self.plan);
        let orientations = plan.ordering().face_orientations(cell.local_id);
        for (f, face) in cell.faces.iter().enumerate() {
            if orientations[f] != FaceOrientation::Outgoing {
                continue;
            }
            let num_dofs = face.num_dofs();
            let target = match face.neighbor {
                FaceNeighbor::Boundary { id } => DownwindTarget::Boundary { id },
                FaceNeighbor::Remote { rank, .. } => {
                    let successor = plan.locations().map_successor(rank)?;
                    let offset = self.deploc_face_dof_count[successor];
                    self.deploc_face_dof_count[successor] += num_dofs;
                    let views = &mut self.deploc_cell_views[successor];
                    let face_view = CompactFaceView {
                        slot: offset,
                        vertex_ids: face.vertex_ids.clone(),
                    };
                    match views.last_mut() {
                        Some(v) if v.global_id == cell.global_id => v.faces.push(face_view),
                        _ => views.push(CompactCellView {
                            global_id: cell.global_id,
                            faces: vec![face_view],
                        }),
                    }
                    DownwindTarget::NonLocal { successor, offset }
                }
                FaceNeighbor::Local { cell: nb } => {
                    let downstream = grid.cell(nb)?;
                    let down_face = cell.associated_face(f, downstream).ok_or(
                        SweepError::AssociatedFaceNotFound {
                            cell: cell.global_id,
                            face: f,
                            neighbor: downstream.global_id,
                        },
                    )?;
                    let tag = FaceTag {
                        cell: downstream.global_id,
                        face: down_face,
                    };
                    if plan.ordering().is_cyclic_pair(cell.local_id, nb) {
                        self.delayed_stride = self.delayed_stride.max(num_dofs);
                        DownwindTarget::Delayed {
                            slot: self.delayed.claim(tag),
                        }
                    } else {
                        let category = self.histogram.category(num_dofs)?;
                        DownwindTarget::Local {
                            category,
                            slot: self.lock_boxes[category.index()].claim(tag),
                        }
                    }
                }
            };
            slots.outgoing.push(OutgoingFace {
                face: f,
                num_dofs,
                target,
            });
        }
        Ok(())
    }
}
