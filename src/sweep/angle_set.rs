//! Angle sets: directions swept together over one sweep plan, for one
//! contiguous range of groups.

use std::sync::Arc;

use super::boundary::{BoundaryFaceRef, BoundaryMap};
use super::fluds::{DownwindTarget, Fluds, FludsCommonData, UpwindSource};
use super::kernel::{CellSolveRequest, FaceValues, SweepChunk};
use super::plan::SweepPlan;
use super::sweep_buffer::SweepBuffer;
use crate::algs::communicator::{CommTag, Communicator};
use crate::sweep_error::SweepError;
use crate::topology::{SweepGrid, Vector3};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AngleSetStatus {
    /// Waiting for upstream messages.
    Pending,
    /// Every upstream message has arrived.
    Ready,
    InProgress,
    Done,
}

/// Contiguous range of groups swept together.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct GroupSubset {
    pub first: usize,
    pub num_groups: usize,
}

impl GroupSubset {
    pub fn range(&self) -> std::ops::Range<usize> {
        self.first..self.first + self.num_groups
    }
}

/// Outcome of executing one angle set.
#[derive(Debug)]
pub struct Execution<H> {
    pub cells_solved: usize,
    pub sends: Vec<H>,
}

#[derive(Debug)]
pub struct AngleSet {
    id: usize,
    angles: Vec<usize>,
    omegas: Vec<Vector3>,
    subset: GroupSubset,
    primary: bool,
    fluds: Fluds,
    buffer: SweepBuffer,
    status: AngleSetStatus,
}

impl AngleSet {
    /// `angles` are quadrature direction indices and `omegas` their unit
    /// vectors. `primary` marks the angle set whose construction ran the
    /// FLUDS passes; auxiliary sets share its `common`.
    pub fn new(
        id: usize,
        angles: Vec<usize>,
        omegas: Vec<Vector3>,
        subset: GroupSubset,
        common: Arc<FludsCommonData>,
        primary: bool,
        eager_limit: usize,
    ) -> Self {
        let buffer = SweepBuffer::new(&common, subset.num_groups, angles.len(), eager_limit);
        let fluds = Fluds::new(common, subset.num_groups, angles.len());
        Self {
            id,
            angles,
            omegas,
            subset,
            primary,
            fluds,
            buffer,
            status: AngleSetStatus::Pending,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn angles(&self) -> &[usize] {
        &self.angles
    }

    pub fn subset(&self) -> GroupSubset {
        self.subset
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn plan(&self) -> &Arc<SweepPlan> {
        self.fluds.common().plan()
    }

    pub fn common(&self) -> &Arc<FludsCommonData> {
        self.fluds.common()
    }

    pub fn fluds(&self) -> &Fluds {
        &self.fluds
    }

    pub fn fluds_mut(&mut self) -> &mut Fluds {
        &mut self.fluds
    }

    pub fn buffer(&self) -> &SweepBuffer {
        &self.buffer
    }

    pub fn status(&self) -> AngleSetStatus {
        self.status
    }

    /// Representative direction of the plan.
    pub fn omega(&self) -> Vector3 {
        self.plan().omega()
    }

    pub(crate) fn assign_tags(
        &mut self,
        base: CommTag,
        max_messages: usize,
    ) -> Result<(), SweepError> {
        self.buffer.assign_tags(base, self.id, max_messages)
    }

    /// Receive whatever upstream data has arrived without blocking.
    /// Returns the new status and the number of messages received.
    pub fn advance<C: Communicator>(
        &mut self,
        comm: &C,
    ) -> Result<(AngleSetStatus, usize), SweepError> {
        let mut received = 0;
        if self.status == AngleSetStatus::Pending {
            received = self.buffer.receive_upstream(comm, &mut self.fluds)?;
            if self.buffer.upstream_complete() {
                self.status = AngleSetStatus::Ready;
            }
        }
        Ok((self.status, received))
    }

    /// Sweep every cell for every angle of the set, then post the
    /// downstream messages. Only valid once the set is `Ready`.
    pub fn execute<G, C, K>(
        &mut self,
        grid: &G,
        comm: &C,
        kernel: &mut K,
        boundaries: &BoundaryMap,
    ) -> Result<Execution<C::SendHandle>, SweepError>
    where
        G: SweepGrid + ?Sized,
        C: Communicator,
        K: SweepChunk + ?Sized,
    {
        if self.status != AngleSetStatus::Ready {
            return Err(SweepError::InvalidConfiguration(format!(
                "angle set {} executed while {:?}",
                self.id, self.status
            )));
        }
        self.status = AngleSetStatus::InProgress;
        log::trace!(
            "[rank {}] executing angle set {} ({} angles, groups {:?})",
            comm.rank(),
            self.id,
            self.angles.len(),
            self.subset.range()
        );

        let common = Arc::clone(self.fluds.common());
        let g = self.subset.num_groups;
        let mut cells_solved = 0;
        for (a, (&angle, &omega)) in self.angles.iter().zip(&self.omegas).enumerate() {
            for slots in common.cells() {
                let cell = grid.cell(slots.cell)?;

                let mut upwind = Vec::with_capacity(slots.incoming.len());
                for inc in &slots.incoming {
                    let mut psi = vec![0.0; inc.num_dofs * g];
                    for (dof, out) in psi.chunks_exact_mut(g).enumerate() {
                        match inc.source {
                            UpwindSource::Boundary { id } => {
                                let face = BoundaryFaceRef {
                                    cell: cell.global_id,
                                    face: inc.face,
                                    dof,
                                    group_start: self.subset.first,
                                };
                                boundaries.get(id).incoming_psi(&face, angle, out);
                            }
                            ref source => {
                                out.copy_from_slice(self.fluds.upwind_psi(source, a, dof)?)
                            }
                        }
                    }
                    upwind.push(FaceValues::new(inc.face, psi));
                }

                let outgoing: Vec<usize> = slots.outgoing.iter().map(|o| o.face).collect();
                let request = CellSolveRequest {
                    cell,
                    angle,
                    omega,
                    group_start: self.subset.first,
                    num_groups: g,
                    upwind: &upwind,
                    outgoing: &outgoing,
                };
                let result = kernel.solve(&request);
                cells_solved += 1;

                for out in &slots.outgoing {
                    let expected = out.num_dofs * g;
                    let values = result.iter().find(|v| v.face == out.face);
                    let got = values.map_or(0, |v| v.psi.len());
                    let values = match values {
                        Some(v) if got == expected => v,
                        _ => {
                            log::error!(
                                "[rank {}] kernel returned {got} values for face {} of cell {}, expected {expected}",
                                comm.rank(),
                                out.face,
                                cell.global_id
                            );
                            return Err(SweepError::KernelOutputMismatch {
                                cell: cell.global_id,
                                face: out.face,
                                expected,
                                got,
                            });
                        }
                    };
                    for (dof, psi) in values.psi.chunks_exact(g).enumerate() {
                        match out.target {
                            DownwindTarget::Boundary { id } => {
                                let face = BoundaryFaceRef {
                                    cell: cell.global_id,
                                    face: out.face,
                                    dof,
                                    group_start: self.subset.first,
                                };
                                boundaries.get(id).store_outgoing(&face, angle, psi);
                            }
                            ref target => self
                                .fluds
                                .outgoing_psi_mut(target, a, dof)?
                                .copy_from_slice(psi),
                        }
                    }
                }
            }
        }

        let sends = self.buffer.send_downstream(comm, &self.fluds)?;
        self.status = AngleSetStatus::Done;
        Ok(Execution {
            cells_solved,
            sends,
        })
    }

    /// Receive lagged messages that have arrived; returns how many.
    pub fn receive_delayed<C: Communicator>(&mut self, comm: &C) -> Result<usize, SweepError> {
        self.buffer.receive_delayed(comm, &mut self.fluds)
    }

    pub fn delayed_complete(&self) -> bool {
        self.buffer.delayed_complete()
    }

    /// Promote lagged data and rearm the set for the next sweep.
    pub fn finish_sweep(&mut self) {
        self.fluds.commit_delayed();
        self.buffer.reset();
        self.status = AngleSetStatus::Pending;
    }
}
