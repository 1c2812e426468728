//! Beta pass: cross-rank negotiation of the non-local face layout.
//!
//! Every rank sends each downstream rank the compact views of the faces it
//! will write into that rank's buffer, and receives the same from each
//! upstream rank. The exchange runs as a fixed sequence of phases:
//!
//! 1. post sends to delayed successors (they may be upstream of us too),
//! 2. receive from delayed predecessors,
//! 3. receive from regular predecessors,
//! 4. post sends to regular successors,
//! 5. wait for every send.
//!
//! Receiving from regular predecessors before sending to regular successors
//! follows the acyclic rank graph, so the exchange cannot deadlock. Every
//! message is length-prefixed; a payload whose size disagrees with its
//! prefix aborts the pass.

use std::collections::{BTreeMap, HashMap};

use super::alpha::{CellFaceSlots, UpwindSource};
use super::compact_view::{CompactCellView, deserialize_cell_views, serialize_cell_views};
use crate::algs::communicator::{CommTag, Communicator, ExchangeTags, Wait};
use crate::algs::exchange::{post_sized, recv_sized, sized_message_bytes};
use crate::algs::wire::{WireI64, cast_slice, decode_i64s, encode_i64s};
use crate::sweep::location_graph::{LocationGraph, Predecessor};
use crate::sweep_error::SweepError;
use crate::topology::SweepGrid;

/// Tags used by the beta pass.
pub const BETA_TAGS: ExchangeTags = ExchangeTags::from_base(CommTag::new(0x0110));

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BetaPhase {
    SendDelayedSuccessors,
    ReceiveDelayedPredecessors,
    ReceivePredecessors,
    SendSuccessors,
    AwaitSends,
    Done,
}

impl BetaPhase {
    pub fn next(self) -> Self {
        match self {
            BetaPhase::SendDelayedSuccessors => BetaPhase::ReceiveDelayedPredecessors,
            BetaPhase::ReceiveDelayedPredecessors => BetaPhase::ReceivePredecessors,
            BetaPhase::ReceivePredecessors => BetaPhase::SendSuccessors,
            BetaPhase::SendSuccessors => BetaPhase::AwaitSends,
            BetaPhase::AwaitSends | BetaPhase::Done => BetaPhase::Done,
        }
    }
}

/// Wire bytes exchanged with each peer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BetaStats {
    pub bytes_sent: BTreeMap<usize, usize>,
    pub bytes_received: BTreeMap<usize, usize>,
}

/// Face layout announced by one upstream rank.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PredecessorViews {
    pub rank: usize,
    /// Dofs per angle and group in the block this rank will receive.
    pub face_dof_count: usize,
    pub cells: Vec<CompactCellView>,
}

#[derive(Clone, Debug, Default)]
pub struct RemoteNegotiation {
    /// Indexed like `location_dependencies` (prelocI).
    pub prelocs: Vec<PredecessorViews>,
    /// Indexed like `delayed_location_dependencies`.
    pub delayed_prelocs: Vec<PredecessorViews>,
    pub stats: BetaStats,
}

pub struct BetaPass<'a, C: Communicator> {
    comm: &'a C,
    tags: ExchangeTags,
    locations: &'a LocationGraph,
    outgoing: Vec<Vec<WireI64>>,
    phase: BetaPhase,
    pending: Vec<C::SendHandle>,
    result: RemoteNegotiation,
}

impl<'a, C: Communicator> BetaPass<'a, C> {
    /// `deploc_views[i]` and `deploc_face_dof_count[i]` describe what this
    /// rank writes for successor `locations.location_successors()[i]`.
    pub fn new(
        comm: &'a C,
        tags: ExchangeTags,
        locations: &'a LocationGraph,
        deploc_views: &[Vec<CompactCellView>],
        deploc_face_dof_count: &[usize],
    ) -> Result<Self, SweepError> {
        let outgoing = deploc_views
            .iter()
            .zip(deploc_face_dof_count)
            .map(|(views, &count)| serialize_cell_views(views, count).map(|raw| encode_i64s(&raw)))
            .collect::<Result<_, _>>()?;
        Ok(Self {
            comm,
            tags,
            locations,
            outgoing,
            phase: BetaPhase::SendDelayedSuccessors,
            pending: Vec::new(),
            result: RemoteNegotiation::default(),
        })
    }

    pub fn phase(&self) -> BetaPhase {
        self.phase
    }

    /// Execute the current phase and move to the next one.
    pub fn advance(&mut self) -> Result<BetaPhase, SweepError> {
        match self.phase {
            BetaPhase::SendDelayedSuccessors => self.send(true),
            BetaPhase::ReceiveDelayedPredecessors => {
                let ranks = self.locations.delayed_location_dependencies().to_vec();
                self.result.delayed_prelocs = self.receive_all(&ranks)?;
            }
            BetaPhase::ReceivePredecessors => {
                let ranks = self.locations.location_dependencies().to_vec();
                self.result.prelocs = self.receive_all(&ranks)?;
            }
            BetaPhase::SendSuccessors => self.send(false),
            BetaPhase::AwaitSends => self.drain(),
            BetaPhase::Done => {}
        }
        self.phase = self.phase.next();
        Ok(self.phase)
    }

    /// Run every remaining phase. Outstanding sends are always drained, even
    /// when a receive fails.
    pub fn run(mut self) -> Result<RemoteNegotiation, SweepError> {
        while self.phase != BetaPhase::Done {
            if let Err(e) = self.advance() {
                self.drain();
                log::error!("[rank {}] beta pass failed: {e}", self.comm.rank());
                return Err(e);
            }
        }
        Ok(self.result)
    }

    fn send(&mut self, delayed: bool) {
        let delayed_succs = self.locations.delayed_location_successors();
        for (i, &peer) in self.locations.location_successors().iter().enumerate() {
            if delayed_succs.contains(&peer) != delayed {
                continue;
            }
            let recs = &self.outgoing[i];
            let payload = cast_slice(recs);
            self.pending
                .extend(post_sized(self.comm, peer, self.tags, recs.len(), payload));
            *self.result.stats.bytes_sent.entry(peer).or_default() +=
                sized_message_bytes(payload.len());
        }
    }

    fn receive_all(&mut self, ranks: &[usize]) -> Result<Vec<PredecessorViews>, SweepError> {
        let mut out = Vec::with_capacity(ranks.len());
        for &peer in ranks {
            let bytes = recv_sized(self.comm, peer, self.tags, std::mem::size_of::<WireI64>())?;
            *self.result.stats.bytes_received.entry(peer).or_default() +=
                sized_message_bytes(bytes.len());
            let raw = decode_i64s(&bytes).map_err(|e| SweepError::comm(peer, e))?;
            let (face_dof_count, cells) = deserialize_cell_views(&raw)?;
            log::trace!(
                "[rank {}] {} cell views ({face_dof_count} face dofs) from rank {peer}",
                self.comm.rank(),
                cells.len()
            );
            out.push(PredecessorViews {
                rank: peer,
                face_dof_count,
                cells,
            });
        }
        Ok(out)
    }

    fn drain(&mut self) {
        for h in self.pending.drain(..) {
            let _ = h.wait();
        }
    }
}

/// Match every remote incoming face against the views its predecessor sent.
pub fn resolve_remote_faces<G: SweepGrid + ?Sized>(
    grid: &G,
    cells: &mut [CellFaceSlots],
    locations: &LocationGraph,
    negotiation: &RemoteNegotiation,
) -> Result<(), SweepError> {
    let index = |views: &[PredecessorViews]| -> Vec<HashMap<u64, usize>> {
        views
            .iter()
            .map(|p| p.cells.iter().enumerate().map(|(i, c)| (c.global_id, i)).collect())
            .collect()
    };
    let regular = index(&negotiation.prelocs);
    let delayed = index(&negotiation.delayed_prelocs);

    for slots in cells.iter_mut() {
        let cell = grid.cell(slots.cell)?;
        for inc in slots.incoming.iter_mut() {
            let UpwindSource::AwaitingNegotiation { rank, neighbor } = inc.source else {
                continue;
            };
            let pred = locations.map_predecessor(rank)?;
            let (views, lookup, i) = match pred {
                Predecessor::Regular(i) => (&negotiation.prelocs, &regular, i),
                Predecessor::Delayed(i) => (&negotiation.delayed_prelocs, &delayed, i),
            };
            let pv = views.get(i).ok_or(SweepError::UnknownPartition {
                rank: locations.rank(),
                partition: rank,
            })?;
            let view = lookup[i]
                .get(&neighbor)
                .map(|&c| &pv.cells[c])
                .ok_or(SweepError::MissingPredecessorCell { rank, cell: neighbor })?;
            let face = &cell.faces[inc.face];
            let face_view = view.find_face(&face.vertex_ids).ok_or(
                SweepError::AssociatedFaceNotFound {
                    cell: cell.global_id,
                    face: inc.face,
                    neighbor,
                },
            )?;
            let dof_map = face.dof_map_onto(&face_view.vertex_ids).map_err(|vertex| {
                SweepError::AssociatedVertexNotFound {
                    cell: cell.global_id,
                    face: inc.face,
                    vertex,
                }
            })?;
            inc.source = match pred {
                Predecessor::Regular(p) => UpwindSource::NonLocal {
                    predecessor: p,
                    offset: face_view.slot,
                    dof_map,
                },
                Predecessor::Delayed(p) => UpwindSource::DelayedNonLocal {
                    predecessor: p,
                    offset: face_view.slot,
                    dof_map,
                },
            };
        }
    }
    Ok(())
}
