//! Message structure of one angle set's cross-rank traffic.
//!
//! The data one rank sends another for an angle set is split so that every
//! message fits under the eager limit and can be sent fire-and-forget:
//! a buffer that already fits is sent as one message per angle, a larger
//! one as `ceil(bytes / eager_limit)` messages. Both ends derive the split
//! from the same face dof count, so they agree without talking.
//!
//! Message `m` of angle set `s` travels on tag `base + s * max_messages + m`,
//! with `max_messages` agreed over all ranks during setup. Payloads are
//! native-endian `f64`.

use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::algs::wire::{cast_slice, cast_slice_mut, expect_exact_len};
use crate::sweep::fluds::{Fluds, FludsCommonData};
use crate::sweep_error::SweepError;

const VALUE_BYTES: usize = std::mem::size_of::<f64>();

/// Consecutive `(offset, len)` pieces of one buffer, in values.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessagePlan {
    offsets: Vec<usize>,
    sizes: Vec<usize>,
}

impl MessagePlan {
    /// Split `num_unknowns` values belonging to `num_angles` angles.
    pub fn split(num_unknowns: usize, num_angles: usize, eager_limit: usize) -> Self {
        if num_unknowns == 0 {
            return Self::default();
        }
        let per_message = (eager_limit / VALUE_BYTES).max(1);
        let count = if num_unknowns * VALUE_BYTES <= eager_limit {
            num_angles.max(1)
        } else {
            num_unknowns.div_ceil(per_message)
        };
        let size = num_unknowns.div_ceil(count);

        let mut plan = Self::default();
        let mut pos = 0;
        while pos < num_unknowns {
            let len = size.min(num_unknowns - pos);
            plan.offsets.push(pos);
            plan.sizes.push(len);
            pos += len;
        }
        plan
    }

    pub fn num_messages(&self) -> usize {
        self.sizes.len()
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Value range of message `m`.
    pub fn range(&self, m: usize) -> std::ops::Range<usize> {
        self.offsets[m]..self.offsets[m] + self.sizes[m]
    }

    pub fn total(&self) -> usize {
        self.sizes.iter().sum()
    }
}

/// Non-blocking receive of one message into `dest`; `Ok(false)` if it has
/// not arrived yet.
fn try_receive<C: Communicator>(
    comm: &C,
    peer: usize,
    tag: CommTag,
    dest: &mut [f64],
) -> Result<bool, SweepError> {
    let Some(len) = comm.iprobe(peer, tag.as_u16()) else {
        return Ok(false);
    };
    let expected = dest.len() * VALUE_BYTES;
    if len != expected {
        log::error!(
            "[rank {}] sweep message from rank {peer} on tag {} is {len} bytes, expected {expected}",
            comm.rank(),
            tag.as_u16()
        );
        return Err(SweepError::WireLengthMismatch {
            neighbor: peer,
            expected,
            got: len,
        });
    }
    let mut buf = vec![0u8; len];
    let data = comm
        .irecv(peer, tag.as_u16(), &mut buf)
        .wait()
        .ok_or_else(|| SweepError::comm(peer, "sweep message vanished after probe"))?;
    expect_exact_len(data.len(), expected).map_err(|e| SweepError::comm(peer, e))?;
    cast_slice_mut(dest).copy_from_slice(&data);
    Ok(true)
}

#[derive(Clone, Debug)]
pub struct SweepBuffer {
    tag_base: CommTag,
    preloc_ranks: Vec<usize>,
    delayed_preloc_ranks: Vec<usize>,
    deploc_ranks: Vec<usize>,
    preloc: Vec<MessagePlan>,
    delayed_preloc: Vec<MessagePlan>,
    deploc: Vec<MessagePlan>,
    preloc_received: Vec<Vec<bool>>,
    delayed_received: Vec<Vec<bool>>,
}

impl SweepBuffer {
    /// Message plans for an angle set of `num_angles` angles and
    /// `num_groups` groups. Tags are assigned later by
    /// [`SweepBuffer::assign_tags`].
    pub fn new(
        common: &FludsCommonData,
        num_groups: usize,
        num_angles: usize,
        eager_limit: usize,
    ) -> Self {
        let plans = |counts: &[usize]| -> Vec<MessagePlan> {
            counts
                .iter()
                .map(|&c| MessagePlan::split(c * num_groups * num_angles, num_angles, eager_limit))
                .collect()
        };
        let flags = |plans: &[MessagePlan]| -> Vec<Vec<bool>> {
            plans.iter().map(|p| vec![false; p.num_messages()]).collect()
        };
        let locations = common.plan().locations();
        let preloc = plans(common.preloc_face_dof_count());
        let delayed_preloc = plans(common.delayed_preloc_face_dof_count());
        Self {
            tag_base: CommTag::new(0),
            preloc_ranks: locations.location_dependencies().to_vec(),
            delayed_preloc_ranks: locations.delayed_location_dependencies().to_vec(),
            deploc_ranks: locations.location_successors().to_vec(),
            preloc_received: flags(&preloc),
            delayed_received: flags(&delayed_preloc),
            deploc: plans(common.deploc_face_dof_count()),
            preloc,
            delayed_preloc,
        }
    }

    /// Largest message count over every peer of this angle set.
    pub fn max_messages(&self) -> usize {
        self.preloc
            .iter()
            .chain(&self.delayed_preloc)
            .chain(&self.deploc)
            .map(MessagePlan::num_messages)
            .max()
            .unwrap_or(0)
    }

    /// Give angle set `set_id` its tag range. Fails if the range does not
    /// fit in the tag space.
    pub fn assign_tags(
        &mut self,
        base: CommTag,
        set_id: usize,
        max_messages: usize,
    ) -> Result<(), SweepError> {
        let first = set_id.checked_mul(max_messages);
        let last = first.and_then(|f| f.checked_add(max_messages.saturating_sub(1)));
        match (first, last) {
            (Some(first), Some(last)) if base.checked_offset(last).is_some() => {
                self.tag_base = base.offset(first as u16);
                Ok(())
            }
            _ => Err(SweepError::InvalidConfiguration(format!(
                "angle set {set_id} with {max_messages} messages overflows the tag space above {}",
                base.as_u16()
            ))),
        }
    }

    pub fn tag(&self, m: usize) -> CommTag {
        self.tag_base.offset(m as u16)
    }

    pub fn preloc_plans(&self) -> &[MessagePlan] {
        &self.preloc
    }

    pub fn deploc_plans(&self) -> &[MessagePlan] {
        &self.deploc
    }

    /// Forget which messages arrived, ahead of the next sweep.
    pub fn reset(&mut self) {
        for f in self.preloc_received.iter_mut().chain(&mut self.delayed_received) {
            f.fill(false);
        }
    }

    pub fn upstream_complete(&self) -> bool {
        self.preloc_received.iter().flatten().all(|&r| r)
    }

    pub fn delayed_complete(&self) -> bool {
        self.delayed_received.iter().flatten().all(|&r| r)
    }

    /// Pull in every upstream message that has arrived; returns how many.
    pub fn receive_upstream<C: Communicator>(
        &mut self,
        comm: &C,
        fluds: &mut Fluds,
    ) -> Result<usize, SweepError> {
        let mut n = 0;
        for (p, plan) in self.preloc.iter().enumerate() {
            let block = fluds.preloc_block_mut(p)?;
            for m in 0..plan.num_messages() {
                if self.preloc_received[p][m] {
                    continue;
                }
                let tag = self.tag_base.offset(m as u16);
                if try_receive(comm, self.preloc_ranks[p], tag, &mut block[plan.range(m)])? {
                    self.preloc_received[p][m] = true;
                    n += 1;
                }
            }
        }
        Ok(n)
    }

    /// Pull in every lagged message that has arrived; returns how many.
    pub fn receive_delayed<C: Communicator>(
        &mut self,
        comm: &C,
        fluds: &mut Fluds,
    ) -> Result<usize, SweepError> {
        let mut n = 0;
        for (p, plan) in self.delayed_preloc.iter().enumerate() {
            let block = fluds.delayed_preloc_block_mut(p)?;
            for m in 0..plan.num_messages() {
                if self.delayed_received[p][m] {
                    continue;
                }
                let tag = self.tag_base.offset(m as u16);
                if try_receive(comm, self.delayed_preloc_ranks[p], tag, &mut block[plan.range(m)])? {
                    self.delayed_received[p][m] = true;
                    n += 1;
                }
            }
        }
        Ok(n)
    }

    /// Post every downstream message.
    pub fn send_downstream<C: Communicator>(
        &self,
        comm: &C,
        fluds: &Fluds,
    ) -> Result<Vec<C::SendHandle>, SweepError> {
        let mut handles = Vec::new();
        for (s, plan) in self.deploc.iter().enumerate() {
            let buf = fluds.deploc_buffer(s)?;
            for m in 0..plan.num_messages() {
                let bytes = cast_slice(&buf[plan.range(m)]);
                handles.push(comm.isend(self.deploc_ranks[s], self.tag(m).as_u16(), bytes));
            }
        }
        Ok(handles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_buffers_split_per_angle() {
        let p = MessagePlan::split(12, 4, 32_000);
        assert_eq!(p.sizes(), &[3, 3, 3, 3]);
        assert_eq!(p.offsets(), &[0, 3, 6, 9]);
    }

    #[test]
    fn large_buffers_stay_under_the_limit() {
        // 10_000 values = 80_000 bytes -> 3 messages
        let p = MessagePlan::split(10_000, 2, 32_000);
        assert_eq!(p.num_messages(), 3);
        assert_eq!(p.total(), 10_000);
        assert!(p.sizes().iter().all(|&s| s * 8 <= 32_000));
    }

    #[test]
    fn uneven_split_never_overshoots() {
        let p = MessagePlan::split(5, 4, 32_000);
        assert_eq!(p.total(), 5);
        assert!(p.num_messages() <= 4);
        assert!(MessagePlan::split(0, 4, 32_000).sizes().is_empty());
    }

    #[test]
    fn exact_fit_is_not_split_by_size() {
        let p = MessagePlan::split(4000, 1, 32_000);
        assert_eq!(p.num_messages(), 1);
    }
}
