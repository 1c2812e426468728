//! Length-prefixed point-to-point messages and small collectives built on them.
//!
//! Every message is a count on `tags.sizes` followed by the payload on
//! `tags.data`. Receivers compare the payload length against the announced
//! count and report a [`SweepError::WireLengthMismatch`] when they disagree.
//! Collectives post all sends first, then complete every receive and drain
//! every send handle before surfacing the first error.

use crate::algs::communicator::{Communicator, ExchangeTags, Wait};
use crate::algs::wire::{
    WireCount, cast_slice, cast_slice_mut, decode_u32s, encode_u32s, expect_exact_len,
};
use crate::sweep_error::SweepError;

/// Post the count and payload of one sized message to `peer`.
///
/// `count` is the number of `elem_size`-byte records in `payload`.
pub fn post_sized<C: Communicator>(
    comm: &C,
    peer: usize,
    tags: ExchangeTags,
    count: usize,
    payload: &[u8],
) -> [C::SendHandle; 2] {
    let header = WireCount::new(count);
    let h = comm.isend(
        peer,
        tags.sizes.as_u16(),
        cast_slice(std::slice::from_ref(&header)),
    );
    let d = comm.isend(peer, tags.data.as_u16(), payload);
    [h, d]
}

/// Bytes one sized message of `payload_len` bytes occupies on the wire.
pub fn sized_message_bytes(payload_len: usize) -> usize {
    std::mem::size_of::<WireCount>() + payload_len
}

/// Receive one sized message of `elem_size`-byte records from `peer`.
pub fn recv_sized<C: Communicator>(
    comm: &C,
    peer: usize,
    tags: ExchangeTags,
    elem_size: usize,
) -> Result<Vec<u8>, SweepError> {
    let mut cnt = WireCount::new(0);
    let data = comm
        .irecv(
            peer,
            tags.sizes.as_u16(),
            cast_slice_mut(std::slice::from_mut(&mut cnt)),
        )
        .wait()
        .ok_or_else(|| SweepError::comm(peer, format!("failed to receive size from rank {peer}")))?;
    expect_exact_len(data.len(), std::mem::size_of::<WireCount>())
        .map_err(|e| SweepError::comm(peer, e))?;
    cast_slice_mut(std::slice::from_mut(&mut cnt)).copy_from_slice(&data);

    let expected = cnt.get() * elem_size;
    let pending = comm.probe(peer, tags.data.as_u16());
    let mut buf = vec![0u8; pending.max(expected)];
    let payload = comm
        .irecv(peer, tags.data.as_u16(), &mut buf)
        .wait()
        .ok_or_else(|| SweepError::comm(peer, format!("failed to receive payload from rank {peer}")))?;
    if payload.len() != expected {
        log::error!(
            "[rank {}] payload from rank {peer} is {} bytes, header announced {expected}",
            comm.rank(),
            payload.len()
        );
        return Err(SweepError::WireLengthMismatch {
            neighbor: peer,
            expected,
            got: payload.len(),
        });
    }
    Ok(payload)
}

/// Every rank contributes a list; every rank gets all lists indexed by rank.
pub fn all_gather_u32<C: Communicator>(
    comm: &C,
    tags: ExchangeTags,
    mine: &[u32],
) -> Result<Vec<Vec<u32>>, SweepError> {
    let (me, n) = (comm.rank(), comm.size());
    if n <= 1 {
        return Ok(vec![mine.to_vec()]);
    }

    // 1) post all sends and keep buffers alive until completion
    let recs = encode_u32s(mine);
    let mut pending_sends = Vec::with_capacity(2 * (n - 1));
    for peer in (0..n).filter(|&p| p != me) {
        pending_sends.extend(post_sized(comm, peer, tags, recs.len(), cast_slice(&recs)));
    }

    // 2) receive from every peer, remember the first error but keep draining
    let mut out = vec![Vec::new(); n];
    out[me] = mine.to_vec();
    let mut maybe_err = None;
    for peer in (0..n).filter(|&p| p != me) {
        match recv_sized(comm, peer, tags, std::mem::size_of::<WireCount>()) {
            Ok(bytes) if maybe_err.is_none() => match decode_u32s(&bytes) {
                Ok(v) => out[peer] = v,
                Err(e) => maybe_err = Some(SweepError::comm(peer, e)),
            },
            Err(e) if maybe_err.is_none() => maybe_err = Some(e),
            _ => {}
        }
    }

    // 3) always drain all send handles before returning
    for send in pending_sends {
        let _ = send.wait();
    }

    match maybe_err {
        Some(err) => Err(err),
        None => Ok(out),
    }
}

/// Maximum of `value` over all ranks.
pub fn all_reduce_max<C: Communicator>(
    comm: &C,
    tags: ExchangeTags,
    value: usize,
) -> Result<usize, SweepError> {
    let gathered = all_gather_u32(comm, tags, &[value as u32])?;
    Ok(gathered
        .iter()
        .flat_map(|v| v.iter().copied())
        .max()
        .map_or(value, |m| m as usize))
}
