//! Thin façade over intra-process (mailbox) or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees).
//! All handles are **waitable**; callers `.wait()` before trusting that a
//! buffer has arrived. `iprobe` lets the sweep scheduler test for an
//! upstream message without blocking, which is what keeps several angle
//! sets in flight on one thread of control.

use bytes::Bytes;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::collections::VecDeque;
use std::sync::Arc;

/// Typed message tag.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommTag(u16);

impl CommTag {
    pub const fn new(tag: u16) -> Self {
        CommTag(tag)
    }

    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Tag `k` steps above this one (wrapping).
    #[inline]
    pub const fn offset(self, k: u16) -> Self {
        CommTag(self.0.wrapping_add(k))
    }

    /// Tag `k` steps above this one, or `None` if it would leave the tag
    /// space (the barrier tag is reserved).
    pub fn checked_offset(self, k: usize) -> Option<Self> {
        let t = (self.0 as usize).checked_add(k)?;
        if t < BARRIER_TAG.0 as usize {
            Some(CommTag(t as u16))
        } else {
            None
        }
    }
}

/// Tag reserved for [`Communicator::barrier`].
pub const BARRIER_TAG: CommTag = CommTag(u16::MAX);

/// Tag pair for length-prefixed exchanges: counts travel on `sizes`,
/// payloads on `data`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ExchangeTags {
    pub sizes: CommTag,
    pub data: CommTag,
}

impl ExchangeTags {
    pub const fn from_base(base: CommTag) -> Self {
        Self {
            sizes: base,
            data: base.offset(1),
        }
    }
}

/// Non-blocking communication interface.
pub trait Communicator {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    /// Post a receive of at most `buf.len()` bytes; the data is returned by `wait`.
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;
    /// Byte length of the next pending message from `peer` on `tag`, if any.
    fn iprobe(&self, peer: usize, tag: u16) -> Option<usize>;
    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// Block until a message from `peer` on `tag` is pending; returns its length.
    fn probe(&self, peer: usize, tag: u16) -> usize {
        loop {
            if let Some(n) = self.iprobe(peer, tag) {
                return n;
            }
            std::thread::yield_now();
        }
    }

    /// All ranks reach this point before any leaves it.
    fn barrier(&self) {
        let (me, n) = (self.rank(), self.size());
        if n <= 1 {
            return;
        }
        let token = [1u8];
        let sends: Vec<_> = (0..n)
            .filter(|&p| p != me)
            .map(|p| self.isend(p, BARRIER_TAG.as_u16(), &token))
            .collect();
        for p in (0..n).filter(|&p| p != me) {
            let mut b = [0u8; 1];
            let _ = self.irecv(p, BARRIER_TAG.as_u16(), &mut b).wait();
        }
        for s in sends {
            let _ = s.wait();
        }
    }

    /// True for the serial no-op backend.
    fn is_no_comm(&self) -> bool {
        false
    }
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

/// Compile-time no-op comm for pure serial runs.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}
    fn iprobe(&self, _peer: usize, _tag: u16) -> Option<usize> {
        None
    }
    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn is_no_comm(&self) -> bool {
        true
    }
}

// --- RayonComm: intra-process / multi-thread ---
type Key = (usize, usize, u16); // (src, dst, tag)
type Mailbox = DashMap<Key, VecDeque<Bytes>>;

static MAILBOX: Lazy<Arc<Mailbox>> = Lazy::new(|| Arc::new(DashMap::new()));

/// Ranks simulated as threads of one process, exchanging through a shared
/// mailbox. Messages with the same `(src, dst, tag)` are delivered in FIFO
/// order.
#[derive(Clone, Debug)]
pub struct RayonComm {
    rank: usize,
    size: usize,
    mailbox: Arc<Mailbox>,
}

impl RayonComm {
    /// A rank attached to the process-wide mailbox.
    pub fn new(rank: usize, size: usize) -> Self {
        Self {
            rank,
            size,
            mailbox: Arc::clone(&MAILBOX),
        }
    }

    /// `size` ranks sharing a fresh, private mailbox.
    pub fn world(size: usize) -> Vec<Self> {
        let mailbox: Arc<Mailbox> = Arc::new(DashMap::new());
        (0..size)
            .map(|rank| Self {
                rank,
                size,
                mailbox: Arc::clone(&mailbox),
            })
            .collect()
    }
}

/// Pending receive from the mailbox; resolved lazily in `wait`.
pub struct LocalRecv {
    mailbox: Arc<Mailbox>,
    key: Key,
    max_len: usize,
}

impl Wait for LocalRecv {
    fn wait(self) -> Option<Vec<u8>> {
        loop {
            if let Some(mut queue) = self.mailbox.get_mut(&self.key) {
                if let Some(bytes) = queue.pop_front() {
                    let n = bytes.len().min(self.max_len);
                    return Some(bytes[..n].to_vec());
                }
            }
            std::thread::yield_now();
        }
    }
}

impl Communicator for RayonComm {
    type SendHandle = ();
    type RecvHandle = LocalRecv;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
        let key = (self.rank, peer, tag);
        self.mailbox
            .entry(key)
            .or_default()
            .push_back(Bytes::copy_from_slice(buf));
    }

    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> LocalRecv {
        LocalRecv {
            mailbox: Arc::clone(&self.mailbox),
            key: (peer, self.rank, tag),
            max_len: buf.len(),
        }
    }

    fn iprobe(&self, peer: usize, tag: u16) -> Option<usize> {
        self.mailbox
            .get(&(peer, self.rank, tag))
            .and_then(|q| q.front().map(|b| b.len()))
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::{Communicator, Wait};
    use mpi::collective::CommunicatorCollectives;
    use mpi::datatype::Equivalence;
    use mpi::environment::Universe;
    use mpi::point_to_point::{Destination, Source};
    use mpi::request::{Request, StaticScope};
    use mpi::topology::{Communicator as _, SimpleCommunicator};
    use std::sync::Arc;

    pub struct MpiComm {
        world: Arc<SimpleCommunicator>,
        rank: usize,
        size: usize,
        _universe: Universe,
    }

    impl MpiComm {
        /// Initialise MPI; `None` if it was already initialised.
        pub fn new() -> Option<Self> {
            let universe = mpi::initialize()?;
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Some(Self {
                world: Arc::new(world),
                rank,
                size,
                _universe: universe,
            })
        }
    }

    /// Send request plus the heap copy it reads from; the copy is freed once
    /// the request completes.
    pub struct MpiSendHandle {
        req: Option<Request<'static, [u8], StaticScope>>,
        buf: Option<*mut [u8]>,
    }

    impl MpiSendHandle {
        fn complete(&mut self) {
            if let Some(req) = self.req.take() {
                req.wait();
            }
            if let Some(ptr) = self.buf.take() {
                // SAFETY: `ptr` came from `Box::leak` in `isend` and the only
                // reader (the request) has completed.
                unsafe { drop(Box::from_raw(ptr)) };
            }
        }
    }

    impl Wait for MpiSendHandle {
        fn wait(mut self) -> Option<Vec<u8>> {
            self.complete();
            None
        }
    }

    impl Drop for MpiSendHandle {
        fn drop(&mut self) {
            self.complete();
        }
    }

    pub struct MpiRecvHandle {
        world: Arc<SimpleCommunicator>,
        peer: i32,
        tag: i32,
        max_len: usize,
    }

    impl Wait for MpiRecvHandle {
        fn wait(self) -> Option<Vec<u8>> {
            let (mut data, _status) = self
                .world
                .process_at_rank(self.peer)
                .receive_vec_with_tag::<u8>(self.tag);
            data.truncate(self.max_len);
            Some(data)
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiSendHandle;
        type RecvHandle = MpiRecvHandle;

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> MpiSendHandle {
            let leaked: &'static [u8] = Box::leak(buf.to_vec().into_boxed_slice());
            let ptr = leaked as *const [u8] as *mut [u8];
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_send_with_tag(StaticScope, leaked, tag as i32);
            MpiSendHandle {
                req: Some(req),
                buf: Some(ptr),
            }
        }

        fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> MpiRecvHandle {
            MpiRecvHandle {
                world: Arc::clone(&self.world),
                peer: peer as i32,
                tag: tag as i32,
                max_len: buf.len(),
            }
        }

        fn iprobe(&self, peer: usize, tag: u16) -> Option<usize> {
            self.world
                .process_at_rank(peer as i32)
                .immediate_probe_with_tag(tag as i32)
                .map(|status| status.count(u8::equivalent_datatype()) as usize)
        }

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn barrier(&self) {
            self.world.barrier();
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;
