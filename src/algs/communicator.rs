//! Thin façade over intra-process (threads) or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees). Sends are
//! fire-and-forget: the buffer is copied (or, under MPI, buffered) before
//! `isend` returns. Receives are "any source, any tag", optionally blocking;
//! the advection loop has exactly one blocking call site.
//!
//! Per sender/receiver pair, messages are delivered in send order. Nothing is
//! assumed about the interleaving of different senders.

use crate::mesh_error::MeshAdvectError;
use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::{Arc, Barrier};
use std::time::Duration;

/// Typed message tag.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommTag(pub u16);

impl CommTag {
    pub const fn new(tag: u16) -> Self {
        Self(tag)
    }
    pub const fn as_u16(self) -> u16 {
        self.0
    }
    /// Derive a related tag; wraps on overflow.
    pub const fn offset(self, by: u16) -> Self {
        Self(self.0.wrapping_add(by))
    }
}

/// A received message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub source: usize,
    pub tag: CommTag,
    pub payload: Bytes,
}

/// Non-blocking communication interface.
pub trait Communicator {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// Post a send of `buf` to `peer`. The buffer is copied, and the send
    /// completes without the receiver's participation.
    fn isend(&self, peer: usize, tag: CommTag, buf: &[u8]);

    /// Take the next message from any peer. With `block`, wait until one arrives.
    fn recv_any(&self, block: bool) -> Result<Option<Envelope>, MeshAdvectError>;

    /// Collective sum across all ranks. Only used outside the steady-state loop.
    fn all_reduce_sum(&self, local: i64) -> Result<i64, MeshAdvectError>;

    /// True for the serial no-op backend.
    fn is_no_comm(&self) -> bool {
        false
    }
}

/// Compile-time no-op comm for single-rank runs and pure serial unit tests.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn isend(&self, _peer: usize, _tag: CommTag, _buf: &[u8]) {}

    fn recv_any(&self, block: bool) -> Result<Option<Envelope>, MeshAdvectError> {
        if block {
            return Err(MeshAdvectError::CommError {
                neighbor: 0,
                source: "blocking receive on a single-rank communicator would never return".into(),
            });
        }
        Ok(None)
    }

    fn all_reduce_sum(&self, local: i64) -> Result<i64, MeshAdvectError> {
        Ok(local)
    }

    fn is_no_comm(&self) -> bool {
        true
    }
}

// --- RayonComm: intra-process, one thread per rank ---

struct Mailbox {
    queue: Mutex<VecDeque<Envelope>>,
    ready: Condvar,
}

struct LocalWorld {
    mailboxes: Vec<Mailbox>,
    reduce: Mutex<i64>,
    barrier: Barrier,
    timeout: Option<Duration>,
}

/// In-process communicator: every rank is a handle onto one shared world.
///
/// Collectives synchronize all handles of the world, so each rank must run on
/// its own thread when `all_reduce_sum` is used.
#[derive(Clone)]
pub struct RayonComm {
    rank: usize,
    world: Arc<LocalWorld>,
}

impl std::fmt::Debug for RayonComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RayonComm")
            .field("rank", &self.rank)
            .field("size", &self.world.mailboxes.len())
            .finish()
    }
}

impl RayonComm {
    /// Create `n` connected ranks.
    pub fn world(n: usize) -> Vec<RayonComm> {
        Self::build(n, None)
    }

    /// Like [`RayonComm::world`], but a blocking receive fails after `timeout`.
    pub fn world_with_timeout(n: usize, timeout: Duration) -> Vec<RayonComm> {
        Self::build(n, Some(timeout))
    }

    fn build(n: usize, timeout: Option<Duration>) -> Vec<RayonComm> {
        let world = Arc::new(LocalWorld {
            mailboxes: (0..n)
                .map(|_| Mailbox {
                    queue: Mutex::new(VecDeque::new()),
                    ready: Condvar::new(),
                })
                .collect(),
            reduce: Mutex::new(0),
            barrier: Barrier::new(n.max(1)),
            timeout,
        });
        (0..n)
            .map(|rank| RayonComm {
                rank,
                world: world.clone(),
            })
            .collect()
    }

    /// Messages waiting in this rank's mailbox.
    pub fn pending(&self) -> usize {
        self.world.mailboxes[self.rank].queue.lock().len()
    }
}

impl Communicator for RayonComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.world.mailboxes.len()
    }

    fn isend(&self, peer: usize, tag: CommTag, buf: &[u8]) {
        let Some(mb) = self.world.mailboxes.get(peer) else {
            log::warn!("rank {} dropped send to nonexistent rank {peer}", self.rank);
            return;
        };
        mb.queue.lock().push_back(Envelope {
            source: self.rank,
            tag,
            payload: Bytes::copy_from_slice(buf),
        });
        mb.ready.notify_one();
    }

    fn recv_any(&self, block: bool) -> Result<Option<Envelope>, MeshAdvectError> {
        let mb = &self.world.mailboxes[self.rank];
        let mut queue = mb.queue.lock();
        if block {
            while queue.is_empty() {
                match self.world.timeout {
                    Some(t) => {
                        if mb.ready.wait_for(&mut queue, t).timed_out() && queue.is_empty() {
                            return Err(MeshAdvectError::CommError {
                                neighbor: self.rank,
                                source: format!("blocking receive timed out after {t:?}").into(),
                            });
                        }
                    }
                    None => mb.ready.wait(&mut queue),
                }
            }
        }
        Ok(queue.pop_front())
    }

    fn all_reduce_sum(&self, local: i64) -> Result<i64, MeshAdvectError> {
        *self.world.reduce.lock() += local;
        self.world.barrier.wait();
        let total = *self.world.reduce.lock();
        if self.world.barrier.wait().is_leader() {
            *self.world.reduce.lock() = 0;
        }
        self.world.barrier.wait();
        Ok(total)
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use mpi::collective::SystemOperation;
    use mpi::environment::Universe;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;

    /// Attached buffer for buffered-mode sends.
    pub const DEFAULT_BSEND_BYTES: usize = 64 << 20;

    pub struct MpiComm {
        world: SimpleCommunicator,
        rank: usize,
        size: usize,
        // Dropped last: finalizes MPI.
        _universe: Universe,
    }

    impl MpiComm {
        pub fn new() -> Result<Self, MeshAdvectError> {
            Self::with_send_buffer(DEFAULT_BSEND_BYTES)
        }

        /// Initialize MPI and attach `bytes` of buffer so sends complete locally.
        pub fn with_send_buffer(bytes: usize) -> Result<Self, MeshAdvectError> {
            let mut universe = mpi::initialize().ok_or_else(|| MeshAdvectError::CommError {
                neighbor: 0,
                source: "MPI was already initialized".into(),
            })?;
            universe.set_buffer_size(bytes);
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Ok(Self {
                world,
                rank,
                size,
                _universe: universe,
            })
        }
    }

    impl Communicator for MpiComm {
        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn isend(&self, peer: usize, tag: CommTag, buf: &[u8]) {
            self.world
                .process_at_rank(peer as i32)
                .buffered_send_with_tag(buf, i32::from(tag.as_u16()));
        }

        fn recv_any(&self, block: bool) -> Result<Option<Envelope>, MeshAdvectError> {
            let any = self.world.any_process();
            let matched = if block {
                Some(any.matched_probe())
            } else {
                any.immediate_matched_probe()
            };
            Ok(matched.map(|(msg, status)| {
                let (data, _) = msg.matched_receive_vec::<u8>();
                Envelope {
                    source: status.source_rank() as usize,
                    tag: CommTag::new(status.tag() as u16),
                    payload: Bytes::from(data),
                }
            }))
        }

        fn all_reduce_sum(&self, local: i64) -> Result<i64, MeshAdvectError> {
            let mut global = 0i64;
            self.world
                .all_reduce_into(&local, &mut global, SystemOperation::sum());
            Ok(global)
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rayon_roundtrip_two_ranks() {
        let w = RayonComm::world(2);
        w[0].isend(1, CommTag::new(7), &[1, 2, 3, 4]);
        let env = w[1].recv_any(false).unwrap().expect("message from rank 0");
        assert_eq!(env.source, 0);
        assert_eq!(env.tag, CommTag::new(7));
        assert_eq!(&env.payload[..], &[1, 2, 3, 4]);
        assert!(w[1].recv_any(false).unwrap().is_none());
    }

    #[test]
    fn blocking_receive_times_out() {
        let w = RayonComm::world_with_timeout(1, Duration::from_millis(10));
        assert!(matches!(
            w[0].recv_any(true),
            Err(MeshAdvectError::CommError { .. })
        ));
    }

    #[test]
    fn no_comm_refuses_to_block() {
        assert!(NoComm.recv_any(true).is_err());
        assert!(NoComm.recv_any(false).unwrap().is_none());
        assert_eq!(NoComm.all_reduce_sum(5).unwrap(), 5);
    }
}
