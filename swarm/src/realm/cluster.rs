//! MPI realm: one process per rank, ranks assigned by the launcher.
//!
//! Receives learn the incoming length from MPI first, then read exactly
//! that many bytes. Every send is an `MPI_Isend` on a leaked buffer whose
//! request is queued; a rendezvous-sized blocking send would wait on a peer
//! that is itself still sending. Completed requests are swept once too many
//! are queued, at each barrier, and whenever the pending count is asked
//! for. Whatever is left is waited for on drop.

use mpi::collective::CommunicatorCollectives;
use mpi::datatype::Equivalence;
use mpi::environment::Universe;
use mpi::point_to_point::{Destination, Source as _};
use mpi::request::{Request, StaticScope};
use mpi::topology::{Communicator, SimpleCommunicator};

use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::realm::pending::PendingSends;
use crate::realm::{Mail, Realm, Source};

struct InFlight {
    request: Request<'static, [u8]>,
    buffer: *mut [u8],
}

impl InFlight {
    /// Frees the buffer if the send has completed, else hands it back.
    fn test(self) -> std::result::Result<(), Self> {
        let InFlight { request, buffer } = self;
        match request.test() {
            Ok(_) => {
                // SAFETY: the request has completed.
                unsafe { free_buffer(buffer) };
                Ok(())
            }
            Err(request) => Err(InFlight { request, buffer }),
        }
    }

    fn wait(self) {
        self.request.wait();
        // SAFETY: the request has completed.
        unsafe { free_buffer(self.buffer) };
    }
}

/// Frees a buffer handed out by `send`.
///
/// # Safety
/// `buffer` must come from `Box::into_raw` in `send`, and the request that
/// borrowed it must have completed.
unsafe fn free_buffer(buffer: *mut [u8]) {
    drop(unsafe { Box::from_raw(buffer) });
}

/// Realm handle of the current MPI process.
pub struct ClusterRealm {
    world: SimpleCommunicator,
    codec: Codec,
    sends: PendingSends<InFlight>,
    // Finalizes MPI when dropped, so it must outlive `world`.
    _universe: Universe,
}

impl ClusterRealm {
    /// Initializes MPI for this process. Fails if it was already initialized.
    pub fn init(codec: Codec, reclaim_threshold: usize) -> Result<Self> {
        let universe = mpi::initialize()
            .ok_or_else(|| Error::Cluster("MPI is already initialized".to_string()))?;
        let world = universe.world();
        tracing::debug!(rank = world.rank(), size = world.size(), "MPI initialized");
        Ok(Self {
            world,
            codec,
            sends: PendingSends::new(reclaim_threshold),
            _universe: universe,
        })
    }
}

impl Realm for ClusterRealm {
    fn rank(&self) -> usize {
        self.world.rank() as usize
    }

    fn total(&self) -> usize {
        self.world.size() as usize
    }

    fn barrier(&mut self) -> Result<()> {
        self.sends.sweep(InFlight::test);
        self.world.barrier();
        Ok(())
    }

    /// Always non-blocking; `blocking` has no effect here.
    fn send(&mut self, buffer: Vec<u8>, dst: usize, _blocking: bool) -> Result<()> {
        let process = self.world.process_at_rank(dst as i32);
        let raw = Box::into_raw(buffer.into_boxed_slice());
        // SAFETY: the allocation is only freed by `free_buffer`, after the
        // request reading it has completed.
        let view: &'static [u8] = unsafe { &*raw };
        let request = process.immediate_send(StaticScope, view);
        self.sends.push(
            InFlight {
                request,
                buffer: raw,
            },
            InFlight::test,
        );
        Ok(())
    }

    fn recv(&mut self, src: Source) -> Result<Mail> {
        let (message, status) = match src {
            Source::Any => self.world.any_process().matched_probe(),
            Source::Rank(rank) => self.world.process_at_rank(rank as i32).matched_probe(),
        };
        let count = status.count(u8::equivalent_datatype());
        let len = usize::try_from(count)
            .map_err(|_| Error::Cluster(format!("negative length {}", count)))?;
        let mut buffer = vec![0u8; len];
        let status = message.matched_receive_into(&mut buffer[..]);
        Ok(Mail {
            sender: status.source_rank() as usize,
            buffer,
        })
    }

    fn codec(&self) -> &Codec {
        &self.codec
    }

    fn pending_sends(&mut self) -> usize {
        self.sends.sweep(InFlight::test);
        self.sends.len()
    }
}

impl Drop for ClusterRealm {
    fn drop(&mut self) {
        if !self.sends.is_empty() {
            tracing::debug!(pending = self.sends.len(), "waiting for in-flight sends");
        }
        for inflight in self.sends.drain() {
            inflight.wait();
        }
    }
}
