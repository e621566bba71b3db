//! In-process realm: one OS thread per node, one inbound queue per node.
//!
//! Nodes talk through a [`thread_channel::Mesh`] carrying whole frames. The
//! thread that starts the run becomes rank 0; `total - 1` worker threads are
//! spawned next to it and each owns the realm handle for its rank, so a
//! node's identity is simply whichever handle its thread holds.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Barrier};
use std::thread;

use thread_channel::{Mesh, MpscChannel, StdMpsc, create_mesh_with};

use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::realm::{Mail, Realm, Source};
use crate::runner::fatal;

/// Realm handle for one thread of an in-process run.
pub struct ThreadRealm<M: MpscChannel = StdMpsc> {
    mesh: Mesh<Vec<u8>, M>,
    barrier: Arc<Barrier>,
    codec: Codec,
}

impl<M: MpscChannel> Realm for ThreadRealm<M> {
    fn rank(&self) -> usize {
        self.mesh.id()
    }

    fn total(&self) -> usize {
        self.mesh.num_nodes()
    }

    fn barrier(&mut self) -> Result<()> {
        self.barrier.wait();
        Ok(())
    }

    // Queues are unbounded, so enqueueing is acceptance and `blocking` has
    // nothing to wait for.
    fn send(&mut self, buffer: Vec<u8>, dst: usize, _blocking: bool) -> Result<()> {
        self.mesh.send(dst, buffer).map_err(|e| Error::Channel {
            rank: dst,
            reason: e.to_string(),
        })
    }

    fn recv(&mut self, src: Source) -> Result<Mail> {
        match src {
            Source::Any => {
                let (sender, buffer) = self.mesh.recv().map_err(|e| Error::Channel {
                    rank: self.mesh.id(),
                    reason: e.to_string(),
                })?;
                Ok(Mail { sender, buffer })
            }
            Source::Rank(sender) => {
                let buffer = self.mesh.recv_from(sender).map_err(|e| Error::Channel {
                    rank: sender,
                    reason: e.to_string(),
                })?;
                Ok(Mail { sender, buffer })
            }
        }
    }

    fn codec(&self) -> &Codec {
        &self.codec
    }
}

/// Builds the realm handles of an in-process run, index = rank.
///
/// # Panics
/// Panics if `total` is 0.
pub fn create_realms<M: MpscChannel>(total: usize, codec: Codec) -> Vec<ThreadRealm<M>> {
    let barrier = Arc::new(Barrier::new(total));
    create_mesh_with::<Vec<u8>, M>(total)
        .into_iter()
        .map(|mesh| ThreadRealm {
            mesh,
            barrier: Arc::clone(&barrier),
            codec,
        })
        .collect()
}

/// Runs `coordinator` on the calling thread as rank 0 and `worker` on
/// `total - 1` freshly spawned threads, then waits for all of them.
///
/// A worker that returns an error or panics takes the whole process down:
/// the other nodes would otherwise wait on it forever. The same holds for a
/// panicking coordinator, since joining its blocked workers would hang.
pub fn launch<M, T, W, F>(total: usize, codec: Codec, worker: W, coordinator: F) -> Result<T>
where
    M: MpscChannel,
    W: Fn(ThreadRealm<M>) -> Result<()> + Sync,
    F: FnOnce(ThreadRealm<M>) -> T,
{
    if total < 2 {
        return Err(Error::InvalidArgument(format!(
            "an in-process run needs at least one worker, got {} nodes",
            total
        )));
    }

    let mut workers = create_realms::<M>(total, codec);
    let root = workers.remove(0);

    thread::scope(|s| {
        for realm in workers {
            let rank = realm.rank();
            let worker = &worker;
            let spawned = thread::Builder::new()
                .name(format!("swarm-worker-{}", rank))
                .spawn_scoped(s, move || {
                    match panic::catch_unwind(AssertUnwindSafe(|| worker(realm))) {
                        Ok(Ok(())) => tracing::debug!(rank, "worker thread finished"),
                        Ok(Err(e)) => fatal(rank, &e),
                        Err(payload) => fatal(rank, &panic_message(payload.as_ref())),
                    }
                });
            if let Err(e) = spawned {
                fatal(rank, &e);
            }
        }

        match panic::catch_unwind(AssertUnwindSafe(|| coordinator(root))) {
            Ok(value) => Ok(value),
            Err(payload) => fatal(0, &panic_message(payload.as_ref())),
        }
    })
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}
