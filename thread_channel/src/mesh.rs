//! MPSC-based n-to-n communication.
//!
//! Each node has a single MPSC receive queue shared by all senders.
//! This uses O(N) channels but has potential contention when multiple
//! nodes send to the same target.
//!
//! Besides receiving from whoever sent first, a node can wait for a message
//! from one specific peer ([`Mesh::recv_from`]). Messages from other peers that
//! arrive in the meantime are parked in a local stash and handed out by later
//! receives, so nothing is lost and per-sender order is kept.

use std::collections::VecDeque;
use std::marker::PhantomData;

use crate::mpsc::{MpscChannel, MpscChannelReceiver, MpscChannelSender, StdMpsc, TryRecvError};
use crate::{RecvError, SendError};

#[cfg(feature = "crossbeam")]
pub use crate::mpsc::CrossbeamMpsc;

/// Sender matrix: `all_senders[j][i]` holds node j's sender to node i's receive queue.
type SenderMatrix<T, M> = Vec<Vec<Option<<M as MpscChannel>::Sender<TaggedMessage<T>>>>>;

/// A message tagged with the sender's ID (internal).
struct TaggedMessage<T> {
    from: usize,
    data: T,
}

/// A node in a Mesh network.
///
/// Each node has a single receive queue that all other nodes send to.
///
/// The `M` type parameter selects the MPSC channel implementation.
/// Use [`create_mesh`] for the default `StdMpsc` implementation, or
/// [`create_mesh_with`] to select a different implementation.
pub struct Mesh<T: Send, M: MpscChannel = StdMpsc> {
    id: usize,
    num_nodes: usize,
    rx: M::Receiver<TaggedMessage<T>>,
    txs: Vec<Option<M::Sender<TaggedMessage<T>>>>,
    /// Messages skipped over by `recv_from`, in arrival order.
    stash: VecDeque<(usize, T)>,
    _marker: PhantomData<M>,
}

impl<T: Send, M: MpscChannel> Mesh<T, M> {
    /// Returns this node's ID.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Returns the number of nodes in the mesh, including this one.
    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    /// Returns the number of peers (excluding self).
    pub fn num_peers(&self) -> usize {
        self.num_nodes - 1
    }

    /// Number of messages parked by selective receives and not yet consumed.
    pub fn stashed(&self) -> usize {
        self.stash.len()
    }

    /// Sends a message to a specific peer.
    pub fn send(&self, to: usize, value: T) -> Result<(), SendError<T>> {
        if to >= self.num_nodes || to == self.id {
            return Err(SendError::InvalidPeer(value));
        }

        match &self.txs[to] {
            Some(tx) => tx
                .send(TaggedMessage {
                    from: self.id,
                    data: value,
                })
                .map_err(|e| SendError::Disconnected(e.0.data)),
            None => Err(SendError::InvalidPeer(value)),
        }
    }

    /// Attempts to receive a message from any peer.
    ///
    /// Returns the sender's ID and the received message if successful.
    pub fn try_recv(&mut self) -> Result<(usize, T), RecvError> {
        if let Some(parked) = self.stash.pop_front() {
            return Ok(parked);
        }
        match self.rx.try_recv() {
            Ok(msg) => Ok((msg.from, msg.data)),
            Err(TryRecvError::Empty) => Err(RecvError::Empty),
            Err(TryRecvError::Disconnected) => Err(RecvError::Disconnected),
        }
    }

    /// Receives a message from any peer, blocking until one is available.
    pub fn recv(&mut self) -> Result<(usize, T), RecvError> {
        if let Some(parked) = self.stash.pop_front() {
            return Ok(parked);
        }
        match self.rx.recv() {
            Ok(msg) => Ok((msg.from, msg.data)),
            Err(_) => Err(RecvError::Disconnected),
        }
    }

    /// Receives the next message sent by `from`, blocking until one arrives.
    ///
    /// Messages from other peers observed while waiting are stashed and
    /// returned by subsequent `recv`/`try_recv`/`recv_from` calls.
    pub fn recv_from(&mut self, from: usize) -> Result<T, RecvError> {
        if from >= self.num_nodes || from == self.id {
            return Err(RecvError::InvalidPeer);
        }

        if let Some(pos) = self.stash.iter().position(|(sender, _)| *sender == from) {
            if let Some((_, data)) = self.stash.remove(pos) {
                return Ok(data);
            }
        }

        loop {
            let msg = self.rx.recv().map_err(|_| RecvError::Disconnected)?;
            if msg.from == from {
                return Ok(msg.data);
            }
            self.stash.push_back((msg.from, msg.data));
        }
    }
}

/// Creates a Mesh network with `n` nodes using the default `StdMpsc` channel.
///
/// Returns a vector of `Mesh` nodes, each capable of communicating with
/// all other nodes through a single shared MPSC receive queue.
///
/// # Panics
/// Panics if `n` is 0.
pub fn create_mesh<T: Send>(n: usize) -> Vec<Mesh<T, StdMpsc>> {
    create_mesh_with::<T, StdMpsc>(n)
}

/// Creates a Mesh network with `n` nodes using a custom MPSC channel implementation.
///
/// # Panics
/// Panics if `n` is 0.
pub fn create_mesh_with<T: Send, M: MpscChannel>(n: usize) -> Vec<Mesh<T, M>> {
    assert!(n > 0, "must have at least one node");

    let mut receivers = Vec::with_capacity(n);
    let mut all_senders: SenderMatrix<T, M> =
        (0..n).map(|_| (0..n).map(|_| None).collect()).collect();

    for i in 0..n {
        let (tx, rx) = M::channel();
        receivers.push(rx);

        // All other nodes get a clone of this sender
        for (j, senders) in all_senders.iter_mut().enumerate() {
            if i != j {
                senders[i] = Some(tx.clone());
            }
        }
    }

    receivers
        .into_iter()
        .enumerate()
        .zip(all_senders)
        .map(|((id, rx), txs)| Mesh {
            id,
            num_nodes: n,
            rx,
            txs,
            stash: VecDeque::new(),
            _marker: PhantomData,
        })
        .collect()
}
