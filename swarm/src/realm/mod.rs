//! Transport abstraction shared by the in-process and cluster runs.
//!
//! A [`Realm`] is one node's handle onto the run: who am I, how many of us
//! are there, move bytes to and from peers, and meet everyone at a barrier.
//! The helpers on `dyn Realm` layer the framing [`Codec`] and the
//! distribution patterns (broadcast, round-robin) on top of those primitives.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::codec::Codec;
use crate::error::Result;

#[cfg(feature = "cluster")]
pub mod cluster;
#[cfg_attr(not(feature = "cluster"), allow(dead_code))]
pub(crate) mod pending;
pub mod threads;

/// Rank of the node that runs user orchestration code.
pub const COORDINATOR: usize = 0;

/// Which peer a receive should accept a message from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Whatever arrives first.
    Any,
    /// Only messages sent by this rank; others stay queued.
    Rank(usize),
}

/// A frame as it came off the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mail {
    pub sender: usize,
    pub buffer: Vec<u8>,
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Parcel<T> {
    pub sender: usize,
    pub payload: T,
}

/// One node's view of the transport.
pub trait Realm {
    /// This node's rank in `[0, total)`.
    fn rank(&self) -> usize;

    /// Number of nodes, coordinator included.
    fn total(&self) -> usize;

    /// Blocks until every node has called `barrier`.
    fn barrier(&mut self) -> Result<()>;

    /// Hands `buffer` to the transport for delivery to `dst`.
    ///
    /// With `blocking` set the call returns once the destination side has
    /// accepted the data; otherwise delivery may complete later. A transport
    /// whose blocking send can wait on a peer that is itself sending may
    /// treat every send as non-blocking.
    fn send(&mut self, buffer: Vec<u8>, dst: usize, blocking: bool) -> Result<()>;

    /// Receives the next frame matching `src`.
    fn recv(&mut self, src: Source) -> Result<Mail>;

    /// Framing settings every node of this realm agrees on.
    fn codec(&self) -> &Codec;

    /// Sends still in flight after polling each outstanding one.
    fn pending_sends(&mut self) -> usize {
        0
    }
}

impl dyn Realm + '_ {
    /// Every rank except this one.
    pub fn others(&self) -> Vec<usize> {
        let me = self.rank();
        (0..self.total()).filter(|&r| r != me).collect()
    }

    pub fn pack<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        self.codec().encode(value)
    }

    pub fn recv_parcel<T: DeserializeOwned>(&mut self, src: Source) -> Result<Parcel<T>> {
        let mail = self.recv(src)?;
        let payload = self.codec().decode(&mail.buffer)?;
        Ok(Parcel {
            sender: mail.sender,
            payload,
        })
    }

    pub fn send_to_coordinator<T: Serialize + ?Sized>(
        &mut self,
        value: &T,
        blocking: bool,
    ) -> Result<()> {
        let buffer = self.pack(value)?;
        self.send(buffer, COORDINATOR, blocking)
    }

    /// Packs `value` once and sends a copy to every other rank.
    pub fn send_to_others<T: Serialize + ?Sized>(
        &mut self,
        value: &T,
        blocking: bool,
    ) -> Result<()> {
        let buffer = self.pack(value)?;
        for dst in self.others() {
            self.send(buffer.clone(), dst, blocking)?;
        }
        Ok(())
    }

    /// Round-robin distribution over the workers: item `k` goes to rank
    /// `k % (total - 1) + 1`. Returns how many items were sent.
    pub fn send_evenly<T, I, F>(&mut self, items: I, blocking: bool, mut wrap: F) -> Result<usize>
    where
        I: IntoIterator<Item = T>,
        F: FnMut(usize, T) -> Result<Vec<u8>>,
    {
        let workers = self.total() - 1;
        let mut count = 0;
        for (index, item) in items.into_iter().enumerate() {
            let buffer = wrap(index, item)?;
            self.send(buffer, worker_for(index, workers), blocking)?;
            count += 1;
        }
        Ok(count)
    }

    /// Receives exactly `count` frames from any sender, in arrival order.
    pub fn recv_count<F>(&mut self, count: usize, mut action: F) -> Result<()>
    where
        F: FnMut(Mail) -> Result<()>,
    {
        for _ in 0..count {
            let mail = self.recv(Source::Any)?;
            action(mail)?;
        }
        Ok(())
    }
}

/// Rank that receives the item at position `index` when `workers` ranks
/// follow the coordinator.
pub fn worker_for(index: usize, workers: usize) -> usize {
    index % workers + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_robin_assignment() {
        let ranks: Vec<usize> = (0..7).map(|k| worker_for(k, 3)).collect();
        assert_eq!(ranks, vec![1, 2, 3, 1, 2, 3, 1]);
        assert!((0..10).all(|k| worker_for(k, 1) == 1));
    }
}
