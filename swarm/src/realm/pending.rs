//! Sends that complete after the call that issued them.
//!
//! The queue is generic over the request type: a request is polled by a
//! closure returning `Ok(())` once it has completed (consuming it) or
//! `Err(request)` to hand it back still in flight.

use std::collections::VecDeque;

pub(crate) struct PendingSends<R> {
    queue: VecDeque<R>,
    threshold: usize,
}

impl<R> PendingSends<R> {
    pub fn new(threshold: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            threshold,
        }
    }

    /// Requests not yet seen to complete.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Queues `request`, sweeping first when `threshold` or more are
    /// already queued.
    pub fn push<F>(&mut self, request: R, poll: F)
    where
        F: FnMut(R) -> Result<(), R>,
    {
        if self.queue.len() >= self.threshold {
            self.sweep(poll);
        }
        self.queue.push_back(request);
    }

    /// Polls every queued request once and drops the completed ones.
    /// Returns how many completed. Issue order is kept for the rest.
    pub fn sweep<F>(&mut self, mut poll: F) -> usize
    where
        F: FnMut(R) -> Result<(), R>,
    {
        let before = self.queue.len();
        let mut still = VecDeque::with_capacity(before);
        while let Some(request) = self.queue.pop_front() {
            if let Err(request) = poll(request) {
                still.push_back(request);
            }
        }
        self.queue = still;
        let completed = before - self.queue.len();
        if completed > 0 {
            tracing::trace!(completed, pending = self.queue.len(), "swept send requests");
        }
        completed
    }

    /// Hands out every queued request, oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = R> + '_ {
        self.queue.drain(..)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Completes once polled `remaining` more times.
    #[derive(Debug, PartialEq)]
    struct Fake {
        id: u32,
        remaining: u32,
    }

    fn poll(mut request: Fake) -> Result<(), Fake> {
        if request.remaining == 0 {
            return Ok(());
        }
        request.remaining -= 1;
        Err(request)
    }

    fn fake(id: u32, remaining: u32) -> Fake {
        Fake { id, remaining }
    }

    #[test]
    fn test_sweep_drops_only_completed() {
        let mut sends = PendingSends::new(100);
        for (id, remaining) in [(0, 0), (1, 2), (2, 0), (3, 1)] {
            sends.push(fake(id, remaining), poll);
        }
        assert_eq!(sends.len(), 4);

        assert_eq!(sends.sweep(poll), 2);
        assert_eq!(sends.len(), 2);
        assert_eq!(sends.sweep(poll), 1);
        assert_eq!(sends.sweep(poll), 1);
        assert!(sends.is_empty());
        assert_eq!(sends.sweep(poll), 0);
    }

    #[test]
    fn test_push_sweeps_past_threshold() {
        let mut sends = PendingSends::new(2);
        sends.push(fake(0, 0), poll);
        sends.push(fake(1, 5), poll);
        assert_eq!(sends.len(), 2);

        // Third push finds the queue at the threshold and reclaims id 0 first.
        sends.push(fake(2, 0), poll);
        assert_eq!(sends.len(), 2);
        let ids: Vec<u32> = sends.drain().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(sends.is_empty());
    }

    #[test]
    fn test_sweep_keeps_issue_order() {
        let mut sends = PendingSends::new(usize::MAX);
        for id in 0..6 {
            sends.push(fake(id, id % 2), poll);
        }
        sends.sweep(poll);
        let left: Vec<Fake> = sends.drain().collect();
        assert_eq!(left, vec![fake(1, 0), fake(3, 0), fake(5, 0)]);
    }
}
