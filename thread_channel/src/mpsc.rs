//! Multi-producer single-consumer channel backends.
//!
//! The `Mesh` is generic over [`MpscChannel`], so the inbound queue of each
//! node can be swapped without touching the routing logic:
//! - [`StdMpsc`]: default, wraps `std::sync::mpsc`
//! - [`CrossbeamMpsc`] (feature `crossbeam`): wraps `crossbeam-channel`

use std::sync::mpsc;

// ============================================================================
// Abstract MPSC Traits
// ============================================================================

/// Abstract MPSC channel sender trait.
pub trait MpscChannelSender<T>: Clone + Send {
    /// Sends a value on this channel.
    fn send(&self, value: T) -> Result<(), SendError<T>>;
}

/// Abstract MPSC channel receiver trait.
pub trait MpscChannelReceiver<T>: Send {
    /// Attempts to receive a value without blocking.
    fn try_recv(&self) -> Result<T, TryRecvError>;

    /// Receives a value, blocking until one is available.
    fn recv(&self) -> Result<T, TryRecvError>;
}

/// Factory trait for creating MPSC channels.
pub trait MpscChannel: 'static + Send + Sync {
    /// The sender type for this channel.
    type Sender<T: Send>: MpscChannelSender<T>;
    /// The receiver type for this channel.
    type Receiver<T: Send>: MpscChannelReceiver<T>;

    /// Creates a new unbounded MPSC channel.
    fn channel<T: Send>() -> (Self::Sender<T>, Self::Receiver<T>);
}

// ============================================================================
// Error types
// ============================================================================

/// Error returned when sending fails because the receiver has disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendError<T>(pub T);

impl<T> std::fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sending on a disconnected channel")
    }
}

impl<T: std::fmt::Debug> std::error::Error for SendError<T> {}

/// Error returned when receiving fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryRecvError {
    /// The channel is empty.
    Empty,
    /// All senders have disconnected.
    Disconnected,
}

impl std::fmt::Display for TryRecvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TryRecvError::Empty => write!(f, "receiving on an empty channel"),
            TryRecvError::Disconnected => write!(f, "receiving on a disconnected channel"),
        }
    }
}

impl std::error::Error for TryRecvError {}

// ============================================================================
// std::sync::mpsc backend
// ============================================================================

/// Channel factory backed by `std::sync::mpsc`.
pub struct StdMpsc;

/// Sending half of a [`StdMpsc`] channel.
pub struct StdSender<T> {
    inner: mpsc::Sender<T>,
}

impl<T> Clone for StdSender<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send> MpscChannelSender<T> for StdSender<T> {
    fn send(&self, value: T) -> Result<(), SendError<T>> {
        self.inner.send(value).map_err(|e| SendError(e.0))
    }
}

/// Receiving half of a [`StdMpsc`] channel.
pub struct StdReceiver<T> {
    inner: mpsc::Receiver<T>,
}

impl<T: Send> MpscChannelReceiver<T> for StdReceiver<T> {
    fn try_recv(&self) -> Result<T, TryRecvError> {
        self.inner.try_recv().map_err(|e| match e {
            mpsc::TryRecvError::Empty => TryRecvError::Empty,
            mpsc::TryRecvError::Disconnected => TryRecvError::Disconnected,
        })
    }

    fn recv(&self) -> Result<T, TryRecvError> {
        self.inner.recv().map_err(|_| TryRecvError::Disconnected)
    }
}

impl MpscChannel for StdMpsc {
    type Sender<T: Send> = StdSender<T>;
    type Receiver<T: Send> = StdReceiver<T>;

    fn channel<T: Send>() -> (Self::Sender<T>, Self::Receiver<T>) {
        let (tx, rx) = mpsc::channel();
        (StdSender { inner: tx }, StdReceiver { inner: rx })
    }
}

// ============================================================================
// crossbeam-channel backend
// ============================================================================

/// Channel factory backed by `crossbeam-channel`.
#[cfg(feature = "crossbeam")]
pub struct CrossbeamMpsc;

#[cfg(feature = "crossbeam")]
impl<T: Send> MpscChannelSender<T> for crossbeam_channel::Sender<T> {
    fn send(&self, value: T) -> Result<(), SendError<T>> {
        crossbeam_channel::Sender::send(self, value).map_err(|e| SendError(e.0))
    }
}

#[cfg(feature = "crossbeam")]
impl<T: Send> MpscChannelReceiver<T> for crossbeam_channel::Receiver<T> {
    fn try_recv(&self) -> Result<T, TryRecvError> {
        crossbeam_channel::Receiver::try_recv(self).map_err(|e| match e {
            crossbeam_channel::TryRecvError::Empty => TryRecvError::Empty,
            crossbeam_channel::TryRecvError::Disconnected => TryRecvError::Disconnected,
        })
    }

    fn recv(&self) -> Result<T, TryRecvError> {
        crossbeam_channel::Receiver::recv(self).map_err(|_| TryRecvError::Disconnected)
    }
}

#[cfg(feature = "crossbeam")]
impl MpscChannel for CrossbeamMpsc {
    type Sender<T: Send> = crossbeam_channel::Sender<T>;
    type Receiver<T: Send> = crossbeam_channel::Receiver<T>;

    fn channel<T: Send>() -> (Self::Sender<T>, Self::Receiver<T>) {
        crossbeam_channel::unbounded()
    }
}
