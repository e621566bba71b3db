//! Thread-safe channel implementations for inter-thread communication.
//!
//! This crate provides:
//! - `mesh`: MPSC-based n-to-n communication (single shared receive queue per node)
//! - `mpsc`: the pluggable MPSC backends the mesh is built on

pub mod mesh;
pub mod mpsc;

pub use mesh::{Mesh, create_mesh, create_mesh_with};
#[cfg(feature = "crossbeam")]
pub use mpsc::CrossbeamMpsc;
pub use mpsc::{MpscChannel, StdMpsc};

/// Error returned when sending fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError<T> {
    /// The target peer has disconnected.
    Disconnected(T),
    /// Invalid peer ID.
    InvalidPeer(T),
}

impl<T> SendError<T> {
    /// Recovers the value that could not be sent.
    pub fn into_inner(self) -> T {
        match self {
            SendError::Disconnected(v) | SendError::InvalidPeer(v) => v,
        }
    }
}

impl<T> std::fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendError::Disconnected(_) => write!(f, "peer has disconnected"),
            SendError::InvalidPeer(_) => write!(f, "invalid peer ID"),
        }
    }
}

impl<T: std::fmt::Debug> std::error::Error for SendError<T> {}

/// Error returned when receiving fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvError {
    /// All channels are empty.
    Empty,
    /// All senders have disconnected.
    Disconnected,
    /// Selective receive named a peer that does not exist.
    InvalidPeer,
}

impl std::fmt::Display for RecvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecvError::Empty => write!(f, "all channels are empty"),
            RecvError::Disconnected => write!(f, "all senders have disconnected"),
            RecvError::InvalidPeer => write!(f, "invalid peer ID"),
        }
    }
}

impl std::error::Error for RecvError {}
