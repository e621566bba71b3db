//! Error types for swarm.

use thiserror::Error;

/// Errors raised by transports, the task protocol and the coordinator API.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad construction parameter (worker count, config value).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Transport name not recognized by [`Transport::from_name`](crate::Transport::from_name).
    #[error("unknown transport '{0}'")]
    UnknownTransport(String),
    /// bincode failed to encode or decode a value.
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
    /// IO error from a compression stream.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Second encoding pass produced a different length than the counting pass.
    #[error("frame size mismatch: counted {expected} bytes, wrote {actual}")]
    FrameSize { expected: usize, actual: usize },
    /// Peer queue is gone or the peer rank does not exist.
    #[error("channel error talking to rank {rank}: {reason}")]
    Channel { rank: usize, reason: String },
    /// A node received something the protocol does not allow at that point.
    #[error("protocol violation from rank {sender}: {detail}")]
    ProtocolViolation { sender: usize, detail: String },
    /// No operation registered under this name.
    #[error("unknown operation '{0}'")]
    UnknownOperation(String),
    /// Operation name registered twice.
    #[error("operation '{0}' is already registered")]
    DuplicateOperation(String),
    /// Task shape does not match the registered handler kind.
    #[error("operation '{name}' is a {found} operation, expected {expected}")]
    OperationKind {
        name: String,
        expected: &'static str,
        found: &'static str,
    },
    /// Context read before `context(factory)` ran on this worker.
    #[error("worker {rank} has no context")]
    MissingContext { rank: usize },
    /// Failure reported by the cluster runtime.
    #[error("cluster error: {0}")]
    Cluster(String),
}

/// Result type for swarm operations.
pub type Result<T> = std::result::Result<T, Error>;
