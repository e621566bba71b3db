//! Wire protocol between the coordinator and its workers.
//!
//! Closures cannot travel between processes, so a task names a registered
//! operation and carries its argument as plain bincode. The receiving
//! worker resolves the name in its own [`Registry`](crate::Registry).

use serde::{Deserialize, Serialize};

/// A unit of work sent from the coordinator to one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Task {
    /// Apply a map or context-map operation to one collection element.
    /// The worker answers with a [`Response`] carrying the same `index`.
    Apply {
        index: usize,
        operation: String,
        payload: Vec<u8>,
    },
    /// Run a per-worker operation (factory, each, each-context, get) once on
    /// every worker. `sync` makes workers join a barrier afterwards.
    Broadcast { operation: String, sync: bool },
    /// Leave the worker loop, then join the closing barrier.
    Stop,
}

/// A worker's answer to one task.
///
/// `index` is the element position for collection operations and the
/// worker's rank for `get`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub index: usize,
    pub data: Vec<u8>,
}
