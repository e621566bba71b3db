//! Distribute work items over a pool of nodes and collect the results in
//! submission order.
//!
//! A run has one coordinator (rank 0, the thread or process that started it)
//! and `total - 1` workers. The coordinator body gets a [`Swarm`] and issues
//! collective calls on it; workers sit in a receive-execute-respond loop
//! until the body returns.
//!
//! Tasks refer to operations by name, so every node registers the same
//! operations in a [`Registry`] before the run:
//!
//! ```no_run
//! use swarm::{Registry, threads};
//!
//! let mut registry = Registry::<u32>::new();
//! let init = registry.factory("init", |rank| rank as u32).unwrap();
//! let offset = registry.map_context("offset", |ctx: &mut u32, v: u32| v + *ctx).unwrap();
//!
//! let out = threads(3, &registry, |swarm| {
//!     swarm.context(&init)?;
//!     swarm.parallelize(0..6u32).map_context(&offset)
//! })
//! .unwrap();
//! assert_eq!(out, vec![1, 3, 5, 4, 6, 8]);
//! ```
//!
//! Two transports implement [`Realm`]: in-process threads
//! ([`realm::threads`]) and MPI processes (`realm::cluster`, behind the
//! `cluster` feature).

pub mod codec;
pub mod error;
pub mod parallel;
pub mod realm;
pub mod registry;
pub mod runner;
pub mod swarm;
pub mod task;
pub mod worker;
pub mod workload;

pub use codec::Codec;
pub use error::{Error, Result};
pub use parallel::{Parallel, Stream};
pub use realm::{COORDINATOR, Mail, Parcel, Realm, Source};
pub use registry::{
    ContextMapOp, EachContextOp, EachOp, FactoryOp, GetOp, Handler, MapOp, Op, Registry,
};
pub use runner::{DEFAULT_RECLAIM_THRESHOLD, SwarmConfig, Transport, run, threads};
pub use swarm::{ReceiveNotifier, Swarm};
pub use task::{Response, Task};
pub use worker::Worker;
