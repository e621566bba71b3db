//! Runs on the MPI transport. Needs a launcher:
//!
//! ```text
//! mpirun -n 4 cargo test -p swarm --features cluster --test cluster_tests -- --ignored
//! ```
//!
//! MPI can be initialized once per process, so this file holds a single run.
#![cfg(feature = "cluster")]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use swarm::{Registry, SwarmConfig, Transport, run};

/// Above the eager limit of common MPI builds, so sends are rendezvous.
const PAYLOAD: usize = 96 * 1024;

fn payload(seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..PAYLOAD).map(|_| rng.random()).collect()
}

fn reverse(mut bytes: Vec<u8>) -> Vec<u8> {
    bytes.reverse();
    bytes
}

#[test]
#[ignore = "needs mpirun with at least 2 ranks"]
fn test_large_frames_in_both_directions() {
    let mut registry = Registry::<()>::new();
    let flip = registry.map("flip", reverse).unwrap();

    // Blocking requested on purpose: every task is sent before any response
    // is read while workers answer with frames just as large.
    let config = SwarmConfig {
        blocking_sends: true,
        ..SwarmConfig::default()
    };
    let out = run(Transport::Cluster, &registry, config, |swarm| {
        let items = 4 * swarm.workers();
        let input: Vec<Vec<u8>> = (0..items as u64).map(payload).collect();
        let got = swarm.map(&input, &flip)?;
        Ok((input, got))
    })
    .unwrap();

    if let Some((input, got)) = out {
        assert_eq!(got.len(), input.len());
        for (sent, back) in input.into_iter().zip(got) {
            assert_eq!(back.len(), PAYLOAD);
            assert_eq!(back, reverse(sent));
        }
    }
}
