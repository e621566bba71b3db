//! Throughput benchmark: SHA-256 chains hashed across a swarm.
//!
//! Thread run:   swarm_bench --workers 8 --items 4096
//! Cluster run:  mpirun -n 9 swarm_bench --transport cluster --items 4096

use std::time::Instant;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use swarm::workload::sha256_chain;
use swarm::{Registry, SwarmConfig, Transport};

#[derive(Parser, Debug)]
#[command(name = "swarm_bench")]
#[command(about = "Hash SHA-256 chains on a swarm of workers")]
struct Cli {
    /// Transport: threads or cluster
    #[arg(short = 't', long, default_value = "threads")]
    transport: String,

    /// Worker threads (threads transport only)
    #[arg(short = 'w', long, default_value = "4")]
    workers: usize,

    /// Work items per pass
    #[arg(short = 'n', long, default_value = "1024")]
    items: u64,

    /// SHA-256 rounds per item
    #[arg(short = 'r', long, default_value = "1000")]
    rounds: usize,

    /// Number of timed passes
    #[arg(long, default_value = "3")]
    passes: usize,

    /// zlib-compress every frame
    #[arg(long)]
    compress: bool,

    /// zlib level used with --compress
    #[arg(long, default_value = "6")]
    level: u32,

    /// Send tasks without waiting for acceptance
    #[arg(long)]
    non_blocking: bool,
}

fn main() -> swarm::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let transport = Transport::from_name(&cli.transport, cli.workers)?;
    let config = SwarmConfig {
        compression: cli.compress,
        compression_level: cli.level,
        blocking_sends: !cli.non_blocking,
        ..SwarmConfig::default()
    };

    let rounds = cli.rounds;
    let mut registry = Registry::<usize>::new();
    let reset = registry.factory("reset", |_| 0)?;
    let hash = registry.map_context("hash", move |handled: &mut usize, seed: u64| {
        *handled += 1;
        sha256_chain(seed, rounds)
    })?;
    let leading_zero = registry.map("leading_zero", move |seed: u64| {
        sha256_chain(seed, rounds).starts_with('0')
    })?;
    let handled = registry.get("handled", |handled: &usize| *handled)?;

    let items = cli.items;
    let passes = cli.passes;
    let summary = swarm::run(transport, &registry, config, |swarm| {
        println!(
            "transport={} workers={} items={} rounds={} compress={} blocking={}",
            transport,
            swarm.workers(),
            items,
            rounds,
            config.compression,
            config.blocking_sends
        );
        swarm.context(&reset)?;

        let seeds: Vec<u64> = (0..items).collect();
        for pass in 0..passes {
            let start = Instant::now();
            let digests = swarm.map_context(&seeds, &hash)?;
            let elapsed = start.elapsed();
            println!(
                "pass {}: {} digests in {:.3}s ({:.0} items/s), first={}",
                pass,
                digests.len(),
                elapsed.as_secs_f64(),
                digests.len() as f64 / elapsed.as_secs_f64(),
                digests.first().map(String::as_str).unwrap_or("-")
            );
        }

        let start = Instant::now();
        let kept = swarm.filter(seeds, &leading_zero)?;
        println!(
            "filter: {} of {} seeds hash to a leading zero ({:.3}s)",
            kept.len(),
            items,
            start.elapsed().as_secs_f64()
        );

        swarm.get(&handled)
    })?;

    if let Some(per_worker) = summary {
        println!("items handled per worker: {:?}", per_worker);
    }
    Ok(())
}
