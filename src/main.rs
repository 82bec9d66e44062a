//! RRC node entry point: parse CLI flags, load configuration, wire up
//! `RrcCore`, spawn the worker threads, and wait for a shutdown signal.

mod channel;
mod clients;
mod config;
mod core;
mod correlator;
mod event_loop;
mod fsm;
mod messages;
mod nc_slot;
mod neighbor;
mod piggyback;
mod priority_plane;
mod queue;
mod reservation;
mod slot_allocator;
mod stats;
mod types;

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use crate::config::RrcConfig;
use crate::core::RrcCore;

/// Radio Resource Control middle layer for a tactical mobile ad-hoc radio node.
#[derive(Parser, Debug)]
#[command(name = "rrc-node", version, about)]
struct Cli {
    /// This node's address on the mesh.
    #[arg(long, default_value_t = crate::types::SELF_DEFAULT)]
    node_id: u8,

    /// Path to a TOML configuration file. Missing fields fall back to defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp_millis()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => RrcConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => RrcConfig::default(),
    };

    log::info!("starting rrc-node, node_id={}", cli.node_id);

    let core = RrcCore::new(cli.node_id, config);
    core.global_fsm
        .apply(crate::fsm::Event::PowerOn, &core.stats)
        .map_err(|state| anyhow::anyhow!("unexpected startup FSM state: {state:?}"))?;

    let running = Arc::clone(&core.running);
    ctrlc::set_handler(move || {
        log::info!("shutdown signal received");
        running.store(false, Ordering::Relaxed);
    })
    .context("failed to install signal handler")?;

    let handles = event_loop::spawn_workers(Arc::clone(&core));
    for handle in handles {
        if handle.join().is_err() {
            log::error!("a worker thread panicked");
        }
    }

    core.global_fsm
        .apply(crate::fsm::Event::PowerOff, &core.stats)
        .ok();
    log::info!("rrc-node stopped cleanly");
    Ok(())
}
