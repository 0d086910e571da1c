// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the hiden-rga project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Serve the simulated MASsoft protocol on a TCP port

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use log::info;
use tokio::signal;

use hiden_rga::utility::{MassoftSimulator, SimulatorConfig};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1")]
    address: String,

    /// Port to listen on
    #[arg(long, default_value_t = 5026)]
    port: u16,

    /// Masses reported by the legends
    #[arg(long, value_delimiter = ',', default_value = "2,18,28,32,40,44")]
    masses: Vec<f64>,

    /// Polled queries answered 0 on each new connection
    #[arg(long, default_value_t = 2)]
    warmup_polls: usize,

    /// Milliseconds between streamed data rows
    #[arg(long, default_value_t = 100)]
    row_interval_ms: u64,

    /// Seconds an experiment runs after -xGo
    #[arg(long, default_value_t = 10)]
    run_time: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );
    let args = Args::parse();

    let config = SimulatorConfig {
        masses: args.masses,
        warmup_polls: args.warmup_polls,
        row_interval: Duration::from_millis(args.row_interval_ms),
        run_time: Duration::from_secs(args.run_time),
        ..SimulatorConfig::default()
    };
    let simulator =
        MassoftSimulator::bind(&format!("{}:{}", args.address, args.port), config).await?;
    info!("Simulated MASsoft ready on {}", simulator.local_addr()?);

    let server = simulator.spawn();
    signal::ctrl_c().await?;
    info!("Stopping simulator");
    server.abort();
    Ok(())
}
