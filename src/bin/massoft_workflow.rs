// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the hiden-rga project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Run one MASsoft experiment from the command line
//!
//! The default workflow uses the three-connection client: open the
//! experiment, start it, pull the data hotlink, follow the status until the
//! run stops, then print legends and file name and close. `--polled` uses
//! the single-connection interface instead and prints the scan table and a
//! few data listings.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use hiden_rga::config::Config;
use hiden_rga::massoft::{DataRequest, Hpr20Interface, MassoftClient};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Configuration file providing the MASsoft settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host running MASsoft
    #[arg(long)]
    host: Option<String>,

    /// MASsoft remote-control port
    #[arg(long)]
    port: Option<u16>,

    /// Experiment file to run
    #[arg(long, default_value = "file56.exp")]
    experiment: String,

    /// View to read
    #[arg(long, default_value_t = 1)]
    view: u32,

    /// Seconds to wait for the run to be confirmed
    #[arg(long, default_value_t = 45)]
    verify_timeout: u64,

    /// Seconds to wait for the run to stop
    #[arg(long, default_value_t = 300)]
    stop_timeout: u64,

    /// Use the single-connection polled interface
    #[arg(long)]
    polled: bool,

    /// Data listings fetched in polled mode
    #[arg(long, default_value_t = 3)]
    passes: usize,

    /// Enable debug logging
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(host) = &args.host {
        config.massoft.host = host.clone();
    }
    if let Some(port) = args.port {
        config.massoft.port = port;
    }

    if args.polled {
        polled_workflow(&config, &args).await
    } else {
        client_workflow(&config, &args).await
    }
}

/// Open, run, collect, wait for the stop, then close
///
/// The steps run one after another. The data hotlink is opened only once
/// the start has been confirmed, so rows streamed before that are not
/// collected.
async fn client_workflow(config: &Config, args: &Args) -> Result<()> {
    let mut client = MassoftClient::from_config(&config.massoft);
    client
        .initialize()
        .await
        .context("Failed to connect to MASsoft")?;
    client.open_experiment(&args.experiment).await?;

    client
        .run_experiment(
            &config.massoft.run_mode,
            args.view,
            Duration::from_secs(args.verify_timeout),
        )
        .await?;
    let data = client.get_data(DataRequest::new(args.view)).await?;
    client
        .monitor_until_stopped(Duration::from_secs(args.stop_timeout))
        .await?;

    let legends = client.get_legends(args.view).await?;
    let filename = client.query_filename().await?;

    println!("Legends: {:?}", legends);
    println!("Pulled {} data points from {:?}", data.len(), filename);

    client.close_experiment().await?;
    client.shutdown();
    Ok(())
}

async fn polled_workflow(config: &Config, args: &Args) -> Result<()> {
    let mut rga = Hpr20Interface::from_config(&config.massoft, Some(&args.experiment));
    rga.open_socket()
        .await
        .context("Failed to connect to MASsoft")?;
    rga.open_file().await?;
    info!("Using {}", rga.full_path());

    let scan = rga.scan_parameters(args.view).await?;
    println!("Scan parameters: {:?}", scan.headers);
    for row in &scan.rows {
        println!("  {}", row.join("\t"));
    }

    for pass in 1..=args.passes {
        let table = rga.collect_data(args.view).await?;
        println!("Pass {}: {} rows under {:?}", pass, table.len(), table.headers);
        for (header, values) in &table.to_columns() {
            println!("  {}: {:?}", header, values);
        }
    }

    let filename = rga.get_filename().await?;
    println!("Current file: {}", filename);
    rga.close_file().await?;
    rga.close_socket();
    Ok(())
}
