// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the hiden-rga project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Main entry point for the Hiden RGA bridge
use anyhow::Result;
use clap::Parser;
use hiden_rga::config::{self, Config};
use hiden_rga::daemon::Daemon;
use log::{error, info};

use std::path::PathBuf;
use tokio::signal;

/// Hiden HPR20 RGA bridge: MASsoft to process variables and Modbus
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Validate the configuration file and exit
    #[arg(long)]
    validate_config: Option<PathBuf>,

    /// Print the configuration JSON schema and exit
    #[arg(long)]
    show_config_schema: bool,

    /// Host running MASsoft
    #[arg(long)]
    massoft_host: Option<String>,

    /// MASsoft remote-control port
    #[arg(long)]
    massoft_port: Option<u16>,

    /// Experiment file opened by OpenExp
    #[arg(long)]
    experiment: Option<String>,

    /// Open the experiment and start acquiring at startup
    #[arg(long)]
    auto_start: bool,

    /// Enable or disable the Modbus server
    #[arg(long)]
    modbus_enabled: Option<bool>,

    /// Modbus server address
    #[arg(long)]
    modbus_address: Option<String>,

    /// Modbus server port
    #[arg(long)]
    modbus_port: Option<u16>,

    /// Enable debug logging
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Disable all logging
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.quiet {
        log::LevelFilter::Off
    } else if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if args.show_config_schema {
        return config::output_config_schema();
    }

    if let Some(validate_path) = args.validate_config {
        if !validate_path.exists() {
            return Err(anyhow::anyhow!(
                "Configuration file does not exist: {}",
                validate_path.display()
            ));
        }

        Config::from_file(&validate_path)
            .map_err(|err| anyhow::anyhow!("Configuration validation failed: {:#}", err))?;
        println!("Configuration file is valid: {}", validate_path.display());
        return Ok(());
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("config.yaml"));
    let mut config = Config::from_file(&config_path)?;

    config.apply_args(
        args.massoft_host.clone(),
        args.massoft_port,
        args.experiment.clone(),
        args.auto_start,
        args.modbus_enabled,
        args.modbus_address.clone(),
        args.modbus_port,
    );

    info!("Starting in daemon mode");
    let mut daemon = Daemon::new();
    daemon.launch(&config).await?;

    match signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal, terminating daemon"),
        Err(err) => error!("Error waiting for shutdown signal: {}", err),
    }
    daemon.shutdown();
    daemon.join().await?;

    Ok(())
}
