// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the hiden-rga project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use clap::Parser;
use hiden_rga::modbus::registers_to_f32;
use std::error::Error;
use tokio::time::Duration;
use tokio_modbus::prelude::*;

/// Modbus client reading the RGA register map
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Modbus server address
    #[clap(long, default_value = "127.0.0.1")]
    address: String,

    /// Modbus server port
    #[clap(long, default_value = "502")]
    port: u16,

    /// Number of MID channels configured on the server
    #[clap(long, default_value = "10")]
    channels: u16,

    /// Write this value to the Acquire holding register before reading
    #[clap(long)]
    acquire: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    let args = Args::parse();
    let n = args.channels;

    let socket_addr = format!("{}:{}", args.address, args.port).parse()?;
    println!("Connecting to Modbus server at {}", socket_addr);
    let mut ctx = tcp::connect_slave(socket_addr, Slave(1)).await?;

    if let Some(acquire) = args.acquire {
        println!("Writing Acquire = {}", acquire);
        ctx.write_single_register(1, acquire).await??;
    }

    let quantity = 4 * n + 3;
    println!("Reading {} input registers", quantity);
    let response = tokio::time::timeout(
        Duration::from_secs(1),
        ctx.read_input_registers(0, quantity),
    )
    .await???;

    for i in 0..n as usize {
        let reading = registers_to_f32(response[2 * i], response[2 * i + 1]);
        let mass_at = 2 * n as usize + 2 * i;
        let mass = registers_to_f32(response[mass_at], response[mass_at + 1]);
        println!("MID{:<2} mass {:>6.1}  reading {:.4e}", i + 1, mass, reading);
    }

    let status = response[4 * n as usize];
    let label = match status {
        0 => "Idle",
        1 => "Running",
        2 => "Error",
        _ => "Unknown",
    };
    println!("Status Code = {} ({})", status, label);

    let low_word = response[4 * n as usize + 1] as u32;
    let high_word = response[4 * n as usize + 2] as u32;
    let timestamp = (high_word << 16) | low_word;
    let datetime = chrono::DateTime::from_timestamp(timestamp as i64, 0).unwrap_or_default();
    println!("Last reading: {} ({})", timestamp, datetime);

    let control = ctx.read_holding_registers(0, 2).await??;
    println!("OpenExp = {}, Acquire = {}", control[0], control[1]);

    ctx.disconnect().await?;
    Ok(())
}
