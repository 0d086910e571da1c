// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the hiden-rga project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Tests for the RgaModbusServer implementation
//!
//! These tests start a server over a PV database holding the RGA PVs and
//! connect to it with a Modbus client. Reads check the register map, writes
//! check that holding registers become puts on the control PVs.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use std::net::SocketAddr;

use approx::assert_relative_eq;
use tokio::net::TcpListener;
use tokio::time;
use tokio_modbus::{
    prelude::*,
    server::tcp::{accept_tcp_connection, Server},
};

use hiden_rga::config::{AcquisitionConfig, IocConfig};
use hiden_rga::ioc::rga::register_pvs;
use hiden_rga::ioc::{PutEvent, PvDatabase, PvValue, RgaPvNames};
use hiden_rga::modbus::{registers_to_f32, RgaModbusServer};

const CHANNELS: u16 = 4;

fn test_database() -> (Arc<PvDatabase>, Arc<RgaPvNames>) {
    let ioc = IocConfig {
        channels: CHANNELS as usize,
        ..IocConfig::default()
    };
    let db = Arc::new(PvDatabase::new());
    let names = RgaPvNames::from_config(&ioc);
    register_pvs(&db, &names, &ioc, &AcquisitionConfig::default()).unwrap();

    db.write(&names.readings[0], PvValue::Float(1.25e-9)).unwrap();
    db.write(&names.masses[0], PvValue::Float(28.0)).unwrap();
    db.write(&names.status, PvValue::Text("Running".into()))
        .unwrap();
    (db, Arc::new(names))
}

/// Test utility function to start a Modbus server in the background
async fn start_test_server(
    db: Arc<PvDatabase>,
    names: Arc<RgaPvNames>,
) -> Result<(SocketAddr, tokio::task::JoinHandle<()>), Box<dyn std::error::Error>> {
    // Use port 0 to let the OS assign an available port
    let socket_addr = SocketAddr::from_str("127.0.0.1:0").unwrap();
    let listener = TcpListener::bind(socket_addr).await?;
    let socket_addr = listener.local_addr()?;

    let server = Server::new(listener);
    let rga_modbus_service = move |_socket_addr| {
        Ok(Some(RgaModbusServer::new(
            Arc::clone(&db),
            Arc::clone(&names),
        )))
    };

    let on_connected = move |stream, socket_addr| {
        let service = rga_modbus_service.clone();
        async move { accept_tcp_connection(stream, socket_addr, service) }
    };

    let on_process_error = |err| {
        eprintln!("Server error: {}", err);
    };

    let handle = tokio::spawn(async move {
        if let Err(e) = server.serve(&on_connected, on_process_error).await {
            eprintln!("Server error: {}", e);
        }
    });

    // Give the server a moment to start
    time::sleep(Duration::from_millis(100)).await;

    Ok((socket_addr, handle))
}

#[tokio::test]
async fn test_read_input_registers() -> Result<(), Box<dyn std::error::Error>> {
    let (db, names) = test_database();
    let (socket_addr, _server_handle) = start_test_server(db, names).await?;
    let mut ctx = tcp::connect(socket_addr).await?;

    let n = CHANNELS;
    let data = ctx.read_input_registers(0, 4 * n + 3).await??;
    assert_eq!(data.len(), (4 * n + 3) as usize);

    assert_relative_eq!(registers_to_f32(data[0], data[1]), 1.25e-9);
    assert_eq!(registers_to_f32(data[2], data[3]), 0.0);
    let mass_at = (2 * n) as usize;
    assert_eq!(registers_to_f32(data[mass_at], data[mass_at + 1]), 28.0);

    // Status code: running
    assert_eq!(data[(4 * n) as usize], 1);

    // The reading timestamp is recent
    let timestamp =
        ((data[(4 * n + 2) as usize] as u32) << 16) | data[(4 * n + 1) as usize] as u32;
    let now = chrono::Utc::now().timestamp() as u32;
    assert!(now - timestamp < 60);

    ctx.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_timestamp_waits_for_first_reading() -> Result<(), Box<dyn std::error::Error>> {
    let ioc = IocConfig {
        channels: CHANNELS as usize,
        ..IocConfig::default()
    };
    let db = Arc::new(PvDatabase::new());
    let names = Arc::new(RgaPvNames::from_config(&ioc));
    register_pvs(&db, &names, &ioc, &AcquisitionConfig::default())?;

    let (socket_addr, _server_handle) = start_test_server(Arc::clone(&db), Arc::clone(&names)).await?;
    let mut ctx = tcp::connect(socket_addr).await?;
    let timestamp_register = 4 * CHANNELS + 1;

    assert_eq!(ctx.read_input_registers(timestamp_register, 2).await??, vec![0, 0]);

    db.write(&names.readings[1], PvValue::Float(3.0e-9))?;
    let data = ctx.read_input_registers(timestamp_register, 2).await??;
    let timestamp = ((data[1] as u32) << 16) | data[0] as u32;
    let now = chrono::Utc::now().timestamp() as u32;
    assert!(now - timestamp < 60);

    ctx.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_status_follows_pv() -> Result<(), Box<dyn std::error::Error>> {
    let (db, names) = test_database();
    let (socket_addr, _server_handle) = start_test_server(Arc::clone(&db), Arc::clone(&names)).await?;
    let mut ctx = tcp::connect(socket_addr).await?;
    let status_register = 4 * CHANNELS;

    db.write(&names.status, PvValue::Text("Error: lost".into()))?;
    assert_eq!(ctx.read_input_registers(status_register, 1).await??, vec![2]);

    db.write(&names.status, PvValue::Text("Idle".into()))?;
    assert_eq!(ctx.read_input_registers(status_register, 1).await??, vec![0]);

    ctx.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_holding_writes_are_puts() -> Result<(), Box<dyn std::error::Error>> {
    let (db, names) = test_database();
    let mut events = db.subscribe();
    let (socket_addr, _server_handle) = start_test_server(Arc::clone(&db), Arc::clone(&names)).await?;
    let mut ctx = tcp::connect(socket_addr).await?;

    assert_eq!(ctx.read_holding_registers(0, 2).await??, vec![0, 0]);

    ctx.write_single_register(1, 1).await??;
    let event = time::timeout(Duration::from_secs(1), events.recv()).await??;
    assert_eq!(
        event,
        PutEvent {
            name: names.acquire.clone(),
            value: PvValue::Int(1)
        }
    );

    ctx.write_multiple_registers(0, &[1, 0]).await??;
    let first = time::timeout(Duration::from_secs(1), events.recv()).await??;
    let second = time::timeout(Duration::from_secs(1), events.recv()).await??;
    assert_eq!(first.name, names.open_exp);
    assert_eq!(second.value, PvValue::Int(0));

    assert_eq!(ctx.read_holding_registers(0, 2).await??, vec![1, 0]);
    assert_eq!(db.value(&names.open_exp), Some(PvValue::Int(1)));

    ctx.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_invalid_register_address() -> Result<(), Box<dyn std::error::Error>> {
    let (db, names) = test_database();
    let (socket_addr, _server_handle) = start_test_server(db, names).await?;
    let mut ctx = tcp::connect(socket_addr).await?;

    let result = ctx.read_input_registers(4 * CHANNELS + 3, 1).await?;
    assert!(result.is_err());
    if let Err(error) = result {
        assert_eq!(error, ExceptionCode::IllegalDataAddress);
    }

    let result = ctx.write_single_register(2, 1).await?;
    assert!(result.is_err());

    ctx.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_unsupported_function() -> Result<(), Box<dyn std::error::Error>> {
    let (db, names) = test_database();
    let (socket_addr, _server_handle) = start_test_server(db, names).await?;
    let mut ctx = tcp::connect(socket_addr).await?;

    // Coils are not part of the register map
    let result = ctx.read_coils(0, 1).await?;
    assert!(result.is_err());
    if let Err(error) = result {
        assert_eq!(error, ExceptionCode::IllegalFunction);
    }

    ctx.disconnect().await?;
    Ok(())
}
