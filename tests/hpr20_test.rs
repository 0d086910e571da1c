// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the hiden-rga project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Tests for the single-connection polled interface

use std::net::SocketAddr;
use std::time::Duration;

use hiden_rga::massoft::{Hpr20Interface, MassoftError, SocketSettings};
use hiden_rga::utility::{MassoftSimulator, SimulatorConfig};

async fn start_simulator(warmup_polls: usize) -> anyhow::Result<SocketAddr> {
    start_simulator_with(vec![2.0, 28.0, 32.0], warmup_polls).await
}

async fn start_simulator_with(masses: Vec<f64>, warmup_polls: usize) -> anyhow::Result<SocketAddr> {
    let config = SimulatorConfig {
        masses,
        warmup_polls,
        row_interval: Duration::from_millis(20),
        rows_per_query: 3,
        ..SimulatorConfig::default()
    };
    let simulator = MassoftSimulator::bind("127.0.0.1:0", config).await?;
    let addr = simulator.local_addr()?;
    simulator.spawn();
    Ok(addr)
}

fn interface(addr: SocketAddr, poll_attempts: u32) -> Hpr20Interface {
    let settings = SocketSettings {
        host: addr.ip().to_string(),
        port: addr.port(),
        retry_delay: Some(20),
        command_timeout: Duration::from_millis(500),
        receive_timeout: Duration::from_millis(100),
    };
    Hpr20Interface::new(
        settings,
        r"C:\exp\file56.exp",
        Duration::from_millis(10),
        poll_attempts,
    )
}

#[tokio::test]
async fn test_scan_parameters_after_warmup() -> anyhow::Result<()> {
    let addr = start_simulator(3).await?;
    let mut rga = interface(addr, 5);

    rga.open_socket().await?;
    rga.open_file().await?;

    let scan = rga.scan_parameters(1).await?;
    assert_eq!(scan.headers.len(), 11);
    assert_eq!(scan.headers[0], "Scan");
    assert_eq!(scan.len(), 3);
    assert_eq!(scan.column("Start"), Some(vec!["2", "28", "32"]));

    assert_eq!(rga.get_filename().await?, r"C:\exp\file56.exp");
    rga.close_file().await?;
    rga.close_socket();
    Ok(())
}

#[tokio::test]
async fn test_collect_data_under_headers() -> anyhow::Result<()> {
    let addr = start_simulator(0).await?;
    let mut rga = interface(addr, 3);
    rga.open_socket().await?;
    rga.open_file().await?;

    let headers = rga.data_headers(1).await?;
    assert_eq!(headers, vec!["mass 2", "mass 28", "mass 32"]);

    let table = rga.collect_data(1).await?;
    assert_eq!(table.len(), 3);
    let nitrogen = table.numeric_column("mass 28")?;
    assert!(nitrogen.iter().all(|v| *v > 1.0e-9 && *v < 1.3e-9));
    Ok(())
}

#[tokio::test]
async fn test_collect_single_mass_skips_acknowledgement() -> anyhow::Result<()> {
    let addr = start_simulator_with(vec![28.0], 0).await?;
    let mut rga = interface(addr, 3);
    rga.open_socket().await?;
    rga.open_file().await?;

    let table = rga.collect_data(1).await?;
    assert_eq!(table.headers, vec!["mass 28"]);
    assert_eq!(table.len(), 3);
    let nitrogen = table.numeric_column("mass 28")?;
    assert!(nitrogen.iter().all(|v| *v > 1.0e-9 && *v < 1.3e-9));
    Ok(())
}

#[tokio::test]
async fn test_parse_data_under_view_headers() -> anyhow::Result<()> {
    let addr = start_simulator(0).await?;
    let mut rga = interface(addr, 3);
    rga.open_socket().await?;
    rga.open_file().await?;

    let raw = "1\r\n5.0e-10\t1.2e-9\t2.5e-10\r\n0\r\n4.9e-10\t1.1e-9\r\n";
    let table = rga.parse_data(1, raw).await?;
    assert_eq!(table.headers, vec!["mass 2", "mass 28", "mass 32"]);
    assert_eq!(table.len(), 1);
    assert_eq!(table.numeric_column("mass 28")?, vec![1.2e-9]);
    Ok(())
}

#[tokio::test]
async fn test_polling_gives_up() -> anyhow::Result<()> {
    let addr = start_simulator(100).await?;
    let mut rga = interface(addr, 2);
    rga.open_socket().await?;
    rga.open_file().await?;

    match rga.data_headers(1).await {
        Err(MassoftError::PollExhausted { attempts, .. }) => assert_eq!(attempts, 2),
        other => panic!("expected poll exhaustion, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_refused_file() -> anyhow::Result<()> {
    let addr = start_simulator(0).await?;
    let settings = SocketSettings {
        host: addr.ip().to_string(),
        port: addr.port(),
        retry_delay: None,
        command_timeout: Duration::from_millis(500),
        receive_timeout: Duration::from_millis(100),
    };
    let mut rga = Hpr20Interface::new(
        settings,
        r"C:\exp\missing.exp",
        Duration::from_millis(10),
        1,
    );
    rga.open_socket().await?;
    assert!(matches!(
        rga.open_file().await,
        Err(MassoftError::OpenFailed(_))
    ));
    Ok(())
}
