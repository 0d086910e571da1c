// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the hiden-rga project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus communication module
//!
//! This module provides a Modbus TCP server that lets PLCs and SCADA
//! systems read the RGA channels and drive the acquisition through the
//! process variables.
//!
//! ## Key Components
//!
//! - `RgaModbusServer`: the `tokio_modbus` service mapping registers to PVs.
//!
//! ## Usage
//!
//! The Modbus server is normally started by the daemon when
//! `modbus.enabled` is set:
//!
//! ```no_run
//! use hiden_rga::config::Config;
//! use hiden_rga::daemon::launch_daemon::Daemon;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let mut config = Config::default();
//! config.modbus.enabled = true;
//! let mut daemon = Daemon::new();
//! daemon.launch(&config).await?;
//! # Ok(())
//! # }
//! ```
//!
//! See [`modbus_server`] for the register map.

pub mod modbus_server;
pub use modbus_server::{registers_to_f32, RgaModbusServer};
