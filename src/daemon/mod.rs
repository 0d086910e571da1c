// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the hiden-rga project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Daemon Module
//!
//! Starts, monitors and stops the background services of the RGA bridge:
//! the IOC, the Modbus server and the heartbeat.

pub mod launch_daemon;

pub use launch_daemon::Daemon;
