// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the hiden-rga project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Hiden RGA bridge library
//!
//! Drives a Hiden HPR20 residual gas analyzer through MASsoft's remote
//! control port and publishes its channels as process variables, readable
//! over Modbus TCP.

pub mod config;
pub mod daemon;
pub mod ioc;
pub mod massoft;
pub mod modbus;
pub mod utility;
