// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the hiden-rga project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! MASsoft protocol client
//!
//! Hiden's MASsoft drives the HPR20 analyzer and accepts remote commands on
//! a TCP port (5026 by default). The protocol is line oriented: a command
//! made of switches goes out terminated by CRLF and MASsoft answers with a
//! line of text, `1` for success and `0` for failure or "not ready".
//!
//! ## Key Components
//!
//! - [`Command`]: the commands and their wire form
//! - [`MassoftSocket`]: one connection with reply timeouts
//! - [`MassoftClient`]: command, status and data connections together
//! - [`Hpr20Interface`]: single connection with polled acknowledgements
//! - [`response`]: reshaping replies into rows and columns
//!
//! ## Usage
//!
//! ```no_run
//! use hiden_rga::config::MassoftConfig;
//! use hiden_rga::massoft::{DataRequest, MassoftClient};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let mut client = MassoftClient::from_config(&MassoftConfig::default());
//! client.initialize().await?;
//! client.open_experiment("file56.exp").await?;
//! let legends = client.get_legends(1).await?;
//! let rows = client.get_data(DataRequest::new(1).cycles(1)).await?;
//! println!("{legends:?} {rows:?}");
//! client.close_experiment().await?;
//! client.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod command;
pub mod connection;
pub mod error;
pub mod hpr20;
pub mod response;

pub use client::MassoftClient;
pub use command::{Command, DataRequest};
pub use connection::{MassoftSocket, SocketSettings};
pub use error::{MassoftError, MassoftResult};
pub use hpr20::Hpr20Interface;
pub use response::{Ack, DataRow, DataTable};
