// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the hiden-rga project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Single-socket HPR20 interface with polled acknowledgements
//!
//! Listings such as legends or scan parameters are not always ready when
//! first asked for: MASsoft answers `0` until the view has been prepared.
//! This interface asks, waits one poll interval, asks again and keeps
//! polling while the answer is still `0`.

use std::time::Duration;

use log::{debug, info, warn};
use tokio::time;

use super::command::{experiment_path, Command, DataRequest};
use super::connection::{MassoftSocket, SocketSettings};
use super::error::{MassoftError, MassoftResult};
use super::response::{
    parse_data_block, parse_scan_parameters, split_fields, strip_ack_line, Ack, DataTable,
    SCAN_PARAMETER_COLUMNS,
};
use crate::config::MassoftConfig;

/// Experiment MASsoft keeps as "last file" when none is named
pub const LAST_FILE: &str = "HIDEN_LastFile";

pub struct Hpr20Interface {
    socket: MassoftSocket,
    full_path: String,
    poll_interval: Duration,
    poll_attempts: u32,
}

impl Hpr20Interface {
    pub fn new(
        settings: SocketSettings,
        full_path: impl Into<String>,
        poll_interval: Duration,
        poll_attempts: u32,
    ) -> Self {
        Self {
            socket: MassoftSocket::new("Hpr20Socket", settings),
            full_path: full_path.into(),
            poll_interval,
            poll_attempts: poll_attempts.max(1),
        }
    }

    /// Build an interface for `file_name`, or MASsoft's last file when `None`
    pub fn from_config(config: &MassoftConfig, file_name: Option<&str>) -> Self {
        let full_path = match file_name {
            Some(name) => experiment_path(&config.experiment_directory, name),
            None => LAST_FILE.to_string(),
        };
        Self::new(
            SocketSettings::from(config),
            full_path,
            Duration::from_millis(config.poll_interval_ms),
            config.poll_attempts,
        )
    }

    pub fn full_path(&self) -> &str {
        &self.full_path
    }

    /// Connect and clear whatever MASsoft queued for a new client
    pub async fn open_socket(&mut self) -> MassoftResult<()> {
        self.socket.connect().await?;
        let _ = self.socket.send_command(&Command::Status, true).await?;
        Ok(())
    }

    pub fn close_socket(&mut self) {
        self.socket.close();
    }

    async fn pause(&self) {
        if !self.poll_interval.is_zero() {
            time::sleep(self.poll_interval).await;
        }
    }

    /// Ask twice one poll interval apart and keep asking while MASsoft says `0`
    pub async fn send_polled(&mut self, command: &Command) -> MassoftResult<String> {
        for attempt in 1..=self.poll_attempts {
            let _ = self.socket.query_block(command).await?;
            self.pause().await;
            let reply = self.socket.query_block(command).await?;
            if !Ack::classify(&reply).is_failure() {
                debug!("`{}` ready after {} poll(s)", command, attempt);
                return Ok(reply);
            }
            debug!("`{}` not ready (attempt {})", command, attempt);
            self.pause().await;
        }

        warn!(
            "`{}` still not ready after {} polls",
            command, self.poll_attempts
        );
        Err(MassoftError::PollExhausted {
            command: command.to_string(),
            attempts: self.poll_attempts,
        })
    }

    /// Associate the socket with the experiment file
    ///
    /// The first answer is not trusted: the file is opened twice and only
    /// the second answer decides.
    pub async fn open_file(&mut self) -> MassoftResult<()> {
        let command = Command::open_file(&self.full_path);
        let _ = self.socket.send_command(&command, true).await?;
        self.pause().await;
        let response = self.socket.send_command(&command, true).await?;
        info!("File Open Response: {}", response);

        match Ack::classify(&response) {
            Ack::Accepted => Ok(()),
            _ => Err(MassoftError::OpenFailed(self.full_path.clone())),
        }
    }

    pub async fn close_file(&mut self) -> MassoftResult<()> {
        let response = self.socket.send_command(&Command::Close, true).await?;
        info!("Close File Response: {}", response);
        match Ack::classify(&response) {
            Ack::Accepted => Ok(()),
            _ => Err(MassoftError::CloseFailed),
        }
    }

    pub async fn get_filename(&mut self) -> MassoftResult<String> {
        let response = self.socket.send_command(&Command::Filename, true).await?;
        if Ack::classify(&response).is_failure() {
            return Err(MassoftError::FilenameUnavailable);
        }
        info!("Current Filename: {}", response);
        Ok(response)
    }

    /// Column headers of a view
    pub async fn data_headers(&mut self, view: u32) -> MassoftResult<Vec<String>> {
        let reply = self.send_polled(&Command::Legends { view }).await?;
        Ok(split_fields(reply.trim())
            .into_iter()
            .map(|field| field.trim().trim_matches('"').to_string())
            .filter(|field| !field.is_empty())
            .collect())
    }

    /// Scan table of a view, eleven columns wide
    pub async fn scan_parameters(&mut self, view: u32) -> MassoftResult<DataTable> {
        let reply = self.send_polled(&Command::ScanParameters { view }).await?;
        Ok(parse_scan_parameters(&reply, SCAN_PARAMETER_COLUMNS))
    }

    /// Parse raw data lines under the headers of `view`
    ///
    /// A leading acknowledgement line is not data and is dropped.
    pub async fn parse_data(&mut self, view: u32, raw: &str) -> MassoftResult<DataTable> {
        let headers = self.data_headers(view).await?;
        Ok(parse_data_block(strip_ack_line(raw), &headers))
    }

    /// One pass of the collecting loop: fetch what the data listing holds now
    pub async fn collect_data(&mut self, view: u32) -> MassoftResult<DataTable> {
        let headers = self.data_headers(view).await?;
        let raw = self
            .socket
            .query_block(&Command::Data(DataRequest::new(view)))
            .await?;

        if Ack::classify(&raw).is_failure() {
            debug!("No data available yet for view {}", view);
            return Ok(DataTable::new(headers));
        }
        let table = parse_data_block(strip_ack_line(&raw), &headers);
        debug!("Collected {} rows from view {}", table.len(), view);
        Ok(table)
    }
}
