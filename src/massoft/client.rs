// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the hiden-rga project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Asynchronous MASsoft client
//!
//! MASsoft serves each role on a separate connection: commands and their
//! acknowledgements on one, the status hotlink on a second and the data
//! hotlink on a third. [`MassoftClient`] owns the three and keeps track of
//! the experiment file they are associated with.
//!
//! # Cancel Safety
//! The RPCs are not cancel safe. Each one writes before it reads, so
//! cancelling between the two leaves an unread acknowledgement that the
//! next RPC would take for its own.

use std::time::Duration;

use log::{debug, info};
use tokio::time::Instant;

use super::command::{experiment_path, Command, DataRequest};
use super::connection::{MassoftSocket, SocketSettings};
use super::error::{MassoftError, MassoftResult};
use super::response::{parse_data_line, parse_legends, Ack, DataRow};
use crate::config::MassoftConfig;

pub struct MassoftClient {
    cmd_sock: MassoftSocket,
    stat_sock: MassoftSocket,
    data_sock: MassoftSocket,
    experiment_directory: String,
    current_file: Option<String>,
}

impl MassoftClient {
    pub fn new(settings: SocketSettings, experiment_directory: impl Into<String>) -> Self {
        Self {
            cmd_sock: MassoftSocket::new("CmdSocket", settings.clone()),
            stat_sock: MassoftSocket::new("StatSocket", settings.clone()),
            data_sock: MassoftSocket::new("DataSocket", settings),
            experiment_directory: experiment_directory.into(),
            current_file: None,
        }
    }

    pub fn from_config(config: &MassoftConfig) -> Self {
        Self::new(
            SocketSettings::from(config),
            config.experiment_directory.clone(),
        )
    }

    /// Full remote path of the open experiment, if any
    pub fn current_file(&self) -> Option<&str> {
        self.current_file.as_deref()
    }

    fn require_file(&self) -> MassoftResult<String> {
        self.current_file.clone().ok_or(MassoftError::NoExperiment)
    }

    /// Connect the three sockets concurrently
    pub async fn initialize(&mut self) -> MassoftResult<()> {
        let (cmd, stat, data) = tokio::join!(
            self.cmd_sock.connect(),
            self.stat_sock.connect(),
            self.data_sock.connect()
        );
        cmd?;
        stat?;
        data?;
        Ok(())
    }

    /// Associate the command socket with an experiment file
    pub async fn open_experiment(&mut self, file_name: &str) -> MassoftResult<()> {
        let path = experiment_path(&self.experiment_directory, file_name);
        let response = self
            .cmd_sock
            .send_command(&Command::open_file(&path), true)
            .await?;
        if Ack::classify(&response).is_failure() {
            return Err(MassoftError::OpenFailed(path));
        }
        info!("Experiment file opened: {}", path);
        self.current_file = Some(path);
        Ok(())
    }

    /// Start the experiment and wait until MASsoft reports it active
    pub async fn run_experiment(
        &mut self,
        mode: &str,
        view: u32,
        verify_timeout: Duration,
    ) -> MassoftResult<()> {
        let path = self.require_file()?;
        let go = Command::go(mode);
        let response = self.cmd_sock.send_command(&go, true).await?;
        if Ack::classify(&response) == Ack::Rejected {
            return Err(MassoftError::Rejected {
                command: go.to_string(),
            });
        }

        self.link_status(&path, view).await?;

        let deadline = Instant::now() + verify_timeout;
        while Instant::now() < deadline {
            let status = match self.stat_sock.receive().await {
                Ok(status) => status.to_lowercase(),
                Err(MassoftError::Timeout(_)) => continue,
                Err(err) => return Err(err),
            };
            info!("Startup Status: {}", status);
            if status.contains("startingactive") || status.contains("scanningactive") {
                info!("Experiment confirmed running");
                return Ok(());
            }
        }
        Err(MassoftError::StartTimeout(verify_timeout))
    }

    /// Point the status socket at the experiment and open the status hotlink
    pub async fn link_status(&mut self, path: &str, view: u32) -> MassoftResult<()> {
        self.stat_sock
            .send_command(&Command::open_file(path), true)
            .await?;
        self.stat_sock
            .send_command(&Command::StatusLink { view }, true)
            .await?;
        Ok(())
    }

    /// Follow the status hotlink until the experiment reports `Stopped...`
    pub async fn monitor_until_stopped(&mut self, timeout: Duration) -> MassoftResult<()> {
        self.require_file()?;
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            let status = match self.stat_sock.receive().await {
                Ok(status) => status,
                Err(MassoftError::Timeout(_)) => continue,
                Err(err) => return Err(err),
            };
            info!("Status Update: {}", status);
            if status.to_lowercase().starts_with("stopped") {
                return Ok(());
            }
        }
        Err(MassoftError::StopTimeout(timeout))
    }

    /// Open a data hotlink and collect rows until it goes quiet
    pub async fn get_data(&mut self, request: DataRequest) -> MassoftResult<Vec<DataRow>> {
        let path = self.require_file()?;
        self.data_sock
            .send_command(&Command::open_file(&path), true)
            .await?;
        self.data_sock
            .send_command(&Command::Data(request), true)
            .await?;

        let mut results = Vec::new();
        loop {
            let line = match self.data_sock.receive().await {
                Ok(line) => line,
                Err(MassoftError::Timeout(_)) => break,
                Err(err) => return Err(err),
            };
            if let Some(row) = parse_data_line(&line, request.is_formatted())? {
                results.push(row);
            }
        }
        debug!("Collected {} data rows from view {}", results.len(), request.view);
        Ok(results)
    }

    pub async fn get_legends(&mut self, view: u32) -> MassoftResult<Vec<String>> {
        self.require_file()?;
        let response = self
            .cmd_sock
            .send_command(&Command::Legends { view }, true)
            .await?;
        Ok(parse_legends(&response))
    }

    pub async fn query_filename(&mut self) -> MassoftResult<String> {
        let response = self.cmd_sock.send_command(&Command::Filename, true).await?;
        if Ack::classify(&response).is_failure() {
            return Err(MassoftError::FilenameUnavailable);
        }
        Ok(response)
    }

    pub async fn close_experiment(&mut self) -> MassoftResult<()> {
        let response = self.cmd_sock.send_command(&Command::Close, true).await?;
        if Ack::classify(&response) != Ack::Accepted {
            return Err(MassoftError::CloseFailed);
        }
        self.current_file = None;
        Ok(())
    }

    /// Set a logical device, e.g. a filament or an inlet valve
    pub async fn set_logical_device(
        &mut self,
        device: &str,
        value: &str,
        view: u32,
    ) -> MassoftResult<()> {
        let command = Command::LogicalSet {
            device: device.to_string(),
            value: value.to_string(),
            view,
        };
        self.expect_accepted(command).await
    }

    pub async fn export_data(&mut self, view: u32) -> MassoftResult<()> {
        self.expect_accepted(Command::Export { view }).await
    }

    async fn expect_accepted(&mut self, command: Command) -> MassoftResult<()> {
        let response = self.cmd_sock.send_command(&command, true).await?;
        match Ack::classify(&response) {
            Ack::Accepted => Ok(()),
            _ => Err(MassoftError::Rejected {
                command: command.to_string(),
            }),
        }
    }

    pub fn shutdown(&mut self) {
        self.cmd_sock.close();
        self.stat_sock.close();
        self.data_sock.close();
    }
}

