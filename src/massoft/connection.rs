// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the hiden-rga project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! A single line-oriented connection to MASsoft
//!
//! MASsoft expects each client role (commands, status hotlink, data hotlink)
//! on its own TCP connection. [`MassoftSocket`] owns one of them, writes
//! framed commands and reads CRLF terminated replies with a timeout.
//!
//! # Cancel Safety
//! Reads go through a persistent line buffer, so a read interrupted by its
//! timeout keeps the bytes it already received and the next read completes
//! the line. Writes are not cancel safe.

use std::time::Duration;

use log::{debug, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time;

use super::command::Command;
use super::error::{MassoftError, MassoftResult};
use crate::config::MassoftConfig;

/// Where and how a socket talks to MASsoft
#[derive(Debug, Clone)]
pub struct SocketSettings {
    pub host: String,
    pub port: u16,
    /// Value of the `-d` switch appended to every command
    pub retry_delay: Option<u32>,
    /// How long to wait for the reply to a command
    pub command_timeout: Duration,
    /// How long to wait for an unsolicited hotlink line
    pub receive_timeout: Duration,
}

impl SocketSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl From<&MassoftConfig> for SocketSettings {
    fn from(config: &MassoftConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            retry_delay: config.retry_delay,
            command_timeout: Duration::from_millis(config.command_timeout_ms),
            receive_timeout: Duration::from_millis(config.receive_timeout_ms),
        }
    }
}

pub struct MassoftSocket {
    name: String,
    settings: SocketSettings,
    stream: Option<BufReader<TcpStream>>,
    /// Bytes of the line being received
    pending: Vec<u8>,
}

impl MassoftSocket {
    pub fn new(name: impl Into<String>, settings: SocketSettings) -> Self {
        Self {
            name: name.into(),
            settings,
            stream: None,
            pending: Vec::with_capacity(256),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &SocketSettings {
        &self.settings
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Open the connection if needed and drop the greeting line
    ///
    /// A server that sends no greeting within the receive timeout is
    /// accepted as is.
    pub async fn connect(&mut self) -> MassoftResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let address = self.settings.address();
        let stream = TcpStream::connect(&address).await?;
        stream.set_nodelay(true)?;
        info!("{} connected to {}", self.name, address);

        self.stream = Some(BufReader::new(stream));
        self.pending.clear();

        match self.read_line_within(self.settings.receive_timeout).await? {
            Some(greeting) => debug!("{} greeting discarded: {}", self.name, greeting),
            None => debug!("{} received no greeting", self.name),
        }
        Ok(())
    }

    /// Send a command and, if asked, return its one-line reply
    ///
    /// A reply timeout is not an error: it is logged and yields an empty
    /// string, which MASsoft callers treat like a `0`.
    pub async fn send_command(
        &mut self,
        command: &Command,
        expect_response: bool,
    ) -> MassoftResult<String> {
        self.connect().await?;
        let frame = command.frame(self.settings.retry_delay);
        self.write_frame(&frame).await?;

        if !expect_response {
            return Ok(String::new());
        }

        match self.read_line_within(self.settings.command_timeout).await? {
            Some(response) => {
                info!(
                    "{} | Cmd: {} | Resp: {}",
                    self.name,
                    frame.trim(),
                    response
                );
                Ok(response)
            }
            None => {
                warn!("{} response timeout for: {}", self.name, frame.trim());
                Ok(String::new())
            }
        }
    }

    /// Send a command whose reply may span several lines
    ///
    /// Lines are collected until the connection stays quiet for the receive
    /// timeout and joined with CRLF.
    pub async fn query_block(&mut self, command: &Command) -> MassoftResult<String> {
        let first = self.send_command(command, true).await?;
        if first.is_empty() {
            return Ok(first);
        }

        let mut lines = vec![first];
        while let Some(line) = self.read_line_within(self.settings.receive_timeout).await? {
            lines.push(line);
        }
        debug!("{} collected {} reply lines", self.name, lines.len());
        Ok(lines.join("\r\n"))
    }

    /// Wait for one unsolicited line with the receive timeout
    pub async fn receive(&mut self) -> MassoftResult<String> {
        self.receive_within(self.settings.receive_timeout).await
    }

    pub async fn receive_within(&mut self, window: Duration) -> MassoftResult<String> {
        self.connect().await?;
        match self.read_line_within(window).await? {
            Some(line) => Ok(line),
            None => Err(MassoftError::Timeout(window)),
        }
    }

    pub fn close(&mut self) {
        if self.stream.take().is_some() {
            info!("{} closed", self.name);
        }
        self.pending.clear();
    }

    async fn write_frame(&mut self, frame: &str) -> MassoftResult<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| MassoftError::NotConnected(self.name.clone()))?;

        let written = async {
            stream.get_mut().write_all(frame.as_bytes()).await?;
            stream.get_mut().flush().await
        }
        .await;

        if let Err(err) = written {
            self.stream = None;
            return Err(err.into());
        }
        Ok(())
    }

    /// Read one line, `None` when the window elapses first
    async fn read_line_within(&mut self, window: Duration) -> MassoftResult<Option<String>> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| MassoftError::NotConnected(self.name.clone()))?;

        match time::timeout(window, stream.read_until(b'\n', &mut self.pending)).await {
            Err(_) => Ok(None),
            Ok(Err(err)) => {
                self.stream = None;
                Err(err.into())
            }
            Ok(Ok(0)) if self.pending.is_empty() => {
                self.stream = None;
                Err(MassoftError::Disconnected(self.name.clone()))
            }
            Ok(Ok(_)) => {
                let line = String::from_utf8_lossy(&self.pending).trim().to_string();
                self.pending.clear();
                Ok(Some(line))
            }
        }
    }
}

impl Drop for MassoftSocket {
    fn drop(&mut self) {
        self.close();
    }
}
