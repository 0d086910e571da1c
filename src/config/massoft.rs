// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the hiden-rga project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! MASsoft connection configuration

use serde::{Deserialize, Serialize};

/// How to reach and talk to the MASsoft instrument-control software.
///
/// # Example
///
/// ```
/// use hiden_rga::config::MassoftConfig;
///
/// let massoft = MassoftConfig {
///     host: "127.0.0.1".to_string(),
///     port: 5026,
///     ..Default::default()
/// };
/// assert_eq!(massoft.retry_delay, Some(20));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MassoftConfig {
    /// Host running MASsoft
    #[serde(default = "default_host")]
    pub host: String,

    /// MASsoft remote-control port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory holding the `.exp` files on the MASsoft machine.
    ///
    /// This is a path on the remote Windows host; it is joined with a
    /// backslash whatever the platform of this bridge.
    #[serde(default = "default_experiment_directory")]
    pub experiment_directory: String,

    /// Value of the `-d` switch appended to every command, `null` to omit it
    #[serde(default = "default_retry_delay")]
    pub retry_delay: Option<u32>,

    /// Time allowed for the reply to a command, in milliseconds
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Time allowed for a hotlink line, in milliseconds.
    ///
    /// A data listing is considered complete once it stays quiet this long.
    #[serde(default = "default_receive_timeout_ms")]
    pub receive_timeout_ms: u64,

    /// Pause between the two asks of a polled query, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Number of polls before a listing is declared unavailable
    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,

    /// Run mode passed to `-xGo`
    #[serde(default = "default_run_mode")]
    pub run_mode: String,
}

fn default_host() -> String {
    "10.66.58.225".to_string()
}

fn default_port() -> u16 {
    5026
}

fn default_experiment_directory() -> String {
    r"C:\Users\08id-user\Documents\Hiden Analytical\MASsoft\11".to_string()
}

fn default_retry_delay() -> Option<u32> {
    Some(20)
}

fn default_command_timeout_ms() -> u64 {
    5000
}

fn default_receive_timeout_ms() -> u64 {
    1000
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_poll_attempts() -> u32 {
    30
}

fn default_run_mode() -> String {
    crate::massoft::command::DEFAULT_RUN_MODE.to_string()
}

impl Default for MassoftConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            experiment_directory: default_experiment_directory(),
            retry_delay: default_retry_delay(),
            command_timeout_ms: default_command_timeout_ms(),
            receive_timeout_ms: default_receive_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_attempts: default_poll_attempts(),
            run_mode: default_run_mode(),
        }
    }
}
