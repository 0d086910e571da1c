// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the hiden-rga project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Errors raised by the MASsoft protocol layer

use std::time::Duration;

use thiserror::Error;

/// Failure of a MASsoft exchange.
#[derive(Debug, Error)]
pub enum MassoftError {
    /// The underlying TCP stream failed
    #[error("MASsoft socket I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No line arrived within the receive window
    #[error("no reply from MASsoft within {0:?}")]
    Timeout(Duration),

    /// MASsoft closed the connection
    #[error("MASsoft closed the {0} connection")]
    Disconnected(String),

    /// An operation needed a socket that was never opened
    #[error("{0} is not connected")]
    NotConnected(String),

    /// An operation needed an experiment file and none is open
    #[error("no experiment file opened")]
    NoExperiment,

    #[error("failed to open experiment file: {0}")]
    OpenFailed(String),

    #[error("failed to close experiment file")]
    CloseFailed,

    #[error("failed to retrieve filename")]
    FilenameUnavailable,

    /// MASsoft answered `0` (or nothing) to a command that must succeed
    #[error("MASsoft rejected `{command}`")]
    Rejected { command: String },

    #[error("no start detected within {0:?}")]
    StartTimeout(Duration),

    #[error("did not stop within {0:?}")]
    StopTimeout(Duration),

    /// A polled query kept answering `0`
    #[error("`{command}` still not ready after {attempts} polls")]
    PollExhausted { command: String, attempts: u32 },

    /// A reply could not be turned into the expected values
    #[error("cannot parse MASsoft reply: {0}")]
    Parse(String),
}

pub type MassoftResult<T> = Result<T, MassoftError>;
