// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the hiden-rga project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! MASsoft command definition and serialization
//!
//! Every request sent to MASsoft is a single ASCII line made of switches:
//! `-x` executes an action, `-l` opens a hotlink (a listing that keeps
//! streaming on the socket), `-f` associates the socket with an experiment
//! file, `-v` selects a view and `-d` tells MASsoft how long to retry
//! internally before answering.

use std::fmt;

/// Line terminator used in both directions
pub const TERMINATOR: &str = "\r\n";

/// Run mode passed to `-xGo` when none is given
pub const DEFAULT_RUN_MODE: &str = "-Odt";

/// Parameters of a `-lData` hotlink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataRequest {
    pub view: u32,
    /// Limit the listing to this many cycles
    pub cycles: Option<u32>,
    /// Prefix rows with a formatted time stamp
    pub time_fmt: bool,
    /// Prefix rows with a millisecond time stamp
    pub ms_fmt: bool,
}

impl DataRequest {
    pub fn new(view: u32) -> Self {
        Self {
            view,
            cycles: None,
            time_fmt: false,
            ms_fmt: false,
        }
    }

    pub fn cycles(mut self, cycles: u32) -> Self {
        self.cycles = Some(cycles);
        self
    }

    pub fn time_fmt(mut self, enabled: bool) -> Self {
        self.time_fmt = enabled;
        self
    }

    pub fn ms_fmt(mut self, enabled: bool) -> Self {
        self.ms_fmt = enabled;
        self
    }

    /// Whether rows come back as text instead of plain numbers
    pub fn is_formatted(&self) -> bool {
        self.time_fmt || self.ms_fmt
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Query the experiment status
    ///
    /// Command: `-xStatus`
    Status,
    /// Associate the socket with an experiment file
    ///
    /// Command: `-f"<path>"`
    OpenFile { path: String },
    /// Close the associated experiment file
    ///
    /// Command: `-xClose`
    Close,
    /// Name of the file associated with the socket
    ///
    /// Command: `-xFilename`
    Filename,
    /// Start the experiment in the given run mode
    ///
    /// Command: `-xGo <mode>`
    Go { mode: String },
    /// Column legends of a view
    ///
    /// Command: `-lLegends -v<view>`
    Legends { view: u32 },
    /// Scan table of a view
    ///
    /// Command: `-lScanParameters -v<view>`
    ScanParameters { view: u32 },
    /// Status hotlink: the socket then receives one line per state change
    ///
    /// Command: `-lStatus -v<view>`
    StatusLink { view: u32 },
    /// Data hotlink: the socket then receives one line per cycle
    Data(DataRequest),
    /// Set a logical device value
    ///
    /// Command: `-xLSet <device> <value> -v<view>`
    LogicalSet {
        device: String,
        value: String,
        view: u32,
    },
    /// Export the acquired data of a view
    ///
    /// Command: `-xExport -v<view>`
    Export { view: u32 },
}

impl Command {
    pub fn open_file(path: impl Into<String>) -> Self {
        Command::OpenFile { path: path.into() }
    }

    pub fn go(mode: impl Into<String>) -> Self {
        Command::Go { mode: mode.into() }
    }

    /// Serialize the command as it travels on the wire
    ///
    /// The `-d<delay>` retry switch is appended when a delay is configured,
    /// followed by the line terminator.
    pub fn frame(&self, retry_delay: Option<u32>) -> String {
        let text = self.to_string();
        match retry_delay {
            Some(delay) => format!("{} -d{}{}", text.trim(), delay, TERMINATOR),
            None => format!("{}{}", text.trim(), TERMINATOR),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Status => write!(f, "-xStatus"),
            Command::OpenFile { path } => write!(f, "-f\"{}\"", path),
            Command::Close => write!(f, "-xClose"),
            Command::Filename => write!(f, "-xFilename"),
            Command::Go { mode } => write!(f, "-xGo {}", mode),
            Command::Legends { view } => write!(f, "-lLegends -v{}", view),
            Command::ScanParameters { view } => write!(f, "-lScanParameters -v{}", view),
            Command::StatusLink { view } => write!(f, "-lStatus -v{}", view),
            Command::Data(request) => {
                write!(f, "-lData -v{}", request.view)?;
                if let Some(cycles) = request.cycles {
                    write!(f, " -c{}", cycles)?;
                }
                write!(
                    f,
                    " -t{} -m{}",
                    u8::from(request.time_fmt),
                    u8::from(request.ms_fmt)
                )
            }
            Command::LogicalSet {
                device,
                value,
                view,
            } => write!(f, "-xLSet {} {} -v{}", device, value, view),
            Command::Export { view } => write!(f, "-xExport -v{}", view),
        }
    }
}

/// Join the remote experiment directory and a file name
///
/// MASsoft runs on Windows, so the separator is a backslash whatever the
/// platform this bridge runs on.
pub fn experiment_path(directory: &str, file_name: &str) -> String {
    if directory.is_empty() {
        file_name.to_string()
    } else if directory.ends_with('\\') || directory.ends_with('/') {
        format!("{}{}", directory, file_name)
    } else {
        format!("{}\\{}", directory, file_name)
    }
}
