// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the hiden-rga project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # MASsoft Simulator
//!
//! A TCP server answering the subset of the MASsoft remote-control protocol
//! used by this crate, so the client, the IOC and the daemon can run
//! without an analyzer.
//!
//! ## Behaviour
//!
//! * Every connection is greeted with one line.
//! * `-f"<path>"` associates the connection with a `.exp` file; paths
//!   containing `missing` are refused.
//! * `-xGo` walks a shared run state through `StartingActive`,
//!   `ScanningActive` and `StoppedShutdown`. It is refused while a run is
//!   active, and acknowledged without effect when `start_runs` is off.
//! * `-lStatus` links the connection: the current state and every later
//!   change are pushed to it.
//! * `-lData` is acknowledged, then rows of simulated partial pressures
//!   are streamed, one per cycle.
//! * `-lLegends` and `-lScanParameters` answer `0` for the first
//!   `warmup_polls` queries of a connection, like MASsoft before the
//!   experiment is ready.
//! * `-xLSet` and `-xExport` need an associated file.
//! * Anything else gets `0`.
//!
//! ## Examples
//!
//! ```no_run
//! use hiden_rga::utility::simulator::{MassoftSimulator, SimulatorConfig};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let simulator = MassoftSimulator::bind("127.0.0.1:0", SimulatorConfig::default()).await?;
//! println!("Simulated MASsoft on {}", simulator.local_addr()?);
//! simulator.run().await?;
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::{debug, info, warn};
use rand::Rng;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time;

pub const GREETING: &str = "Hiden Analytical MASsoft remote control";

const IDLE: &str = "Idle";
const STARTING: &str = "StartingActive";
const SCANNING: &str = "ScanningActive";
const STOPPED: &str = "StoppedShutdown";

/// Header of the eleven-column scan table
const SCAN_HEADERS: [&str; 11] = [
    "Scan", "Mode", "Input", "Start", "Stop", "Step", "Dwell", "Settle", "Range", "Detector",
    "Units",
];

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Masses reported by the legends, one column each
    pub masses: Vec<f64>,
    /// Polled queries answered `0` on each new connection
    pub warmup_polls: usize,
    /// Time between two streamed data rows
    pub row_interval: Duration,
    /// Rows streamed when a data request gives no cycle count
    pub rows_per_query: usize,
    /// Time spent in `StartingActive` after `-xGo`
    pub start_delay: Duration,
    /// Time spent in `ScanningActive` before the run stops
    pub run_time: Duration,
    /// When false, `-xGo` is acknowledged but the run stays `Idle`
    pub start_runs: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            masses: vec![2.0, 18.0, 28.0, 32.0, 40.0, 44.0],
            warmup_polls: 2,
            row_interval: Duration::from_millis(100),
            rows_per_query: 3,
            start_delay: Duration::from_millis(500),
            run_time: Duration::from_secs(10),
            start_runs: true,
        }
    }
}

/// One parsed request line
#[derive(Debug, Clone, PartialEq)]
enum Request {
    Open(String),
    Status,
    Close,
    Filename,
    Go,
    Legends,
    ScanParameters,
    StatusLink,
    Data {
        cycles: Option<usize>,
        time_fmt: bool,
        ms_fmt: bool,
    },
    LogicalSet,
    Export,
    Unknown(String),
}

fn switch_value(tokens: &[&str], prefix: &str) -> Option<usize> {
    tokens
        .iter()
        .find_map(|token| token.strip_prefix(prefix)?.parse().ok())
}

fn parse_request(line: &str) -> Request {
    let line = line.trim();

    if let Some(rest) = line.strip_prefix("-f") {
        let rest = rest.trim_start();
        let path = match rest.strip_prefix('"') {
            Some(quoted) => quoted.split('"').next().unwrap_or_default(),
            None => rest.split(" -d").next().unwrap_or_default(),
        };
        return Request::Open(path.trim().to_string());
    }

    let tokens: Vec<&str> = line.split_whitespace().collect();
    match tokens.first().copied() {
        Some("-xStatus") => Request::Status,
        Some("-xClose") => Request::Close,
        Some("-xFilename") => Request::Filename,
        Some("-xGo") => Request::Go,
        Some("-lLegends") => Request::Legends,
        Some("-lScanParameters") => Request::ScanParameters,
        Some("-lStatus") => Request::StatusLink,
        Some("-lData") => Request::Data {
            cycles: switch_value(&tokens, "-c"),
            time_fmt: switch_value(&tokens, "-t") == Some(1),
            ms_fmt: switch_value(&tokens, "-m") == Some(1),
        },
        Some("-xLSet") => Request::LogicalSet,
        Some("-xExport") => Request::Export,
        _ => Request::Unknown(line.to_string()),
    }
}

/// Partial pressure around which a mass fluctuates
fn base_pressure(mass: f64) -> f64 {
    match mass.round() as u32 {
        2 => 5.0e-10,
        18 => 3.0e-9,
        28 => 1.2e-9,
        32 => 2.5e-10,
        40 => 1.0e-11,
        44 => 8.0e-11,
        _ => 1.0e-12,
    }
}

fn simulated_row(masses: &[f64], time_fmt: bool, ms_fmt: bool) -> String {
    let mut rng = rand::rng();
    let mut fields = Vec::with_capacity(masses.len() + 1);
    if time_fmt || ms_fmt {
        let now = chrono::Local::now();
        let stamp = if ms_fmt {
            now.format("%H:%M:%S%.3f")
        } else {
            now.format("%H:%M:%S")
        };
        fields.push(stamp.to_string());
    }
    for mass in masses {
        let value = base_pressure(*mass) * rng.random_range(0.95..1.05);
        fields.push(format!("{:.4e}", value));
    }
    fields.join("\t")
}

pub struct MassoftSimulator {
    listener: TcpListener,
    config: Arc<SimulatorConfig>,
    run_state: Arc<watch::Sender<String>>,
}

impl MassoftSimulator {
    pub async fn bind(addr: &str, config: SimulatorConfig) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let (run_state, _) = watch::channel(IDLE.to_string());
        Ok(Self {
            listener,
            config: Arc::new(config),
            run_state: Arc::new(run_state),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the task is dropped
    pub async fn run(self) -> Result<()> {
        info!("MASsoft simulator listening on {}", self.local_addr()?);
        loop {
            let (stream, peer) = self.listener.accept().await?;
            debug!("Simulator connection from {}", peer);
            let mut connection = Connection::new(
                Arc::clone(&self.config),
                Arc::clone(&self.run_state),
            );
            tokio::spawn(async move {
                if let Err(err) = connection.serve(stream).await {
                    warn!("Simulator connection {} ended: {}", peer, err);
                }
                connection.abort_hotlinks();
            });
        }
    }

    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }
}

/// State of one client connection
struct Connection {
    config: Arc<SimulatorConfig>,
    run_state: Arc<watch::Sender<String>>,
    file: Option<String>,
    polls_left: usize,
    status_link: Option<JoinHandle<()>>,
    data_link: Option<JoinHandle<()>>,
}

impl Connection {
    fn new(config: Arc<SimulatorConfig>, run_state: Arc<watch::Sender<String>>) -> Self {
        let polls_left = config.warmup_polls;
        Self {
            config,
            run_state,
            file: None,
            polls_left,
            status_link: None,
            data_link: None,
        }
    }

    async fn serve(&mut self, stream: TcpStream) -> Result<()> {
        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        let writer = tokio::spawn(write_lines(write_half, rx));

        let _ = tx.send(GREETING.to_string());
        let mut lines = BufReader::new(read_half).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            debug!("Simulator received: {}", line);
            self.handle(parse_request(&line), &tx);
        }

        drop(tx);
        self.abort_hotlinks();
        let _ = writer.await;
        Ok(())
    }

    fn abort_hotlinks(&mut self) {
        if let Some(link) = self.status_link.take() {
            link.abort();
        }
        if let Some(link) = self.data_link.take() {
            link.abort();
        }
    }

    fn ack(ok: bool) -> String {
        let reply = if ok { "1" } else { "0" };
        reply.to_string()
    }

    /// True while the connection is still warming up
    fn warming_up(&mut self) -> bool {
        if self.polls_left > 0 {
            self.polls_left -= 1;
            true
        } else {
            false
        }
    }

    fn handle(&mut self, request: Request, tx: &mpsc::UnboundedSender<String>) {
        let reply = match request {
            Request::Open(path) => {
                let ok = path.to_lowercase().ends_with(".exp") && !path.contains("missing");
                if ok {
                    self.file = Some(path);
                }
                Self::ack(ok)
            }
            Request::Status => self.run_state.borrow().clone(),
            Request::Close => Self::ack(self.file.take().is_some()),
            Request::Filename => self.file.clone().unwrap_or_else(|| "0".to_string()),
            Request::Go => {
                let ok = self.file.is_some() && !self.run_active();
                if ok && self.config.start_runs {
                    self.start_run();
                }
                Self::ack(ok)
            }
            Request::Legends => {
                if self.file.is_none() || self.warming_up() {
                    "0".to_string()
                } else {
                    self.legends()
                }
            }
            Request::ScanParameters => {
                if self.file.is_none() || self.warming_up() {
                    "0".to_string()
                } else {
                    self.scan_parameters()
                }
            }
            Request::StatusLink => {
                let ok = self.file.is_some();
                let _ = tx.send(Self::ack(ok));
                if ok {
                    self.link_status(tx.clone());
                }
                return;
            }
            Request::Data {
                cycles,
                time_fmt,
                ms_fmt,
            } => {
                let ok = self.file.is_some();
                let _ = tx.send(Self::ack(ok));
                if ok {
                    let rows = cycles.unwrap_or(self.config.rows_per_query);
                    self.link_data(tx.clone(), rows, time_fmt, ms_fmt);
                }
                return;
            }
            Request::LogicalSet => Self::ack(self.file.is_some()),
            Request::Export => Self::ack(self.file.is_some()),
            Request::Unknown(line) => {
                debug!("Simulator does not know {:?}", line);
                "0".to_string()
            }
        };
        let _ = tx.send(reply);
    }

    fn legends(&self) -> String {
        self.config
            .masses
            .iter()
            .map(|mass| format!("mass {}", mass))
            .collect::<Vec<_>>()
            .join("\t")
    }

    fn scan_parameters(&self) -> String {
        let mut lines = vec![SCAN_HEADERS.join("\t")];
        for (i, mass) in self.config.masses.iter().enumerate() {
            let row = [
                (i + 1).to_string(),
                "MID".to_string(),
                "mass".to_string(),
                mass.to_string(),
                mass.to_string(),
                "1".to_string(),
                "100".to_string(),
                "100".to_string(),
                "-7".to_string(),
                "SEM".to_string(),
                "torr".to_string(),
            ];
            lines.push(row.join("\t"));
        }
        lines.join("\r\n")
    }

    fn run_active(&self) -> bool {
        let state = self.run_state.borrow();
        *state == STARTING || *state == SCANNING
    }

    fn start_run(&self) {
        let run_state = Arc::clone(&self.run_state);
        let start_delay = self.config.start_delay;
        let run_time = self.config.run_time;
        run_state.send_replace(STARTING.to_string());
        tokio::spawn(async move {
            time::sleep(start_delay).await;
            run_state.send_replace(SCANNING.to_string());
            time::sleep(run_time).await;
            run_state.send_replace(STOPPED.to_string());
        });
    }

    fn link_status(&mut self, tx: mpsc::UnboundedSender<String>) {
        let mut updates = self.run_state.subscribe();
        if let Some(previous) = self.status_link.take() {
            previous.abort();
        }
        self.status_link = Some(tokio::spawn(async move {
            loop {
                let state = updates.borrow_and_update().clone();
                if tx.send(state).is_err() || updates.changed().await.is_err() {
                    break;
                }
            }
        }));
    }

    fn link_data(
        &mut self,
        tx: mpsc::UnboundedSender<String>,
        rows: usize,
        time_fmt: bool,
        ms_fmt: bool,
    ) {
        let masses = self.config.masses.clone();
        let interval = self.config.row_interval;
        if let Some(previous) = self.data_link.take() {
            previous.abort();
        }
        self.data_link = Some(tokio::spawn(async move {
            for _ in 0..rows {
                time::sleep(interval).await;
                if tx.send(simulated_row(&masses, time_fmt, ms_fmt)).is_err() {
                    break;
                }
            }
        }));
    }
}

async fn write_lines(mut writer: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<String>) {
    while let Some(line) = rx.recv().await {
        let framed = format!("{}\r\n", line);
        if writer.write_all(framed.as_bytes()).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_are_parsed_with_retry_switch() {
        assert_eq!(
            parse_request(r#"-f"C:\Hiden Analytical\file56.exp" -d20"#),
            Request::Open(r"C:\Hiden Analytical\file56.exp".to_string())
        );
        assert_eq!(
            parse_request("-f file56.exp -d20"),
            Request::Open("file56.exp".to_string())
        );
        assert_eq!(
            parse_request("-lData -v1 -c1 -t0 -m1 -d20"),
            Request::Data {
                cycles: Some(1),
                time_fmt: false,
                ms_fmt: true
            }
        );
        assert_eq!(parse_request("-xGo -Odt -d20"), Request::Go);
        assert!(matches!(parse_request("-zBogus"), Request::Unknown(_)));
    }

    #[test]
    fn rows_have_one_value_per_mass() {
        let row = simulated_row(&[2.0, 28.0], false, false);
        let values: Vec<f64> = row.split('\t').map(|v| v.parse().unwrap()).collect();
        assert_eq!(values.len(), 2);
        assert!(values[1] > 1.0e-9 && values[1] < 1.3e-9);

        let formatted = simulated_row(&[2.0], true, false);
        assert_eq!(formatted.split('\t').count(), 2);
    }
}
