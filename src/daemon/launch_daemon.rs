// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the hiden-rga project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Daemon Management Module
//!
//! This module runs the background tasks of the RGA bridge:
//!
//! - the IOC event loop reacting to puts on the control PVs
//! - the Modbus TCP server, when enabled
//! - a heartbeat
//!
//! Every task watches a shared `running` flag so the daemon can stop them
//! together.
//!
//! ## Usage
//!
//! ```no_run
//! use hiden_rga::{config::Config, daemon::launch_daemon::Daemon};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let config = Config::from_file("config.yaml")?;
//!
//!     let mut daemon = Daemon::new();
//!     daemon.launch(&config).await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!
//!     daemon.shutdown();
//!     daemon.join().await?;
//!     Ok(())
//! }
//! ```

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_modbus::server::tcp::{accept_tcp_connection, Server};

use crate::config::Config;
use crate::ioc::{shared, PvDatabase, PvValue, RgaIoc, RgaPvNames, SharedSource};
use crate::massoft::MassoftClient;
use crate::modbus::RgaModbusServer;

/// Seconds between two heartbeat messages
const HEARTBEAT_PERIOD: u64 = 60;

/// Represents the daemon and the tasks it manages
pub struct Daemon {
    tasks: Vec<JoinHandle<Result<()>>>,
    running: Arc<AtomicBool>,
    database: Arc<PvDatabase>,
    names: Option<Arc<RgaPvNames>>,
    modbus_addr: Option<SocketAddr>,
}

impl Default for Daemon {
    fn default() -> Self {
        Self::new()
    }
}

impl Daemon {
    /// Create a new daemon instance
    pub fn new() -> Self {
        Daemon {
            tasks: Vec::new(),
            running: Arc::new(AtomicBool::new(true)),
            database: Arc::new(PvDatabase::new()),
            names: None,
            modbus_addr: None,
        }
    }

    /// Connect to MASsoft and launch all configured tasks
    pub async fn launch(&mut self, config: &Config) -> Result<()> {
        info!(
            "Connecting to MASsoft at {}:{}",
            config.massoft.host, config.massoft.port
        );
        let mut client = MassoftClient::from_config(&config.massoft);
        client
            .initialize()
            .await
            .context("Failed to connect to MASsoft")?;

        self.launch_with_source(config, shared(client)).await
    }

    /// Launch all configured tasks on top of an already connected source
    pub async fn launch_with_source(&mut self, config: &Config, source: SharedSource) -> Result<()> {
        let ioc = RgaIoc::new(
            Arc::clone(&self.database),
            source,
            &config.ioc,
            &config.acquisition,
        )?;
        let names = Arc::new(ioc.names().clone());
        self.names = Some(Arc::clone(&names));

        self.start_ioc(ioc);

        if config.acquisition.auto_start {
            info!(
                "Auto start: opening {} and starting acquisition",
                config.acquisition.experiment
            );
            self.database
                .put(&names.open_exp, PvValue::Int(1))
                .context("Failed to request experiment opening")?;
            self.database
                .put(&names.acquire, PvValue::Int(1))
                .context("Failed to request acquisition start")?;
        }

        if config.modbus.enabled {
            self.start_modbus_server(config, names).await?;
        }

        self.start_heartbeat()?;

        Ok(())
    }

    /// The PV database served by this daemon
    pub fn database(&self) -> Arc<PvDatabase> {
        Arc::clone(&self.database)
    }

    /// PV names, once launched
    pub fn names(&self) -> Option<Arc<RgaPvNames>> {
        self.names.clone()
    }

    /// Address the Modbus server is bound to, once started
    pub fn modbus_addr(&self) -> Option<SocketAddr> {
        self.modbus_addr
    }

    fn start_ioc(&mut self, ioc: RgaIoc) {
        info!("Starting RGA IOC");
        let running = self.running.clone();
        let task = tokio::spawn(async move { ioc.run(running).await });
        self.tasks.push(task);
    }

    /// Start a heartbeat task that logs the daemon status periodically
    fn start_heartbeat(&mut self) -> Result<()> {
        info!("Starting heartbeat monitor");

        let running = self.running.clone();
        let task = tokio::spawn(async move {
            let mut ticks = 0u64;
            while running.load(Ordering::SeqCst) {
                if ticks % HEARTBEAT_PERIOD == 0 {
                    debug!("Daemon heartbeat: running");
                }
                ticks += 1;
                time::sleep(Duration::from_secs(1)).await;
            }
            Ok(())
        });

        self.tasks.push(task);
        Ok(())
    }

    /// Launch the Modbus server
    ///
    /// The listener is bound before the task is spawned so an unusable
    /// address fails the launch.
    async fn start_modbus_server(&mut self, config: &Config, names: Arc<RgaPvNames>) -> Result<()> {
        let socket_addr: SocketAddr = format!("{}:{}", config.modbus.address, config.modbus.port)
            .parse()
            .with_context(|| {
                format!(
                    "Invalid Modbus address {}:{}",
                    config.modbus.address, config.modbus.port
                )
            })?;
        let listener = TcpListener::bind(socket_addr)
            .await
            .with_context(|| format!("Failed to bind Modbus server to {}", socket_addr))?;
        let local_addr = listener.local_addr()?;
        self.modbus_addr = Some(local_addr);
        info!("Starting modbus server on {}", local_addr);

        let running = self.running.clone();
        let database = self.database();

        let task = tokio::spawn(async move {
            let server = Server::new(listener);

            let on_connected = move |stream, socket_addr| {
                let database = Arc::clone(&database);
                let names = Arc::clone(&names);
                async move {
                    accept_tcp_connection(stream, socket_addr, move |socket_addr| {
                        debug!("Modbus client connected from {}", socket_addr);
                        Ok(Some(RgaModbusServer::new(
                            Arc::clone(&database),
                            Arc::clone(&names),
                        )))
                    })
                }
            };

            let on_process_error = |err| {
                error!("Modbus server error: {err}");
            };

            let server_handle = tokio::spawn(async move {
                if let Err(e) = server.serve(&on_connected, on_process_error).await {
                    error!("Modbus server error: {}", e);
                }
            });

            while running.load(Ordering::SeqCst) {
                time::sleep(Duration::from_millis(500)).await;
            }

            info!("Shutting down Modbus server...");
            server_handle.abort();
            match time::timeout(Duration::from_secs(5), server_handle).await {
                Ok(_) => info!("Modbus server shut down successfully"),
                Err(_) => warn!("Modbus server shutdown timed out, forcing termination"),
            }
            Ok(())
        });

        self.tasks.push(task);
        info!("Modbus server started");
        Ok(())
    }

    /// Signal all tasks to stop
    ///
    /// The IOC stops the acquisition loop and closes the MASsoft connections
    /// on its way out.
    pub fn shutdown(&self) {
        info!("Shutting down daemon tasks");
        self.running.store(false, Ordering::SeqCst);
    }

    /// Wait for all tasks to complete
    ///
    /// Each task gets 5 seconds; task errors and panics are logged.
    pub async fn join(self) -> Result<()> {
        for task in self.tasks {
            match time::timeout(Duration::from_secs(5), task).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => error!("Task failed: {:#}", e),
                Ok(Err(e)) => error!("Task panicked: {}", e),
                Err(_) => warn!("Task did not complete within timeout period, may be hung"),
            }
        }
        Ok(())
    }
}
