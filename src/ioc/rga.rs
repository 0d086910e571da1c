// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the hiden-rga project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! RGA IOC
//!
//! Publishes the analyzer through process variables: four control PVs
//! (`OpenExp`, `ExpName`, `Acquire`, `Status`) and, for each MID channel, a
//! reading and a mass. Puts on `OpenExp` and `Acquire` trigger the
//! corresponding actions; the acquisition loop refreshes the channel PVs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time;

use super::pv::{ProcessVariable, PutEvent, PvDatabase, PvError, PvValue};
use super::source::SharedSource;
use crate::config::{AcquisitionConfig, IocConfig};
use crate::massoft::response::parse_masses;

pub const STATUS_IDLE: &str = "Idle";
pub const STATUS_RUNNING: &str = "Running";
pub const STATUS_ERROR_PREFIX: &str = "Error";

/// How long a stop request waits for the loop to finish its reading
const STOP_GRACE: Duration = Duration::from_secs(10);

/// Full names of the RGA process variables
#[derive(Debug, Clone)]
pub struct RgaPvNames {
    pub open_exp: String,
    pub exp_name: String,
    pub acquire: String,
    pub status: String,
    /// `MID<n>-I`, one per channel
    pub readings: Vec<String>,
    /// `MID<n>` masses, one per channel
    pub masses: Vec<String>,
}

impl RgaPvNames {
    pub fn from_config(config: &IocConfig) -> Self {
        let control = &config.control_prefix;
        Self {
            open_exp: format!("{control}:OpenExp"),
            exp_name: format!("{control}:ExpName"),
            acquire: format!("{control}:Acquire"),
            status: format!("{control}:Status"),
            readings: (1..=config.channels)
                .map(|i| format!("{}MID{}-I", config.reading_prefix, i))
                .collect(),
            masses: (1..=config.channels)
                .map(|i| format!("{}MID{}", config.mass_prefix, i))
                .collect(),
        }
    }

    pub fn channels(&self) -> usize {
        self.readings.len()
    }
}

/// Register the RGA PVs with their initial values
pub fn register_pvs(
    db: &PvDatabase,
    names: &RgaPvNames,
    ioc: &IocConfig,
    acquisition: &AcquisitionConfig,
) -> Result<(), PvError> {
    db.add(ProcessVariable::int(
        &names.open_exp,
        0,
        "Put 1 to open the experiment named by ExpName",
    ))?;
    db.add(
        ProcessVariable::text(
            &names.exp_name,
            &acquisition.experiment,
            "Experiment file name",
        )
        .max_length(ioc.max_name_length),
    )?;
    db.add(ProcessVariable::int(
        &names.acquire,
        0,
        "1 starts the acquisition loop, 0 stops it",
    ))?;
    db.add(ProcessVariable::text(
        &names.status,
        STATUS_IDLE,
        "Acquisition status",
    ))?;
    for (i, (reading, mass)) in names.readings.iter().zip(&names.masses).enumerate() {
        db.add(ProcessVariable::float(
            reading,
            0.0,
            format!("Reading of channel MID{}", i + 1),
        ))?;
        db.add(ProcessVariable::float(
            mass,
            0.0,
            format!("Mass of channel MID{}", i + 1),
        ))?;
    }
    Ok(())
}

/// Everything the acquisition loop needs, cloned into its task
#[derive(Clone)]
struct LoopContext {
    db: Arc<PvDatabase>,
    names: Arc<RgaPvNames>,
    source: SharedSource,
    view: u32,
    interval: Duration,
}

struct Acquisition {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct RgaIoc {
    ctx: LoopContext,
    events: broadcast::Receiver<PutEvent>,
    acquisition: Option<Acquisition>,
}

impl RgaIoc {
    /// Create the IOC and register its PVs in `db`
    pub fn new(
        db: Arc<PvDatabase>,
        source: SharedSource,
        ioc: &IocConfig,
        acquisition: &AcquisitionConfig,
    ) -> Result<Self> {
        let names = RgaPvNames::from_config(ioc);
        register_pvs(&db, &names, ioc, acquisition).context("Failed to register RGA PVs")?;
        // Subscribe now so puts made before run() are not lost
        let events = db.subscribe();
        Ok(Self {
            ctx: LoopContext {
                db,
                names: Arc::new(names),
                source,
                view: acquisition.view,
                interval: Duration::from_millis(acquisition.interval_ms),
            },
            events,
            acquisition: None,
        })
    }

    pub fn names(&self) -> &RgaPvNames {
        &self.ctx.names
    }

    pub fn database(&self) -> Arc<PvDatabase> {
        Arc::clone(&self.ctx.db)
    }

    pub fn is_acquiring(&self) -> bool {
        self.acquisition
            .as_ref()
            .is_some_and(|acq| !acq.handle.is_finished())
    }

    /// Dispatch put events until `running` is cleared
    pub async fn run(mut self, running: Arc<AtomicBool>) -> Result<()> {
        info!("RGA IOC started");
        while running.load(Ordering::SeqCst) {
            match time::timeout(Duration::from_millis(200), self.events.recv()).await {
                Err(_) => continue,
                Ok(Ok(event)) => self.handle_put(event).await,
                Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    warn!("RGA IOC missed {} put events", skipped);
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => break,
            }
        }
        self.stop_acquisition().await;
        self.ctx.source.lock().await.shutdown().await;
        info!("RGA IOC stopped");
        Ok(())
    }

    pub async fn handle_put(&mut self, event: PutEvent) {
        let names = Arc::clone(&self.ctx.names);
        if event.name == names.open_exp {
            if event.value.as_i64().unwrap_or(0) != 0 {
                self.open_experiment().await;
            }
        } else if event.name == names.acquire {
            let requested = event.value.as_i64().unwrap_or(0) != 0;
            if requested && !self.is_acquiring() {
                self.start_acquisition();
            } else if !requested && self.is_acquiring() {
                self.stop_acquisition().await;
            }
        } else {
            debug!("No action bound to {}", event.name);
        }
    }

    async fn open_experiment(&self) {
        let experiment = match self.ctx.db.value(&self.ctx.names.exp_name) {
            Some(PvValue::Text(name)) => name,
            _ => return,
        };
        info!("Opening experiment {}", experiment);
        let result = self
            .ctx
            .source
            .lock()
            .await
            .open_experiment(&experiment)
            .await;
        match result {
            Ok(()) if !self.is_acquiring() => self.ctx.set_status(STATUS_IDLE),
            Ok(()) => {}
            Err(err) => {
                error!("Failed to open experiment {}: {}", experiment, err);
                self.ctx.set_status(&format!("{STATUS_ERROR_PREFIX}: {err}"));
            }
        }
    }

    fn start_acquisition(&mut self) {
        info!("Starting acquisition on view {}", self.ctx.view);
        let (stop, stop_rx) = watch::channel(false);
        let ctx = self.ctx.clone();
        let handle = tokio::spawn(async move {
            ctx.set_status(STATUS_RUNNING);
            match ctx.acquire(stop_rx).await {
                Ok(()) => ctx.set_status(STATUS_IDLE),
                Err(err) => {
                    error!("Error in acquisition loop: {:#}", err);
                    ctx.set_status(&format!("{STATUS_ERROR_PREFIX}: {err:#}"));
                    if let Err(err) = ctx.db.write(&ctx.names.acquire, PvValue::Int(0)) {
                        error!("Failed to reset {}: {}", ctx.names.acquire, err);
                    }
                }
            }
        });
        self.acquisition = Some(Acquisition { stop, handle });
    }

    /// Ask the loop to stop and wait for it, aborting it past the grace period
    pub async fn stop_acquisition(&mut self) {
        let Some(acquisition) = self.acquisition.take() else {
            return;
        };
        let _ = acquisition.stop.send(true);
        let mut handle = acquisition.handle;
        match time::timeout(self.ctx.interval + STOP_GRACE, &mut handle).await {
            Ok(_) => info!("Acquisition stopped"),
            Err(_) => {
                warn!("Acquisition loop did not stop in time, aborting it");
                handle.abort();
                self.ctx.set_status(STATUS_IDLE);
            }
        }
    }
}

impl LoopContext {
    fn set_status(&self, status: &str) {
        if let Err(err) = self
            .db
            .write(&self.names.status, PvValue::Text(status.to_string()))
        {
            error!("Failed to update status: {}", err);
        }
    }

    async fn acquire(&self, mut stop: watch::Receiver<bool>) -> Result<()> {
        let legends = self
            .source
            .lock()
            .await
            .legends(self.view)
            .await
            .context("Failed to read legends")?;
        let masses = parse_masses(&legends, self.names.channels());
        info!("Parsed masses: {:?}", masses);
        for (name, mass) in self.names.masses.iter().zip(&masses) {
            self.db.write(name, PvValue::Float(*mass))?;
        }

        while !*stop.borrow() {
            let row = self
                .source
                .lock()
                .await
                .latest_row(self.view)
                .await
                .context("Failed to read data")?;
            match row {
                Some(values) if values.len() >= masses.len() => {
                    for (name, value) in self.names.readings.iter().zip(&values) {
                        self.db.write(name, PvValue::Float(*value))?;
                    }
                    debug!("Updated {} channels", values.len().min(self.names.channels()));
                }
                Some(values) => debug!(
                    "Skipping row with {} values for {} masses",
                    values.len(),
                    masses.len()
                ),
                None => debug!("No data row available"),
            }

            tokio::select! {
                _ = time::sleep(self.interval) => {}
                _ = stop.changed() => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ioc::source::{shared, RgaSource};
    use crate::massoft::{MassoftError, MassoftResult};
    use async_trait::async_trait;

    struct FakeSource {
        rows: Vec<Vec<f64>>,
        fail_after: Option<usize>,
        served: usize,
        opened: Arc<std::sync::Mutex<Vec<String>>>,
    }

    impl FakeSource {
        fn new(rows: Vec<Vec<f64>>) -> Self {
            Self {
                rows,
                fail_after: None,
                served: 0,
                opened: Arc::new(std::sync::Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl RgaSource for FakeSource {
        async fn open_experiment(&mut self, file_name: &str) -> MassoftResult<()> {
            if file_name == "missing.exp" {
                return Err(MassoftError::OpenFailed(file_name.to_string()));
            }
            self.opened.lock().unwrap().push(file_name.to_string());
            Ok(())
        }

        async fn legends(&mut self, _view: u32) -> MassoftResult<Vec<String>> {
            Ok(vec!["Time".into(), "mass 2".into(), "mass 28".into()])
        }

        async fn latest_row(&mut self, _view: u32) -> MassoftResult<Option<Vec<f64>>> {
            if self.fail_after.is_some_and(|limit| self.served >= limit) {
                return Err(MassoftError::Disconnected("DataSocket".into()));
            }
            let row = self.rows.get(self.served % self.rows.len()).cloned();
            self.served += 1;
            Ok(row)
        }
    }

    fn ioc_with(source: FakeSource) -> RgaIoc {
        let ioc_config = IocConfig {
            channels: 3,
            ..IocConfig::default()
        };
        let acquisition = AcquisitionConfig {
            interval_ms: 10,
            ..AcquisitionConfig::default()
        };
        RgaIoc::new(
            Arc::new(PvDatabase::new()),
            shared(source),
            &ioc_config,
            &acquisition,
        )
        .unwrap()
    }

    /// Store the value like an external put and return the matching event
    fn put(ioc: &RgaIoc, name: &str, value: i64) -> PutEvent {
        ioc.database().write(name, PvValue::Int(value)).unwrap();
        PutEvent {
            name: name.to_string(),
            value: PvValue::Int(value),
        }
    }

    #[test]
    fn pv_names_follow_prefixes() {
        let names = RgaPvNames::from_config(&IocConfig::default());
        assert_eq!(names.acquire, "XF:08IDB-SE{RGA:1}:Acquire");
        assert_eq!(names.readings[0], "XF:08IDB-SE{RGA:1}P:MID1-I");
        assert_eq!(names.masses[9], "XF:08IDB-VA{RGA:1}Mass:MID10");
        assert_eq!(names.channels(), 10);
    }

    #[tokio::test]
    async fn open_exp_opens_named_experiment() {
        let source = FakeSource::new(vec![vec![0.0]]);
        let opened = Arc::clone(&source.opened);
        let mut ioc = ioc_with(source);
        let names = ioc.names().clone();

        let event = put(&ioc, &names.open_exp, 1);
        ioc.handle_put(event).await;
        assert_eq!(*opened.lock().unwrap(), vec!["file56.exp".to_string()]);

        let db = ioc.database();
        db.write(&names.exp_name, PvValue::Text("missing.exp".into()))
            .unwrap();
        let event = put(&ioc, &names.open_exp, 1);
        ioc.handle_put(event).await;
        let status = db.value(&names.status).unwrap();
        assert!(status.as_str().unwrap().starts_with("Error:"));
    }

    #[tokio::test]
    async fn acquisition_updates_channels() {
        let mut ioc = ioc_with(FakeSource::new(vec![vec![1.0e-9, 2.0e-8, 3.0e-7]]));
        let names = ioc.names().clone();
        let db = ioc.database();

        let event = put(&ioc, &names.acquire, 1);
        ioc.handle_put(event).await;
        assert!(ioc.is_acquiring());
        time::sleep(Duration::from_millis(100)).await;

        assert_eq!(db.value(&names.masses[0]), Some(PvValue::Float(2.0)));
        assert_eq!(db.value(&names.masses[1]), Some(PvValue::Float(28.0)));
        assert_eq!(db.value(&names.readings[2]), Some(PvValue::Float(3.0e-7)));
        assert_eq!(
            db.value(&names.status),
            Some(PvValue::Text(STATUS_RUNNING.into()))
        );

        let event = put(&ioc, &names.acquire, 0);
        ioc.handle_put(event).await;
        assert!(!ioc.is_acquiring());
        assert_eq!(
            db.value(&names.status),
            Some(PvValue::Text(STATUS_IDLE.into()))
        );
    }

    #[tokio::test]
    async fn loop_error_resets_acquire() {
        let mut source = FakeSource::new(vec![vec![1.0, 2.0]]);
        source.fail_after = Some(2);
        let mut ioc = ioc_with(source);
        let names = ioc.names().clone();
        let db = ioc.database();

        let event = put(&ioc, &names.acquire, 1);
        ioc.handle_put(event).await;
        time::sleep(Duration::from_millis(200)).await;

        assert!(!ioc.is_acquiring());
        assert_eq!(db.value(&names.acquire), Some(PvValue::Int(0)));
        let status = db.value(&names.status).unwrap();
        assert!(status.as_str().unwrap().starts_with("Error:"));
    }
}
