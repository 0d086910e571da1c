// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the hiden-rga project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration management for the RGA bridge
//!
//! This module provides functionality for loading, validating, and applying
//! configuration settings. The configuration is backed by a YAML file and
//! validated against a JSON schema before it is deserialized.
//!
//! ## Configuration Structure
//!
//! - `massoft`: How to reach MASsoft and protocol timings
//! - `acquisition`: The acquisition loop feeding the channel PVs
//! - `ioc`: Process-variable names and channel count
//! - `modbus`: Settings for the Modbus TCP server
//!
//! ## Usage
//!
//! ```no_run
//! use hiden_rga::config::Config;
//! use std::path::Path;
//!
//! // Load config from file, creates a default if not found
//! let mut config = Config::from_file(Path::new("config.yaml")).unwrap();
//!
//! // Apply command line overrides if needed
//! config.apply_args(
//!     Some("192.168.1.20".to_string()), // MASsoft host
//!     None,                             // MASsoft port
//!     Some("file57.exp".to_string()),   // Experiment
//!     false,                            // Auto start
//!     Some(true),                       // Enable Modbus
//!     Some("0.0.0.0".to_string()),      // Modbus address
//!     Some(502),                        // Modbus port
//! );
//!
//! println!("MASsoft at {}:{}", config.massoft.host, config.massoft.port);
//! ```

pub mod acquisition;
pub mod ioc;
pub mod massoft;
pub mod modbus;
pub mod utils;

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, error};
use serde::{Deserialize, Serialize};

pub use acquisition::AcquisitionConfig;
pub use ioc::IocConfig;
pub use massoft::MassoftConfig;
pub use modbus::ModbusConfig;
pub use utils::{is_valid_ip_address, output_config_schema};

/// Schema every configuration file is validated against
pub(crate) const CONFIG_SCHEMA: &str = include_str!("../../resources/config.schema.json");

/// Root configuration structure.
///
/// Each section falls back to its defaults when absent from the file, so an
/// empty YAML document is a valid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// MASsoft host, port, experiment directory and protocol timings.
    #[serde(default)]
    pub massoft: MassoftConfig,

    /// Experiment, view and pace of the acquisition loop.
    #[serde(default)]
    pub acquisition: AcquisitionConfig,

    /// Process-variable prefixes and channel count.
    #[serde(default)]
    pub ioc: IocConfig,

    /// Modbus TCP server publishing the process variables.
    #[serde(default)]
    pub modbus: ModbusConfig,
}

impl Config {
    /// Helper method to create a sample config file when validation fails
    fn create_sample_config<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        let sample_path = path.with_extension("sample.yaml");
        debug!("Original path: {:?}, Sample path: {:?}", path, sample_path);

        if let Some(parent) = sample_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!("Creating parent directory: {:?}", parent);
                fs::create_dir_all(parent).with_context(|| {
                    format!(
                        "Failed to create parent directory for sample config at {:?}",
                        parent
                    )
                })?;
            }
        }

        Self::default()
            .save_to_file(&sample_path)
            .with_context(|| format!("Failed to save sample config to {:?}", sample_path))?;

        error!(
            "Sample configuration file created at {:?}\nPlease edit and rename it",
            sample_path
        );
        Ok(())
    }

    /// Load configuration from a file
    ///
    /// A missing file is created with the default configuration. A file that
    /// fails validation leaves a `<name>.sample.yaml` with the defaults next
    /// to it and returns an error.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(
                "Configuration file not found at {:?}, creating default",
                path
            );
            let default_config = Self::default();
            default_config.save_to_file(path)?;
            return Ok(default_config);
        }

        debug!("Loading configuration from {:?}", path);
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file at {:?}", path))?;

        Self::from_yaml_str(&contents).or_else(|err| {
            error!("Configuration error in {}: {:#}", path.display(), err);
            if let Err(sample_err) = Self::create_sample_config(path) {
                error!("Failed to create sample config: {}", sample_err);
            }
            Err(err.context(format!("Invalid configuration file {}", path.display())))
        })
    }

    /// Validate and deserialize a YAML document
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        // An empty document means "all defaults"
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }

        let yaml_value: serde_yml::Value =
            serde_yml::from_str(contents).context("Failed to parse YAML configuration")?;
        let json_value = serde_json::to_value(&yaml_value)
            .context("Failed to convert YAML to JSON for validation")?;
        utils::validate_against_schema(&json_value)?;

        debug!("Schema validation passed, deserializing into Config structure");
        let config: Config =
            serde_yml::from_str(contents).context("Failed to deserialize configuration")?;

        utils::validate_specific_rules(&config)?;
        Ok(config)
    }

    /// Save the configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml =
            serde_yml::to_string(self).context("Failed to serialize configuration to YAML")?;

        let mut file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create config file at {:?}", path.as_ref()))?;

        file.write_all(yaml.as_bytes())
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Apply command line arguments to override configuration values.
    ///
    /// Only values explicitly provided override the loaded configuration.
    ///
    /// # Parameters
    ///
    /// * `massoft_host` - Host running MASsoft
    /// * `massoft_port` - MASsoft remote-control port
    /// * `experiment` - Experiment file the acquisition starts with
    /// * `auto_start` - If true, open the experiment and acquire at startup
    /// * `modbus_enabled` - Optional flag to enable/disable Modbus server
    /// * `modbus_address` - Optional network address for Modbus server
    /// * `modbus_port` - Optional TCP port for Modbus server
    #[allow(clippy::too_many_arguments)]
    pub fn apply_args(
        &mut self,
        massoft_host: Option<String>,
        massoft_port: Option<u16>,
        experiment: Option<String>,
        auto_start: bool,
        modbus_enabled: Option<bool>,
        modbus_address: Option<String>,
        modbus_port: Option<u16>,
    ) {
        if let Some(host) = massoft_host {
            debug!("Overriding MASsoft host from command line: {}", host);
            self.massoft.host = host;
        }
        if let Some(port) = massoft_port {
            debug!("Overriding MASsoft port from command line: {}", port);
            self.massoft.port = port;
        }
        if let Some(experiment) = experiment {
            debug!("Overriding experiment from command line: {}", experiment);
            self.acquisition.experiment = experiment;
        }
        if auto_start {
            self.acquisition.auto_start = true;
        }

        if let Some(enabled) = modbus_enabled {
            debug!("Overriding Modbus enabled from command line: {}", enabled);
            self.modbus.enabled = enabled;
        }
        if let Some(port) = modbus_port {
            debug!("Overriding Modbus port from command line: {}", port);
            self.modbus.port = port;
        }
        if let Some(address) = modbus_address {
            debug!("Overriding Modbus address from command line: {}", address);
            self.modbus.address = address;
        }
    }
}
