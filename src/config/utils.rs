// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the hiden-rga project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration utilities
//!
//! This module provides utility functions for working with configuration
//! settings, including validation and schema management.

use anyhow::{Context, Result};
use log::{debug, warn};

use super::{Config, CONFIG_SCHEMA};

/// Output the embedded JSON schema to the console.
///
/// This function is called when the `--show-config-schema` flag is provided
/// on the command line.
///
/// # Example
///
/// ```bash
/// ./hiden_rga --show-config-schema > config_schema.json
/// ```
pub fn output_config_schema() -> Result<()> {
    let schema: serde_json::Value =
        serde_json::from_str(CONFIG_SCHEMA).context("Failed to parse JSON schema")?;
    let formatted_schema =
        serde_json::to_string_pretty(&schema).context("Failed to format JSON schema")?;
    println!("{}", formatted_schema);
    Ok(())
}

/// Check if a string is a valid IP address
///
/// Validates that a string represents a valid IPv4 or IPv6 address,
/// or is one of the special values like "localhost" or "0.0.0.0".
pub fn is_valid_ip_address(addr: &str) -> bool {
    if addr.parse::<std::net::IpAddr>().is_ok() {
        return true;
    }

    matches!(addr, "localhost" | "::" | "::0" | "0.0.0.0")
}

/// Validate a configuration document against the embedded schema
pub(crate) fn validate_against_schema(document: &serde_json::Value) -> Result<()> {
    let schema: serde_json::Value =
        serde_json::from_str(CONFIG_SCHEMA).context("Failed to parse JSON schema")?;
    let validator = jsonschema::validator_for(&schema)
        .map_err(|err| anyhow::anyhow!("Invalid configuration schema: {}", err))?;

    if let Err(error) = validator.validate(document) {
        anyhow::bail!("Configuration validation failed: {}", error);
    }
    Ok(())
}

/// Validates the configuration against rules the JSON schema cannot express.
///
/// # Validation Rules
///
/// - **Ports**: MASsoft and Modbus ports within 1-65534
/// - **Timings**: command and receive timeouts are not zero, at least one poll
/// - **Channels**: between 1 and 32 channels, so the register map stays small
/// - **Experiment**: the initial experiment name fits the experiment-name PV
/// - **Addresses**: unusual Modbus bind addresses only produce a warning
pub fn validate_specific_rules(config: &Config) -> Result<()> {
    debug!("Performing additional validation checks");

    if config.massoft.port < 1 || config.massoft.port > 65534 {
        anyhow::bail!("Invalid MASsoft port number: {}", config.massoft.port);
    }
    if config.massoft.host.trim().is_empty() {
        anyhow::bail!("MASsoft host must not be empty");
    }
    if config.massoft.command_timeout_ms == 0 || config.massoft.receive_timeout_ms == 0 {
        anyhow::bail!("MASsoft timeouts must be greater than zero");
    }
    if config.massoft.poll_attempts == 0 {
        anyhow::bail!("MASsoft poll_attempts must be at least 1");
    }

    if config.ioc.channels == 0 || config.ioc.channels > 32 {
        anyhow::bail!(
            "Invalid channel count {}: expected 1 to 32",
            config.ioc.channels
        );
    }
    if config.acquisition.experiment.chars().count() > config.ioc.max_name_length {
        anyhow::bail!(
            "Experiment name {:?} is longer than {} characters",
            config.acquisition.experiment,
            config.ioc.max_name_length
        );
    }
    if !config.acquisition.experiment.to_lowercase().ends_with(".exp") {
        warn!(
            "Experiment {:?} does not look like a MASsoft .exp file",
            config.acquisition.experiment
        );
    }

    if config.modbus.port < 1 || config.modbus.port > 65534 {
        anyhow::bail!("Invalid Modbus port number: {}", config.modbus.port);
    }
    if !is_valid_ip_address(&config.modbus.address) {
        warn!(
            "Potentially invalid Modbus address format: {}",
            config.modbus.address
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ip_addresses() {
        assert!(is_valid_ip_address("127.0.0.1"));
        assert!(is_valid_ip_address("::1"));
        assert!(is_valid_ip_address("localhost"));
        assert!(!is_valid_ip_address("not an address"));
    }

    #[test]
    fn default_config_passes_specific_rules() {
        assert!(validate_specific_rules(&Config::default()).is_ok());
    }

    #[test]
    fn channel_count_is_bounded() {
        let mut config = Config::default();
        config.ioc.channels = 0;
        assert!(validate_specific_rules(&config).is_err());
        config.ioc.channels = 33;
        assert!(validate_specific_rules(&config).is_err());
    }

    #[test]
    fn experiment_name_must_fit_the_pv() {
        let mut config = Config::default();
        config.acquisition.experiment = format!("{}.exp", "x".repeat(80));
        assert!(validate_specific_rules(&config).is_err());
    }

    #[test]
    fn experiment_name_length_counts_characters() {
        let mut config = Config::default();
        let max = config.ioc.max_name_length;
        config.acquisition.experiment = format!("{}.exp", "é".repeat(max - 4));
        assert!(config.acquisition.experiment.len() > max);
        assert!(validate_specific_rules(&config).is_ok());

        config.acquisition.experiment = format!("{}.exp", "é".repeat(max - 3));
        assert!(validate_specific_rules(&config).is_err());
    }

    #[test]
    fn default_config_matches_schema() {
        let value = serde_json::to_value(Config::default()).unwrap();
        assert!(validate_against_schema(&value).is_ok());
    }
}
