// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the hiden-rga project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Acquisition configuration

use serde::{Deserialize, Serialize};

/// Settings of the acquisition loop feeding the channel PVs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Open the experiment and start acquiring as soon as the daemon starts
    #[serde(default)]
    pub auto_start: bool,

    /// Experiment file initially held by the experiment-name PV
    #[serde(default = "default_experiment")]
    pub experiment: String,

    /// MASsoft view the readings come from
    #[serde(default = "default_view")]
    pub view: u32,

    /// Pause between two readings, in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

fn default_experiment() -> String {
    "file56.exp".to_string()
}

fn default_view() -> u32 {
    1
}

fn default_interval_ms() -> u64 {
    1000
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            auto_start: false,
            experiment: default_experiment(),
            view: default_view(),
            interval_ms: default_interval_ms(),
        }
    }
}
