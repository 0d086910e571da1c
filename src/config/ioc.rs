// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the hiden-rga project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Process-variable naming configuration

use serde::{Deserialize, Serialize};

/// Names and sizes of the RGA process variables.
///
/// With the defaults the PVs are
/// `XF:08IDB-SE{RGA:1}:Acquire`, `XF:08IDB-SE{RGA:1}P:MID1-I` and
/// `XF:08IDB-VA{RGA:1}Mass:MID1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IocConfig {
    /// Prefix of the control PVs (`:OpenExp`, `:ExpName`, `:Acquire`, `:Status`)
    #[serde(default = "default_control_prefix")]
    pub control_prefix: String,

    /// Prefix of the channel reading PVs, followed by `MID<n>-I`
    #[serde(default = "default_reading_prefix")]
    pub reading_prefix: String,

    /// Prefix of the channel mass PVs, followed by `MID<n>`
    #[serde(default = "default_mass_prefix")]
    pub mass_prefix: String,

    /// Number of MID channels published
    #[serde(default = "default_channels")]
    pub channels: usize,

    /// Longest experiment name the experiment-name PV accepts
    #[serde(default = "default_max_name_length")]
    pub max_name_length: usize,
}

fn default_control_prefix() -> String {
    "XF:08IDB-SE{RGA:1}".to_string()
}

fn default_reading_prefix() -> String {
    "XF:08IDB-SE{RGA:1}P:".to_string()
}

fn default_mass_prefix() -> String {
    "XF:08IDB-VA{RGA:1}Mass:".to_string()
}

fn default_channels() -> usize {
    10
}

fn default_max_name_length() -> usize {
    64
}

impl Default for IocConfig {
    fn default() -> Self {
        Self {
            control_prefix: default_control_prefix(),
            reading_prefix: default_reading_prefix(),
            mass_prefix: default_mass_prefix(),
            channels: default_channels(),
            max_name_length: default_max_name_length(),
        }
    }
}
