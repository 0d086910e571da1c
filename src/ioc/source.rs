// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the hiden-rga project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Where the IOC gets its readings from

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::massoft::{DataRequest, MassoftClient, MassoftResult};

/// Instrument operations the IOC needs
///
/// Implemented by [`MassoftClient`]; tests substitute an in-memory source.
#[async_trait]
pub trait RgaSource: Send {
    /// Open an experiment file by name
    async fn open_experiment(&mut self, file_name: &str) -> MassoftResult<()>;

    /// Column legends of a view
    async fn legends(&mut self, view: u32) -> MassoftResult<Vec<String>>;

    /// Most recent numeric row of a view, if MASsoft had one
    async fn latest_row(&mut self, view: u32) -> MassoftResult<Option<Vec<f64>>>;

    /// Release the instrument connections
    async fn shutdown(&mut self) {}
}

/// Source shared between the putters and the acquisition loop
pub type SharedSource = Arc<Mutex<Box<dyn RgaSource>>>;

pub fn shared(source: impl RgaSource + 'static) -> SharedSource {
    Arc::new(Mutex::new(Box::new(source)))
}

#[async_trait]
impl RgaSource for MassoftClient {
    async fn open_experiment(&mut self, file_name: &str) -> MassoftResult<()> {
        MassoftClient::open_experiment(self, file_name).await
    }

    async fn legends(&mut self, view: u32) -> MassoftResult<Vec<String>> {
        self.get_legends(view).await
    }

    async fn latest_row(&mut self, view: u32) -> MassoftResult<Option<Vec<f64>>> {
        let rows = self.get_data(DataRequest::new(view).cycles(1)).await?;
        Ok(rows
            .iter()
            .rev()
            .find_map(|row| row.as_numeric().map(|values| values.to_vec())))
    }

    async fn shutdown(&mut self) {
        MassoftClient::shutdown(self);
    }
}
