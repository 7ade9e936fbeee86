// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


//! Store configuration and connection.
//!
//! Every store is identified by `server`, `port`, `database` and a table
//! name per granularity. All keys are required and checked once, when the
//! stores are connected.

use crate::alert::{AlertMirrorStore, ALERT_TIME_FIELD};
use crate::document::DocumentCollection;
use crate::error::{StorageError, StorageResult};
use crate::journal::JournalCollection;
use crate::raw::{RawSeriesStore, RAW_TIME_FIELD};
use crate::rollup::{RollupStore, ROLLUP_TIME_FIELD};
use meterlog_core::{Granularity, ENERGY_COUNTER};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreEngine {
    /// Journal files under `data_dir/<database>/`.
    #[default]
    Journal,
    /// Process-lifetime collections, nothing touches disk.
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub engine: StoreEngine,

    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    pub server: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,

    pub raw_table: Option<String>,
    pub hourly_table: Option<String>,
    pub daily_table: Option<String>,
    pub alert_table: Option<String>,

    /// Cumulative counter the hourly rollups difference.
    #[serde(default = "default_counter_field")]
    pub counter_field: String,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_counter_field() -> String {
    ENERGY_COUNTER.to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            engine: StoreEngine::default(),
            data_dir: default_data_dir(),
            server: Some("localhost".to_string()),
            port: Some(27017),
            database: Some("meterlog".to_string()),
            raw_table: Some("periodic".to_string()),
            hourly_table: Some("hourly".to_string()),
            daily_table: Some("daily".to_string()),
            alert_table: Some("alert".to_string()),
            counter_field: default_counter_field(),
        }
    }
}

/// Store keys after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStoreConfig {
    pub server: String,
    pub port: u16,
    pub database: String,
    pub raw_table: String,
    pub hourly_table: String,
    pub daily_table: String,
    pub alert_table: String,
}

impl StoreConfig {
    /// Check that every required key is present and non-empty.
    pub fn resolve(&self) -> StorageResult<ResolvedStoreConfig> {
        fn required(value: &Option<String>, key: &'static str) -> StorageResult<String> {
            match value.as_deref().map(str::trim) {
                Some(v) if !v.is_empty() => Ok(v.to_string()),
                _ => Err(StorageError::MissingConfig(key)),
            }
        }

        Ok(ResolvedStoreConfig {
            server: required(&self.server, "server")?,
            port: self.port.ok_or(StorageError::MissingConfig("port"))?,
            database: required(&self.database, "database")?,
            raw_table: required(&self.raw_table, "raw_table")?,
            hourly_table: required(&self.hourly_table, "hourly_table")?,
            daily_table: required(&self.daily_table, "daily_table")?,
            alert_table: required(&self.alert_table, "alert_table")?,
        })
    }
}

/// The four stores the service runs on, wired together.
#[derive(Clone)]
pub struct StoreSet {
    pub raw: Arc<RawSeriesStore>,
    pub hourly: Arc<RollupStore>,
    pub daily: Arc<RollupStore>,
    pub alerts: Arc<AlertMirrorStore>,
}

impl StoreSet {
    pub fn connect(config: &StoreConfig) -> StorageResult<Self> {
        let resolved = config.resolve()?;
        let database_dir = config.data_dir.join(&resolved.database);

        let open = |table: &str, time_field: &str| -> StorageResult<Box<dyn DocumentCollection>> {
            let collection: Box<dyn DocumentCollection> = match config.engine {
                StoreEngine::Journal => {
                    Box::new(JournalCollection::open(&database_dir, table, time_field)?)
                }
                StoreEngine::Memory => Box::new(JournalCollection::in_memory(table, time_field)),
            };
            Ok(collection)
        };

        let stores = Self::assemble(
            open(&resolved.raw_table, RAW_TIME_FIELD)?,
            open(&resolved.hourly_table, ROLLUP_TIME_FIELD)?,
            open(&resolved.daily_table, ROLLUP_TIME_FIELD)?,
            open(&resolved.alert_table, ALERT_TIME_FIELD)?,
            &config.counter_field,
        );

        info!(
            server = %resolved.server,
            port = resolved.port,
            database = %resolved.database,
            engine = ?config.engine,
            "Connected stores"
        );
        Ok(stores)
    }

    /// Fresh in-memory stores with default table names.
    pub fn in_memory() -> Self {
        Self::assemble(
            Box::new(JournalCollection::in_memory("periodic", RAW_TIME_FIELD)),
            Box::new(JournalCollection::in_memory("hourly", ROLLUP_TIME_FIELD)),
            Box::new(JournalCollection::in_memory("daily", ROLLUP_TIME_FIELD)),
            Box::new(JournalCollection::in_memory("alert", ALERT_TIME_FIELD)),
            ENERGY_COUNTER,
        )
    }

    fn assemble(
        raw: Box<dyn DocumentCollection>,
        hourly: Box<dyn DocumentCollection>,
        daily: Box<dyn DocumentCollection>,
        alerts: Box<dyn DocumentCollection>,
        counter_field: &str,
    ) -> Self {
        let raw = Arc::new(RawSeriesStore::new(raw).with_counter(counter_field));
        let hourly = Arc::new(RollupStore::new(Granularity::Hour, hourly, raw.clone()));
        let daily = Arc::new(RollupStore::new(Granularity::Day, daily, hourly.clone()));
        let alerts = Arc::new(AlertMirrorStore::new(alerts));
        Self {
            raw,
            hourly,
            daily,
            alerts,
        }
    }

    pub fn flush(&self) -> StorageResult<()> {
        self.raw.flush()?;
        self.hourly.flush()?;
        self.daily.flush()?;
        self.alerts.flush()
    }
}
