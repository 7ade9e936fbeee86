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


//! Records held by the meterlog stores.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Wall-clock timestamp in the process's local zone.
pub type Timestamp = DateTime<Local>;

/// Counter column holding the cumulative energy reading (kWh).
pub const ENERGY_COUNTER: &str = "pm_kwh";

/// One telemetry snapshot taken by the raw sampler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSample {
    pub time: Timestamp,
    #[serde(default)]
    pub counters: BTreeMap<String, i64>,
    #[serde(default)]
    pub descriptors: BTreeMap<String, String>,
}

impl RawSample {
    pub fn new(time: Timestamp) -> Self {
        Self {
            time,
            counters: BTreeMap::new(),
            descriptors: BTreeMap::new(),
        }
    }

    pub fn with_counter(mut self, name: impl Into<String>, value: i64) -> Self {
        self.counters.insert(name.into(), value);
        self
    }

    pub fn with_descriptor(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.descriptors.insert(name.into(), value.into());
        self
    }

    pub fn counter(&self, name: &str) -> Option<i64> {
        self.counters.get(name).copied()
    }

    /// Replace the sample time, used to stamp a snapshot with its scheduled tick.
    pub fn stamped(mut self, time: Timestamp) -> Self {
        self.time = time;
        self
    }
}

/// Materialized aggregate for one bucket.
///
/// `time` is the bucket's closing boundary. `delta` is the counter movement
/// inside the bucket and `cumulative` the running total of `delta` over the
/// enclosing day (hourly records) or month (daily records), this bucket
/// included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollupRecord {
    pub time: Timestamp,
    pub delta: i64,
    pub cumulative: i64,
}

impl RollupRecord {
    pub fn new(time: Timestamp, delta: i64, cumulative: i64) -> Self {
        Self {
            time,
            delta,
            cumulative,
        }
    }

    /// Re-express `time` in the local zone.
    pub fn normalized(mut self) -> Self {
        self.time = self.time.with_timezone(&Local);
        self
    }
}

/// Alert event mirrored from the alert source.
///
/// `is_read` and `is_hidden` exist only in the mirror and are changed
/// exclusively through the alert API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub alert_event_id: i64,
    pub alert_type: i64,
    pub alert_event_time: Timestamp,
    #[serde(default)]
    pub var_tag: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub line_text: String,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub is_hidden: bool,
}

impl AlertRecord {
    pub fn new(alert_event_id: i64, alert_event_time: Timestamp) -> Self {
        Self {
            alert_event_id,
            alert_type: 0,
            alert_event_time,
            var_tag: String::new(),
            comment: String::new(),
            line_text: String::new(),
            is_read: false,
            is_hidden: false,
        }
    }
}

/// Local flag on an [`AlertRecord`] that the API may toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertFlag {
    Read,
    Hidden,
}

impl AlertFlag {
    /// Field name of the flag in a stored alert document.
    pub fn field(&self) -> &'static str {
        match self {
            AlertFlag::Read => "is_read",
            AlertFlag::Hidden => "is_hidden",
        }
    }
}
