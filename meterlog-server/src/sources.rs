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


//! External sources the collectors read from.
//!
//! The telemetry host and the alert database are reached over HTTP and
//! return rows of text columns; [`meterlog_core::mapping`] turns those rows
//! into records. In-process implementations back tests and local runs.

use crate::error::SourceError;
use async_trait::async_trait;
use meterlog_core::{sample_from_row, RawSample, SourceRow};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;

#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Latest counter and descriptor values.
    async fn read_snapshot(&self) -> Result<RawSample, SourceError>;
}

#[async_trait]
pub trait AlertSource: Send + Sync {
    async fn count(&self) -> Result<u64, SourceError>;

    /// The `n` rows with the highest event ids, highest first.
    async fn read_latest(&self, n: u64) -> Result<Vec<SourceRow>, SourceError>;
}

/// Telemetry host answering `GET <url>` with one row object (or an array
/// whose first element is the row).
pub struct HttpTelemetrySource {
    client: reqwest::Client,
    url: String,
}

impl HttpTelemetrySource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl TelemetrySource for HttpTelemetrySource {
    async fn read_snapshot(&self) -> Result<RawSample, SourceError> {
        let body: Value = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let row = match body {
            Value::Array(mut rows) if !rows.is_empty() => row_from_json(rows.swap_remove(0))?,
            Value::Array(_) => {
                return Err(SourceError::BadResponse("empty telemetry row set".to_string()))
            }
            other => row_from_json(other)?,
        };
        Ok(sample_from_row(&row)?)
    }
}

/// Alert database front answering `GET <url>/count` with `{"count": n}` and
/// `GET <url>/latest?limit=n` with an array of row objects.
pub struct HttpAlertSource {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct CountResponse {
    count: u64,
}

impl HttpAlertSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl AlertSource for HttpAlertSource {
    async fn count(&self) -> Result<u64, SourceError> {
        let response: CountResponse = self
            .client
            .get(format!("{}/count", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.count)
    }

    async fn read_latest(&self, n: u64) -> Result<Vec<SourceRow>, SourceError> {
        let rows: Vec<Value> = self
            .client
            .get(format!("{}/latest", self.base_url))
            .query(&[("limit", n)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        rows.into_iter().map(row_from_json).collect()
    }
}

/// Flatten a JSON object into text columns. Numbers and booleans keep their
/// JSON spelling, null becomes empty.
fn row_from_json(value: Value) -> Result<SourceRow, SourceError> {
    let Value::Object(fields) = value else {
        return Err(SourceError::BadResponse(format!(
            "expected a row object, got {value}"
        )));
    };
    Ok(fields
        .into_iter()
        .map(|(column, value)| {
            let text = match value {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            };
            (column, text)
        })
        .collect())
}

/// Telemetry source replaying queued snapshots; once the queue is drained
/// it keeps returning the last one.
pub struct ScriptedTelemetrySource {
    queue: Mutex<VecDeque<RawSample>>,
    last: Mutex<Option<RawSample>>,
}

impl ScriptedTelemetrySource {
    pub fn new(samples: impl IntoIterator<Item = RawSample>) -> Self {
        Self {
            queue: Mutex::new(samples.into_iter().collect()),
            last: Mutex::new(None),
        }
    }
}

#[async_trait]
impl TelemetrySource for ScriptedTelemetrySource {
    async fn read_snapshot(&self) -> Result<RawSample, SourceError> {
        let next = self.queue.lock().pop_front();
        let mut last = self.last.lock();
        if let Some(sample) = next {
            *last = Some(sample);
        }
        last.clone()
            .ok_or_else(|| SourceError::Unreachable("no scripted telemetry".to_string()))
    }
}

/// Alert source over an in-memory table, kept in ascending event id order.
#[derive(Default)]
pub struct MemoryAlertSource {
    rows: Mutex<Vec<(i64, SourceRow)>>,
}

impl MemoryAlertSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a row; its `ALERTEVENTID` column orders it.
    pub fn push(&self, row: SourceRow) {
        let id = row
            .get("ALERTEVENTID")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(i64::MAX);
        let mut rows = self.rows.lock();
        rows.push((id, row));
        rows.sort_by_key(|(id, _)| *id);
    }
}

#[async_trait]
impl AlertSource for MemoryAlertSource {
    async fn count(&self) -> Result<u64, SourceError> {
        Ok(self.rows.lock().len() as u64)
    }

    async fn read_latest(&self, n: u64) -> Result<Vec<SourceRow>, SourceError> {
        let rows = self.rows.lock();
        Ok(rows
            .iter()
            .rev()
            .take(n as usize)
            .map(|(_, row)| row.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};
    use meterlog_core::ENERGY_COUNTER;
    use serde_json::json;

    #[test]
    fn test_row_from_json_stringifies_values() {
        let row = row_from_json(json!({
            "RTEXPDTIME": "2024/06/10 09:00:00",
            "M93": 1234,
            "CNC6": null,
            "flag": true,
        }))
        .unwrap();

        assert_eq!(row["M93"], "1234");
        assert_eq!(row["CNC6"], "");
        assert_eq!(row["flag"], "true");

        let sample = sample_from_row(&row).unwrap();
        assert_eq!(sample.counter(ENERGY_COUNTER), Some(1234));
    }

    #[test]
    fn test_row_from_json_rejects_non_objects() {
        assert!(matches!(
            row_from_json(json!([1, 2])),
            Err(SourceError::BadResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_scripted_source_repeats_last() {
        let t = Local.with_ymd_and_hms(2024, 6, 10, 9, 0, 0).unwrap();
        let source = ScriptedTelemetrySource::new([
            RawSample::new(t).with_counter(ENERGY_COUNTER, 1),
            RawSample::new(t).with_counter(ENERGY_COUNTER, 2),
        ]);

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(source.read_snapshot().await.unwrap().counter(ENERGY_COUNTER));
        }
        assert_eq!(seen, vec![Some(1), Some(2), Some(2)]);

        let empty = ScriptedTelemetrySource::new(std::iter::empty());
        assert!(empty.read_snapshot().await.is_err());
    }

    #[tokio::test]
    async fn test_memory_alert_source_latest_first() {
        let source = MemoryAlertSource::new();
        for id in [3, 1, 2] {
            let mut row = SourceRow::new();
            row.insert("ALERTEVENTID".to_string(), id.to_string());
            source.push(row);
        }

        assert_eq!(source.count().await.unwrap(), 3);
        let latest = source.read_latest(2).await.unwrap();
        let ids: Vec<_> = latest.iter().map(|r| r["ALERTEVENTID"].clone()).collect();
        assert_eq!(ids, vec!["3", "2"]);
    }
}
