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


//! Alert mirror sync
//!
//! Copies alerts that the external alert source has and the local mirror
//! lacks. The source only grows, so the difference in row counts is the
//! number of newest rows to fetch.

use crate::collectors::CollectorStats;
use crate::error::TaskError;
use crate::sources::AlertSource;
use meterlog_core::{alert_from_row, AlertRecord};
use meterlog_storage::AlertMirrorStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct AlertMirrorSync {
    source: Arc<dyn AlertSource>,
    mirror: Arc<AlertMirrorStore>,
    interval: Duration,
    stats: Arc<CollectorStats>,
}

impl AlertMirrorSync {
    pub fn new(
        source: Arc<dyn AlertSource>,
        mirror: Arc<AlertMirrorStore>,
        interval: Duration,
        stats: Arc<CollectorStats>,
    ) -> Self {
        Self {
            source,
            mirror,
            interval,
            stats,
        }
    }

    pub async fn run(self, cancel: CancellationToken) -> Result<(), TaskError> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval_secs = self.interval.as_secs(), "Alert mirror sync started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.sync_once().await?;
                }
            }
        }

        info!("Alert mirror sync stopped");
        Ok(())
    }

    /// One comparison and copy pass. Returns the number of alerts written.
    pub async fn sync_once(&self) -> Result<usize, TaskError> {
        let source_count = self.source.count().await?;
        let mirror = self.mirror.clone();
        let mirror_count = tokio::task::spawn_blocking(move || mirror.count()).await??;

        if source_count <= mirror_count {
            debug!(source_count, mirror_count, "Alert mirror up to date");
            return Ok(0);
        }

        let missing = source_count - mirror_count;
        let rows = self.source.read_latest(missing).await?;
        let mut alerts = rows
            .iter()
            .map(alert_from_row)
            .collect::<Result<Vec<AlertRecord>, _>>()?;
        alerts.sort_by_key(|alert| alert.alert_event_id);

        let mirror = self.mirror.clone();
        let copied = tokio::task::spawn_blocking(move || {
            let mut copied = 0;
            for alert in &alerts {
                if mirror.insert_if_new(alert)? {
                    copied += 1;
                }
            }
            Ok::<_, meterlog_storage::StorageError>(copied)
        })
        .await??;

        self.stats.record_alerts_copied(copied);
        info!(source_count, mirror_count, copied, "Mirrored new alerts");
        Ok(copied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::MemoryAlertSource;
    use meterlog_core::{AlertFlag, SourceRow};
    use meterlog_storage::StoreSet;

    fn row(id: i64) -> SourceRow {
        [
            ("ALERTEVENTID", id.to_string()),
            ("ALERTEVENTTIME", format!("2024-06-10T09:{:02}:00Z", id)),
            ("VARTAG", format!("TAG{id}")),
            ("COMMENT", "over threshold".to_string()),
            ("ALERTTYPE", "2".to_string()),
            ("LINETEXT", format!("line {id}")),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    fn sync_fixture(rows: Vec<SourceRow>) -> (AlertMirrorSync, StoreSet, Arc<CollectorStats>) {
        let stores = StoreSet::in_memory();
        let source = Arc::new(MemoryAlertSource::new());
        for row in rows {
            source.push(row);
        }
        let stats = Arc::new(CollectorStats::default());
        let sync = AlertMirrorSync::new(
            source,
            stores.alerts.clone(),
            Duration::from_secs(15),
            stats.clone(),
        );
        (sync, stores, stats)
    }

    #[tokio::test]
    async fn test_sync_copies_only_newest_rows() {
        let (sync, stores, stats) = sync_fixture((1..=10).map(row).collect());
        for id in 1..=7 {
            let alert = alert_from_row(&row(id)).unwrap();
            stores.alerts.insert_if_new(&alert).unwrap();
        }
        stores.alerts.set_flag(3, AlertFlag::Read, true).unwrap();
        stores.alerts.set_flag(5, AlertFlag::Hidden, true).unwrap();

        assert_eq!(sync.sync_once().await.unwrap(), 3);

        let ids: Vec<i64> = stores
            .alerts
            .find_all()
            .unwrap()
            .iter()
            .map(|a| a.alert_event_id)
            .collect();
        assert_eq!(ids, (1..=10).rev().collect::<Vec<_>>());

        let read = stores.alerts.find_by_id(3).unwrap().unwrap();
        assert!(read.is_read && !read.is_hidden);
        let hidden = stores.alerts.find_by_id(5).unwrap().unwrap();
        assert!(hidden.is_hidden && !hidden.is_read);
        let copied = stores.alerts.find_by_id(9).unwrap().unwrap();
        assert!(!copied.is_read && !copied.is_hidden);
        assert_eq!(copied.var_tag, "TAG9");
        assert_eq!(stats.snapshot().alerts_copied, 3);

        assert_eq!(sync.sync_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sync_fails_on_bad_row() {
        let mut bad = row(3);
        bad.insert("ALERTEVENTID".to_string(), "three".to_string());
        let (sync, stores, _) = sync_fixture(vec![row(1), row(2), bad]);

        let result = sync.sync_once().await;
        assert!(matches!(result, Err(TaskError::Mapping(_))));
        assert_eq!(stores.alerts.count().unwrap(), 0);
    }
}
