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


//! Periodic collectors
//!
//! The raw sampler polls the telemetry source on a fixed schedule and the
//! boundary closers write the rollup record of each bucket once it closes.
//! Every loop stops when the shared cancellation token fires and returns an
//! error when a source or store call fails.

use crate::error::TaskError;
use crate::sources::TelemetrySource;
use chrono::{Duration, Timelike};
use meterlog_core::{Clock, Granularity, Timestamp};
use meterlog_storage::{RawSeriesStore, RollupStore, StorageResult};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Counters shared by the background loops, reported on `/health`.
#[derive(Debug, Default)]
pub struct CollectorStats {
    ticks: AtomicU64,
    samples: AtomicU64,
    skipped_ticks: AtomicU64,
    hourly_closed: AtomicU64,
    daily_closed: AtomicU64,
    alerts_copied: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollectorStatsSnapshot {
    pub ticks: u64,
    pub samples: u64,
    pub skipped_ticks: u64,
    pub hourly_closed: u64,
    pub daily_closed: u64,
    pub alerts_copied: u64,
}

impl CollectorStats {
    pub fn snapshot(&self) -> CollectorStatsSnapshot {
        CollectorStatsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            samples: self.samples.load(Ordering::Relaxed),
            skipped_ticks: self.skipped_ticks.load(Ordering::Relaxed),
            hourly_closed: self.hourly_closed.load(Ordering::Relaxed),
            daily_closed: self.daily_closed.load(Ordering::Relaxed),
            alerts_copied: self.alerts_copied.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_alerts_copied(&self, n: usize) {
        self.alerts_copied.fetch_add(n as u64, Ordering::Relaxed);
    }

    fn record_closed(&self, granularity: Granularity) {
        let counter = match granularity {
            Granularity::Hour => &self.hourly_closed,
            Granularity::Day => &self.daily_closed,
            Granularity::Month => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Next intended tick after `previous`.
///
/// The schedule is anchored to intended ticks, not to completion times.
/// When `now` is already more than one interval past the next tick, whole
/// intervals are skipped so the sampler does not burst to catch up. Returns
/// the next tick and how many ticks were skipped.
pub fn advance_schedule(previous: Timestamp, interval: Duration, now: Timestamp) -> (Timestamp, u64) {
    let next = previous + interval;
    let behind = now - next;
    if interval <= Duration::zero() || behind <= interval {
        return (next, 0);
    }
    let skipped = behind.num_milliseconds() / interval.num_milliseconds();
    (next + interval * skipped as i32, skipped as u64)
}

/// Sleep until `target` by `clock`. Returns false when cancelled first.
async fn sleep_until(clock: &dyn Clock, target: Timestamp, cancel: &CancellationToken) -> bool {
    let wait = (target - clock.now()).to_std().unwrap_or_default();
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(wait) => true,
    }
}

fn to_chrono(duration: std::time::Duration) -> Duration {
    Duration::milliseconds(duration.as_millis() as i64)
}

/// Polls the telemetry source and appends one raw sample per tick.
pub struct RawSampler {
    source: Arc<dyn TelemetrySource>,
    raw: Arc<RawSeriesStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    stats: Arc<CollectorStats>,
}

impl RawSampler {
    pub fn new(
        source: Arc<dyn TelemetrySource>,
        raw: Arc<RawSeriesStore>,
        clock: Arc<dyn Clock>,
        interval: std::time::Duration,
        stats: Arc<CollectorStats>,
    ) -> Self {
        Self {
            source,
            raw,
            clock,
            interval: to_chrono(interval),
            stats,
        }
    }

    pub async fn run(self, cancel: CancellationToken) -> Result<(), TaskError> {
        let now = self.clock.now();
        let mut tick = now.with_nanosecond(0).unwrap_or(now);
        info!(interval_ms = self.interval.num_milliseconds(), first_tick = %tick, "Raw sampler started");

        while sleep_until(self.clock.as_ref(), tick, &cancel).await {
            self.sample_at(tick).await?;

            let (next, skipped) = advance_schedule(tick, self.interval, self.clock.now());
            if skipped > 0 {
                warn!(skipped, next = %next, "Raw sampler fell behind, skipping ticks");
                self.stats.skipped_ticks.fetch_add(skipped, Ordering::Relaxed);
            }
            tick = next;
        }

        info!("Raw sampler stopped");
        Ok(())
    }

    /// Read one snapshot and store it under the intended tick time.
    pub async fn sample_at(&self, tick: Timestamp) -> Result<(), TaskError> {
        self.stats.ticks.fetch_add(1, Ordering::Relaxed);
        let sample = self.source.read_snapshot().await?.stamped(tick);

        let raw = self.raw.clone();
        tokio::task::spawn_blocking(move || raw.append(&sample)).await??;

        self.stats.samples.fetch_add(1, Ordering::Relaxed);
        debug!(tick = %tick, "Appended raw sample");
        Ok(())
    }
}

/// Writes the record of each bucket of one granularity once it has closed.
///
/// The closer wakes a settle delay after every boundary so the samples
/// stamped at the boundary itself have landed.
pub struct BoundaryCloser {
    store: Arc<RollupStore>,
    prerequisite: Option<Arc<RollupStore>>,
    clock: Arc<dyn Clock>,
    settle: Duration,
    stats: Arc<CollectorStats>,
}

impl BoundaryCloser {
    pub fn new(
        store: Arc<RollupStore>,
        clock: Arc<dyn Clock>,
        settle: std::time::Duration,
        stats: Arc<CollectorStats>,
    ) -> Self {
        Self {
            store,
            prerequisite: None,
            clock,
            settle: to_chrono(settle),
            stats,
        }
    }

    /// Close the same boundary in `store` first. The daily closer uses this
    /// so the last hour of the day exists before the day is summed.
    pub fn with_prerequisite(mut self, store: Arc<RollupStore>) -> Self {
        self.prerequisite = Some(store);
        self
    }

    pub fn granularity(&self) -> Granularity {
        self.store.granularity()
    }

    /// First boundary due at or after `now`, accounting for the settle delay.
    pub fn next_boundary(&self, now: Timestamp) -> Timestamp {
        self.granularity().bounds(&(now - self.settle)).1
    }

    pub async fn run(self, cancel: CancellationToken) -> Result<(), TaskError> {
        let granularity = self.granularity();
        let mut boundary = self.next_boundary(self.clock.now());
        info!(granularity = %granularity, next = %boundary, "Boundary closer started");

        while sleep_until(self.clock.as_ref(), boundary + self.settle, &cancel).await {
            self.close(boundary).await?;
            boundary = granularity.step(&boundary, 1);
        }

        info!(granularity = %granularity, "Boundary closer stopped");
        Ok(())
    }

    /// Insert the record labelled `boundary` if it is still missing.
    pub async fn close(&self, boundary: Timestamp) -> Result<bool, TaskError> {
        let store = self.store.clone();
        let prerequisite = self.prerequisite.clone();

        let inserted = tokio::task::spawn_blocking(move || -> StorageResult<bool> {
            if let Some(prerequisite) = prerequisite {
                prerequisite.insert_if_absent(&boundary)?;
            }
            store.insert_if_absent(&boundary)
        })
        .await??;

        if inserted {
            self.stats.record_closed(self.granularity());
            info!(granularity = %self.granularity(), boundary = %boundary, "Closed bucket");
        } else {
            debug!(granularity = %self.granularity(), boundary = %boundary, "Bucket already closed");
        }
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::sources::ScriptedTelemetrySource;
    use async_trait::async_trait;
    use chrono::{Local, TimeZone};
    use meterlog_core::{FixedClock, RawSample, SystemClock, ENERGY_COUNTER};
    use meterlog_storage::StoreSet;

    fn local(h: u32, mi: u32, s: u32) -> Timestamp {
        Local.with_ymd_and_hms(2024, 6, 10, h, mi, s).unwrap()
    }

    #[test]
    fn test_advance_schedule_on_time() {
        let interval = Duration::seconds(15);
        let (next, skipped) = advance_schedule(local(9, 0, 0), interval, local(9, 0, 3));
        assert_eq!(next, local(9, 0, 15));
        assert_eq!(skipped, 0);

        // A slow tick within one interval keeps the anchor.
        let (next, skipped) = advance_schedule(local(9, 0, 0), interval, local(9, 0, 29));
        assert_eq!(next, local(9, 0, 15));
        assert_eq!(skipped, 0);
    }

    #[test]
    fn test_advance_schedule_skips_when_far_behind() {
        let interval = Duration::seconds(15);
        let (next, skipped) = advance_schedule(local(9, 0, 0), interval, local(9, 1, 0));
        assert_eq!(skipped, 3);
        assert_eq!(next, local(9, 1, 0));
        assert_eq!((next - local(9, 0, 0)).num_seconds() % 15, 0);
    }

    #[tokio::test]
    async fn test_sample_at_stamps_intended_tick() {
        let stores = StoreSet::in_memory();
        let stats = Arc::new(CollectorStats::default());
        let read_at = local(9, 0, 7);
        let source = Arc::new(ScriptedTelemetrySource::new([
            RawSample::new(read_at).with_counter(ENERGY_COUNTER, 42),
        ]));
        let sampler = RawSampler::new(
            source,
            stores.raw.clone(),
            Arc::new(FixedClock::new(read_at)),
            std::time::Duration::from_secs(15),
            stats.clone(),
        );

        sampler.sample_at(local(9, 0, 0)).await.unwrap();

        let latest = stores.raw.latest().unwrap().unwrap();
        assert_eq!(latest.time, local(9, 0, 0));
        assert_eq!(latest.counter(ENERGY_COUNTER), Some(42));
        assert_eq!(stats.snapshot().samples, 1);
    }

    struct FailingSource;

    #[async_trait]
    impl TelemetrySource for FailingSource {
        async fn read_snapshot(&self) -> Result<RawSample, SourceError> {
            Err(SourceError::Unreachable("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_sampler_stops_on_source_error() {
        let stores = StoreSet::in_memory();
        let sampler = RawSampler::new(
            Arc::new(FailingSource),
            stores.raw.clone(),
            Arc::new(SystemClock),
            std::time::Duration::from_secs(1),
            Arc::new(CollectorStats::default()),
        );

        let result = sampler.run(CancellationToken::new()).await;
        assert!(matches!(result, Err(TaskError::Source(_))));
        assert_eq!(stores.raw.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sampler_stops_on_cancel() {
        let stores = StoreSet::in_memory();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let sampler = RawSampler::new(
            Arc::new(ScriptedTelemetrySource::new(std::iter::empty())),
            stores.raw.clone(),
            Arc::new(FixedClock::new(local(9, 0, 0) + Duration::milliseconds(500))),
            std::time::Duration::from_secs(15),
            Arc::new(CollectorStats::default()),
        );

        // The first tick is already due, cancellation still wins.
        sampler.run(cancel).await.unwrap();
        assert_eq!(stores.raw.count().unwrap(), 0);
    }

    #[test]
    fn test_next_boundary_respects_settle_delay() {
        let stores = StoreSet::in_memory();
        let closer = BoundaryCloser::new(
            stores.hourly.clone(),
            Arc::new(SystemClock),
            std::time::Duration::from_secs(5),
            Arc::new(CollectorStats::default()),
        );

        assert_eq!(closer.next_boundary(local(9, 30, 0)), local(10, 0, 0));
        // Still inside the settle window of 09:00.
        assert_eq!(closer.next_boundary(local(9, 0, 3)), local(9, 0, 0));
        assert_eq!(closer.next_boundary(local(9, 0, 5)), local(9, 0, 0));
        assert_eq!(closer.next_boundary(local(9, 0, 6)), local(10, 0, 0));
    }

    #[tokio::test]
    async fn test_daily_closer_closes_last_hour_first() {
        let stores = StoreSet::in_memory();
        let day = local(0, 0, 0);
        for h in 0..=24 {
            let sample = RawSample::new(day + Duration::hours(h)).with_counter(ENERGY_COUNTER, 10 * h);
            stores.raw.append(&sample).unwrap();
        }
        // Every hour but the last was closed by the hourly closer.
        for h in 1..24 {
            stores.hourly.insert_if_absent(&(day + Duration::hours(h))).unwrap();
        }

        let stats = Arc::new(CollectorStats::default());
        let closer = BoundaryCloser::new(
            stores.daily.clone(),
            Arc::new(SystemClock),
            std::time::Duration::from_secs(5),
            stats.clone(),
        )
        .with_prerequisite(stores.hourly.clone());

        let midnight = day + Duration::days(1);
        assert!(closer.close(midnight).await.unwrap());
        assert!(!closer.close(midnight).await.unwrap());

        assert_eq!(stores.hourly.count().unwrap(), 24);
        let daily = stores.daily.find_in_range(&day, &midnight, false, true).unwrap();
        assert_eq!(daily.len(), 1);
        assert_eq!(daily[0].delta, 240);
        assert_eq!(stats.snapshot().daily_closed, 1);
    }
}
