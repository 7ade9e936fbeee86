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


//! Rollup store
//!
//! One store per granularity. Records are labelled with the closing boundary
//! of their bucket and carry the bucket's delta plus a running total over
//! the enclosing period:
//!
//! ```text
//!   raw samples --(counter difference)--> hourly  (total per day)
//!   hourly      --(sum of deltas)-------> daily   (total per month)
//! ```
//!
//! Each store owns a read-write lock around its collection. Computing a
//! record only takes read locks (the source store's, then this store's);
//! the write lock is held just for the insert or replace.

use crate::document::{DocumentCollection, Filter, FindOptions, TimeRange};
use crate::error::{StorageError, StorageResult};
use meterlog_core::{Granularity, RollupRecord, Timestamp};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Time field of stored rollup records.
pub const ROLLUP_TIME_FIELD: &str = "time";

/// Anything that can report how much a quantity moved between two instants.
pub trait DeltaSource: Send + Sync {
    fn delta_between(&self, lower: &Timestamp, upper: &Timestamp) -> StorageResult<i64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepsertOutcome {
    Inserted,
    Replaced,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RollupStats {
    pub created: u64,
    pub inserted: u64,
    pub repserted: u64,
}

#[derive(Default)]
struct RollupStatsInternal {
    created: AtomicU64,
    inserted: AtomicU64,
    repserted: AtomicU64,
}

impl RollupStatsInternal {
    fn snapshot(&self) -> RollupStats {
        RollupStats {
            created: self.created.load(Ordering::Relaxed),
            inserted: self.inserted.load(Ordering::Relaxed),
            repserted: self.repserted.load(Ordering::Relaxed),
        }
    }
}

pub struct RollupStore {
    granularity: Granularity,
    collection: RwLock<Box<dyn DocumentCollection>>,
    source: Arc<dyn DeltaSource>,
    stats: RollupStatsInternal,
}

impl RollupStore {
    pub fn new(
        granularity: Granularity,
        collection: Box<dyn DocumentCollection>,
        source: Arc<dyn DeltaSource>,
    ) -> Self {
        Self {
            granularity,
            collection: RwLock::new(collection),
            source,
            stats: RollupStatsInternal::default(),
        }
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn stats(&self) -> RollupStats {
        self.stats.snapshot()
    }

    pub fn count(&self) -> StorageResult<u64> {
        self.collection.read().count(&Filter::All)
    }

    pub fn count_by_exact_time(&self, t: &Timestamp) -> StorageResult<u64> {
        self.collection.read().count(&Filter::exact_time(t))
    }

    pub fn count_in_range(
        &self,
        lower: &Timestamp,
        upper: &Timestamp,
        lower_inclusive: bool,
        upper_inclusive: bool,
    ) -> StorageResult<u64> {
        let filter = Filter::Time(TimeRange::new(lower, upper, lower_inclusive, upper_inclusive));
        self.collection.read().count(&filter)
    }

    /// Records in range, oldest first, times in the local zone.
    pub fn find_in_range(
        &self,
        lower: &Timestamp,
        upper: &Timestamp,
        lower_inclusive: bool,
        upper_inclusive: bool,
    ) -> StorageResult<Vec<RollupRecord>> {
        let filter = Filter::Time(TimeRange::new(lower, upper, lower_inclusive, upper_inclusive));
        let collection = self.collection.read();
        collection
            .find(&filter, &FindOptions::default())?
            .into_iter()
            .map(|doc| {
                serde_json::from_value::<RollupRecord>(doc)
                    .map(RollupRecord::normalized)
                    .map_err(|e| StorageError::decode(collection.name(), e))
            })
            .collect()
    }

    pub fn sum_deltas(
        &self,
        lower: &Timestamp,
        upper: &Timestamp,
        lower_inclusive: bool,
        upper_inclusive: bool,
    ) -> StorageResult<i64> {
        Ok(self
            .find_in_range(lower, upper, lower_inclusive, upper_inclusive)?
            .iter()
            .map(|record| record.delta)
            .sum())
    }

    /// Compute the record for the bucket labelled `floor(t)` without storing it.
    ///
    /// The running total adds this bucket's delta to the stored deltas of
    /// earlier buckets in the same period, so recomputing an old bucket is
    /// not affected by buckets stored after it.
    pub fn create(&self, t: &Timestamp) -> StorageResult<RollupRecord> {
        let time = self.granularity.floor(t);
        let (lower, upper) = self.granularity.bounds(&time);
        let delta = self.source.delta_between(&lower, &upper)?;

        let cumulative = match self.granularity.period() {
            Some(period) => {
                let (period_lower, _) = period.bounds(&time);
                self.sum_deltas(&period_lower, &time, false, false)? + delta
            }
            None => delta,
        };

        self.stats.created.fetch_add(1, Ordering::Relaxed);
        Ok(RollupRecord::new(time, delta, cumulative))
    }

    /// Store the record for `floor(t)` unless one exists. Returns whether a
    /// record was written.
    pub fn insert_if_absent(&self, t: &Timestamp) -> StorageResult<bool> {
        let time = self.granularity.floor(t);
        if self.count_by_exact_time(&time)? > 0 {
            return Ok(false);
        }

        let record = self.create(&time)?;
        let document = serde_json::to_value(&record)?;

        let mut collection = self.collection.write();
        // Another writer may have closed the bucket while we computed.
        if collection.count(&Filter::exact_time(&time))? > 0 {
            return Ok(false);
        }
        collection.insert_one(document)?;
        drop(collection);

        self.stats.inserted.fetch_add(1, Ordering::Relaxed);
        debug!(
            granularity = %self.granularity,
            time = %record.time,
            delta = record.delta,
            cumulative = record.cumulative,
            "Inserted rollup"
        );
        Ok(true)
    }

    /// Replace the record with the same time as `record`, inserting it when
    /// none exists.
    pub fn repsert(&self, record: &RollupRecord) -> StorageResult<RepsertOutcome> {
        let document = serde_json::to_value(record)?;
        let previous = self.collection.write().find_one_and_replace(
            &Filter::exact_time(&record.time),
            document,
            true,
        )?;
        self.stats.repserted.fetch_add(1, Ordering::Relaxed);
        Ok(match previous {
            Some(_) => RepsertOutcome::Replaced,
            None => RepsertOutcome::Inserted,
        })
    }

    /// Recompute and store every bucket labelled in `(low, upper]`, oldest
    /// first. Each bucket is its own critical section. Returns the number of
    /// buckets written.
    pub fn repsert_range(&self, low: &Timestamp, upper: &Timestamp) -> StorageResult<usize> {
        let mut written = 0;
        for label in self.granularity.labels(low, upper) {
            let record = self.create(&label)?;
            self.repsert(&record)?;
            written += 1;
        }
        debug!(
            granularity = %self.granularity,
            low = %low,
            upper = %upper,
            written,
            "Repserted rollup range"
        );
        Ok(written)
    }

    pub fn flush(&self) -> StorageResult<()> {
        self.collection.write().flush()
    }
}

impl DeltaSource for RollupStore {
    /// Sum of the deltas of buckets labelled in `(lower, upper]`.
    fn delta_between(&self, lower: &Timestamp, upper: &Timestamp) -> StorageResult<i64> {
        self.sum_deltas(lower, upper, false, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::JournalCollection;
    use crate::raw::{RawSeriesStore, RAW_TIME_FIELD};
    use chrono::{Duration, Local, TimeZone};
    use meterlog_core::{RawSample, ENERGY_COUNTER};

    struct Fixture {
        raw: Arc<RawSeriesStore>,
        hourly: Arc<RollupStore>,
        daily: RollupStore,
    }

    fn fixture() -> Fixture {
        let raw = Arc::new(RawSeriesStore::new(Box::new(JournalCollection::in_memory(
            "raw",
            RAW_TIME_FIELD,
        ))));
        let hourly = Arc::new(RollupStore::new(
            Granularity::Hour,
            Box::new(JournalCollection::in_memory("hourly", ROLLUP_TIME_FIELD)),
            raw.clone(),
        ));
        let daily = RollupStore::new(
            Granularity::Day,
            Box::new(JournalCollection::in_memory("daily", ROLLUP_TIME_FIELD)),
            hourly.clone(),
        );
        Fixture { raw, hourly, daily }
    }

    fn at(d: u32, h: u32, m: u32) -> Timestamp {
        Local.with_ymd_and_hms(2024, 6, d, h, m, 0).unwrap()
    }

    /// One reading per quarter hour across `hours` hours, growing by `per_hour`.
    fn feed(raw: &RawSeriesStore, start: Timestamp, hours: i64, per_hour: i64) {
        for quarter in 0..=(hours * 4) {
            let time = start + Duration::minutes(15 * quarter);
            let kwh = 1_000 + quarter * per_hour / 4;
            raw.append(&RawSample::new(time).with_counter(ENERGY_COUNTER, kwh))
                .unwrap();
        }
    }

    #[test]
    fn test_hourly_create_differences_counter() {
        let f = fixture();
        let hour = at(10, 9, 0);
        for (offset, kwh) in [(0, 100), (15, 120), (30, 150)] {
            f.raw
                .append(&RawSample::new(hour + Duration::seconds(offset)).with_counter(ENERGY_COUNTER, kwh))
                .unwrap();
        }

        let record = f.hourly.create(&(hour + Duration::hours(1))).unwrap();
        assert_eq!(record.time, at(10, 10, 0));
        assert_eq!(record.delta, 50);
        assert_eq!(record.cumulative, 50);
    }

    #[test]
    fn test_create_aligns_time() {
        let f = fixture();
        let record = f.hourly.create(&at(10, 9, 42)).unwrap();
        assert_eq!(record.time, at(10, 9, 0));
        assert_eq!(record.delta, 0);
    }

    #[test]
    fn test_hourly_cumulative_runs_within_day() {
        let f = fixture();
        feed(&f.raw, at(10, 0, 0), 4, 40);

        f.hourly.repsert_range(&at(10, 0, 0), &at(10, 4, 0)).unwrap();
        let records = f
            .hourly
            .find_in_range(&at(10, 0, 0), &at(11, 0, 0), false, true)
            .unwrap();

        let cumulative: Vec<_> = records.iter().map(|r| r.cumulative).collect();
        assert_eq!(cumulative, vec![40, 80, 120, 160]);
        assert!(records.iter().all(|r| r.delta == 40));
    }

    #[test]
    fn test_midnight_record_closes_previous_day() {
        let f = fixture();
        feed(&f.raw, at(10, 22, 0), 3, 8);

        f.hourly.repsert_range(&at(10, 22, 0), &at(11, 1, 0)).unwrap();
        let midnight = f
            .hourly
            .find_in_range(&at(11, 0, 0), &at(11, 0, 0), true, true)
            .unwrap();
        assert_eq!(midnight[0].cumulative, 16);

        let one_am = f
            .hourly
            .find_in_range(&at(11, 1, 0), &at(11, 1, 0), true, true)
            .unwrap();
        assert_eq!(one_am[0].cumulative, 8);
    }

    #[test]
    fn test_insert_if_absent_is_idempotent() {
        let f = fixture();
        feed(&f.raw, at(10, 9, 0), 1, 12);

        assert!(f.hourly.insert_if_absent(&at(10, 10, 0)).unwrap());
        let first = f.hourly.find_in_range(&at(10, 10, 0), &at(10, 10, 0), true, true).unwrap();

        assert!(!f.hourly.insert_if_absent(&at(10, 10, 0)).unwrap());
        let second = f.hourly.find_in_range(&at(10, 10, 0), &at(10, 10, 0), true, true).unwrap();

        assert_eq!(f.hourly.count_by_exact_time(&at(10, 10, 0)).unwrap(), 1);
        assert_eq!(first, second);
        assert_eq!(f.hourly.stats().inserted, 1);
    }

    #[test]
    fn test_repsert_reports_insert_then_replace() {
        let f = fixture();
        let record = RollupRecord::new(at(10, 5, 0), 3, 3);
        assert_eq!(f.hourly.repsert(&record).unwrap(), RepsertOutcome::Inserted);
        assert_eq!(f.hourly.repsert(&record).unwrap(), RepsertOutcome::Replaced);
        assert_eq!(f.hourly.count().unwrap(), 1);
    }

    #[test]
    fn test_daily_sums_hours_and_runs_within_month() {
        let f = fixture();
        feed(&f.raw, at(2, 0, 0), 48, 10);
        f.hourly.repsert_range(&at(2, 0, 0), &at(4, 0, 0)).unwrap();

        let day_two = f.daily.create(&at(3, 0, 0)).unwrap();
        let hourly_sum = f.hourly.sum_deltas(&at(2, 0, 0), &at(3, 0, 0), false, true).unwrap();
        assert_eq!(day_two.delta, hourly_sum);
        assert_eq!(day_two.delta, 240);
        f.daily.repsert(&day_two).unwrap();

        let day_three = f.daily.create(&at(4, 0, 0)).unwrap();
        assert_eq!(day_three.delta, 240);
        assert_eq!(day_three.cumulative, 480);
    }

    #[test]
    fn test_repsert_range_starts_after_low() {
        let f = fixture();
        let written = f.hourly.repsert_range(&at(10, 3, 0), &at(10, 6, 30)).unwrap();
        assert_eq!(written, 3);
        assert_eq!(f.hourly.count_by_exact_time(&at(10, 3, 0)).unwrap(), 0);
        assert_eq!(f.hourly.count_by_exact_time(&at(10, 6, 0)).unwrap(), 1);
    }
}
