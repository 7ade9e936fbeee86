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


//! Raw series store: append-only telemetry samples, one per sampler tick.

use crate::document::{DocumentCollection, Filter, FindOptions, TimeRange};
use crate::error::{StorageError, StorageResult};
use crate::rollup::DeltaSource;
use meterlog_core::{RawSample, Timestamp, ENERGY_COUNTER};
use parking_lot::RwLock;
use tracing::warn;

/// Time field of stored samples.
pub const RAW_TIME_FIELD: &str = "time";

pub struct RawSeriesStore {
    collection: RwLock<Box<dyn DocumentCollection>>,
    counter: String,
}

impl RawSeriesStore {
    pub fn new(collection: Box<dyn DocumentCollection>) -> Self {
        Self {
            collection: RwLock::new(collection),
            counter: ENERGY_COUNTER.to_string(),
        }
    }

    /// Use `counter` as the cumulative reading that hourly rollups difference.
    pub fn with_counter(mut self, counter: impl Into<String>) -> Self {
        self.counter = counter.into();
        self
    }

    pub fn counter_field(&self) -> &str {
        &self.counter
    }

    pub fn append(&self, sample: &RawSample) -> StorageResult<()> {
        let document = serde_json::to_value(sample)?;
        self.collection.write().insert_one(document)
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

    /// Samples in range, oldest first. An undecodable sample is an error.
    pub fn find_in_range(
        &self,
        lower: &Timestamp,
        upper: &Timestamp,
        lower_inclusive: bool,
        upper_inclusive: bool,
    ) -> StorageResult<Vec<RawSample>> {
        let filter = Filter::Time(TimeRange::new(lower, upper, lower_inclusive, upper_inclusive));
        let collection = self.collection.read();
        let documents = collection.find(&filter, &FindOptions::default())?;
        documents
            .into_iter()
            .map(|doc| {
                serde_json::from_value(doc).map_err(|e| StorageError::decode(collection.name(), e))
            })
            .collect()
    }

    pub fn latest(&self) -> StorageResult<Option<RawSample>> {
        let collection = self.collection.read();
        let mut documents = collection.find(&Filter::All, &FindOptions::descending().limit(1))?;
        documents
            .pop()
            .map(|doc| {
                serde_json::from_value(doc).map_err(|e| StorageError::decode(collection.name(), e))
            })
            .transpose()
    }

    pub fn count(&self) -> StorageResult<u64> {
        self.collection.read().count(&Filter::All)
    }

    /// Movement of `field` over `[lower, upper]`.
    ///
    /// For a monotonic counter this is the last reading minus the first.
    /// When a reading drops, the counter is taken to have restarted from zero
    /// and the post-reset reading counts as growth. Fewer than two readings
    /// give zero.
    pub fn counter_difference(
        &self,
        lower: &Timestamp,
        upper: &Timestamp,
        field: &str,
    ) -> StorageResult<i64> {
        let readings: Vec<(Timestamp, i64)> = self
            .find_in_range(lower, upper, true, true)?
            .into_iter()
            .filter_map(|sample| sample.counter(field).map(|value| (sample.time, value)))
            .collect();

        let mut total = 0;
        for pair in readings.windows(2) {
            let (_, before) = pair[0];
            let (at, after) = pair[1];
            if after >= before {
                total += after - before;
            } else {
                warn!(
                    counter = field,
                    before,
                    after,
                    at = %at,
                    "Counter went backwards, treating as reset"
                );
                total += after;
            }
        }
        Ok(total)
    }

    pub fn flush(&self) -> StorageResult<()> {
        self.collection.write().flush()
    }
}

impl DeltaSource for RawSeriesStore {
    fn delta_between(&self, lower: &Timestamp, upper: &Timestamp) -> StorageResult<i64> {
        self.counter_difference(lower, upper, &self.counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::JournalCollection;
    use chrono::{Duration, Local, TimeZone};

    fn store() -> RawSeriesStore {
        RawSeriesStore::new(Box::new(JournalCollection::in_memory("raw", RAW_TIME_FIELD)))
    }

    fn hour() -> Timestamp {
        Local.with_ymd_and_hms(2024, 6, 10, 9, 0, 0).unwrap()
    }

    fn sample(offset_secs: i64, kwh: i64) -> RawSample {
        RawSample::new(hour() + Duration::seconds(offset_secs)).with_counter(ENERGY_COUNTER, kwh)
    }

    #[test]
    fn test_first_and_last_difference() {
        let store = store();
        for (offset, kwh) in [(0, 100), (15, 120), (30, 150)] {
            store.append(&sample(offset, kwh)).unwrap();
        }

        let upper = hour() + Duration::hours(1);
        assert_eq!(store.delta_between(&hour(), &upper).unwrap(), 50);
        assert_eq!(store.count_in_range(&hour(), &upper, false, true).unwrap(), 2);
    }

    #[test]
    fn test_single_sample_gives_zero() {
        let store = store();
        store.append(&sample(10, 500)).unwrap();
        let upper = hour() + Duration::hours(1);
        assert_eq!(store.delta_between(&hour(), &upper).unwrap(), 0);
    }

    #[test]
    fn test_reset_counts_post_reset_reading() {
        let store = store();
        for (offset, kwh) in [(0, 900), (15, 910), (30, 5), (45, 12)] {
            store.append(&sample(offset, kwh)).unwrap();
        }
        let upper = hour() + Duration::hours(1);
        assert_eq!(store.delta_between(&hour(), &upper).unwrap(), 10 + 5 + 7);
    }

    #[test]
    fn test_samples_without_counter_are_ignored() {
        let store = store();
        store.append(&sample(0, 100)).unwrap();
        store.append(&RawSample::new(hour() + Duration::seconds(15))).unwrap();
        store.append(&sample(30, 130)).unwrap();

        let upper = hour() + Duration::hours(1);
        assert_eq!(store.counter_difference(&hour(), &upper, ENERGY_COUNTER).unwrap(), 30);
    }

    #[test]
    fn test_find_in_range_is_ascending() {
        let store = store();
        store.append(&sample(30, 3)).unwrap();
        store.append(&sample(0, 1)).unwrap();
        store.append(&sample(15, 2)).unwrap();

        let upper = hour() + Duration::hours(1);
        let found = store.find_in_range(&hour(), &upper, true, false).unwrap();
        let values: Vec<_> = found.iter().filter_map(|s| s.counter(ENERGY_COUNTER)).collect();
        assert_eq!(values, vec![1, 2, 3]);
        assert_eq!(store.latest().unwrap().unwrap().counter(ENERGY_COUNTER), Some(3));
    }
}
