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


//! Read-time reconciliation
//!
//! A range read counts the rollup records it expects against the ones
//! stored. When some are missing it recomputes every bucket from the first
//! gap up to the requested end (or now, whichever is earlier) and then
//! re-reads the range. Rewriting the buckets after the first gap also heals
//! interior gaps and refreshes the running totals that depend on them.

use chrono::{Datelike, Local, NaiveDate, TimeZone};
use meterlog_core::{Clock, Granularity, MeterlogError, RollupRecord, Timestamp};
use meterlog_storage::{RollupStore, StorageError, StorageResult, StoreSet};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of one reconciled read.
#[derive(Debug, Clone, Serialize)]
pub struct Reconciliation {
    pub records: Vec<RollupRecord>,
    pub expected: usize,
    pub found: u64,
    pub backfilled: usize,
}

pub struct Reconciler {
    hourly: Arc<RollupStore>,
    daily: Arc<RollupStore>,
    clock: Arc<dyn Clock>,
}

impl Reconciler {
    pub fn new(stores: &StoreSet, clock: Arc<dyn Clock>) -> Self {
        Self {
            hourly: stores.hourly.clone(),
            daily: stores.daily.clone(),
            clock,
        }
    }

    /// Hourly records of one calendar day, labelled `(day start, next day start]`.
    pub fn read_day(&self, date: NaiveDate) -> StorageResult<Reconciliation> {
        let (lower, upper) = Granularity::Day.bounds(&local_noon(date)?);
        self.reconcile(&self.hourly, &lower, &upper, |_, _| Ok(()))
    }

    /// Daily records of one calendar month. Days about to be backfilled get
    /// their hourly records reconciled first so the daily sums are complete.
    pub fn read_month(&self, year: i32, month: u32) -> StorageResult<Reconciliation> {
        let mid_month = NaiveDate::from_ymd_opt(year, month, 15).ok_or_else(|| {
            StorageError::Core(MeterlogError::InvalidTime(format!("{year:04}-{month:02}")))
        })?;
        let (lower, upper) = Granularity::Month.bounds(&local_noon(mid_month)?);

        self.reconcile(&self.daily, &lower, &upper, |low, stop| {
            for day_end in Granularity::Day.labels(low, stop) {
                let day_start = Granularity::Day.step(&day_end, -1);
                self.reconcile(&self.hourly, &day_start, &day_end, |_, _| Ok(()))?;
            }
            Ok(())
        })
    }

    /// Reconcile `store` over `(lower, upper]`. `prepare` runs with the
    /// backfill window before any bucket of it is recomputed.
    fn reconcile<F>(
        &self,
        store: &RollupStore,
        lower: &Timestamp,
        upper: &Timestamp,
        prepare: F,
    ) -> StorageResult<Reconciliation>
    where
        F: Fn(&Timestamp, &Timestamp) -> StorageResult<()>,
    {
        let granularity = store.granularity();
        let expected = granularity.count_between(lower, upper);
        let found = store.count_in_range(lower, upper, false, true)?;

        let mut backfilled = 0;
        if found != expected as u64 {
            let present: BTreeSet<Timestamp> = store
                .find_in_range(lower, upper, false, true)?
                .into_iter()
                .map(|record| record.time)
                .collect();

            if let Some(first_gap) = granularity
                .labels(lower, upper)
                .find(|label| !present.contains(label))
            {
                let now = self.clock.now();
                let stop = if *upper < now { *upper } else { now };
                let low = granularity.step(&first_gap, -1);

                info!(
                    granularity = %granularity,
                    expected,
                    found,
                    first_gap = %first_gap,
                    stop = %stop,
                    "Backfilling rollups"
                );
                prepare(&low, &stop)?;
                backfilled = store.repsert_range(&low, &stop)?;
            }
        }

        let records = store.find_in_range(lower, upper, false, true)?;
        debug!(
            granularity = %granularity,
            lower = %lower,
            upper = %upper,
            records = records.len(),
            backfilled,
            "Reconciled range"
        );
        Ok(Reconciliation {
            records,
            expected,
            found,
            backfilled,
        })
    }
}

/// Local noon of `date`, safely inside the day whatever the DST rules.
fn local_noon(date: NaiveDate) -> StorageResult<Timestamp> {
    date.and_hms_opt(12, 0, 0)
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .ok_or_else(|| {
            StorageError::Core(MeterlogError::InvalidTime(format!(
                "{:04}-{:02}-{:02}",
                date.year(),
                date.month(),
                date.day()
            )))
        })
}
