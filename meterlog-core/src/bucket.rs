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


//! Bucket boundary arithmetic.
//!
//! A bucket is a fixed-width calendar window (hour, day or month). Every
//! rollup record is labelled with an aligned timestamp, and the label is the
//! *closing* boundary of the window it summarizes:
//!
//! ```text
//!   t = 10:30  ->  bounds = [10:00, 11:00)      (inside a bucket)
//!   t = 11:00  ->  bounds = [10:00, 11:00]      (aligned: the bucket that just closed)
//! ```
//!
//! All arithmetic is done on the wall clock of the timestamp's own zone, so
//! day and month steps follow the calendar rather than fixed durations.

use chrono::{DateTime, Datelike, Days, Duration, Months, NaiveDateTime, NaiveTime, TimeZone, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Width of a rollup bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hour,
    Day,
    Month,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Hour => "hour",
            Granularity::Day => "day",
            Granularity::Month => "month",
        }
    }

    /// The calendar period whose running total a bucket of this width
    /// contributes to: hours accumulate per day, days per month.
    pub fn period(&self) -> Option<Granularity> {
        match self {
            Granularity::Hour => Some(Granularity::Day),
            Granularity::Day => Some(Granularity::Month),
            Granularity::Month => None,
        }
    }

    /// True when every sub-unit field of `t` is zero.
    pub fn is_aligned<Tz: TimeZone>(&self, t: &DateTime<Tz>) -> bool {
        let hour_aligned = t.minute() == 0 && t.second() == 0 && t.nanosecond() == 0;
        match self {
            Granularity::Hour => hour_aligned,
            Granularity::Day => hour_aligned && t.hour() == 0,
            Granularity::Month => hour_aligned && t.hour() == 0 && t.day() == 1,
        }
    }

    /// Truncate `t` down to the start of its bucket.
    pub fn floor<Tz: TimeZone>(&self, t: &DateTime<Tz>) -> DateTime<Tz> {
        match self {
            Granularity::Hour => {
                let sub_hour = Duration::seconds(i64::from(t.minute() * 60 + t.second()))
                    + Duration::nanoseconds(i64::from(t.nanosecond()));
                t.clone() - sub_hour
            }
            Granularity::Day => {
                let midnight = t.date_naive().and_time(NaiveTime::MIN);
                localize(&t.timezone(), midnight)
            }
            Granularity::Month => {
                let date = t.date_naive();
                let first = date.with_day(1).unwrap_or(date);
                localize(&t.timezone(), first.and_time(NaiveTime::MIN))
            }
        }
    }

    /// Move `t` by `n` whole units. Hours are fixed durations, days and
    /// months step the wall clock.
    pub fn step<Tz: TimeZone>(&self, t: &DateTime<Tz>, n: i32) -> DateTime<Tz> {
        let naive = t.naive_local();
        let magnitude = n.unsigned_abs();
        let shifted = match self {
            Granularity::Hour => return t.clone() + Duration::hours(i64::from(n)),
            Granularity::Day if n >= 0 => naive.checked_add_days(Days::new(u64::from(magnitude))),
            Granularity::Day => naive.checked_sub_days(Days::new(u64::from(magnitude))),
            Granularity::Month if n >= 0 => naive.checked_add_months(Months::new(magnitude)),
            Granularity::Month => naive.checked_sub_months(Months::new(magnitude)),
        };
        localize(&t.timezone(), shifted.unwrap_or(naive))
    }

    /// Canonical `(lower, upper)` window for `t`.
    ///
    /// An aligned `t` is the upper bound of the bucket that just closed;
    /// otherwise `lower <= t < upper`.
    pub fn bounds<Tz: TimeZone>(&self, t: &DateTime<Tz>) -> (DateTime<Tz>, DateTime<Tz>) {
        if self.is_aligned(t) {
            (self.step(t, -1), t.clone())
        } else {
            let lower = self.floor(t);
            let upper = self.step(&lower, 1);
            (lower, upper)
        }
    }

    /// Every aligned label `b` with `lower < b <= upper`, ascending.
    pub fn labels<Tz: TimeZone>(&self, lower: &DateTime<Tz>, upper: &DateTime<Tz>) -> Labels<Tz> {
        Labels {
            granularity: *self,
            next: self.step(&self.floor(lower), 1),
            upper: upper.clone(),
        }
    }

    /// Number of buckets whose label falls in `(lower, upper]`.
    pub fn count_between<Tz: TimeZone>(&self, lower: &DateTime<Tz>, upper: &DateTime<Tz>) -> usize {
        self.labels(lower, upper).count()
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Iterator returned by [`Granularity::labels`].
#[derive(Debug, Clone)]
pub struct Labels<Tz: TimeZone> {
    granularity: Granularity,
    next: DateTime<Tz>,
    upper: DateTime<Tz>,
}

impl<Tz: TimeZone> Iterator for Labels<Tz> {
    type Item = DateTime<Tz>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next > self.upper {
            return None;
        }
        let current = self.next.clone();
        self.next = self.granularity.step(&current, 1);
        Some(current)
    }
}

/// Resolve a wall-clock time in `tz`. Ambiguous times take the earlier
/// instant; times inside a DST gap are pushed past the gap.
fn localize<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    if let Some(t) = tz.from_local_datetime(&naive).earliest() {
        return t;
    }
    tz.from_local_datetime(&(naive + Duration::hours(1)))
        .earliest()
        .unwrap_or_else(|| tz.from_utc_datetime(&naive))
}
