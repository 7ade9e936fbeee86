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


//! Document collection interface.
//!
//! Stores talk to their backing engine only through [`DocumentCollection`]:
//! range-filterable, sortable, upsertable JSON documents. Each collection
//! designates one RFC 3339 time field that range filters and sorting use.

use crate::error::StorageResult;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use std::ops::Bound;

pub type Document = Value;

/// Interval over a collection's time field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeRange {
    pub lower: Bound<DateTime<Utc>>,
    pub upper: Bound<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new<Tz: TimeZone>(
        lower: &DateTime<Tz>,
        upper: &DateTime<Tz>,
        lower_inclusive: bool,
        upper_inclusive: bool,
    ) -> Self {
        let lower = lower.with_timezone(&Utc);
        let upper = upper.with_timezone(&Utc);
        Self {
            lower: if lower_inclusive {
                Bound::Included(lower)
            } else {
                Bound::Excluded(lower)
            },
            upper: if upper_inclusive {
                Bound::Included(upper)
            } else {
                Bound::Excluded(upper)
            },
        }
    }

    pub fn exact<Tz: TimeZone>(t: &DateTime<Tz>) -> Self {
        Self::new(t, t, true, true)
    }

    pub fn contains(&self, t: &DateTime<Utc>) -> bool {
        let above = match &self.lower {
            Bound::Included(lower) => t >= lower,
            Bound::Excluded(lower) => t > lower,
            Bound::Unbounded => true,
        };
        let below = match &self.upper {
            Bound::Included(upper) => t <= upper,
            Bound::Excluded(upper) => t < upper,
            Bound::Unbounded => true,
        };
        above && below
    }

    /// True when no instant can satisfy both bounds.
    pub fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Bound::Included(l), Bound::Included(u)) => l > u,
            (Bound::Included(l), Bound::Excluded(u))
            | (Bound::Excluded(l), Bound::Included(u))
            | (Bound::Excluded(l), Bound::Excluded(u)) => l >= u,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    All,
    Time(TimeRange),
    /// Top-level field equals the given JSON value.
    Field { name: String, value: Value },
}

impl Filter {
    pub fn exact_time<Tz: TimeZone>(t: &DateTime<Tz>) -> Self {
        Filter::Time(TimeRange::exact(t))
    }

    pub fn field(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Field {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Order on the collection's time field.
    pub sort: SortOrder,
    pub limit: Option<usize>,
}

impl FindOptions {
    pub fn descending() -> Self {
        Self {
            sort: SortOrder::Descending,
            limit: None,
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Backing engine for one collection.
///
/// Implementations do no locking of their own; every store wraps its
/// collection in a read-write lock and calls the `&mut self` methods only
/// under the write guard.
pub trait DocumentCollection: Send + Sync {
    fn name(&self) -> &str;

    fn count(&self, filter: &Filter) -> StorageResult<u64>;

    fn find(&self, filter: &Filter, options: &FindOptions) -> StorageResult<Vec<Document>>;

    fn insert_one(&mut self, document: Document) -> StorageResult<()>;

    /// Replace the first document matching `filter` and return what it
    /// replaced. With `upsert`, a filter that matches nothing inserts the
    /// document and returns `None`.
    fn find_one_and_replace(
        &mut self,
        filter: &Filter,
        document: Document,
        upsert: bool,
    ) -> StorageResult<Option<Document>>;

    /// Overwrite the top-level fields in `patch` on the first match and
    /// return the updated document.
    fn find_one_and_update(
        &mut self,
        filter: &Filter,
        patch: &Map<String, Value>,
    ) -> StorageResult<Option<Document>>;

    /// Push buffered writes to durable storage.
    fn flush(&mut self) -> StorageResult<()>;
}
