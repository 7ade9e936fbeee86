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


//! Meterlog Storage
//!
//! Stores for raw telemetry samples, hourly and daily rollups and mirrored
//! alerts, each behind its own read-write lock, over a pluggable document
//! collection.

pub mod alert;
pub mod document;
pub mod error;
pub mod journal;
pub mod raw;
pub mod rollup;
pub mod stores;

pub use alert::AlertMirrorStore;
pub use document::{Document, DocumentCollection, Filter, FindOptions, SortOrder, TimeRange};
pub use error::{StorageError, StorageResult};
pub use journal::JournalCollection;
pub use raw::RawSeriesStore;
pub use rollup::{DeltaSource, RepsertOutcome, RollupStats, RollupStore};
pub use stores::{ResolvedStoreConfig, StoreConfig, StoreEngine, StoreSet};
