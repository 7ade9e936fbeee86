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


//! Alert mirror store.
//!
//! Holds alert events copied from the alert source plus the two flags that
//! only exist here. The sync loop inserts; the API toggles flags.

use crate::document::{DocumentCollection, Filter, FindOptions};
use crate::error::{StorageError, StorageResult};
use meterlog_core::{AlertFlag, AlertRecord};
use parking_lot::RwLock;
use serde_json::{Map, Value};

/// Time field of stored alerts.
pub const ALERT_TIME_FIELD: &str = "alert_event_time";
const ALERT_ID_FIELD: &str = "alert_event_id";

pub struct AlertMirrorStore {
    collection: RwLock<Box<dyn DocumentCollection>>,
}

impl AlertMirrorStore {
    pub fn new(collection: Box<dyn DocumentCollection>) -> Self {
        Self {
            collection: RwLock::new(collection),
        }
    }

    pub fn count(&self) -> StorageResult<u64> {
        self.collection.read().count(&Filter::All)
    }

    pub fn contains(&self, alert_event_id: i64) -> StorageResult<bool> {
        let filter = Filter::field(ALERT_ID_FIELD, alert_event_id);
        Ok(self.collection.read().count(&filter)? > 0)
    }

    pub fn find_by_id(&self, alert_event_id: i64) -> StorageResult<Option<AlertRecord>> {
        let collection = self.collection.read();
        let filter = Filter::field(ALERT_ID_FIELD, alert_event_id);
        let mut found = collection.find(&filter, &FindOptions::default().limit(1))?;
        found
            .pop()
            .map(|doc| decode(collection.name(), doc))
            .transpose()
    }

    /// Every mirrored alert, newest event first.
    pub fn find_all(&self) -> StorageResult<Vec<AlertRecord>> {
        let collection = self.collection.read();
        collection
            .find(&Filter::All, &FindOptions::descending())?
            .into_iter()
            .map(|doc| decode(collection.name(), doc))
            .collect()
    }

    /// Insert `alert` unless its event id is already mirrored. Returns
    /// whether it was written.
    pub fn insert_if_new(&self, alert: &AlertRecord) -> StorageResult<bool> {
        let document = serde_json::to_value(alert)?;
        let mut collection = self.collection.write();
        if collection.count(&Filter::field(ALERT_ID_FIELD, alert.alert_event_id))? > 0 {
            return Ok(false);
        }
        collection.insert_one(document)?;
        Ok(true)
    }

    /// Set a local flag and return the updated alert, or `None` when the id
    /// is unknown.
    pub fn set_flag(
        &self,
        alert_event_id: i64,
        flag: AlertFlag,
        value: bool,
    ) -> StorageResult<Option<AlertRecord>> {
        let mut patch = Map::new();
        patch.insert(flag.field().to_string(), Value::Bool(value));

        let mut collection = self.collection.write();
        let updated = collection
            .find_one_and_update(&Filter::field(ALERT_ID_FIELD, alert_event_id), &patch)?;
        updated.map(|doc| decode(collection.name(), doc)).transpose()
    }

    pub fn flush(&self) -> StorageResult<()> {
        self.collection.write().flush()
    }
}

fn decode(collection: &str, document: Value) -> StorageResult<AlertRecord> {
    serde_json::from_value::<AlertRecord>(document)
        .map(|mut alert| {
            alert.alert_event_time = alert.alert_event_time.with_timezone(&chrono::Local);
            alert
        })
        .map_err(|e| StorageError::decode(collection, e))
}
