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


use meterlog_core::MeterlogError;
use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

/// Store failures. Every variant is fatal to the operation that hit it; a
/// missing document on upsert is reported as a normal result instead.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backing engine could not be reached or opened.
    #[error("cannot connect to {store}: {reason}")]
    Connectivity { store: String, reason: String },

    /// A stored document does not have the expected shape.
    #[error("corrupt document in {collection}: {reason}")]
    Decode { collection: String, reason: String },

    #[error("missing store configuration key {0}")]
    MissingConfig(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Core(#[from] MeterlogError),
}

impl StorageError {
    pub(crate) fn decode(collection: &str, reason: impl ToString) -> Self {
        StorageError::Decode {
            collection: collection.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
