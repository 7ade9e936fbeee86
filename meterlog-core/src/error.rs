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


//! Error types shared by every meterlog crate.

use thiserror::Error;

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, MeterlogError>;

/// Errors raised by domain logic that does not touch a store.
#[derive(Debug, Error)]
pub enum MeterlogError {
    /// A source column could not be coerced into its target type.
    #[error("cannot coerce column {column} value {value:?} into {target}: {reason}")]
    FieldCoercion {
        column: &'static str,
        target: &'static str,
        value: String,
        reason: String,
    },

    /// A mapped source column was absent from the row.
    #[error("source row is missing column {0}")]
    MissingColumn(&'static str),

    /// A local wall-clock time does not exist (DST gap) or is out of range.
    #[error("invalid time: {0}")]
    InvalidTime(String),
}
