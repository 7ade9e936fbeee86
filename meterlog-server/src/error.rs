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
use meterlog_storage::StorageError;
use thiserror::Error;

/// Failure reading one of the external sources.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source unreachable: {0}")]
    Unreachable(String),

    #[error("unexpected source response: {0}")]
    BadResponse(String),

    #[error(transparent)]
    Mapping(#[from] MeterlogError),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SourceError::BadResponse(err.to_string())
        } else {
            SourceError::Unreachable(err.to_string())
        }
    }
}

/// Reason a background loop stopped before shutdown.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Mapping(#[from] MeterlogError),

    #[error("blocking store call failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
