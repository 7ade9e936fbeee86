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


use super::{ApiError, AppState};
use axum::{extract::State, Json};
use meterlog_core::RawSample;
use tracing::warn;

/// GET /api/v1/snapshot - current readings straight from the telemetry source
pub async fn get_snapshot(State(state): State<AppState>) -> Result<Json<RawSample>, ApiError> {
    let source = state
        .telemetry
        .as_ref()
        .ok_or_else(|| ApiError::ServiceUnavailable("telemetry source not configured".to_string()))?;

    match source.read_snapshot().await {
        Ok(sample) => Ok(Json(sample)),
        Err(err) => {
            warn!(error = %err, "Snapshot read failed");
            Err(ApiError::ServiceUnavailable(err.to_string()))
        }
    }
}
