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
use crate::collectors::CollectorStatsSnapshot;
use axum::{extract::State, Json};
use meterlog_storage::RollupStats;
use serde::Serialize;
use tracing::debug;

/// Health check response structure
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub stores: StoreCounts,
    pub rollups: RollupActivity,
    pub collectors: CollectorStatsSnapshot,
}

#[derive(Debug, Serialize)]
pub struct StoreCounts {
    pub raw: u64,
    pub hourly: u64,
    pub daily: u64,
    pub alerts: u64,
}

#[derive(Debug, Serialize)]
pub struct RollupActivity {
    pub hourly: RollupStats,
    pub daily: RollupStats,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    debug!("Health check requested");

    let stores = state.stores.clone();
    let counts = tokio::task::spawn_blocking(move || -> meterlog_storage::StorageResult<StoreCounts> {
        Ok(StoreCounts {
            raw: stores.raw.count()?,
            hourly: stores.hourly.count()?,
            daily: stores.daily.count()?,
            alerts: stores.alerts.count()?,
        })
    })
    .await??;

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        stores: counts,
        rollups: RollupActivity {
            hourly: state.stores.hourly.stats(),
            daily: state.stores.daily.stats(),
        },
        collectors: state.stats.snapshot(),
    }))
}
