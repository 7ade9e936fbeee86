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
use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{Datelike, NaiveDate};
use meterlog_core::RollupRecord;
use tracing::debug;

/// GET /api/v1/hourly/:year/:month/:day
///
/// Hourly records of one day, reconciled before they are returned.
pub async fn get_hourly(
    State(state): State<AppState>,
    Path((year, month, day)): Path<(String, String, String)>,
) -> Result<Json<Vec<RollupRecord>>, ApiError> {
    let date = parse_date(&year, &month, Some(&day))?;
    debug!(%date, "Hourly read");

    let reconciler = state.reconciler.clone();
    let result = tokio::task::spawn_blocking(move || reconciler.read_day(date)).await??;
    Ok(Json(result.records))
}

/// GET /api/v1/daily/:year/:month
pub async fn get_daily(
    State(state): State<AppState>,
    Path((year, month)): Path<(String, String)>,
) -> Result<Json<Vec<RollupRecord>>, ApiError> {
    let date = parse_date(&year, &month, None)?;
    debug!(%date, "Daily read");

    let reconciler = state.reconciler.clone();
    let result =
        tokio::task::spawn_blocking(move || reconciler.read_month(date.year(), date.month())).await??;
    Ok(Json(result.records))
}

/// Strict calendar parse of path components. A missing day means the first
/// of the month.
fn parse_date(year: &str, month: &str, day: Option<&str>) -> Result<NaiveDate, ApiError> {
    let y = parse_number("year", year, 4, 4)?;
    let m = parse_number("month", month, 1, 2)?;
    let d = match day {
        Some(day) => parse_number("day", day, 1, 2)?,
        None => 1,
    };

    NaiveDate::from_ymd_opt(y as i32, m, d).ok_or_else(|| {
        ApiError::BadRequest(format!("{year}-{month}-{} is not a calendar date", day.unwrap_or("01")))
    })
}

fn parse_number(name: &str, raw: &str, min_len: usize, max_len: usize) -> Result<u32, ApiError> {
    let well_formed = (min_len..=max_len).contains(&raw.len()) && raw.bytes().all(|b| b.is_ascii_digit());
    if !well_formed {
        return Err(ApiError::BadRequest(format!("invalid {name}: {raw:?}")));
    }
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid {name}: {raw:?}")))
}
