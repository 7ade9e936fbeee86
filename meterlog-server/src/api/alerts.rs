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
use meterlog_core::{AlertFlag, AlertRecord};
use tracing::info;

/// GET /api/v1/alerts - mirrored alerts, newest event first
pub async fn list_alerts(State(state): State<AppState>) -> Result<Json<Vec<AlertRecord>>, ApiError> {
    let alerts = state.stores.alerts.clone();
    let records = tokio::task::spawn_blocking(move || alerts.find_all()).await??;
    Ok(Json(records))
}

/// POST /api/v1/alerts/:id/:action where action is one of `read`,
/// `unread`, `hidden`, `unhidden`
pub async fn set_alert_flag(
    State(state): State<AppState>,
    Path((id, action)): Path<(String, String)>,
) -> Result<Json<AlertRecord>, ApiError> {
    let id: i64 = id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid alert id: {id:?}")))?;
    let (flag, value) = match action.as_str() {
        "read" => (AlertFlag::Read, true),
        "unread" => (AlertFlag::Read, false),
        "hidden" => (AlertFlag::Hidden, true),
        "unhidden" => (AlertFlag::Hidden, false),
        other => return Err(ApiError::NotFound(format!("unknown alert action: {other}"))),
    };

    let alerts = state.stores.alerts.clone();
    let updated = tokio::task::spawn_blocking(move || alerts.set_flag(id, flag, value)).await??;

    match updated {
        Some(alert) => {
            info!(alert_event_id = id, flag = flag.field(), value, "Updated alert flag");
            Ok(Json(alert))
        }
        None => Err(ApiError::NotFound(format!("alert {id}"))),
    }
}
