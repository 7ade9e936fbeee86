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


//! HTTP API
//!
//! Range reads reconcile before answering, so every read of a closed period
//! returns the full set of buckets.

pub mod alerts;
pub mod health;
pub mod rollups;
pub mod snapshot;

use crate::collectors::CollectorStats;
use crate::reconcile::Reconciler;
use crate::sources::TelemetrySource;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use meterlog_storage::{StorageError, StoreSet};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        tracing::error!(error = %err, "Store operation failed");
        ApiError::Internal(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        tracing::error!(error = %err, "Blocking store task failed");
        ApiError::Internal(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub stores: StoreSet,
    pub reconciler: Arc<Reconciler>,
    /// Live source for `/api/v1/snapshot`, absent when no telemetry URL is set.
    pub telemetry: Option<Arc<dyn TelemetrySource>>,
    pub stats: Arc<CollectorStats>,
    pub started_at: Instant,
}

/// Every route of the service, without transport layers.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/hourly/:year/:month/:day", get(rollups::get_hourly))
        .route("/api/v1/daily/:year/:month", get(rollups::get_daily))
        .route("/api/v1/alerts", get(alerts::list_alerts))
        .route("/api/v1/alerts/:id/:action", post(alerts::set_alert_flag))
        .route("/api/v1/snapshot", get(snapshot::get_snapshot))
        .with_state(state)
}
