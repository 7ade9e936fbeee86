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


pub mod alert_sync;
pub mod api;
pub mod collectors;
pub mod config;
pub mod error;
pub mod reconcile;
pub mod sources;

use alert_sync::AlertMirrorSync;
use anyhow::{anyhow, Result};
use api::AppState;
use collectors::{BoundaryCloser, CollectorStats, RawSampler};
use config::{LogFormat, LoggingConfig, ServerConfig};
use error::TaskError;
use meterlog_core::{Clock, SystemClock};
use meterlog_storage::StoreSet;
use reconcile::Reconciler;
use sources::{HttpAlertSource, HttpTelemetrySource, TelemetrySource};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "meterlog_server=info,meterlog_storage=info,tower_http=info";

type TaskOutcome = (&'static str, Result<(), TaskError>);

pub async fn run_server(config: ServerConfig) -> Result<()> {
    init_tracing(&config.logging);

    tracing::info!("Starting Meterlog Server");
    tracing::debug!("Configuration: {:#?}", config);

    config.validate()?;
    let addr = config.socket_addr()?;

    let store_config = config.store.clone();
    let stores = tokio::task::spawn_blocking(move || StoreSet::connect(&store_config)).await??;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let stats = Arc::new(CollectorStats::default());
    let cancel = CancellationToken::new();
    let mut tasks: JoinSet<TaskOutcome> = JoinSet::new();

    let telemetry: Option<Arc<dyn TelemetrySource>> = match &config.telemetry.url {
        Some(url) => {
            let source: Arc<dyn TelemetrySource> =
                Arc::new(HttpTelemetrySource::new(url.clone(), config.telemetry.timeout())?);
            let sampler = RawSampler::new(
                source.clone(),
                stores.raw.clone(),
                clock.clone(),
                config.collectors.sample_interval(),
                stats.clone(),
            );
            tasks.spawn(named("raw sampler", sampler.run(cancel.clone())));
            Some(source)
        }
        None => {
            tracing::warn!("No telemetry URL configured, raw sampler disabled");
            None
        }
    };

    let hourly_closer = BoundaryCloser::new(
        stores.hourly.clone(),
        clock.clone(),
        config.collectors.close_delay(),
        stats.clone(),
    );
    tasks.spawn(named("hourly closer", hourly_closer.run(cancel.clone())));

    let daily_closer = BoundaryCloser::new(
        stores.daily.clone(),
        clock.clone(),
        config.collectors.close_delay(),
        stats.clone(),
    )
    .with_prerequisite(stores.hourly.clone());
    tasks.spawn(named("daily closer", daily_closer.run(cancel.clone())));

    match &config.alerts.url {
        Some(url) => {
            let source = Arc::new(HttpAlertSource::new(url.clone(), config.alerts.timeout())?);
            let sync = AlertMirrorSync::new(
                source,
                stores.alerts.clone(),
                config.collectors.alert_sync_interval(),
                stats.clone(),
            );
            tasks.spawn(named("alert sync", sync.run(cancel.clone())));
        }
        None => tracing::warn!("No alert URL configured, alert mirror sync disabled"),
    }

    let state = AppState {
        stores: stores.clone(),
        reconciler: Arc::new(Reconciler::new(&stores, clock.clone())),
        telemetry,
        stats,
        started_at: Instant::now(),
    };

    let cors = if config.server.enable_cors {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
    };
    let app = api::routes(state).layer(cors).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("HTTP server listening on http://{}", addr);

    let server_cancel = cancel.clone();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
    });
    let mut server_done = false;

    let outcome = tokio::select! {
        _ = shutdown_signal() => {
            tracing::info!("Shutdown signal received");
            Ok(())
        }
        Some(joined) = tasks.join_next() => task_result(joined),
        served = &mut server => {
            server_done = true;
            match served {
                Ok(Ok(())) => Err(anyhow!("HTTP server stopped unexpectedly")),
                Ok(Err(e)) => Err(e.into()),
                Err(e) => Err(e.into()),
            }
        }
    };

    cancel.cancel();
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = task_result(joined) {
            tracing::error!("Error while stopping: {:#}", e);
        }
    }
    if !server_done {
        match server.await {
            Ok(Ok(())) => tracing::info!("HTTP server stopped"),
            Ok(Err(e)) => tracing::error!("HTTP server error: {}", e),
            Err(e) => tracing::error!("HTTP server task failed: {}", e),
        }
    }

    let flushing = stores.clone();
    tokio::task::spawn_blocking(move || flushing.flush()).await??;
    tracing::info!("Stores flushed, Meterlog Server stopped");

    outcome
}

async fn named<F>(name: &'static str, task: F) -> TaskOutcome
where
    F: std::future::Future<Output = Result<(), TaskError>>,
{
    (name, task.await)
}

fn task_result(joined: std::result::Result<TaskOutcome, JoinError>) -> Result<()> {
    match joined {
        Ok((name, Ok(()))) => {
            tracing::info!(task = name, "Task finished");
            Ok(())
        }
        Ok((name, Err(e))) => {
            tracing::error!(task = name, error = %e, "Task failed");
            Err(anyhow::Error::new(e).context(format!("{name} failed")))
        }
        Err(e) => Err(e.into()),
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(logging.filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER))
    });
    let registry = tracing_subscriber::registry().with(filter);

    match logging.format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Resolves on Ctrl-C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
