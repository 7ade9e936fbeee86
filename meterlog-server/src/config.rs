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


use anyhow::{bail, Context, Result};
use meterlog_storage::StoreConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Meterlog Server Configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: HttpServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    /// Telemetry host polled by the raw sampler
    #[serde(default)]
    pub telemetry: SourceConfig,
    /// Alert database mirrored by the alert sync
    #[serde(default)]
    pub alerts: SourceConfig,
    #[serde(default)]
    pub collectors: CollectorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpServerConfig {
    /// HTTP API listen address (e.g., "127.0.0.1:47200")
    #[serde(default = "default_http_addr")]
    pub listen_addr: String,

    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_http_addr(),
            enable_cors: default_enable_cors(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    /// Base URL. Unset disables the loop that reads this source.
    pub url: Option<String>,

    #[serde(default = "default_source_timeout")]
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_source_timeout(),
        }
    }
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CollectorConfig {
    /// Seconds between raw samples
    #[serde(default = "default_sample_interval")]
    pub sample_interval_secs: u64,

    /// Seconds between alert mirror comparisons
    #[serde(default = "default_alert_sync_interval")]
    pub alert_sync_interval_secs: u64,

    /// Seconds to wait past an hour or day boundary before closing it, so
    /// the sample taken on the boundary is already stored
    #[serde(default = "default_close_delay")]
    pub close_delay_secs: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            sample_interval_secs: default_sample_interval(),
            alert_sync_interval_secs: default_alert_sync_interval(),
            close_delay_secs: default_close_delay(),
        }
    }
}

impl CollectorConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.sample_interval_secs)
    }

    pub fn alert_sync_interval(&self) -> Duration {
        Duration::from_secs(self.alert_sync_interval_secs)
    }

    pub fn close_delay(&self) -> Duration {
        Duration::from_secs(self.close_delay_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// `EnvFilter` directives; `RUST_LOG` wins when set
    pub filter: Option<String>,
}

// Default values
fn default_http_addr() -> String {
    "127.0.0.1:47200".to_string()
}

fn default_enable_cors() -> bool {
    true
}

fn default_source_timeout() -> u64 {
    10
}

fn default_sample_interval() -> u64 {
    15
}

fn default_alert_sync_interval() -> u64 {
    15
}

fn default_close_delay() -> u64 {
    5
}

impl ServerConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }

    /// Load configuration with priority: env > file > defaults
    ///
    /// Supported environment variables:
    /// - METERLOG_HTTP_ADDR: HTTP listen address
    /// - METERLOG_DATA_DIR: Journal directory
    /// - METERLOG_TELEMETRY_URL: Telemetry source base URL
    /// - METERLOG_ALERT_URL: Alert source base URL
    pub fn load(config_file: Option<PathBuf>) -> Result<Self> {
        let config = match config_file {
            Some(path) if path.exists() => {
                tracing::info!("Loading configuration from file: {:?}", path);
                Self::from_file(&path)?
            }
            Some(path) => {
                tracing::warn!("Config file not found: {:?}, using defaults", path);
                Self::default()
            }
            None => Self::default(),
        };
        Ok(config.merge_with_env())
    }

    fn merge_with_env(mut self) -> Self {
        if let Ok(addr) = std::env::var("METERLOG_HTTP_ADDR") {
            self.server.listen_addr = addr;
        }
        if let Ok(data_dir) = std::env::var("METERLOG_DATA_DIR") {
            self.store.data_dir = PathBuf::from(data_dir);
        }
        if let Ok(url) = std::env::var("METERLOG_TELEMETRY_URL") {
            self.telemetry.url = Some(url);
        }
        if let Ok(url) = std::env::var("METERLOG_ALERT_URL") {
            self.alerts.url = Some(url);
        }
        self
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.server
            .listen_addr
            .parse()
            .with_context(|| format!("invalid listen address {}", self.server.listen_addr))
    }

    /// Validate configuration. Missing store keys are fatal here, before
    /// anything is opened.
    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;
        self.store.resolve()?;

        if self.collectors.sample_interval_secs == 0 {
            bail!("collectors.sample_interval_secs must be greater than zero");
        }
        if self.collectors.alert_sync_interval_secs == 0 {
            bail!("collectors.alert_sync_interval_secs must be greater than zero");
        }
        for (name, source) in [("telemetry", &self.telemetry), ("alerts", &self.alerts)] {
            if let Some(url) = &source.url {
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    bail!("{name}.url must be an http(s) URL, got {url}");
                }
            }
        }
        Ok(())
    }
}
