//! Configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use speedlog_core::PhaseTimeouts;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Probes per latency measurement; sequence numbers are 16-bit
pub const MAX_PING_COUNT: u32 = 100;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub dashboard: DashboardConfig,
    pub provider: ProviderConfig,
    pub timeouts: TimeoutConfig,
    pub export: ExportConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,
    /// Scheduler interval in minutes, 0 disables it
    pub interval_minutes: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub bind_address: String,
    pub port: u16,
    /// Records shown by the charts when the request has no limit
    pub chart_limit: usize,
    /// Scheduler interval used by --web when none is configured
    pub default_interval_minutes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LatencyMethod {
    Http,
    Icmp,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub servers_url: String,
    pub server_list_limit: usize,
    pub geolocation_url: String,
    pub geolocation_language: String,
    pub public_ip_url: String,
    pub latency_method: LatencyMethod,
    pub ping_count: u32,
    /// Image edge sizes requested during download, cycled in order
    pub download_sizes: Vec<u32>,
    pub upload_size_bytes: usize,
    /// Stop a transfer phase after this many bytes
    pub max_transfer_bytes: u64,
    /// Stop a transfer phase after this many seconds
    pub transfer_budget_secs: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub identity_secs: u64,
    pub discovery_secs: u64,
    pub latency_secs: u64,
    pub transfer_secs: u64,
    pub geolocation_secs: u64,
    pub store_busy_ms: u64,
    pub shutdown_grace_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExportConfig {
    pub chart_width: u32,
    pub chart_height: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "results.db".to_string(),
            interval_minutes: 0,
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            chart_limit: 100,
            default_interval_minutes: 120,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            servers_url: "https://www.speedtest.net/api/js/servers?engine=js".to_string(),
            server_list_limit: 100,
            geolocation_url: "http://ip-api.com/json/".to_string(),
            geolocation_language: "en".to_string(),
            public_ip_url: "https://icanhazip.com/".to_string(),
            latency_method: LatencyMethod::Http,
            ping_count: 3,
            download_sizes: vec![1000, 1500, 2000, 2500],
            upload_size_bytes: 1_000_000,
            max_transfer_bytes: 200_000_000,
            transfer_budget_secs: 10,
            user_agent: format!("speedlog/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            identity_secs: 10,
            discovery_secs: 15,
            latency_secs: 10,
            transfer_secs: 60,
            geolocation_secs: 5,
            store_busy_ms: 5000,
            shutdown_grace_secs: 30,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            chart_width: 1600,
            chart_height: 900,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl TimeoutConfig {
    pub fn phase_timeouts(&self) -> PhaseTimeouts {
        PhaseTimeouts {
            identity: Duration::from_secs(self.identity_secs),
            discovery: Duration::from_secs(self.discovery_secs),
            latency: Duration::from_secs(self.latency_secs),
            download: Duration::from_secs(self.transfer_secs),
            upload: Duration::from_secs(self.transfer_secs),
        }
    }

    pub fn store_busy(&self) -> Duration {
        Duration::from_millis(self.store_busy_ms)
    }

    pub fn geolocation(&self) -> Duration {
        Duration::from_secs(self.geolocation_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        Self::parse(&contents)
    }

    /// Load `path` if it exists, otherwise fall back to defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            info!("No config file at {:?}, using defaults", path.as_ref());
            Ok(Self::default())
        }
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)
            .with_context(|| "Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.general.database_path.trim().is_empty() {
            anyhow::bail!("general.database_path must not be empty");
        }
        if self.dashboard.chart_limit == 0 {
            anyhow::bail!("dashboard.chart_limit must be at least 1");
        }
        if self.provider.ping_count == 0 || self.provider.ping_count > MAX_PING_COUNT {
            anyhow::bail!("provider.ping_count must be between 1 and {}", MAX_PING_COUNT);
        }
        if self.provider.download_sizes.is_empty() {
            anyhow::bail!("provider.download_sizes must list at least one size");
        }
        if self.provider.upload_size_bytes == 0 {
            anyhow::bail!("provider.upload_size_bytes must be positive");
        }
        Ok(())
    }
}
