//! Configuration module for the simulation service
//!
//! Every process-wide value (paths, ports, readiness target) lives here and is
//! handed to the components explicitly. Values come from the environment, with
//! a `.env` file honoured when present, and fall back to the sandbox defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use shared::observability::{LogConfig, LogFormat, LogLevel};
use std::env;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::collector::FollowOptions;
use crate::inetsim::{default_config_path, SimulatorConfig};
use crate::readiness::ReadinessProbe;

/// Main configuration structure for the simulation service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub inetsim: InetSimConfig,
    pub readiness: ReadinessConfig,
    pub collector: CollectorConfig,
    pub network_sim: NetworkSimConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            server: ServerConfig::from_env()?,
            inetsim: InetSimConfig::from_env()?,
            readiness: ReadinessConfig::from_env()?,
            collector: CollectorConfig::from_env()?,
            network_sim: NetworkSimConfig::from_env(),
            logging: LoggingConfig::from_env()?,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.inetsim.validate()?;
        self.readiness.validate()?;
        self.collector.validate()?;
        self.network_sim.validate()?;
        Ok(())
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Status server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: var_or("SERVER_HOST", "0.0.0.0"),
            port: var_or("SERVER_PORT", "5000")
                .parse()
                .context("Invalid SERVER_PORT")?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            anyhow::bail!("Server host cannot be empty");
        }
        if self.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

/// Simulator config file location and directive values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InetSimConfig {
    pub config_path: PathBuf,
    pub template: SimulatorConfig,
}

impl InetSimConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = SimulatorConfig::default();

        let services = match env::var("INETSIM_SERVICES") {
            Ok(raw) => parse_services(&raw),
            Err(_) => defaults.services.clone(),
        };

        Ok(Self {
            config_path: env::var("INETSIM_CONFIG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_config_path()),
            template: SimulatorConfig {
                service_bind_address: var_or(
                    "INETSIM_BIND_ADDRESS",
                    &defaults.service_bind_address,
                ),
                dns_default_ip: var_or("INETSIM_DNS_DEFAULT_IP", &defaults.dns_default_ip),
                services,
                http_fakefile: var_or("INETSIM_HTTP_FAKEFILE", &defaults.http_fakefile),
                http_fakefile_mime: var_or(
                    "INETSIM_HTTP_FAKEFILE_MIME",
                    &defaults.http_fakefile_mime,
                ),
                dns_bind_port: var_or("INETSIM_DNS_PORT", &defaults.dns_bind_port.to_string())
                    .parse()
                    .context("Invalid INETSIM_DNS_PORT")?,
            },
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.config_path.as_os_str().is_empty() {
            anyhow::bail!("INetSim config path cannot be empty");
        }
        self.template
            .service_bind_address
            .parse::<IpAddr>()
            .context("INetSim bind address must be an IP address")?;
        self.template
            .dns_default_ip
            .parse::<IpAddr>()
            .context("INetSim default DNS answer must be an IP address")?;
        if self.template.services.is_empty() {
            anyhow::bail!("At least one INetSim service must be started");
        }
        if self.template.http_fakefile.trim().is_empty() {
            anyhow::bail!("INetSim HTTP fakefile cannot be empty");
        }
        if self.template.dns_bind_port == 0 {
            anyhow::bail!("INetSim DNS port cannot be 0");
        }
        Ok(())
    }
}

impl Default for InetSimConfig {
    fn default() -> Self {
        Self {
            config_path: default_config_path(),
            template: SimulatorConfig::default(),
        }
    }
}

fn parse_services(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Readiness gate target and timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessConfig {
    pub host: String,
    pub port: u16,
    pub timeout_seconds: u64,
    pub interval_ms: u64,
    /// Upper bound on the whole wait; `None` waits forever
    pub deadline_seconds: Option<u64>,
}

impl ReadinessConfig {
    pub fn from_env() -> Result<Self> {
        let deadline_seconds = match env::var("READINESS_DEADLINE_SECS") {
            Ok(raw) if !raw.trim().is_empty() => Some(
                raw.trim()
                    .parse()
                    .context("Invalid READINESS_DEADLINE_SECS")?,
            ),
            _ => None,
        };

        Ok(Self {
            host: var_or("INETSIM_HOST", "inetsim"),
            port: var_or("INETSIM_PORT", "80")
                .parse()
                .context("Invalid INETSIM_PORT")?,
            timeout_seconds: var_or("READINESS_TIMEOUT_SECS", "5")
                .parse()
                .context("Invalid READINESS_TIMEOUT_SECS")?,
            interval_ms: var_or("READINESS_INTERVAL_MS", "1000")
                .parse()
                .context("Invalid READINESS_INTERVAL_MS")?,
            deadline_seconds,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            anyhow::bail!("Readiness host cannot be empty");
        }
        if self.port == 0 {
            anyhow::bail!("Readiness port cannot be 0");
        }
        if self.timeout_seconds == 0 {
            anyhow::bail!("Readiness timeout must be greater than 0");
        }
        if self.interval_ms == 0 {
            anyhow::bail!("Readiness interval must be greater than 0");
        }
        if self.deadline_seconds == Some(0) {
            anyhow::bail!("Readiness deadline must be greater than 0 when set");
        }
        Ok(())
    }

    pub fn probe(&self) -> ReadinessProbe {
        ReadinessProbe {
            host: self.host.clone(),
            port: self.port,
            timeout: Duration::from_secs(self.timeout_seconds),
            interval: Duration::from_millis(self.interval_ms),
        }
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_seconds.map(Duration::from_secs)
    }
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            host: "inetsim".to_string(),
            port: 80,
            timeout_seconds: 5,
            interval_ms: 1000,
            deadline_seconds: None,
        }
    }
}

/// Log collector source and polling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    pub log_path: PathBuf,
    pub poll_interval_ms: u64,
    pub reopen_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl CollectorConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            log_path: PathBuf::from(var_or("INETSIM_LOG_PATH", "/logs/inetsim.log")),
            poll_interval_ms: var_or("COLLECTOR_POLL_INTERVAL_MS", "250")
                .parse()
                .context("Invalid COLLECTOR_POLL_INTERVAL_MS")?,
            reopen_backoff_ms: var_or("COLLECTOR_REOPEN_BACKOFF_MS", "500")
                .parse()
                .context("Invalid COLLECTOR_REOPEN_BACKOFF_MS")?,
            max_backoff_ms: var_or("COLLECTOR_MAX_BACKOFF_MS", "10000")
                .parse()
                .context("Invalid COLLECTOR_MAX_BACKOFF_MS")?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.log_path.as_os_str().is_empty() {
            anyhow::bail!("Collector log path cannot be empty");
        }
        if self.poll_interval_ms == 0 {
            anyhow::bail!("Collector poll interval must be greater than 0");
        }
        if self.reopen_backoff_ms == 0 {
            anyhow::bail!("Collector reopen backoff must be greater than 0");
        }
        if self.max_backoff_ms < self.reopen_backoff_ms {
            anyhow::bail!("Collector max backoff cannot be below the reopen backoff");
        }
        Ok(())
    }

    pub fn follow_options(&self) -> FollowOptions {
        FollowOptions {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            reopen_backoff: Duration::from_millis(self.reopen_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from("/logs/inetsim.log"),
            poll_interval_ms: 250,
            reopen_backoff_ms: 500,
            max_backoff_ms: 10_000,
        }
    }
}

/// Sandbox-side redirection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSimConfig {
    /// INetSim DNS server, e.g. "172.20.0.2:53"
    pub dns_addr: String,
    /// INetSim HTTP server, e.g. "172.20.0.2:80"
    pub http_addr: String,
    pub enabled: bool,
    pub liveness_timeout: Duration,
}

impl NetworkSimConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if env::var("OSSF_NETWORK_SIMULATION_ENABLED").as_deref() == Ok("true") {
            config.enabled = true;
        }
        if let Ok(addr) = env::var("OSSF_INETSIM_DNS_ADDR") {
            if !addr.is_empty() {
                config.dns_addr = addr;
            }
        }
        if let Ok(addr) = env::var("OSSF_INETSIM_HTTP_ADDR") {
            if !addr.is_empty() {
                config.http_addr = addr;
            }
        }
        if let Some(timeout) = parse_liveness_timeout(env::var("OSSF_URL_LIVENESS_TIMEOUT").ok()) {
            config.liveness_timeout = timeout;
        }

        config
    }

    pub fn validate(&self) -> Result<()> {
        if self.enabled && (self.dns_addr.is_empty() || self.http_addr.is_empty()) {
            anyhow::bail!("Network simulation needs both DNS and HTTP addresses");
        }
        if self.liveness_timeout.is_zero() {
            anyhow::bail!("Liveness timeout must be greater than 0");
        }
        Ok(())
    }
}

impl Default for NetworkSimConfig {
    fn default() -> Self {
        Self {
            dns_addr: "172.20.0.2:53".to_string(),
            http_addr: "172.20.0.2:80".to_string(),
            enabled: false,
            liveness_timeout: Duration::from_secs(3),
        }
    }
}

/// Whole seconds; anything unparsable keeps the default.
fn parse_liveness_timeout(raw: Option<String>) -> Option<Duration> {
    raw?.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            level: var_or("LOG_LEVEL", "info")
                .parse()
                .context("Invalid LOG_LEVEL")?,
            format: var_or("LOG_FORMAT", "pretty")
                .parse()
                .context("Invalid LOG_FORMAT")?,
        })
    }

    pub fn log_config(&self, service_name: &str) -> LogConfig {
        LogConfig {
            level: self.level,
            format: self.format,
            service_name: service_name.to_string(),
            ..LogConfig::default()
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Pretty,
        }
    }
}
