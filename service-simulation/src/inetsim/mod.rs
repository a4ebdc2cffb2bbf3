//! INetSim configuration generation
//!
//! The simulator reads its directives from a single file on startup. This
//! module renders that file from a small set of directive values and writes it
//! to the configured path, always replacing whatever was there before.

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, SimulationError};

/// Directive values for the simulator config file.
///
/// The default value renders the stock sandbox template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    pub service_bind_address: String,
    pub dns_default_ip: String,
    pub services: Vec<String>,
    pub http_fakefile: String,
    pub http_fakefile_mime: String,
    pub dns_bind_port: u16,
}

impl SimulatorConfig {
    /// Render the config file contents.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            service_bind_address: "0.0.0.0".to_string(),
            dns_default_ip: "127.0.0.1".to_string(),
            services: vec!["http".to_string(), "dns".to_string()],
            http_fakefile: "sample.html".to_string(),
            http_fakefile_mime: "text/html".to_string(),
            dns_bind_port: 53,
        }
    }
}

impl fmt::Display for SimulatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "service_bind_address {}", self.service_bind_address)?;
        writeln!(f, "dns_default_ip {}", self.dns_default_ip)?;
        writeln!(f)?;
        for service in &self.services {
            writeln!(f, "start_service {}", service)?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "http_default_fakefile   {} {}",
            self.http_fakefile, self.http_fakefile_mime
        )?;
        writeln!(f)?;
        writeln!(f, "dns_bind_port {}", self.dns_bind_port)
    }
}

/// Writes the simulator config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigGenerator {
    template: SimulatorConfig,
}

impl ConfigGenerator {
    pub fn new(template: SimulatorConfig) -> Self {
        Self { template }
    }

    /// Write the rendered config to `target_path`.
    ///
    /// Any existing file is removed first and missing parent directories are
    /// created, so repeated calls always leave exactly one rendering behind.
    pub async fn generate(&self, target_path: &Path) -> Result<()> {
        let write_err = |source: std::io::Error| SimulationError::ConfigWrite {
            path: target_path.to_path_buf(),
            source,
        };

        match tokio::fs::remove_file(target_path).await {
            Ok(()) => debug!("Removed previous simulator config at {}", target_path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(write_err(e)),
        }

        if let Some(parent) = target_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        let contents = self.template.render();
        tokio::fs::write(target_path, contents.as_bytes())
            .await
            .map_err(write_err)?;

        info!(
            path = %target_path.display(),
            bytes = contents.len(),
            "Simulator config generated"
        );
        Ok(())
    }
}

/// Default location the simulator container reads its config from.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("/etc/inetsim/inetsim.conf")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    const STOCK_TEMPLATE: &str = "service_bind_address 0.0.0.0
dns_default_ip 127.0.0.1

start_service http
start_service dns

http_default_fakefile   sample.html text/html

dns_bind_port 53
";

    #[test]
    fn test_default_template_renders_stock_config() {
        assert_eq!(SimulatorConfig::default().render(), STOCK_TEMPLATE);
    }

    #[test]
    fn test_custom_directives_keep_layout() {
        let config = SimulatorConfig {
            service_bind_address: "10.0.0.1".to_string(),
            services: vec!["dns".to_string()],
            dns_bind_port: 5353,
            ..SimulatorConfig::default()
        };
        let rendered = config.render();
        assert!(rendered.starts_with("service_bind_address 10.0.0.1\n"));
        assert!(rendered.contains("\nstart_service dns\n\n"));
        assert!(!rendered.contains("start_service http"));
        assert!(rendered.ends_with("dns_bind_port 5353\n"));
    }

    #[tokio::test]
    async fn test_generate_creates_missing_directories() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("etc").join("inetsim").join("inetsim.conf");

        ConfigGenerator::default().generate(&target).await.unwrap();

        let written = tokio::fs::read_to_string(&target).await.unwrap();
        assert_eq!(written, STOCK_TEMPLATE);
    }

    #[tokio::test]
    async fn test_generate_twice_is_idempotent() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("inetsim.conf");
        let generator = ConfigGenerator::default();

        generator.generate(&target).await.unwrap();
        generator.generate(&target).await.unwrap();

        let written = tokio::fs::read_to_string(&target).await.unwrap();
        assert_eq!(written, STOCK_TEMPLATE);
    }

    #[tokio::test]
    async fn test_generate_replaces_unrelated_content() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("etc/inetsim/inetsim.conf");
        std::fs::create_dir_all(target.parent().unwrap()).unwrap();
        std::fs::write(&target, "start_service smtp\n".repeat(64)).unwrap();

        ConfigGenerator::default().generate(&target).await.unwrap();

        let written = std::fs::read(&target).unwrap();
        assert_eq!(written, STOCK_TEMPLATE.as_bytes());
    }

    #[tokio::test]
    async fn test_generate_reports_write_failure() {
        let dir = tempdir().unwrap();
        // A regular file where a directory is expected
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();
        let target = blocker.join("inetsim.conf");

        let err = ConfigGenerator::default().generate(&target).await.unwrap_err();
        match err {
            SimulationError::ConfigWrite { path, .. } => assert_eq!(path, target),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_default_config_path() {
        assert_eq!(default_config_path(), PathBuf::from("/etc/inetsim/inetsim.conf"));
    }
}
