//! Network simulation policy for the analysis sandbox
//!
//! Decides whether traffic from a sample should be pointed at INetSim: URLs
//! that no longer answer are redirected, live ones are left alone. Also tells
//! the sandbox which DNS servers to hand out and can check that the simulator
//! itself is reachable.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use reqwest::redirect::Policy;
use reqwest::Client;
use tokio::net::{lookup_host, UdpSocket};
use tracing::{info, warn};

use crate::config::NetworkSimConfig;
use crate::error::{Result, SimulationError};

const DEFAULT_DNS_SERVERS: [&str; 2] = ["8.8.8.8", "8.8.4.4"];

pub struct NetworkSimulator {
    config: NetworkSimConfig,
    client: Client,
}

impl NetworkSimulator {
    pub fn new(config: NetworkSimConfig) -> Result<Self> {
        // Liveness is judged on the target's own first response: no redirects, no proxy
        let client = Client::builder()
            .timeout(config.liveness_timeout)
            .redirect(Policy::none())
            .no_proxy()
            .build()
            .map_err(|e| SimulationError::Connection(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn dns_addr(&self) -> &str {
        &self.config.dns_addr
    }

    pub fn http_addr(&self) -> &str {
        &self.config.http_addr
    }

    /// Whether `url` answers a HEAD request with a 2xx or 3xx status.
    ///
    /// Always true while simulation is disabled.
    pub async fn is_url_alive(&self, url: &str) -> bool {
        if !self.config.enabled {
            return true;
        }

        info!(url, "Checking URL liveness");

        match self.client.head(url).send().await {
            Ok(response) => {
                let status = response.status();
                let alive = status.is_success() || status.is_redirection();
                info!(url, status_code = status.as_u16(), is_alive = alive, "URL liveness check result");
                alive
            }
            Err(e) => {
                info!(url, error = %e, "URL is not alive");
                false
            }
        }
    }

    /// Whether `host` resolves to at least one address within the liveness timeout.
    pub async fn is_host_alive(&self, host: &str) -> bool {
        if !self.config.enabled {
            return true;
        }

        info!(host, "Checking host DNS resolution");

        match tokio::time::timeout(self.config.liveness_timeout, lookup_host((host, 0))).await {
            Ok(Ok(addrs)) => {
                let ips: Vec<String> = addrs.map(|a| a.ip().to_string()).collect();
                if ips.is_empty() {
                    info!(host, "Host resolved to no addresses");
                    return false;
                }
                info!(host, ips = ?ips, "Host resolved successfully");
                true
            }
            Ok(Err(e)) => {
                info!(host, error = %e, "Host DNS resolution failed");
                false
            }
            Err(_) => {
                info!(host, "Host DNS resolution timed out");
                false
            }
        }
    }

    /// Dead URLs go to the simulator; nothing is redirected while disabled.
    pub async fn should_redirect(&self, url: &str) -> bool {
        if !self.config.enabled {
            return false;
        }

        let redirect = !self.is_url_alive(url).await;
        if redirect {
            info!(url, inetsim_http = %self.config.http_addr, "URL will be redirected to INetSim");
        }
        redirect
    }

    /// DNS servers for the sandbox: the simulator when enabled, public
    /// resolvers otherwise.
    pub fn dns_servers(&self) -> Vec<String> {
        if !self.config.enabled {
            return DEFAULT_DNS_SERVERS.iter().map(|s| s.to_string()).collect();
        }

        match split_host(&self.config.dns_addr) {
            Some(host) => vec![host],
            None => vec![self.config.dns_addr.clone()],
        }
    }

    /// Check that the simulator's DNS and HTTP services can be reached.
    pub async fn validate_connection(&self) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }

        info!("Validating INetSim connection");

        if split_host(&self.config.dns_addr).is_none() {
            return Err(SimulationError::InvalidAddress(format!(
                "invalid INetSim DNS address: {}",
                self.config.dns_addr
            )));
        }
        self.connect_dns().await.map_err(|e| {
            SimulationError::Connection(format!("failed to connect to INetSim DNS: {}", e))
        })?;

        let url = format!("http://{}/", self.config.http_addr);
        self.client.get(&url).send().await.map_err(|e| {
            SimulationError::Connection(format!("failed to connect to INetSim HTTP: {}", e))
        })?;

        info!(
            dns = %self.config.dns_addr,
            http = %self.config.http_addr,
            "INetSim connection validated successfully"
        );
        Ok(())
    }

    async fn connect_dns(&self) -> std::io::Result<()> {
        let resolve = lookup_host(self.config.dns_addr.as_str());
        let target = tokio::time::timeout(self.config.liveness_timeout, resolve)
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "DNS address lookup timed out"))??
            .next()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "DNS address resolved to nothing"))?;

        let local: SocketAddr = if target.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(local).await?;
        if let Err(e) = socket.connect(target).await {
            warn!(target_addr = %target, error = %e, "UDP connect to INetSim DNS failed");
            return Err(e);
        }
        Ok(())
    }
}

/// Host part of a `host:port` address.
fn split_host(addr: &str) -> Option<String> {
    if let Ok(sock) = addr.parse::<SocketAddr>() {
        return Some(sock.ip().to_string());
    }
    let (host, port) = addr.rsplit_once(':')?;
    if host.is_empty() || host.contains(':') || port.parse::<u16>().is_err() {
        return None;
    }
    Some(host.trim_start_matches('[').trim_end_matches(']').to_string())
}
