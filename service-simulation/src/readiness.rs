//! Startup gate that waits for the simulator to accept connections
//!
//! The simulator container takes a variable amount of time to come up, so the
//! gate keeps probing its service port until a TCP connect succeeds. Without a
//! deadline or cancellation token the wait is unbounded; that matches how the
//! sandbox has always been brought up, but it means a simulator that never
//! starts will hang the caller forever. Embedders should pass a bound.

use std::future::Future;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, SimulationError};

/// Where and how often to probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessProbe {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
    pub interval: Duration,
}

impl ReadinessProbe {
    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ReadinessProbe {
    fn default() -> Self {
        Self {
            host: "inetsim".to_string(),
            port: 80,
            timeout: Duration::from_secs(5),
            interval: Duration::from_secs(1),
        }
    }
}

/// One connection trial against the target.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    async fn probe(&self, host: &str, port: u16, timeout: Duration) -> io::Result<()>;
}

/// Plain TCP connect; the connection is closed as soon as it is established.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn probe(&self, host: &str, port: u16, timeout: Duration) -> io::Result<()> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??;
        drop(stream);
        Ok(())
    }
}

enum WaitOutcome {
    Ready(u32),
    Expired(u32),
    Cancelled(u32),
}

pub struct ReadinessGate<C = TcpConnector> {
    probe: ReadinessProbe,
    connector: C,
}

impl ReadinessGate<TcpConnector> {
    pub fn new(probe: ReadinessProbe) -> Self {
        Self::with_connector(probe, TcpConnector)
    }
}

impl<C: Connector> ReadinessGate<C> {
    pub fn with_connector(probe: ReadinessProbe, connector: C) -> Self {
        Self { probe, connector }
    }

    pub fn probe(&self) -> &ReadinessProbe {
        &self.probe
    }

    /// Block until the target accepts a connection, with no upper bound.
    ///
    /// Returns the number of attempts it took.
    pub async fn await_ready(&self) -> u32 {
        match self.probe_until(None, None).await {
            WaitOutcome::Ready(n) | WaitOutcome::Expired(n) | WaitOutcome::Cancelled(n) => n,
        }
    }

    /// Like [`await_ready`](Self::await_ready) but gives up when `cancel` fires.
    pub async fn await_ready_cancellable(&self, cancel: &CancellationToken) -> Result<u32> {
        self.finish(self.probe_until(None, Some(cancel)).await)
    }

    /// Wait at most `limit`; no probe is started once the limit has passed.
    pub async fn await_ready_within(
        &self,
        limit: Duration,
        cancel: &CancellationToken,
    ) -> Result<u32> {
        let deadline = Instant::now() + limit;
        self.finish(self.probe_until(Some(deadline), Some(cancel)).await)
    }

    fn finish(&self, outcome: WaitOutcome) -> Result<u32> {
        match outcome {
            WaitOutcome::Ready(attempts) => Ok(attempts),
            WaitOutcome::Expired(attempts) => {
                warn!(target_addr = %self.probe.target(), attempts, "Simulator readiness deadline expired");
                Err(SimulationError::ReadinessTimeout {
                    target: self.probe.target(),
                    attempts,
                })
            }
            WaitOutcome::Cancelled(attempts) => Err(SimulationError::ReadinessCancelled {
                target: self.probe.target(),
                attempts,
            }),
        }
    }

    async fn probe_until(
        &self,
        deadline: Option<Instant>,
        cancel: Option<&CancellationToken>,
    ) -> WaitOutcome {
        let mut attempts = 0u32;

        loop {
            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            if remaining == Some(Duration::ZERO) {
                return WaitOutcome::Expired(attempts);
            }
            if cancel.is_some_and(|c| c.is_cancelled()) {
                return WaitOutcome::Cancelled(attempts);
            }

            attempts += 1;
            let timeout = remaining.map_or(self.probe.timeout, |r| r.min(self.probe.timeout));
            let attempt = self.connector.probe(&self.probe.host, self.probe.port, timeout);
            let Some(result) = until_cancelled(cancel, attempt).await else {
                return WaitOutcome::Cancelled(attempts);
            };

            match result {
                Ok(()) => {
                    info!(target_addr = %self.probe.target(), attempts, "Simulator is accepting connections");
                    return WaitOutcome::Ready(attempts);
                }
                Err(e) => {
                    debug!(target_addr = %self.probe.target(), attempt = attempts, error = %e, "Simulator not reachable yet");
                }
            }

            let pause = deadline.map_or(self.probe.interval, |d| {
                self.probe.interval.min(d.saturating_duration_since(Instant::now()))
            });
            if until_cancelled(cancel, tokio::time::sleep(pause)).await.is_none() {
                return WaitOutcome::Cancelled(attempts);
            }
        }
    }
}

/// Drive `fut` to completion unless `cancel` fires first.
async fn until_cancelled<F: Future>(cancel: Option<&CancellationToken>, fut: F) -> Option<F::Output> {
    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => None,
            out = fut => Some(out),
        },
        None => Some(fut.await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn fast_probe() -> ReadinessProbe {
        ReadinessProbe {
            host: "inetsim".to_string(),
            port: 80,
            timeout: Duration::from_millis(50),
            interval: Duration::from_millis(100),
        }
    }

    fn refused() -> io::Error {
        io::Error::new(io::ErrorKind::ConnectionRefused, "refused")
    }

    #[test]
    fn test_default_probe_targets_simulator() {
        let probe = ReadinessProbe::default();
        assert_eq!(probe.target(), "inetsim:80");
        assert_eq!(probe.timeout, Duration::from_secs(5));
        assert_eq!(probe.interval, Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_after_failed_attempts_stops_probing() {
        let mut connector = MockConnector::new();
        let mut calls = 0u32;
        connector
            .expect_probe()
            .withf(|host, port, _| host == "inetsim" && *port == 80)
            .times(4)
            .returning(move |_, _, _| {
                calls += 1;
                if calls < 4 {
                    Err(refused())
                } else {
                    Ok(())
                }
            });

        let gate = ReadinessGate::with_connector(fast_probe(), connector);
        assert_eq!(gate.await_ready().await, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expires_without_late_probes() {
        let started: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
        let recorder = started.clone();

        let mut connector = MockConnector::new();
        connector.expect_probe().returning(move |_, _, _| {
            recorder.lock().unwrap().push(Instant::now());
            Err(refused())
        });

        let gate = ReadinessGate::with_connector(fast_probe(), connector);
        let begin = Instant::now();
        let limit = Duration::from_millis(350);
        let err = gate
            .await_ready_within(limit, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            SimulationError::ReadinessTimeout { target, attempts } => {
                assert_eq!(target, "inetsim:80");
                assert_eq!(attempts, 4);
            }
            other => panic!("unexpected error: {other}"),
        }

        let started = started.lock().unwrap();
        assert_eq!(started.len(), 4);
        assert!(started.iter().all(|at| *at < begin + limit));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_caps_attempt_timeout() {
        let mut connector = MockConnector::new();
        connector
            .expect_probe()
            .withf(|_, _, timeout| *timeout <= Duration::from_millis(30))
            .returning(|_, _, _| Err(refused()));

        let gate = ReadinessGate::with_connector(fast_probe(), connector);
        let result = gate
            .await_ready_within(Duration::from_millis(30), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(SimulationError::ReadinessTimeout { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_unbounded_wait() {
        let mut connector = MockConnector::new();
        connector.expect_probe().returning(|_, _, _| Err(refused()));

        let gate = ReadinessGate::with_connector(fast_probe(), connector);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            trigger.cancel();
        });

        let result = gate.await_ready_cancellable(&cancel).await;
        assert!(matches!(
            result,
            Err(SimulationError::ReadinessCancelled { attempts: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_already_cancelled_token_never_probes() {
        let mut connector = MockConnector::new();
        connector.expect_probe().times(0);

        let gate = ReadinessGate::with_connector(fast_probe(), connector);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = gate.await_ready_cancellable(&cancel).await;
        assert!(matches!(
            result,
            Err(SimulationError::ReadinessCancelled { attempts: 0, .. })
        ));
    }
}
