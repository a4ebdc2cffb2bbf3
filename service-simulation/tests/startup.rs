//! End-to-end startup sequence against real sockets and files

use std::io::Write;
use std::net::SocketAddr;
use std::time::Duration;

use futures::StreamExt;
use service_simulation::collector::{FollowOptions, LogCollector};
use service_simulation::config::Config;
use service_simulation::handlers;
use service_simulation::inetsim::ConfigGenerator;
use service_simulation::models::LogEventKind;
use service_simulation::readiness::{ReadinessGate, ReadinessProbe};
use service_simulation::SimulationError;
use tempfile::tempdir;
use tokio::net::TcpListener;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn local_probe(port: u16) -> ReadinessProbe {
    ReadinessProbe {
        host: "127.0.0.1".to_string(),
        port,
        timeout: Duration::from_millis(200),
        interval: Duration::from_millis(20),
    }
}

#[tokio::test]
async fn test_generate_wait_and_serve_status() {
    let dir = tempdir().unwrap();
    let mut config = Config::default();
    config.inetsim.config_path = dir.path().join("etc/inetsim/inetsim.conf");
    std::fs::create_dir_all(config.inetsim.config_path.parent().unwrap()).unwrap();
    std::fs::write(&config.inetsim.config_path, "stale content\n").unwrap();

    assert_ok!(
        ConfigGenerator::new(config.inetsim.template.clone())
            .generate(&config.inetsim.config_path)
            .await
    );
    let written = std::fs::read_to_string(&config.inetsim.config_path).unwrap();
    assert!(written.starts_with("service_bind_address 0.0.0.0\n"));
    assert!(!written.contains("stale"));

    // The simulator comes up a little after we start waiting
    let sim_port = free_port();
    let simulator = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let listener = TcpListener::bind(("127.0.0.1", sim_port)).await.unwrap();
        let _ = listener.accept().await;
    });

    let gate = ReadinessGate::new(local_probe(sim_port));
    let attempts = gate
        .await_ready_within(Duration::from_secs(10), &CancellationToken::new())
        .await
        .unwrap();
    assert!(attempts >= 1);
    simulator.await.unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let stop = shutdown.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, handlers::router())
            .with_graceful_shutdown(async move { stop.cancelled().await })
            .await
    });

    let response = reqwest::Client::builder()
        .no_proxy()
        .build()
        .unwrap()
        .get(format!("http://{}/status", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(
        body,
        serde_json::json!({"service": "simulation", "status": "running"})
    );

    shutdown.cancel();
    assert_ok!(server.await.unwrap());
}

#[tokio::test]
async fn test_unreachable_simulator_times_out() {
    let gate = ReadinessGate::new(local_probe(free_port()));
    let result = gate
        .await_ready_within(Duration::from_millis(150), &CancellationToken::new())
        .await;

    let err = assert_err!(result);
    assert!(matches!(err, SimulationError::ReadinessTimeout { attempts, .. } if attempts >= 1));
}

#[tokio::test]
async fn test_collector_follows_simulator_log() {
    let dir = tempdir().unwrap();
    let log_path = dir.path().join("inetsim.log");
    std::fs::write(
        &log_path,
        "[2024-05-01 10:00:00] INetSim main process started\n\
         [2024-05-01 10:00:02] [dns_53_tcp_udp] DNS query for malicious-c2-server.example.com\n",
    )
    .unwrap();

    let cancel = CancellationToken::new();
    let collector = LogCollector::new(FollowOptions {
        poll_interval: Duration::from_millis(10),
        reopen_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(50),
    });
    let events = collector.watch(log_path.clone(), cancel.clone());
    tokio::pin!(events);

    let writer_path = log_path.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut log = std::fs::OpenOptions::new()
            .append(true)
            .open(&writer_path)
            .unwrap();
        log.write_all(b"[2024-05-01 10:00:03] [http_80_tcp] HTTP GET /payload.bin\n")
            .unwrap();
    });

    let mut kinds = Vec::new();
    for _ in 0..2 {
        let event = tokio::time::timeout(Duration::from_secs(5), events.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        kinds.push(event.kind);
    }
    assert_eq!(kinds, vec![LogEventKind::Dns, LogEventKind::Http]);

    cancel.cancel();
    let end = tokio::time::timeout(Duration::from_secs(5), events.next())
        .await
        .unwrap();
    assert!(end.is_none());
}
