use anyhow::Result;
use service_simulation::config::Config;
use service_simulation::handlers;
use service_simulation::inetsim::ConfigGenerator;
use service_simulation::networksim::NetworkSimulator;
use service_simulation::readiness::ReadinessGate;
use shared::observability::init_logging;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_logging(config.logging.log_config("service-simulation"))?;
    config.validate()?;

    info!("Starting simulation service");

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
        }
        signal.cancel();
    });

    // The simulator reads this on its own startup, so it must exist before we
    // start waiting for it
    ConfigGenerator::new(config.inetsim.template.clone())
        .generate(&config.inetsim.config_path)
        .await?;

    let gate = ReadinessGate::new(config.readiness.probe());
    info!(
        target_addr = %gate.probe().target(),
        deadline_secs = ?config.readiness.deadline_seconds,
        "Waiting for simulator"
    );
    let attempts = match config.readiness.deadline() {
        Some(limit) => gate.await_ready_within(limit, &shutdown).await?,
        None => gate.await_ready_cancellable(&shutdown).await?,
    };
    info!(attempts, "Simulator ready");

    if config.network_sim.enabled {
        let simulator = NetworkSimulator::new(config.network_sim.clone())?;
        match simulator.validate_connection().await {
            Ok(()) => info!(dns_servers = ?simulator.dns_servers(), "Network simulation enabled"),
            Err(e) => warn!(error = %e, "INetSim connection validation failed"),
        }
    }

    let addr = config.server.bind_address();
    let listener = TcpListener::bind(&addr).await?;
    info!("Simulation service listening on {}", addr);

    axum::serve(listener, handlers::router())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Simulation service stopped");
    Ok(())
}
