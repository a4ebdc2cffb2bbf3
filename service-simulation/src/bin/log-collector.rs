use std::collections::HashMap;

use anyhow::Result;
use futures::StreamExt;
use service_simulation::collector::LogCollector;
use service_simulation::config::Config;
use service_simulation::models::LogEventKind;
use shared::observability::init_logging;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_logging(config.logging.log_config("log-collector"))?;
    config.collector.validate()?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
        }
        signal.cancel();
    });

    let collector = LogCollector::new(config.collector.follow_options());
    let events = collector.watch(config.collector.log_path.clone(), shutdown);
    tokio::pin!(events);

    let mut counts: HashMap<LogEventKind, u64> = HashMap::new();
    while let Some(item) = events.next().await {
        let event = item?;
        info!(kind = %event.kind, line = %event.raw_line, "Event");
        *counts.entry(event.kind).or_default() += 1;
    }

    info!(
        dns_events = counts.get(&LogEventKind::Dns).copied().unwrap_or(0),
        http_events = counts.get(&LogEventKind::Http).copied().unwrap_or(0),
        "Log collector stopped"
    );
    Ok(())
}
