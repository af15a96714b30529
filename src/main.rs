use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pgpulse::config::Config;
use pgpulse::services::{
    PgPoolManager, QueryMonitorService, TelemetryClient,
    telemetry_client::{HttpTransport, StdoutTransport, Transport},
};
use pgpulse::utils::ScheduledExecutor;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Load configuration first
    let config = Config::load()?;

    // Initialize logging
    let log_filter = tracing_subscriber::EnvFilter::new(&config.logging.level);

    let registry = tracing_subscriber::registry().with(log_filter);

    // Add file logging if configured
    let _guard;
    if let Some(log_file) = &config.logging.file {
        // Ensure log directory exists
        let log_path = std::path::Path::new(log_file);
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        // Extract directory and filename prefix from config
        let log_dir = log_path.parent().and_then(|p| p.to_str()).unwrap_or("logs");
        let file_name = log_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("pgpulse.log");
        // Remove .log extension if present (rolling appender adds date suffix)
        let file_prefix = file_name.strip_suffix(".log").unwrap_or(file_name);

        let file_appender = tracing_appender::rolling::daily(log_dir, file_prefix);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        _guard = guard;
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(non_blocking))
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
    tracing::info!("pgpulse starting up");
    tracing::info!(
        "Monitoring {}:{} (databases: {:?})",
        config.connection.host,
        config.connection.port,
        config.collection.databases
    );

    // Telemetry transport: stdout payloads by default, HTTP when configured
    let transport: Arc<dyn Transport> = match &config.telemetry.endpoint {
        Some(endpoint) => {
            tracing::info!("Publishing metrics to {}", endpoint);
            Arc::new(HttpTransport::new(endpoint))
        },
        None => Arc::new(StdoutTransport),
    };

    let telemetry = Arc::new(TelemetryClient::new(
        &config.telemetry.integration_name,
        env!("CARGO_PKG_VERSION"),
        &config.entity_name(),
        transport,
    ));

    let pool_manager = Arc::new(PgPoolManager::new(config.connection.clone()));

    let monitor = Arc::new(QueryMonitorService::new(
        Arc::clone(&pool_manager),
        Arc::clone(&telemetry),
        config.connection.clone(),
        config.collection.clone(),
    ));

    // Always run the first cycle immediately; the executor waits a full
    // interval before its first tick.
    if let Err(e) = monitor.run_cycle().await {
        tracing::error!("Initial monitoring cycle failed: {}", e);
    }

    if config.run_once {
        tracing::info!("Single-cycle mode, exiting");
        return Ok(());
    }

    if !config.collection.enabled {
        tracing::warn!("Collector disabled by configuration, exiting after initial cycle");
        return Ok(());
    }

    let interval = Duration::from_secs(config.collection.interval_secs);
    tracing::info!("Starting collector with interval: {}s", config.collection.interval_secs);
    let executor = ScheduledExecutor::new("query-monitor", interval);
    executor.start(monitor).await;

    Ok(())
}
