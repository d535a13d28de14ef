//! MediSafe Server
//!
//! Run with: cargo run
//!
//! Environment variables:
//! - MEDISAFE_HOST: Bind address (default: 0.0.0.0)
//! - MEDISAFE_PORT: Port number (default: 8080)
//! - MEDISAFE_THRESHOLDS: Threshold configuration JSON file (default: built-in catalogue)
//! - MEDISAFE_SNAPSHOT_PATH: Store snapshot file (default: none)
//! - MEDISAFE_SNAPSHOT_INTERVAL_SECS: Snapshot interval (default: 30)
//! - MEDISAFE_RETRY_ATTEMPTS: Store attempts per call (default: 4)
//! - MEDISAFE_WEBHOOK_URL: Alert webhook (default: log only)
//! - RUST_LOG: Log level (default: info)

use medisafe::api::run_server;
use medisafe::config::MonitorConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "medisafe=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = MonitorConfig::from_env()?;

    tracing::info!("MediSafe configuration:");
    tracing::info!("  Host: {}:{}", config.server.host, config.server.port);
    match &config.thresholds_path {
        Some(path) => tracing::info!("  Thresholds: {}", path.display()),
        None => tracing::info!("  Thresholds: built-in sensor catalogue"),
    }
    match &config.snapshot_path {
        Some(path) => tracing::info!(
            "  Snapshot: {} every {} seconds",
            path.display(),
            config.snapshot_interval.as_secs()
        ),
        None => tracing::info!("  Snapshot: DISABLED (in-memory only)"),
    }
    tracing::info!("  Store retry attempts: {}", config.retry.max_attempts);
    tracing::info!("  Notification targets: {}", config.notify_targets.len());

    println!(
        r#"
  __  __          _ _  _____        __
 |  \/  |        | (_)/ ____|      / _|
 | \  / | ___  __| |_| (___   __ _| |_ ___
 | |\/| |/ _ \/ _` | |\___ \ / _` |  _/ _ \
 | |  | |  __/ (_| | |____) | (_| | ||  __/
 |_|  |_|\___|\__,_|_|_____/ \__,_|_| \___|

 Shipment Sensor Monitoring
 Version: {}
"#,
        env!("CARGO_PKG_VERSION")
    );

    run_server(config).await
}
