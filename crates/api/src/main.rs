//! Alert Bridge - Main Entry Point

use alerting::BridgeConfig;
use api::{init_logging, run_server};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // First argument wins over ALERT_BRIDGE_CONFIG; neither means ./alert-bridge.toml if present
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("ALERT_BRIDGE_CONFIG").ok());
    let config = BridgeConfig::load(path.as_deref())?;

    init_logging(&config.log)?;

    info!("=== Alert Bridge v{} ===", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &path {
        info!("Loaded configuration from {}", path);
    }

    run_server(config).await
}
