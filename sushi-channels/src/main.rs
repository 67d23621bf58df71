//! SushiBot - Main entry point.

use anyhow::Result;
use sushi_channels::start_server;
use sushi_common::config::Config;
use sushi_common::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load_with_env()?;

    // Initialize logging
    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
        &config.observability.excluded_targets,
    );

    tracing::info!("SushiBot v{}", env!("CARGO_PKG_VERSION"));

    config.validate()?;

    // Start the HTTP server
    start_server(&config).await
}
