//! HMPI HTTP Server Binary
//!
//! Main entry point for the HMPI REST API server. Loads configuration,
//! initializes the repository and the index calculator, sets up the HTTP
//! router, and starts serving requests.
//!
//! # Usage
//!
//! ```bash
//! # Mock scoring with the in-memory repository (default)
//! cargo run --bin hmpi-server
//!
//! # Remote scoring model
//! SCORING_MODE=remote SCORING_API_URL=http://model:5000/predict \
//!   cargo run --bin hmpi-server
//! ```
//!
//! # Environment Variables
//!
//! Settings come from `hmpi.toml` (working directory, `backend/`, or parent),
//! then these overrides:
//!
//! - `HOST`, `PORT`, `APP_ENV`: Server overrides
//! - `REPOSITORY_TYPE`: Repository backend (default: local)
//! - `SCORING_MODE`, `USE_MOCK`, `SCORING_API_URL`, `SCORING_TIMEOUT_MS`,
//!   `MOCK_LATENCY_MS`: Index calculator overrides
//! - `RUST_LOG`: Log filter (default: info)

use std::net::SocketAddr;

use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use hmpi_backend::config::AppConfig;
use hmpi_backend::db::RepositoryFactory;
use hmpi_backend::http::{create_router, set_error_details, AppState};
use hmpi_backend::scoring::IndexCalculator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();

    info!("Starting HMPI HTTP Server");

    let config = AppConfig::load()?;
    set_error_details(config.is_development());
    info!(
        environment = ?config.server.environment,
        scoring = ?config.scoring.mode,
        "Configuration loaded"
    );

    let repository = RepositoryFactory::from_config(&config)?;
    info!("Repository initialized successfully");

    // The scoring strategy is fixed for the lifetime of the process
    let calculator = IndexCalculator::from_config(&config.scoring)?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    let state = AppState::new(repository, calculator, config);
    let app = create_router(state);

    info!("Server listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
