//! HOC Card Backend
//!
//! Serves `/api/submit` and `/api/blob-upload`. Configuration comes
//! from the environment (a `.env` file is honoured).

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hoc_card::{run_server, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hoc_card=info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();

    let config = ServerConfig::from_env();
    info!("Sending cards from {}", config.sender);

    run_server(config).await
}
