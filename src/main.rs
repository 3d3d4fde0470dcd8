//! Query service - runs SQL statements posted over HTTP.

use std::sync::Arc;

use anyhow::Context;
use db_query_service::cli::Cli;
use db_query_service::config::Config;
use db_query_service::db::DriverConnector;
use db_query_service::logging;
use db_query_service::query::QueryExecutor;
use db_query_service::server;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // .env.local wins over .env; neither overrides the real environment
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::dotenv();

    let cli = Cli::parse_args();

    match &cli.log_file {
        Some(path) => logging::init_file_logging(path),
        None => logging::init_stderr_logging(),
    }

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let config = Config::load_from_file(&config_path)?;

    let config = cli.resolve(config)?;
    let addr = config.server.listen_addr()?;

    if config.defaults.host.is_none() && config.defaults.database.is_none() {
        warn!("No default connection configured; requests must name their own host and database");
    } else {
        info!(
            "Default connection: {} ({})",
            config.defaults.display_string(),
            config.defaults.backend().as_str()
        );
    }

    let executor = Arc::new(QueryExecutor::new(
        Arc::new(DriverConnector),
        config.defaults,
    ));

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    server::serve(listener, executor)
        .await
        .context("HTTP server failed")?;

    info!("Server stopped");
    Ok(())
}
