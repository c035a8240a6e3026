//! DocQL server
//!
//! Loads the discovered schema and serves relational-to-N1QL translation
//! over HTTP, or runs discovery over a document export.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use docql_server::{
    discover_export, logging, router, AppState, Cli, Command, Config, SchemaCatalog,
};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse_args();
    let config_path = cli.config_path();
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("loading configuration from {}", config_path.display()))?;

    logging::init(&config.logging);

    match cli.command {
        Some(Command::Discover { dump }) => discover(&config, &dump),
        Some(Command::Serve) | None => serve(config).await,
    }
}

fn discover(config: &Config, dump: &Path) -> anyhow::Result<()> {
    info!(
        sample_size = config.discovery.sample_size,
        partitioned_keyspaces = config.discovery.type_names().len(),
        "Discovery settings"
    );
    discover_export(dump, &config.discovery, &config.schema.path)
        .with_context(|| format!("discovering schema from {}", dump.display()))?;
    Ok(())
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let catalog = SchemaCatalog::load(&config.schema.path)
        .with_context(|| format!("loading schema from {}", config.schema.path))?;
    let state = Arc::new(AppState::new(catalog.into_schema(), config.compiler));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Starting DocQL server on {}", addr);

    axum::serve(listener, router(state)).await?;
    Ok(())
}
