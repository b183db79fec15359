use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use token_cache::cli::{Cli, Commands};
use token_cache::config;
use token_cache::fetcher::HttpTokenFetcher;
use token_cache::manager::TokenCacheManager;
use token_cache::store::postgres::PgDocumentStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Cli::parse();
    let cfg = config::load()?;

    let documents = PgDocumentStore::connect(&cfg.database_url)
        .await
        .context("failed to connect to the token database")?;
    let fetcher = HttpTokenFetcher::new(
        cfg.endpoint.clone(),
        Duration::from_secs(cfg.http_timeout_secs),
    )
    .context("failed to build HTTP client")?;

    let mut manager_config = cfg.manager_config();
    if args.no_memoize {
        manager_config = manager_config.memoize(false);
    }
    tracing::debug!(config = ?manager_config, "token cache configured");

    let manager = TokenCacheManager::new(manager_config, Arc::new(documents.clone()), Arc::new(fetcher));

    let result = run(&manager, args.command).await;

    documents.pool().close().await;
    result
}

async fn run(manager: &TokenCacheManager, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Get => {
            let token = manager.get_access_token().await?;
            println!("{}", token);
        }
        Commands::ForceFetch => {
            let response = manager.force_get_access_token_by_http().await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::CreateCollection => {
            manager.create_collection().await?;
            println!("collection '{}' ready", manager.store().collection());
        }
    }
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "token_cache=info".into()),
    );
    let json = std::env::var("TOKEN_CACHE_LOG_JSON").map(|v| v == "1").unwrap_or(false);

    // Logs go to stderr so stdout stays clean for the printed token.
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
