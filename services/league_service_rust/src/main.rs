use anyhow::{Context, Result};
use dotenv::dotenv;
use h2h_league_core::db::{create_pool, DbPoolConfig, PgStore, RetryConfig};
use h2h_league_core::{LeagueService, ScoringRules};
use league_service_rust::config::Config;
use league_service_rust::{serve, Handler};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    // stdout carries responses, logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    info!("Starting League Service...");

    let config = Config::from_env()?;
    let rules = ScoringRules::from_env();
    rules.log_config();

    let pool = create_pool(&config.database_url, &DbPoolConfig::from_env()).await?;
    let store = PgStore::new(pool).with_retry(RetryConfig::from_env());

    if config.run_migrations {
        store.migrate().await.context("Failed to run migrations")?;
    }

    info!(maintainers = config.result_maintainers.len(), "Result maintainers configured");
    let handler = Handler::new(LeagueService::new(store, rules))
        .with_result_maintainers(config.result_maintainers);
    info!("League Service ready, reading requests from stdin");

    let handled = serve(&handler, tokio::io::stdin(), tokio::io::stdout()).await?;
    info!(handled, "Input closed, shutting down");
    Ok(())
}
