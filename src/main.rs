use query_executor::{config::Config, db::MySqlDriver, QueryExecutor};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        database = %config.database,
        pool_size = config.pool_size,
        "Loaded database configuration"
    );

    let executor = QueryExecutor::new(MySqlDriver::from_config(&config), config.pool_config());

    // Smoke test the connection before handing the pool to anything else
    match executor.ping().await {
        Ok(result) => tracing::info!(rows = %result.to_json(), "Connected"),
        Err(e) => tracing::error!(error = %e, "Connection not successful"),
    }

    executor.close().await;
    Ok(())
}
