use std::time::Duration;

use migration::{Migrator, MigratorTrait};
use server::{MemoryCounterStore, RateLimiter, RedisCounterStore};
use settings::Database;

mod settings;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let settings = settings::Settings::new()?;
    let mut tasks = tokio::task::JoinSet::new();

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "splitshare={level},server={level},engine={level}",
            level = settings.app.level
        ))
        .init();

    if let Some(server) = settings.server {
        tasks.spawn(async move {
            tracing::info!("Found server settings...");
            let db = match parse_database(&server.database).await {
                Ok(db) => db,
                Err(err) => {
                    tracing::error!("failed to initialize database: {err}");
                    return;
                }
            };

            let engine = engine::Engine::builder().database(db.clone()).build();

            let limiter = match build_limiter(&server).await {
                Ok(limiter) => limiter,
                Err(err) => {
                    tracing::error!("failed to initialize admission store: {err}");
                    return;
                }
            };

            let bind = server.bind.unwrap_or_else(|| "127.0.0.1".to_string());
            let addr = format!("{}:{}", bind, server.port);
            let listener = match tokio::net::TcpListener::bind(addr).await {
                Ok(listener) => listener,
                Err(err) => {
                    tracing::error!("failed to bind server listener: {err}");
                    return;
                }
            };
            if let Err(err) = server::run_with_listener(engine, db, limiter, listener).await {
                tracing::error!("server failed: {err}");
            }
        });
    }

    while tasks.join_next().await.is_some() {
        tasks.shutdown().await;
    }

    Ok(())
}

async fn parse_database(
    config: &settings::Database,
) -> Result<sea_orm::DatabaseConnection, Box<dyn std::error::Error + Send + Sync>> {
    let url = match config {
        Database::Memory => String::from("sqlite::memory:"),
        Database::Sqlite(path) => format!("sqlite:{}?mode=rwc", path),
    };

    let database = sea_orm::Database::connect(url).await?;
    Migrator::up(&database, None).await?;
    Ok(database)
}

async fn build_limiter(
    config: &settings::Server,
) -> Result<RateLimiter, Box<dyn std::error::Error + Send + Sync>> {
    let window = Duration::from_secs(config.rate_limit.window_seconds);
    let limiter = match &config.redis_url {
        Some(url) => {
            tracing::info!("admission counters backed by redis");
            RateLimiter::new(
                config.rate_limit.limit,
                window,
                Box::new(RedisCounterStore::connect(url).await?),
            )
        }
        None => RateLimiter::new(
            config.rate_limit.limit,
            window,
            Box::new(MemoryCounterStore::new()),
        ),
    };
    Ok(limiter)
}
