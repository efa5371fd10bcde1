use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use crumb_api::{app, state::{AppState, AuthConfig}};
use crumb_store::{app_config::Config, DbClient, PgReportRepository, PgStore, SupabaseStorage};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crumb_api=debug,crumb_order=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Crumb API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    let app_state = AppState::new(
        Arc::new(PgStore::new(db.pool.clone())),
        Arc::new(PgReportRepository::new(db.pool.clone())),
        Arc::new(SupabaseStorage::new(&config.storage)),
        &config.storage,
        AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
        },
    );

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
