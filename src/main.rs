use std::sync::Arc;
use std::time::Duration;
use sqlx::sqlite::SqlitePoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chargeflow::{
    api,
    config::Settings,
    service::{EngineOptions, ServiceContext},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chargeflow=debug,tower_http=debug,axum=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::new().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config: {}. Using defaults.", e);
        Settings::default()
    });

    tracing::info!("Starting Chargeflow on {}:{}", settings.server.host, settings.server.port);

    let db_pool = SqlitePoolOptions::new()
        .max_connections(settings.database.max_connections)
        .connect(&settings.database.url)
        .await?;

    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await?;

    let options = EngineOptions::from_settings(&settings)?;
    let service_context = Arc::new(ServiceContext::new(db_pool, options));

    if settings.worker.enabled {
        let interval = Duration::from_secs(settings.worker.tick_interval_secs);
        service_context
            .settlement_worker(interval, settings.worker.batch_size)
            .spawn();
        tracing::info!("Settlement worker running every {:?}", interval);
    } else {
        tracing::info!("Settlement worker disabled; charges advance on poll only");
    }

    let app = api::create_app(service_context, Arc::new(settings.clone()));

    let listener = tokio::net::TcpListener::bind(
        format!("{}:{}", settings.server.host, settings.server.port)
    ).await?;

    tracing::info!("Server listening on http://{}:{}", settings.server.host, settings.server.port);

    axum::serve(listener, app).await?;

    Ok(())
}
