mod config;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use vidtide_api::token::TokenService;
use vidtide_api::{AppState, AppStateInner};
use vidtide_media::DiskMediaStore;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vidtide=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init storage
    let db = vidtide_db::Database::open(&config.db_path)?;
    let media = DiskMediaStore::new(config.media_dir.clone(), config.media_base_url.clone()).await?;

    let tokens = TokenService::new(
        config.access_secret.clone(),
        config.refresh_secret.clone(),
        config.access_ttl_secs,
        config.refresh_ttl_secs,
    );

    let state: AppState = Arc::new(AppStateInner {
        store: Arc::new(db),
        media: Arc::new(media),
        tokens,
        spool_dir: config.spool_dir.clone(),
    });

    let app = vidtide_api::router(state)
        .nest_service("/media", ServeDir::new(&config.media_dir))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.request_timeout_secs,
        )))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Vidtide server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
