//! # TaskHub API Server
//!
//! Serves the JSON API and the `/hub` realtime websocket.
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgresql://… JWT_SECRET=… cargo run -p taskhub-api
//! ```
//!
//! Migrations are applied on startup. On Ctrl-C the server stops accepting
//! connections, the realtime hub closes every session, and the pool drains.

use taskhub_api::{
    app::{build_router, AppState},
    config::Config,
};
use taskhub_shared::{
    db::{
        migrations::run_migrations,
        pool::{close_pool, create_pool, DatabaseConfig},
    },
    realtime::RealtimeHub,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskhub_api=debug,taskhub_shared=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("TaskHub API Server v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    let pool = create_pool(DatabaseConfig {
        url: config.database.url.clone(),
        max_connections: config.database.max_connections,
        ..Default::default()
    })
    .await?;

    run_migrations(&pool).await?;

    tokio::fs::create_dir_all(&config.uploads.dir).await?;

    let bind_address = config.bind_address();
    let state = AppState::new(pool.clone(), config);
    let hub = state.hub.clone();
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Server listening on http://{}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(hub))
        .await?;

    close_pool(pool).await;
    tracing::info!("Server stopped");

    Ok(())
}

/// Resolves on Ctrl-C after closing every realtime session, so open
/// websockets don't hold graceful shutdown open.
async fn shutdown_signal(hub: RealtimeHub) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }

    tracing::info!("Shutdown signal received, closing realtime sessions...");
    hub.shutdown().await;
}
