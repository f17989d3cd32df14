use anyhow::{Context, Result};
use axum::Router;
use sensor_hub::auth::Authenticator;
use sensor_hub::config::{AppConfig, read_env};
use sensor_hub::store::SensorStore;
use sensor_hub::{AppState, build_router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();
    let store = SensorStore::open(&config.db_path, config.default_threshold).with_context(|| {
        format!(
            "failed to open sensor database at {}",
            config.db_path.display()
        )
    })?;
    let auth = Authenticator::from_config(&config);
    let state = Arc::new(AppState {
        store,
        auth,
        config,
    });
    let app: Router = build_router(state);

    let host = read_env("SENSOR_HUB_HOST", "0.0.0.0");
    let port: u16 = std::env::var("SENSOR_HUB_PORT")
        .or_else(|_| std::env::var("PORT"))
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    tracing::info!("sensor-hub listening on http://{addr}");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("sensor-hub shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigint = signal(SignalKind::interrupt()).expect("listen SIGINT");
    let mut sigterm = signal(SignalKind::terminate()).expect("listen SIGTERM");
    tokio::select! {
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
    }
    tracing::info!("shutdown signal received");
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
