use std::sync::Arc;

use anyhow::Result;
use tokio::{net::TcpListener, signal};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use predictive_maintenance_service::{
    api,
    config::Config,
    db::{self, MemoryRepository, PgRepository, Repository},
    state::AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Env vars may be set externally, so a missing .env is fine
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    let repo: Arc<dyn Repository> = match &config.database_url {
        Some(url) => {
            let pool = db::create_pool(url, config.db_max_connections).await?;
            db::run_migrations(&pool).await?;
            info!("Database ready");
            Arc::new(PgRepository::new(pool))
        }
        None => {
            warn!("DATABASE_URL not set; using in-memory store");
            Arc::new(MemoryRepository::new())
        }
    };

    let state = AppState::new(repo, config.ingest_preset, config.sim_interval_secs);
    info!(preset = %config.ingest_preset, "Ingestion thresholds selected");

    if config.sim_autostart {
        state.simulator.start(None).await?;
    }

    let app = api::router(state.clone())
        .layer(api::cors_layer(&config.cors_allowed_origins)?)
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.simulator.stop().await;
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
