//! clinai-server: clinical note assistant HTTP server binary entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clinai_server::AppState;
use clinai_server::ai::{ClaudeClient, CompletionService, Unconfigured};
use clinai_server::config::Config;
use clinai_server::db::{self, MemoryRecordStore, PgRecordStore, RecordStore};

#[tokio::main]
async fn main() {
    // A missing .env file is fine; the process environment still applies
    let dotenv = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    if let Ok(path) = dotenv {
        tracing::info!(path = %path.display(), "Loaded environment file");
    }

    // Load configuration
    let config = Config::from_env();

    // Record store
    let store: Arc<dyn RecordStore> = match config.database_url.as_deref() {
        Some(url) => {
            let pool = db::create_pool(url).expect("Failed to create database pool");
            let store = PgRecordStore::new(pool);
            let report = store.migrate().await.expect("Failed to migrate database");
            tracing::info!(
                normalized = report.normalized,
                skipped = report.skipped,
                "PostgreSQL record store ready"
            );
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, records are kept in memory only");
            Arc::new(MemoryRecordStore::new())
        }
    };

    // LLM completion service
    let llm: Arc<dyn CompletionService> = match config.anthropic_api_key.clone() {
        Some(key) => {
            let client = ClaudeClient::new(
                key,
                config.anthropic_model.clone(),
                Duration::from_secs(config.llm_timeout_secs),
            )
            .expect("Failed to build Claude client");
            tracing::info!(
                model = client.model(),
                "Anthropic API key configured, AI features enabled"
            );
            Arc::new(client)
        }
        None => {
            tracing::warn!(
                "ANTHROPIC_API_KEY not set, search runs on fallbacks and extraction yields defaults"
            );
            Arc::new(Unconfigured)
        }
    };

    // Log startup info
    if config.api_key.is_some() {
        tracing::info!("API key authentication enabled");
    } else {
        tracing::warn!("API key authentication disabled (no API_KEY env var)");
    }
    tracing::info!("Rate limiting: {} requests/second", config.rate_limit_rps);

    // Build application
    let state = AppState::new(store.clone(), llm).with_max_candidates(config.max_candidates);
    let app = clinai_server::build_app(state, &config);

    // Start server
    let addr: SocketAddr = config.bind_address.parse().expect("Invalid bind address");
    tracing::info!("Starting ClinAI server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    store.close();
    tracing::info!("Server shutdown complete");
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
