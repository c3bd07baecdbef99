//! clinai-server library crate
//!
//! Exposes `build_app`, `AppState` and the pipeline modules for integration
//! tests. The server entrypoint is in `main.rs`, the bulk loader in
//! `bin/ingest.rs`.

pub mod ai;
pub mod config;
pub mod db;
mod error;
pub mod ingest;
mod middleware;
mod routes;
pub mod search;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::{Extension, Router, middleware as axum_mw, routing::get};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use ai::CompletionService;
use config::Config;
use db::RecordStore;
use middleware::ApiKeyAuth;
use search::SearchPipeline;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Process-wide resources shared by every request
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub llm: Arc<dyn CompletionService>,
    pub max_candidates: usize,
}

impl AppState {
    pub fn new(store: Arc<dyn RecordStore>, llm: Arc<dyn CompletionService>) -> Self {
        Self {
            store,
            llm,
            max_candidates: search::DEFAULT_MAX_CANDIDATES,
        }
    }

    pub fn with_max_candidates(mut self, max_candidates: usize) -> Self {
        self.max_candidates = max_candidates;
        self
    }

    pub(crate) fn search_pipeline(&self) -> SearchPipeline {
        SearchPipeline::new(self.store.clone(), self.llm.clone())
            .with_max_candidates(self.max_candidates)
    }
}

/// Build the full application router with all routes and middleware.
///
/// Extracted from `main()` so integration tests can construct the app
/// without binding to a TCP port.
pub fn build_app(state: AppState, config: &Config) -> Router {
    let auth = ApiKeyAuth::new(config.api_key.clone());
    let rate_limiter = middleware::create_rate_limiter(config.rate_limit_rps);

    // Protected routes (require auth)
    let protected_routes = routes::api_routes()
        .layer(axum_mw::from_fn(middleware::auth::auth_middleware))
        .layer(Extension(auth))
        .layer(axum_mw::from_fn(middleware::rate_limit_middleware))
        .layer(Extension(rate_limiter));

    // Install Prometheus metrics recorder.
    // A second install (integration tests build many apps) is ignored and
    // the fresh handle still renders.
    let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
    let prometheus_handle = recorder.handle();
    let _ = metrics::set_global_recorder(recorder);

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(routes::health::check))
        .route("/metrics", get(routes::metrics::get))
        .layer(Extension(prometheus_handle));

    let cors = if config.cors_origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(axum_mw::from_fn(middleware::audit_middleware))
        .layer(axum_mw::from_fn(middleware::request_id_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum_mw::from_fn(middleware::metrics_middleware))
}
