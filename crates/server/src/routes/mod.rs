pub mod health;
pub mod metrics;
mod patient;
mod search;

use axum::{
    Router,
    routing::{get, patch, post},
};

use crate::AppState;

/// Build the API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/api/search", post(search::search))
        .route("/api/patients", get(patient::list))
        .route(
            "/api/patient/{id}",
            get(patient::read).delete(patient::delete),
        )
        .route("/patient/{id}/details", get(patient::details))
        .route("/patient/{id}/{field}", patch(patient::update_field))
        .route("/save_record", post(patient::save_record))
}
