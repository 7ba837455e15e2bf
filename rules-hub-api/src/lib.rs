//! Rules Hub API Server
//!
//! REST API for editing rule files, reading rule statuses and populating
//! the editor's device dropdowns.

pub mod config;
pub mod error;
pub mod handlers;
pub mod state;

pub use config::{ApiConfig, StorageKind};
pub use error::ApiError;
pub use state::AppState;

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        // Rule files
        .route("/api/files/:file/rules", get(handlers::list_rules).post(handlers::create_rule))
        .route(
            "/api/files/:file/rules/:idx",
            put(handlers::update_rule).delete(handlers::delete_rule),
        )
        // Rule runtime
        .route("/api/rules/status", get(handlers::list_statuses))
        .route("/api/rules/:id/arming", post(handlers::set_arming))
        .route("/api/rules/:id/acknowledgement", post(handlers::set_acknowledgement))
        .route("/api/timeline", get(handlers::get_timeline))
        // Device catalog
        .route("/api/catalog/options", post(handlers::catalog_options))
        .route("/api/catalog/refresh", post(handlers::refresh_catalog))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
