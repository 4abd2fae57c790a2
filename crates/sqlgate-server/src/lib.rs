//! sqlgate server library logic.
//!
//! An axum router that runs caller-supplied SQL against the database owned
//! by a [`sqlgate_db::Store`] and reports what the catalog holds. There is
//! no authentication: anyone who can reach the listener can read, change or
//! drop anything in the database.

pub mod api;
pub mod config;

use api::ApiError;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Json, Router,
};
use serde_json::{json, Value};
use sqlgate_db::Store;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Source of per-request database connections.
    pub store: Store,
    /// Pass SQLite error messages through to clients.
    pub expose_db_errors: bool,
}

/// Maximum request body size (2 MiB).
const MAX_REQUEST_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Health check handler.
///
/// Opens and verifies a connection, so a corrupted file is recovered here
/// like on any other request.
async fn health(Extension(state): Extension<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    api::with_connection(state, |_conn| Ok::<(), sqlgate_db::DbError>(())).await?;

    Ok(Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    })))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/execute", post(api::execute_handler))
        .route("/tables", get(api::list_tables_handler))
        .route("/table/{name}", get(api::describe_table_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
