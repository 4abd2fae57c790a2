//! API handlers for the sqlgate server.

use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Extension, Json, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlgate_db::{
    describe_table, is_read_query, list_tables, run_statement, DbError, RowMap,
    StatementOutcome, TableDescription,
};
use std::sync::Arc;
use thiserror::Error;

/// Error message for a request without a usable `query` field.
pub const NO_QUERY_MESSAGE: &str = "No query provided";

/// Acknowledgement sent after a write statement.
pub const EXECUTED_MESSAGE: &str = "Query executed successfully";

/// Sent instead of SQLite's message when `api.expose_db_errors` is off.
const REDACTED_QUERY_ERROR: &str = "Query failed";

/// Sent instead of the storage error when `api.expose_db_errors` is off.
const REDACTED_STORAGE_ERROR: &str = "Database unavailable";

/// Longest SQL prefix written to the logs.
const SQL_PREVIEW_CHARS: usize = 160;

/// Response body for `POST /execute`.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ExecuteResponse {
    /// Rows of a read statement.
    Rows(Vec<RowMap>),
    /// Acknowledgement of a write statement.
    Message(MessageResponse),
}

/// A plain acknowledgement.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    /// Human-readable outcome.
    pub message: String,
}

/// Response body for `GET /tables`.
#[derive(Debug, Serialize, Deserialize)]
pub struct TablesResponse {
    /// User table names in catalog order.
    pub tables: Vec<String>,
}

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

/// Maps a storage error onto the HTTP contract.
///
/// Statement failures are the caller's problem (400). A database that
/// cannot be opened or recovered is the server's (500).
fn map_db_error(err: DbError, expose: bool) -> ApiError {
    match err {
        e @ (DbError::Sqlite(_) | DbError::MultipleStatements) => {
            tracing::warn!(error = %e, "database statement failed");
            ApiError::BadRequest(if expose {
                e.to_string()
            } else {
                REDACTED_QUERY_ERROR.to_string()
            })
        }
        other => {
            tracing::error!(error = %other, "database unavailable");
            ApiError::InternalServerError(if expose {
                other.to_string()
            } else {
                REDACTED_STORAGE_ERROR.to_string()
            })
        }
    }
}

/// Opens a verified connection on a blocking thread and runs `f` with it.
///
/// The connection is closed when `f` returns, whatever the outcome.
pub(crate) async fn with_connection<T, E, F>(state: Arc<AppState>, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    E: Into<DbError>,
    F: FnOnce(&Connection) -> Result<T, E> + Send + 'static,
{
    let expose = state.expose_db_errors;

    tokio::task::spawn_blocking(move || -> Result<T, DbError> {
        let conn = state.store.connect()?;
        f(&conn).map_err(Into::into)
    })
    .await
    .map_err(|e| ApiError::InternalServerError(format!("task join error: {}", e)))?
    .map_err(|e| map_db_error(e, expose))
}

/// Extracts a non-blank `query` string from a raw request body.
///
/// Bodies that are not JSON objects, or whose `query` is missing, not a
/// string or blank, yield `None`.
fn parse_query(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    let query = value.get("query")?.as_str()?;
    (!query.trim().is_empty()).then(|| query.to_string())
}

fn preview_sql(sql: &str) -> String {
    match sql.char_indices().nth(SQL_PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Handler for `POST /execute`.
///
/// The query must hold a single statement. Statements whose text starts with
/// `select` return their rows; anything else is executed and committed. See [`sqlgate_db::is_read_query`] for the
/// limits of that classification.
pub async fn execute_handler(
    Extension(state): Extension<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<ExecuteResponse>, ApiError> {
    let query =
        parse_query(&body).ok_or_else(|| ApiError::BadRequest(NO_QUERY_MESSAGE.to_string()))?;

    tracing::debug!(
        sql = %preview_sql(&query),
        read = is_read_query(&query),
        "executing query"
    );

    let outcome = with_connection(state, move |conn| run_statement(conn, &query)).await?;

    let response = match outcome {
        StatementOutcome::Rows(rows) => {
            tracing::debug!(row_count = rows.len(), "query returned rows");
            ExecuteResponse::Rows(rows)
        }
        StatementOutcome::Executed => ExecuteResponse::Message(MessageResponse {
            message: EXECUTED_MESSAGE.to_string(),
        }),
    };

    Ok(Json(response))
}

/// Handler for `GET /tables`.
pub async fn list_tables_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<TablesResponse>, ApiError> {
    let tables = with_connection(state, list_tables).await?;
    Ok(Json(TablesResponse { tables }))
}

/// Handler for `GET /table/{name}`.
pub async fn describe_table_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<TableDescription>, ApiError> {
    let lookup = name.clone();
    let description = with_connection(state, move |conn| describe_table(conn, &lookup)).await?;

    description
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Table '{}' not found", name)))
}
