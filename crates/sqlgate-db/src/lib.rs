//! Storage layer for the sqlgate HTTP gateway.
//!
//! Owns the single SQLite file the gateway exposes. A [`Store`] opens a
//! fresh, verified connection for every request, bootstraps the `users`
//! demo table on first run, and recovers from a corrupted file by deleting
//! and recreating it. The remaining modules provide the statement and
//! catalog helpers the HTTP handlers call.
//!
//! # Design decisions
//!
//! - **No pooling**: every caller gets its own connection and drops it when
//!   done. SQLite's file locking is the only serialization between
//!   concurrent requests.
//! - **Destructive recovery**: a file SQLite reports as "not a database" is
//!   removed, not repaired. Whatever it held is lost. Recovery is attempted
//!   at most [`MAX_CORRUPTION_RECOVERIES`] times per call.
//! - **One statement per call**: [`run_statement`] refuses SQL holding a
//!   second statement before running any of it, so a failed call never
//!   leaves earlier statements committed.
//! - **Rows as JSON objects**: result rows are converted into
//!   `serde_json` maps keyed by column name, ready to be sent as-is.

mod bootstrap;
mod catalog;
mod error;
mod query;
mod store;

pub use bootstrap::SEED_USERS;
pub use catalog::{
    describe_table, list_tables, quote_identifier, sample_rows, table_exists, table_schema,
    ColumnInfo, TableDescription, SAMPLE_ROW_LIMIT,
};
pub use error::DbError;
pub use query::{is_read_query, run_statement, value_to_json, RowMap, StatementOutcome};
pub use store::{
    is_not_a_database, DbRuntimeSettings, InitReport, Store, MAX_CORRUPTION_RECOVERIES,
};
