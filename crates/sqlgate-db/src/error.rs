//! Error types for the storage layer.

use std::path::PathBuf;

/// Errors returned by [`crate::Store`] and the query helpers built on it.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// The directory that should contain the database file could not be created.
    #[error("failed to create database directory {}: {source}", .path.display())]
    Directory {
        /// The directory that was being created.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A corrupted database file could not be deleted.
    #[error("failed to remove corrupted database file {}: {source}", .path.display())]
    RemoveCorrupted {
        /// The database file path.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The database file is still unreadable after it was recreated.
    #[error("database file {} is corrupted and could not be recovered: {source}", .path.display())]
    Corrupted {
        /// The database file path.
        path: PathBuf,
        /// The error SQLite reported on the recreated file.
        source: rusqlite::Error,
    },

    /// The SQL text held a second statement after the first. Nothing was run.
    #[error("You can only execute one statement at a time.")]
    MultipleStatements,

    /// Any other SQLite failure. Displays the driver's message unchanged.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}
