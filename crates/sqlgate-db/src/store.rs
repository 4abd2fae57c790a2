//! Connection management for the gateway's database file.

use crate::bootstrap::bootstrap;
use crate::error::DbError;
use rusqlite::{Connection, ErrorCode, OpenFlags};
use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How many times a single call may delete and recreate a corrupted file.
pub const MAX_CORRUPTION_RECOVERIES: u32 = 1;

/// Files SQLite may keep next to the database. Removed along with a corrupted file.
const SIDECAR_SUFFIXES: &[&str] = &["-journal", "-wal", "-shm"];

/// The first 16 bytes of every SQLite database file.
const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";

/// Runtime tunables for SQLite connection behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbRuntimeSettings {
    /// How long a connection waits on a locked database, in milliseconds.
    pub busy_timeout_ms: u64,
}

impl Default for DbRuntimeSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
        }
    }
}

/// What [`Store::initialize`] did to bring the file up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InitReport {
    /// Seed rows were inserted into an empty `users` table.
    pub seeded: bool,
    /// A corrupted file was deleted and recreated.
    pub recovered: bool,
}

/// Hands out verified connections to a single SQLite file.
///
/// A `Store` holds no open handles; it is cheap to clone and share across
/// request handlers.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
    settings: DbRuntimeSettings,
}

/// Returns `true` if SQLite rejected the file as not being a database.
pub fn is_not_a_database(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::NotADatabase
    )
}

impl Store {
    /// Creates a store for the database file at `path`. Nothing is opened yet.
    pub fn new(path: impl Into<PathBuf>, settings: DbRuntimeSettings) -> Self {
        Self {
            path: path.into(),
            settings,
        }
    }

    /// The database file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The connection settings.
    pub fn settings(&self) -> DbRuntimeSettings {
        self.settings
    }

    /// Prepares the database file: creates its directory, the `users` table
    /// and the seed rows as needed.
    ///
    /// If SQLite reports the file is not a database, the file is **deleted**
    /// and bootstrapped again, at most [`MAX_CORRUPTION_RECOVERIES`] times.
    /// Its previous contents are lost.
    ///
    /// # Errors
    ///
    /// - [`DbError::Directory`] if the parent directory cannot be created.
    /// - [`DbError::RemoveCorrupted`] if a corrupted file cannot be deleted.
    /// - [`DbError::Corrupted`] if the recreated file is still unreadable.
    /// - [`DbError::Sqlite`] for any other SQLite failure.
    pub fn initialize(&self) -> Result<InitReport, DbError> {
        self.initialize_with_budget(MAX_CORRUPTION_RECOVERIES)
    }

    fn initialize_with_budget(&self, max_recoveries: u32) -> Result<InitReport, DbError> {
        self.ensure_parent_dir()?;

        let mut recoveries_left = max_recoveries;
        let mut recovered = false;

        loop {
            // The connection is dropped inside the closure, so the file is
            // closed before it might be removed below.
            match self.open().and_then(|conn| bootstrap(&conn)) {
                Ok(seeded) => {
                    tracing::info!(
                        path = %self.path.display(),
                        seeded,
                        recovered,
                        "database initialized"
                    );
                    return Ok(InitReport { seeded, recovered });
                }
                Err(e) if is_not_a_database(&e) => {
                    if recoveries_left == 0 {
                        tracing::error!(
                            path = %self.path.display(),
                            error = %e,
                            "database file still unreadable after recreation"
                        );
                        return Err(DbError::Corrupted {
                            path: self.path.clone(),
                            source: e,
                        });
                    }
                    recoveries_left -= 1;

                    tracing::warn!(
                        path = %self.path.display(),
                        error = %e,
                        "database file is corrupted, deleting and recreating it; its contents are lost"
                    );
                    self.discard_file()?;
                    recovered = true;
                }
                Err(e) => {
                    tracing::error!(
                        path = %self.path.display(),
                        error = %e,
                        "database initialization failed"
                    );
                    return Err(DbError::Sqlite(e));
                }
            }
        }
    }

    /// Opens a new connection and checks that the file is a readable database.
    ///
    /// A probe failing with "not a database" triggers [`Store::initialize`]
    /// once, followed by one more open and probe.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Corrupted`] if the file is unreadable even after
    /// reinitialization, any error from [`Store::initialize`], or
    /// [`DbError::Sqlite`] for other failures.
    pub fn connect(&self) -> Result<Connection, DbError> {
        self.connect_with_recovery(Self::initialize)
    }

    fn connect_with_recovery<R>(&self, recover: R) -> Result<Connection, DbError>
    where
        R: FnOnce(&Self) -> Result<InitReport, DbError>,
    {
        match self.open_verified() {
            Ok(conn) => Ok(conn),
            Err(e) if is_not_a_database(&e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "connection probe found a corrupted database, reinitializing"
                );
                recover(self)?;
                self.open_verified().map_err(|e| {
                    if is_not_a_database(&e) {
                        DbError::Corrupted {
                            path: self.path.clone(),
                            source: e,
                        }
                    } else {
                        DbError::Sqlite(e)
                    }
                })
            }
            Err(e) => Err(DbError::Sqlite(e)),
        }
    }

    fn open(&self) -> rusqlite::Result<Connection> {
        check_header(&self.path)?;

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

        let conn = Connection::open_with_flags(&self.path, flags)?;
        conn.busy_timeout(Duration::from_millis(self.settings.busy_timeout_ms))?;
        Ok(conn)
    }

    fn open_verified(&self) -> rusqlite::Result<Connection> {
        let conn = self.open()?;
        // Opening is lazy and a bare `SELECT 1` never touches the file, so
        // the probe reads the schema table to force a header check.
        conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| {
            row.get::<_, i64>(0)
        })?;
        Ok(conn)
    }

    fn ensure_parent_dir(&self) -> Result<(), DbError> {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => {
                std::fs::create_dir_all(dir).map_err(|source| DbError::Directory {
                    path: dir.to_path_buf(),
                    source,
                })
            }
            _ => Ok(()),
        }
    }

    fn discard_file(&self) -> Result<(), DbError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(DbError::RemoveCorrupted {
                    path: self.path.clone(),
                    source,
                })
            }
        }

        for suffix in SIDECAR_SUFFIXES {
            let sidecar = sidecar_path(&self.path, suffix);
            if let Err(e) = std::fs::remove_file(&sidecar) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(
                        path = %sidecar.display(),
                        error = %e,
                        "failed to remove database sidecar file"
                    );
                }
            }
        }

        Ok(())
    }
}

/// Rejects a non-empty file that does not start with [`SQLITE_HEADER`].
///
/// SQLite reads a file of a few stray bytes as an empty database, so the
/// probe alone would accept it. Missing, empty and unreadable files are
/// left for SQLite to handle.
fn check_header(path: &Path) -> rusqlite::Result<()> {
    let mut prefix = Vec::with_capacity(SQLITE_HEADER.len());
    let read = std::fs::File::open(path)
        .and_then(|file| file.take(SQLITE_HEADER.len() as u64).read_to_end(&mut prefix));
    if read.is_err() || prefix.is_empty() || prefix == SQLITE_HEADER {
        return Ok(());
    }

    Err(rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_NOTADB),
        Some("file is not a database".to_string()),
    ))
}

fn sidecar_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let store = Store::new(
            dir.path().join("nested").join("database.db"),
            DbRuntimeSettings::default(),
        );
        (dir, store)
    }

    #[test]
    fn initialize_creates_missing_directory() {
        let (_dir, store) = temp_store();
        assert!(!store.path().parent().unwrap().exists());

        let report = store.initialize().expect("initialize should succeed");
        assert_eq!(
            report,
            InitReport {
                seeded: true,
                recovered: false
            }
        );
        assert!(store.path().exists());
    }

    #[test]
    fn initialize_twice_does_not_reseed() {
        let (_dir, store) = temp_store();
        store.initialize().expect("first initialize should succeed");
        let second = store.initialize().expect("second initialize should succeed");
        assert!(!second.seeded);

        let conn = store.connect().expect("should connect");
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .expect("should count users");
        assert_eq!(count, 2);
    }

    #[test]
    fn connect_applies_busy_timeout() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let store = Store::new(
            dir.path().join("database.db"),
            DbRuntimeSettings {
                busy_timeout_ms: 1_250,
            },
        );
        store.initialize().expect("initialize should succeed");

        let conn = store.connect().expect("should connect");
        let busy_timeout: i64 = conn
            .query_row("PRAGMA busy_timeout;", [], |row| row.get(0))
            .expect("should query busy_timeout");
        assert_eq!(busy_timeout, 1_250);
    }

    #[test]
    fn initialize_recovers_corrupted_file() {
        let (_dir, store) = temp_store();
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), b"this is definitely not a sqlite file ".repeat(200))
            .unwrap();

        let report = store.initialize().expect("initialize should recover");
        assert_eq!(
            report,
            InitReport {
                seeded: true,
                recovered: true
            }
        );
    }

    fn write_garbage(store: &Store, bytes: &[u8]) {
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), bytes).unwrap();
    }

    #[test]
    fn initialize_without_budget_reports_corruption() {
        let (_dir, store) = temp_store();
        write_garbage(&store, &b"not a database ".repeat(200));

        let err = store.initialize_with_budget(0).unwrap_err();
        assert!(matches!(err, DbError::Corrupted { .. }), "got {err:?}");
        assert!(store.path().exists(), "file should not be discarded");
    }

    #[test]
    fn connect_reports_corruption_that_survives_recovery() {
        let (_dir, store) = temp_store();
        store.initialize().expect("initialize should succeed");
        write_garbage(&store, &b"not a database ".repeat(200));

        let mut recovery_ran = false;
        let err = store
            .connect_with_recovery(|_| {
                recovery_ran = true;
                Ok(InitReport::default())
            })
            .unwrap_err();
        assert!(recovery_ran);
        assert!(matches!(err, DbError::Corrupted { .. }), "got {err:?}");
    }

    #[test]
    fn tiny_garbage_file_is_recovered() {
        let (_dir, store) = temp_store();
        write_garbage(&store, b"x");

        let report = store.initialize().expect("initialize should recover");
        assert!(report.recovered);
        assert!(report.seeded);
    }

    #[test]
    fn connect_recovers_tiny_garbage_file() {
        let (_dir, store) = temp_store();
        store.initialize().expect("initialize should succeed");
        write_garbage(&store, b"x");

        let conn = store.connect().expect("connect should recover");
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .expect("users should exist again");
        assert_eq!(count, 2);
    }

    #[test]
    fn header_check_accepts_empty_and_missing_files() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = dir.path().join("database.db");
        assert!(check_header(&path).is_ok());

        std::fs::write(&path, b"").unwrap();
        assert!(check_header(&path).is_ok());

        std::fs::write(&path, b"SQLite format 2\0rest").unwrap();
        assert!(is_not_a_database(&check_header(&path).unwrap_err()));
    }

    #[test]
    fn not_a_database_classification() {
        let not_db = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_NOTADB),
            Some("file is not a database".to_string()),
        );
        assert!(is_not_a_database(&not_db));

        let syntax = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
            Some("near \"SELEC\": syntax error".to_string()),
        );
        assert!(!is_not_a_database(&syntax));
        assert!(!is_not_a_database(&rusqlite::Error::QueryReturnedNoRows));
    }

    #[test]
    fn sidecar_path_appends_suffix() {
        let path = Path::new("/tmp/data/database.db");
        assert_eq!(
            sidecar_path(path, "-wal"),
            PathBuf::from("/tmp/data/database.db-wal")
        );
    }
}
