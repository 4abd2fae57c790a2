//! Execution of caller-supplied SQL and conversion of rows into JSON objects.

use crate::error::DbError;
use base64::prelude::{Engine as _, BASE64_STANDARD};
use rusqlite::types::ValueRef;
use rusqlite::{Batch, Connection, Row, Statement};
use serde_json::Value;

/// One result row: column name to value.
pub type RowMap = serde_json::Map<String, Value>;

/// Result of [`run_statement`].
#[derive(Debug, Clone, PartialEq)]
pub enum StatementOutcome {
    /// The statement was treated as a read; these are all of its rows.
    Rows(Vec<RowMap>),
    /// The statement was treated as a write and committed.
    Executed,
}

/// Decides whether `sql` is a read, by its leading keyword only.
///
/// Leading whitespace is skipped and the comparison ignores case. Nothing
/// else is parsed, so reads that do not start with `select` (`WITH ...
/// SELECT`, `VALUES (...)`, `PRAGMA table_info(...)`) are classified as
/// writes: they run, but their rows are discarded.
pub fn is_read_query(sql: &str) -> bool {
    sql.trim_start()
        .get(..6)
        .is_some_and(|keyword| keyword.eq_ignore_ascii_case("select"))
}

/// Runs caller-supplied SQL holding exactly one statement.
///
/// Reads (see [`is_read_query`]) return every row the statement yields.
/// Writes are executed with any rows discarded, and a transaction the
/// statement left open is committed. Text that is only whitespace or
/// comments counts as an empty write.
///
/// # Errors
///
/// Returns [`DbError::MultipleStatements`] without running anything if a
/// second statement follows the first. Otherwise returns the SQLite error
/// unchanged: syntax errors, constraint violations, missing tables, a
/// locked database and so on.
pub fn run_statement(conn: &Connection, sql: &str) -> Result<StatementOutcome, DbError> {
    let mut batch = Batch::new(conn, sql);
    let Some(mut stmt) = batch.next()? else {
        return Ok(StatementOutcome::Executed);
    };

    // The tail is only prepared here. A tail that fails to prepare is still
    // a second statement.
    if !matches!(batch.next(), Ok(None)) {
        return Err(DbError::MultipleStatements);
    }

    if is_read_query(sql) {
        return Ok(StatementOutcome::Rows(collect_rows(&mut stmt)?));
    }

    {
        let mut rows = stmt.query([])?;
        while rows.next()?.is_some() {}
    }
    drop(stmt);

    if !conn.is_autocommit() {
        conn.execute_batch("COMMIT")?;
    }
    Ok(StatementOutcome::Executed)
}

/// Prepares `sql` and collects every row it yields.
pub(crate) fn fetch_rows(conn: &Connection, sql: &str) -> rusqlite::Result<Vec<RowMap>> {
    let mut stmt = conn.prepare(sql)?;
    collect_rows(&mut stmt)
}

fn collect_rows(stmt: &mut Statement<'_>) -> rusqlite::Result<Vec<RowMap>> {
    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(String::from)
        .collect();

    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(row_to_map(row, &columns)?);
    }
    Ok(out)
}

fn row_to_map(row: &Row<'_>, columns: &[String]) -> rusqlite::Result<RowMap> {
    let mut map = RowMap::new();
    for (idx, name) in columns.iter().enumerate() {
        map.insert(name.clone(), value_to_json(row.get_ref(idx)?));
    }
    Ok(map)
}

/// Converts a SQLite value into JSON.
///
/// Non-finite reals become `null`, text is decoded lossily and blobs are
/// encoded as standard base64.
pub fn value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(BASE64_STANDARD.encode(bytes)),
    }
}
