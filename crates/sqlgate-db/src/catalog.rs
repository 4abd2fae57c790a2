//! Read-only lookups against SQLite's catalog (`sqlite_master`).

use crate::query::{fetch_rows, RowMap};
use rusqlite::Connection;
use serde::Serialize;

/// Maximum number of sample rows returned by [`describe_table`].
pub const SAMPLE_ROW_LIMIT: usize = 5;

/// A column as declared in the table definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Declared type, empty when the column was declared without one.
    #[serde(rename = "type")]
    pub decl_type: String,
}

/// Schema and a handful of rows of one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableDescription {
    /// Columns in definition order.
    pub schema: Vec<ColumnInfo>,
    /// Up to [`SAMPLE_ROW_LIMIT`] rows in the engine's scan order.
    pub samples: Vec<RowMap>,
}

/// Lists user tables in catalog order. SQLite's internal `sqlite_` tables are excluded.
pub fn list_tables(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        r"SELECT name FROM sqlite_master
          WHERE type = 'table' AND name NOT LIKE 'sqlite\_%' ESCAPE '\'",
    )?;
    let names = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(names)
}

/// Returns `true` if a table with exactly this name exists.
pub fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        [table],
        |row| row.get(0),
    )
}

/// Columns of `table` in definition order.
pub fn table_schema(conn: &Connection, table: &str) -> rusqlite::Result<Vec<ColumnInfo>> {
    let mut stmt = conn.prepare("SELECT name, type FROM pragma_table_info(?1) ORDER BY cid")?;
    let columns = stmt
        .query_map([table], |row| {
            Ok(ColumnInfo {
                name: row.get(0)?,
                decl_type: row.get(1)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(columns)
}

/// The first `limit` rows of `table`, unordered.
///
/// The table name cannot be bound as a parameter, so it is quoted with
/// [`quote_identifier`]. Callers should check [`table_exists`] first.
pub fn sample_rows(conn: &Connection, table: &str, limit: usize) -> rusqlite::Result<Vec<RowMap>> {
    let sql = format!("SELECT * FROM {} LIMIT {limit}", quote_identifier(table));
    fetch_rows(conn, &sql)
}

/// Quotes `name` as an SQL identifier, doubling embedded double quotes.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Schema plus up to [`SAMPLE_ROW_LIMIT`] rows, or `None` if the table does not exist.
pub fn describe_table(
    conn: &Connection,
    table: &str,
) -> rusqlite::Result<Option<TableDescription>> {
    if !table_exists(conn, table)? {
        return Ok(None);
    }

    Ok(Some(TableDescription {
        schema: table_schema(conn, table)?,
        samples: sample_rows(conn, table, SAMPLE_ROW_LIMIT)?,
    }))
}
