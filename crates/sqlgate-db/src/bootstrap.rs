//! Bootstrap schema and seed rows for a fresh database file.
//!
//! The `users` table exists so a brand-new gateway has something to query.
//! It is created only when missing and seeded only while empty, so running
//! the bootstrap repeatedly never touches rows a caller has written.

use rusqlite::Connection;

const CREATE_USERS: &str = "CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    email TEXT UNIQUE
)";

/// `(name, email)` pairs inserted into an empty `users` table, in order.
pub const SEED_USERS: &[(&str, &str)] = &[
    ("John Doe", "john@example.com"),
    ("Jane Smith", "jane@example.com"),
];

/// Creates the `users` table if absent and seeds it if it has no rows.
///
/// Runs in a single transaction. Returns `true` when seed rows were
/// inserted.
pub(crate) fn bootstrap(conn: &Connection) -> rusqlite::Result<bool> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(CREATE_USERS)?;

    let count: i64 = tx.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
    let seeded = count == 0;

    if seeded {
        let mut stmt = tx.prepare("INSERT INTO users (name, email) VALUES (?1, ?2)")?;
        for &(name, email) in SEED_USERS {
            stmt.execute([name, email])?;
        }
    }

    tx.commit()?;
    Ok(seeded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .expect("should count users")
    }

    #[test]
    fn bootstrap_on_fresh_db_seeds_two_users() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        let seeded = bootstrap(&conn).expect("bootstrap should succeed");
        assert!(seeded);
        assert_eq!(user_count(&conn), 2);

        let names: Vec<String> = conn
            .prepare("SELECT name FROM users ORDER BY id")
            .expect("should prepare")
            .query_map([], |row| row.get(0))
            .expect("should query")
            .map(|r| r.expect("should read name"))
            .collect();
        assert_eq!(names, vec!["John Doe", "Jane Smith"]);
    }

    #[test]
    fn bootstrap_idempotent() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        assert!(bootstrap(&conn).expect("first run should succeed"));
        assert!(!bootstrap(&conn).expect("second run should succeed"));
        assert_eq!(user_count(&conn), 2, "seed rows must not be duplicated");
    }

    #[test]
    fn bootstrap_leaves_populated_table_alone() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        conn.execute_batch(CREATE_USERS).expect("should create table");
        conn.execute(
            "INSERT INTO users (name, email) VALUES ('Ada', 'ada@example.com')",
            [],
        )
        .expect("should insert");

        let seeded = bootstrap(&conn).expect("bootstrap should succeed");
        assert!(!seeded);
        assert_eq!(user_count(&conn), 1);
    }

    #[test]
    fn bootstrap_reseeds_after_table_emptied() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        bootstrap(&conn).expect("bootstrap should succeed");
        conn.execute("DELETE FROM users", []).expect("should delete");

        assert!(bootstrap(&conn).expect("bootstrap should succeed"));
        assert_eq!(user_count(&conn), 2);
    }
}
