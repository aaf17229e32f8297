//! Database schema and migrations.
//!
//! The schema version lives in SQLite's `user_version` pragma. Each entry
//! of [`MIGRATIONS`] moves the database one version forward; opening a
//! database applies whatever it is missing.

use rusqlite::Connection;
use tracing::info;

use crate::error::Result;

/// Ordered migration scripts; version `n` is reached by applying the first `n`.
const MIGRATIONS: &[&str] = &[
    // 1: indicator records. Value fields and split dimensions are kept in
    // the attributes JSON object.
    r#"
    CREATE TABLE records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        collection TEXT NOT NULL,
        date INTEGER NOT NULL,
        location TEXT,
        period_type TEXT NOT NULL,
        source_id TEXT,
        is_date_total INTEGER NOT NULL DEFAULT 0,
        attributes TEXT NOT NULL DEFAULT '{}'
    );
    CREATE INDEX idx_records_collection_date
        ON records(collection, period_type, date);
    "#,
    // 2: per-location lookups and entities referenced by split values
    r#"
    CREATE INDEX idx_records_collection_location
        ON records(collection, location, date);
    CREATE TABLE reference_entities (
        id TEXT PRIMARY KEY,
        kind TEXT NOT NULL,
        name TEXT NOT NULL,
        attributes TEXT
    );
    "#,
];

/// Current schema version.
pub const SCHEMA_VERSION: i32 = MIGRATIONS.len() as i32;

/// Bring the database schema up to [`SCHEMA_VERSION`].
pub fn initialize(conn: &Connection) -> Result<()> {
    let current = schema_version(conn)?;

    for (index, script) in MIGRATIONS.iter().enumerate().skip(current.max(0) as usize) {
        let target = index as i32 + 1;
        conn.execute_batch(&format!(
            "BEGIN;\n{script}\nPRAGMA user_version = {target};\nCOMMIT;"
        ))?;
        info!("Migrated database schema to version {}", target);
    }

    Ok(())
}

fn schema_version(conn: &Connection) -> Result<i32> {
    Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables(conn: &Connection) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_initialize_fresh_database() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();

        let tables = tables(&conn);
        assert!(tables.contains(&"records".to_string()));
        assert!(tables.contains(&"reference_entities".to_string()));
        assert_eq!(schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_reinitialize_is_noop() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        initialize(&conn).unwrap();
        assert_eq!(schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_partial_database_is_migrated() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(&format!("{}\nPRAGMA user_version = 1;", MIGRATIONS[0]))
            .unwrap();
        assert!(!tables(&conn).contains(&"reference_entities".to_string()));

        initialize(&conn).unwrap();
        assert!(tables(&conn).contains(&"reference_entities".to_string()));
        assert_eq!(schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }
}
