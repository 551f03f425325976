//! Database schema migrations for the context store.
//!
//! Migrations are versioned and applied automatically when opening the
//! database. The `schema_version` table tracks the current migration
//! version.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
///
/// Increment this when adding new migrations.
pub const CURRENT_VERSION: i32 = 3;

/// Apply all pending migrations to bring the database to the current
/// schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }
    if current_version < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
pub(crate) fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            log::warn!("failed to read schema_version: {e}");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Migration v1: baseline schema.
///
/// Creates the kv store, the context history log and the saved
/// locations table.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS kv (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS context_history (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            state       TEXT NOT NULL,
            source      TEXT NOT NULL,
            confidence  REAL NOT NULL,
            recorded_at TEXT NOT NULL,
            snapshot    TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS saved_locations (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            kind         TEXT NOT NULL,
            display_name TEXT,
            latitude     REAL NOT NULL,
            longitude    REAL NOT NULL,
            created_at   TEXT NOT NULL
        );

        -- Indexes for the common query patterns
        CREATE INDEX IF NOT EXISTS idx_history_recorded_at ON context_history(recorded_at);
        CREATE INDEX IF NOT EXISTS idx_history_state ON context_history(state);
        CREATE INDEX IF NOT EXISTS idx_history_state_recorded_at ON context_history(state, recorded_at);",
    )?;

    set_schema_version(&tx, 1)?;

    tx.commit()?;
    Ok(())
}

/// Migration v2: add the resolved place label to history rows.
///
/// The label also lives inside the snapshot JSON; the dedicated column
/// exists so summaries can GROUP BY it without parsing JSON.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch("ALTER TABLE context_history ADD COLUMN label TEXT NOT NULL DEFAULT '';")?;

    set_schema_version(&tx, 2)?;

    tx.commit()?;
    Ok(())
}

/// Migration v3: add the snapshot sequence number.
///
/// Pre-existing rows get sequence 0; ordering within them falls back
/// to the row id.
fn migrate_v3(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "ALTER TABLE context_history ADD COLUMN sequence INTEGER NOT NULL DEFAULT 0;",
    )?;

    set_schema_version(&tx, 3)?;

    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrate_from_scratch_reaches_current_version() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), CURRENT_VERSION);

        // All v2/v3 columns must exist on a fresh database.
        let stmt = conn
            .prepare("SELECT state, label, sequence, snapshot FROM context_history")
            .unwrap();
        drop(stmt);
    }

    #[test]
    fn migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), CURRENT_VERSION);
    }

    #[test]
    fn incremental_migration_from_v1() {
        let conn = Connection::open_in_memory().unwrap();

        // Simulate a database created before the label/sequence columns.
        conn.execute_batch(
            "CREATE TABLE schema_version (version INTEGER PRIMARY KEY);
            INSERT INTO schema_version (version) VALUES (1);
            CREATE TABLE kv (key TEXT PRIMARY KEY, value TEXT NOT NULL);
            CREATE TABLE context_history (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                state       TEXT NOT NULL,
                source      TEXT NOT NULL,
                confidence  REAL NOT NULL,
                recorded_at TEXT NOT NULL,
                snapshot    TEXT NOT NULL
            );
            CREATE TABLE saved_locations (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                kind         TEXT NOT NULL,
                display_name TEXT,
                latitude     REAL NOT NULL,
                longitude    REAL NOT NULL,
                created_at   TEXT NOT NULL
            );
            INSERT INTO context_history (state, source, confidence, recorded_at, snapshot)
            VALUES ('resting', 'startup', 0.5, '2024-01-01T00:00:00+00:00', '{}');",
        )
        .unwrap();

        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), CURRENT_VERSION);

        // Existing rows must read back with defaulted new columns.
        let (label, sequence): (String, i64) = conn
            .query_row(
                "SELECT label, sequence FROM context_history LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(label, "");
        assert_eq!(sequence, 0);
    }
}
