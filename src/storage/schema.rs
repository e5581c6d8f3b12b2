//! Database schema for the two login record sets.
//!
//! The mirror table (`logins_mirror`) holds the last server-confirmed state
//! and is written only by the sync engine. The local table (`logins_local`)
//! is the device's overlay of pending edits. Both share the credential
//! columns; each carries its own sync metadata.
//!
//! Schema evolution is deliberately destructive: any version mismatch drops
//! both tables and recreates them at the current version. Saved logins are
//! recoverable from the server on next sync, so drop-and-recreate trades
//! stored data for migration simplicity.

use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, warn};

use crate::error::Result;

/// Current schema version. Bumping this discards existing data on open.
pub const SCHEMA_VERSION: i32 = 1;

pub(crate) const TABLE_MIRROR: &str = "logins_mirror";
pub(crate) const TABLE_LOCAL: &str = "logins_local";

/// DDL for both record sets.
///
/// Shared credential timestamps are stored as INTEGER microseconds;
/// `server_modified` and `local_modified` are INTEGER milliseconds, the
/// resolution the sync protocol uses.
const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS logins_mirror (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    guid TEXT NOT NULL UNIQUE,
    hostname TEXT NOT NULL,
    http_realm TEXT,
    form_submit_url TEXT,
    username_field TEXT,
    password_field TEXT,
    time_created INTEGER NOT NULL,
    time_last_used INTEGER,
    time_password_changed INTEGER NOT NULL,
    username TEXT,
    password TEXT NOT NULL,
    server_modified INTEGER NOT NULL,
    is_overridden TINYINT NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS logins_local (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    guid TEXT NOT NULL UNIQUE,
    hostname TEXT NOT NULL,
    http_realm TEXT,
    form_submit_url TEXT,
    username_field TEXT,
    password_field TEXT,
    time_created INTEGER NOT NULL,
    time_last_used INTEGER,
    time_password_changed INTEGER NOT NULL,
    username TEXT,
    password TEXT NOT NULL,
    local_modified INTEGER,
    is_deleted TINYINT NOT NULL DEFAULT 0,
    should_upload TINYINT NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_logins_mirror_hostname ON logins_mirror(hostname);
CREATE INDEX IF NOT EXISTS idx_logins_local_hostname ON logins_local(hostname);
";

const VERSION_TABLE_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL,
    applied_at INTEGER NOT NULL
);
";

/// Check whether both login tables exist.
///
/// # Errors
///
/// Returns an error if the catalog query fails.
pub fn tables_exist(conn: &Connection) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN (?1, ?2)",
        rusqlite::params![TABLE_MIRROR, TABLE_LOCAL],
        |row| row.get(0),
    )?;
    Ok(count == 2)
}

/// Create both tables and record `version` as applied.
///
/// # Errors
///
/// Returns an error if any DDL statement fails; no version is recorded in
/// that case.
pub fn create_tables(conn: &Connection, version: i32) -> Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute(
        "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![version, chrono::Utc::now().timestamp_millis()],
    )?;
    Ok(())
}

/// Drop both login tables.
///
/// # Errors
///
/// Returns an error if a DROP statement fails.
pub fn drop_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "DROP TABLE IF EXISTS logins_local;
         DROP TABLE IF EXISTS logins_mirror;",
    )?;
    Ok(())
}

/// Move the schema from `from` to `to`.
///
/// `from == to` is a no-op success. Any other `from` applies the
/// destructive policy: drop both tables and recreate at `to`.
///
/// # Errors
///
/// Returns an error if the drop or recreate fails; neither is partially
/// applied when run inside the caller's transaction.
pub fn upgrade(conn: &Connection, from: i32, to: i32) -> Result<()> {
    if from == to {
        debug!(from, to, "schema already current, skipping upgrade");
        return Ok(());
    }

    warn!(from, to, "schema version changed, dropping login tables");
    drop_tables(conn)?;
    create_tables(conn, to)
}

/// Bring the database to the current schema, creating or destructively
/// upgrading as needed. Run on every open.
///
/// All schema work happens in one transaction; a failure leaves the
/// database as it was.
///
/// # Errors
///
/// Returns an error if pragma setup or any schema statement fails.
pub fn apply_schema(conn: &mut Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;

    let tx = conn.transaction()?;
    tx.execute_batch(VERSION_TABLE_SQL)?;

    let stored: Option<i32> = tx
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .optional()?;

    let tables_missing = !tables_exist(&tx)?;
    match stored {
        Some(version) if version != SCHEMA_VERSION => upgrade(&tx, version, SCHEMA_VERSION)?,
        // No recorded version, or a recorded version whose tables are gone:
        // treat as a fresh database.
        _ if tables_missing => {
            debug!(version = SCHEMA_VERSION, "creating login tables");
            create_tables(&tx, SCHEMA_VERSION)?;
        }
        _ => debug!(version = SCHEMA_VERSION, "schema already current"),
    }

    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        apply_schema(&mut conn).expect("Failed to apply schema");
        conn
    }

    #[test]
    fn test_apply_schema_creates_tables() {
        let conn = open();
        assert!(tables_exist(&conn).unwrap());

        let version: i32 = conn
            .query_row("SELECT version FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_apply_schema_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        apply_schema(&mut conn).expect("First apply failed");

        conn.execute(
            "INSERT INTO logins_local (guid, hostname, time_created, time_password_changed, password)
             VALUES ('g1', 'example.com', 0, 0, 'secret')",
            [],
        )
        .unwrap();

        apply_schema(&mut conn).expect("Second apply failed");

        // Same version: data survives.
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM logins_local", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_version_mismatch_drops_data() {
        let mut conn = Connection::open_in_memory().unwrap();
        apply_schema(&mut conn).unwrap();

        conn.execute(
            "INSERT INTO logins_local (guid, hostname, time_created, time_password_changed, password)
             VALUES ('g1', 'example.com', 0, 0, 'secret')",
            [],
        )
        .unwrap();

        // Simulate a database written by an older release.
        conn.execute("UPDATE schema_version SET version = 0", [])
            .unwrap();

        apply_schema(&mut conn).unwrap();

        assert!(tables_exist(&conn).unwrap());
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM logins_local", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_upgrade_same_version_is_noop() {
        let conn = open();
        conn.execute(
            "INSERT INTO logins_local (guid, hostname, time_created, time_password_changed, password)
             VALUES ('g1', 'example.com', 0, 0, 'secret')",
            [],
        )
        .unwrap();

        upgrade(&conn, SCHEMA_VERSION, SCHEMA_VERSION).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM logins_local", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
