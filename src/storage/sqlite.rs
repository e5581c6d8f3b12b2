//! SQLite-backed login repository.
//!
//! All reads merge the local overlay with the mirror: non-deleted overlay
//! rows first, then mirror rows that are neither flagged overridden nor
//! shadowed by an overlay row with the same GUID. All writes go to the
//! overlay only, cloning the mirror row on first mutation; the mirror
//! belongs to the sync engine.
//!
//! Every mutating operation runs through [`LoginStore::mutate`], which
//! wraps the whole statement sequence in an IMMEDIATE transaction. The
//! materialize-then-mutate and tombstone-then-clone sequences are therefore
//! atomic: they commit together or not at all.

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::{debug, error};

use crate::error::{Error, Result};
use crate::model::{Login, LoginEntry, Site};
use crate::storage::schema;

/// Columns selected by site lookups, decodable by [`LoginEntry::from_row`].
const ENTRY_PROJECTION: &str = "guid, username, password, hostname, http_realm, \
     form_submit_url, username_field, password_field, time_last_used";

/// Columns selected by by-GUID lookups, decodable by [`Login::from_row`].
const USAGE_PROJECTION: &str = "guid, username, password, hostname, http_realm, \
     form_submit_url, username_field, password_field, time_created, \
     time_last_used, time_password_changed";

/// SQLite-backed credential store.
#[derive(Debug)]
pub struct LoginStore {
    conn: Connection,
}

impl LoginStore {
    /// Open a database at the given path.
    ///
    /// Creates or destructively upgrades the schema as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema
    /// setup fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a database with an optional busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema
    /// setup fails.
    pub fn open_with_timeout(path: &Path, timeout_ms: Option<u64>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_millis(timeout_ms.unwrap_or(5000)))?;
        schema::apply_schema(&mut conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        schema::apply_schema(&mut conn)?;
        Ok(Self { conn })
    }

    /// Get a reference to the underlying connection (for read operations).
    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Execute a mutation with the transaction protocol.
    ///
    /// Begins an IMMEDIATE transaction (taking the write lock up front),
    /// runs the closure, and commits. On error the transaction rolls back,
    /// so multi-statement operations never leave partial state.
    fn mutate<F, R>(&mut self, op: &'static str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction<'_>) -> Result<R>,
    {
        debug!(op, "starting mutation");
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        match f(&tx) {
            Ok(result) => {
                tx.commit()?;
                Ok(result)
            }
            Err(e) => {
                error!(op, error = %e, "mutation failed, rolling back");
                Err(e)
            }
        }
    }

    /// Guarantee an overlay row exists for `guid` before a local mutation.
    ///
    /// The clone is a single conditional `INSERT OR IGNORE ... SELECT`, so
    /// a row that already exists (or two operations racing on the same
    /// GUID inside their own transactions) cannot produce duplicates. A
    /// fresh clone preserves the shared fields and starts clean:
    /// `local_modified` NULL, not deleted, nothing to upload.
    fn ensure_local_overlay(tx: &Transaction<'_>, guid: &str) -> Result<()> {
        tx.execute(
            "INSERT OR IGNORE INTO logins_local
                (guid, hostname, http_realm, form_submit_url, username_field,
                 password_field, time_created, time_last_used,
                 time_password_changed, username, password,
                 local_modified, is_deleted, should_upload)
             SELECT guid, hostname, http_realm, form_submit_url, username_field,
                    password_field, time_created, time_last_used,
                    time_password_changed, username, password,
                    NULL, 0, 0
             FROM logins_mirror WHERE guid = ?1",
            [guid],
        )?;

        let exists = tx
            .prepare("SELECT 1 FROM logins_local WHERE guid = ?1")?
            .exists([guid])?;

        if exists {
            Ok(())
        } else {
            Err(Error::NoSuchRecord {
                guid: guid.to_string(),
            })
        }
    }

    // =================
    // Lookup Operations
    // =================

    /// All saved logins for a site, most recently used first.
    ///
    /// Matches on host; the realm does not narrow the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row cannot be decoded.
    pub fn get_logins_for_site(&self, site: &Site) -> Result<Vec<LoginEntry>> {
        let sql = format!(
            "SELECT {ENTRY_PROJECTION} FROM logins_local
             WHERE is_deleted = 0 AND hostname = ?1
             UNION ALL
             SELECT {ENTRY_PROJECTION} FROM logins_mirror m
             WHERE is_overridden = 0 AND hostname = ?1
               AND NOT EXISTS (SELECT 1 FROM logins_local l WHERE l.guid = m.guid)
             ORDER BY time_last_used DESC"
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_and_then([&site.host], |row| LoginEntry::from_row(row))?;
        rows.collect()
    }

    /// Saved logins for a site, narrowed by username.
    ///
    /// `username` is really either a string or absent; an absent username
    /// matches overlay rows whose username is NULL. The mirror arm always
    /// compares `username = ?` — with an absent username that comparison
    /// binds SQL NULL and matches no row at all. The two record sets
    /// intentionally answer the absent case differently; both paths are
    /// pinned by tests until the behavior is unified upstream.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row cannot be decoded.
    pub fn get_logins_for_site_and_username(
        &self,
        site: &Site,
        username: Option<&str>,
    ) -> Result<Vec<LoginEntry>> {
        let local_match = if username.is_some() {
            "username = ?2"
        } else {
            "username IS NULL"
        };

        let sql = format!(
            "SELECT {ENTRY_PROJECTION} FROM logins_local
             WHERE is_deleted = 0 AND hostname = ?1 AND {local_match}
             UNION ALL
             SELECT {ENTRY_PROJECTION} FROM logins_mirror m
             WHERE is_overridden = 0 AND hostname = ?1 AND username = ?2
               AND NOT EXISTS (SELECT 1 FROM logins_local l WHERE l.guid = m.guid)
             ORDER BY time_last_used DESC"
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_and_then(rusqlite::params![site.host, username], |row| {
            LoginEntry::from_row(row)
        })?;
        rows.collect()
    }

    /// The full record for a GUID, resolved across the merged view.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchRecord`] when the GUID is absent from the
    /// merge (including when it is tombstoned locally).
    pub fn get_login_usage(&self, guid: &str) -> Result<Login> {
        let sql = format!(
            "SELECT {USAGE_PROJECTION} FROM logins_local
             WHERE is_deleted = 0 AND guid = ?1
             UNION ALL
             SELECT {USAGE_PROJECTION} FROM logins_mirror m
             WHERE is_overridden = 0 AND guid = ?1
               AND NOT EXISTS (SELECT 1 FROM logins_local l WHERE l.guid = m.guid)
             LIMIT 1"
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query_and_then([guid], |row| Login::from_row(row))?;
        rows.next().unwrap_or_else(|| {
            Err(Error::NoSuchRecord {
                guid: guid.to_string(),
            })
        })
    }

    // ===================
    // Mutation Operations
    // ===================

    /// Save a new login to the local overlay.
    ///
    /// All three credential timestamps are stamped with the current time;
    /// the row is born dirty (`should_upload = 1`). A GUID already present
    /// in the overlay is left untouched (insert-or-ignore).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLogin`] when the hostname or password is
    /// empty, or an error if the insert fails.
    pub fn add_login(&mut self, login: &Login) -> Result<()> {
        if login.site.host.is_empty() {
            return Err(Error::InvalidLogin("hostname is required".to_string()));
        }
        if login.credentials.password.is_empty() {
            return Err(Error::InvalidLogin("password is required".to_string()));
        }

        let now_us = chrono::Utc::now().timestamp_micros();
        let now_ms = now_us / 1000;

        self.mutate("add_login", |tx| {
            tx.execute(
                "INSERT OR IGNORE INTO logins_local
                    (hostname, http_realm, form_submit_url, username_field,
                     password_field, time_created, time_last_used,
                     time_password_changed, username, password,
                     guid, local_modified, is_deleted, should_upload)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?6, ?7, ?8, ?9, ?10, 0, 1)",
                rusqlite::params![
                    login.site.host,
                    login.site.realm,
                    login.form_submit_url,
                    login.username_field,
                    login.password_field,
                    now_us,
                    login.credentials.username,
                    login.credentials.password,
                    login.guid,
                    now_ms,
                ],
            )?;
            Ok(())
        })
    }

    /// Record that a login was used to fill a form.
    ///
    /// Bumps `time_last_used` and `local_modified` only. Mere use is not
    /// enough to flip `should_upload`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchRecord`] when the GUID exists in neither
    /// record set, or an error if a statement fails.
    pub fn record_login_use(&mut self, guid: &str) -> Result<()> {
        let now_us = chrono::Utc::now().timestamp_micros();
        let now_ms = now_us / 1000;

        self.mutate("record_login_use", |tx| {
            Self::ensure_local_overlay(tx, guid)?;
            tx.execute(
                "UPDATE logins_local SET time_last_used = ?1, local_modified = ?2
                 WHERE guid = ?3 AND is_deleted = 0",
                rusqlite::params![now_us, now_ms, guid],
            )?;
            Ok(())
        })
    }

    /// Overwrite a login's mutable fields.
    ///
    /// `significant` is the caller's judgment of whether the remote must
    /// learn about this change; only then is `should_upload` set.
    /// `time_last_used` and `time_password_changed` are restamped either
    /// way.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchRecord`] when the GUID exists in neither
    /// record set, or an error if a statement fails.
    pub fn update_login(&mut self, guid: &str, new: &Login, significant: bool) -> Result<()> {
        let now_us = chrono::Utc::now().timestamp_micros();
        let now_ms = now_us / 1000;

        let upload_clause = if significant {
            ", should_upload = 1"
        } else {
            ""
        };
        let sql = format!(
            "UPDATE logins_local SET
                local_modified = ?1, http_realm = ?2, form_submit_url = ?3,
                username_field = ?4, password_field = ?5, time_last_used = ?6,
                time_password_changed = ?6, password = ?7, hostname = ?8,
                username = ?9{upload_clause}
             WHERE guid = ?10"
        );

        self.mutate("update_login", |tx| {
            Self::ensure_local_overlay(tx, guid)?;
            tx.execute(
                &sql,
                rusqlite::params![
                    now_ms,
                    new.site.realm,
                    new.form_submit_url,
                    new.username_field,
                    new.password_field,
                    now_us,
                    new.credentials.password,
                    new.site.host,
                    new.credentials.username,
                    guid,
                ],
            )?;
            Ok(())
        })
    }

    /// Delete one login.
    ///
    /// The row is tombstoned, not removed: sensitive fields are cleared
    /// and the row persists with `is_deleted` set until the sync engine
    /// propagates the deletion. A mirror-only GUID gets a fresh tombstone
    /// overlay row. Unknown GUIDs succeed as a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if a statement fails.
    pub fn delete_login(&mut self, guid: &str) -> Result<()> {
        let now_us = chrono::Utc::now().timestamp_micros();
        let now_ms = now_us / 1000;

        self.mutate("delete_login", |tx| {
            // Tombstone any overlay row in place.
            tx.execute(
                "UPDATE logins_local SET
                    local_modified = ?1, should_upload = 1, is_deleted = 1,
                    password = '', hostname = '', username = ''
                 WHERE guid = ?2",
                rusqlite::params![now_ms, guid],
            )?;

            // Cover the mirror-only case with a tombstone clone. OR IGNORE
            // makes this a no-op when the overlay row already exists.
            tx.execute(
                "INSERT OR IGNORE INTO logins_local
                    (guid, local_modified, is_deleted, should_upload, hostname,
                     time_created, time_password_changed, password, username)
                 SELECT guid, ?1, 1, 1, '', time_created, ?2, '', ''
                 FROM logins_mirror WHERE guid = ?3",
                rusqlite::params![now_ms, now_us, guid],
            )?;
            Ok(())
        })
    }

    /// Delete every login.
    ///
    /// Tombstones all non-deleted overlay rows and inserts tombstone
    /// clones for every mirror row not already shadowed by an overlay row.
    /// Both statements commit together.
    ///
    /// # Errors
    ///
    /// Returns an error if a statement fails.
    pub fn delete_all_logins(&mut self) -> Result<()> {
        let now_us = chrono::Utc::now().timestamp_micros();
        let now_ms = now_us / 1000;

        self.mutate("delete_all_logins", |tx| {
            tx.execute(
                "UPDATE logins_local SET
                    local_modified = ?1, should_upload = 1, is_deleted = 1,
                    password = '', hostname = '', username = ''
                 WHERE is_deleted = 0",
                rusqlite::params![now_ms],
            )?;

            tx.execute(
                "INSERT OR IGNORE INTO logins_local
                    (guid, local_modified, is_deleted, should_upload, hostname,
                     time_created, time_password_changed, password, username)
                 SELECT guid, ?1, 1, 1, '', time_created, ?2, '', ''
                 FROM logins_mirror",
                rusqlite::params![now_ms, now_us],
            )?;
            Ok(())
        })
    }
}
