//! Login record types and row decoding.
//!
//! Site identity and the credential payload are plain value types with no
//! ties to any platform secret-store API; platform integration is an
//! adapter concern at the boundary. Persisted rows decode through one
//! shared mapping: [`LoginEntry::from_row`] covers the columns every query
//! selects, and [`Login::from_row`] layers the remaining timestamps on top.

use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The identity of a site a credential belongs to.
///
/// Lookups match on `host`; `realm` further qualifies HTTP-auth
/// credentials but does not participate in queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    /// Hostname the credential was saved for.
    pub host: String,

    /// Optional HTTP authentication realm.
    pub realm: Option<String>,
}

impl Site {
    /// Create a site identity for a bare hostname.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            realm: None,
        }
    }

    /// Set the HTTP realm.
    #[must_use]
    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }
}

/// The secret payload of a login.
///
/// `username` is genuinely optional: a saved HTTP-auth credential may have
/// none, and an absent username is distinct from an empty string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: String,
}

impl Credentials {
    pub fn new(username: Option<&str>, password: impl Into<String>) -> Self {
        Self {
            username: username.map(str::to_string),
            password: password.into(),
        }
    }
}

/// A saved credential as returned by site lookups.
///
/// This is the slice of a [`Login`] needed to fill a form: identity,
/// payload, form metadata, and recency. Creation and password-change
/// history are carried only by the full record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginEntry {
    /// Globally unique identifier, stable across the record's lifetime.
    pub guid: String,

    pub site: Site,

    pub credentials: Credentials,

    /// Form action URL the credential was submitted to.
    pub form_submit_url: Option<String>,

    /// Name of the username field in the login form.
    pub username_field: Option<String>,

    /// Name of the password field in the login form.
    pub password_field: Option<String>,

    /// Last use, microseconds since the epoch. Zero when never used.
    pub time_last_used: i64,
}

/// A full credential record, including its timestamp history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Login {
    pub guid: String,
    pub site: Site,
    pub credentials: Credentials,
    pub form_submit_url: Option<String>,
    pub username_field: Option<String>,
    pub password_field: Option<String>,

    /// Creation time, microseconds since the epoch.
    pub time_created: i64,

    /// Last use, microseconds since the epoch. Zero when never used.
    pub time_last_used: i64,

    /// Last password change, microseconds since the epoch.
    pub time_password_changed: i64,
}

impl Login {
    /// Create a new login with a freshly minted GUID.
    ///
    /// Timestamps are left at zero; the store stamps them when the record
    /// is added.
    pub fn new(site: Site, credentials: Credentials) -> Self {
        Self {
            guid: uuid::Uuid::new_v4().to_string(),
            site,
            credentials,
            form_submit_url: None,
            username_field: None,
            password_field: None,
            time_created: 0,
            time_last_used: 0,
            time_password_changed: 0,
        }
    }

    /// Set the form action URL.
    #[must_use]
    pub fn with_form_submit_url(mut self, url: impl Into<String>) -> Self {
        self.form_submit_url = Some(url.into());
        self
    }

    /// Set the login form's field names.
    #[must_use]
    pub fn with_form_fields(
        mut self,
        username_field: impl Into<String>,
        password_field: impl Into<String>,
    ) -> Self {
        self.username_field = Some(username_field.into());
        self.password_field = Some(password_field.into());
        self
    }

    /// The identity projection of this record.
    #[must_use]
    pub fn entry(&self) -> LoginEntry {
        LoginEntry {
            guid: self.guid.clone(),
            site: self.site.clone(),
            credentials: self.credentials.clone(),
            form_submit_url: self.form_submit_url.clone(),
            username_field: self.username_field.clone(),
            password_field: self.password_field.clone(),
            time_last_used: self.time_last_used,
        }
    }

    /// Decode a full record from a row selecting all shared columns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingField`] when a required column is NULL, or
    /// a database error when a column is absent or of the wrong type.
    pub fn from_row(row: &Row<'_>) -> Result<Self> {
        let entry = LoginEntry::from_row(row)?;
        let time_created = required(row, "time_created")?;
        let time_password_changed = required(row, "time_password_changed")?;
        Ok(Self {
            guid: entry.guid,
            site: entry.site,
            credentials: entry.credentials,
            form_submit_url: entry.form_submit_url,
            username_field: entry.username_field,
            password_field: entry.password_field,
            time_created,
            time_last_used: entry.time_last_used,
            time_password_changed,
        })
    }
}

impl LoginEntry {
    /// Decode the identity projection from a row.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingField`] when `guid`, `hostname`, or
    /// `password` is NULL, or a database error when a column is absent or
    /// of the wrong type.
    pub fn from_row(row: &Row<'_>) -> Result<Self> {
        let host: String = required(row, "hostname")?;
        let realm: Option<String> = row.get("http_realm")?;
        let username: Option<String> = row.get("username")?;
        let password: String = required(row, "password")?;

        Ok(Self {
            guid: required(row, "guid")?,
            site: Site { host, realm },
            credentials: Credentials { username, password },
            form_submit_url: row.get("form_submit_url")?,
            username_field: row.get("username_field")?,
            password_field: row.get("password_field")?,
            time_last_used: row
                .get::<_, Option<i64>>("time_last_used")?
                .unwrap_or_default(),
        })
    }
}

impl From<Login> for LoginEntry {
    fn from(login: Login) -> Self {
        login.entry()
    }
}

/// Read a column that the schema declares NOT NULL, failing the row's
/// decode (rather than the process) when it is NULL anyway.
fn required<T: rusqlite::types::FromSql>(row: &Row<'_>, column: &'static str) -> Result<T> {
    row.get::<_, Option<T>>(column)?
        .ok_or(Error::MissingField { column })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn scratch_table(conn: &Connection) {
        conn.execute_batch(
            "CREATE TABLE rows (
                guid TEXT, hostname TEXT, http_realm TEXT, form_submit_url TEXT,
                username_field TEXT, password_field TEXT, time_created INTEGER,
                time_last_used INTEGER, time_password_changed INTEGER,
                username TEXT, password TEXT
            )",
        )
        .unwrap();
    }

    #[test]
    fn test_new_login_mints_guid() {
        let a = Login::new(
            Site::new("example.com"),
            Credentials::new(Some("bob"), "hunter2"),
        );
        let b = Login::new(Site::new("example.com"), Credentials::new(None, "hunter2"));

        assert!(!a.guid.is_empty());
        assert_ne!(a.guid, b.guid);
        assert_eq!(a.time_created, 0);
    }

    #[test]
    fn test_entry_projection() {
        let login = Login::new(
            Site::new("example.com").with_realm("corp"),
            Credentials::new(Some("bob"), "hunter2"),
        )
        .with_form_submit_url("https://example.com/login")
        .with_form_fields("user", "pass");

        let entry = login.entry();
        assert_eq!(entry.guid, login.guid);
        assert_eq!(entry.site.realm.as_deref(), Some("corp"));
        assert_eq!(entry.username_field.as_deref(), Some("user"));
    }

    #[test]
    fn test_decode_full_row() {
        let conn = Connection::open_in_memory().unwrap();
        scratch_table(&conn);
        conn.execute(
            "INSERT INTO rows VALUES ('g1', 'example.com', NULL, NULL, NULL, NULL,
             100, NULL, 100, 'bob', 'hunter2')",
            [],
        )
        .unwrap();

        let login = conn
            .query_row_and_then("SELECT * FROM rows", [], |row| Login::from_row(row))
            .unwrap();

        assert_eq!(login.site.host, "example.com");
        assert_eq!(login.credentials.username.as_deref(), Some("bob"));
        assert_eq!(login.time_created, 100);
        // Never used: the nullable column decodes to zero.
        assert_eq!(login.time_last_used, 0);
    }

    #[test]
    fn test_null_password_fails_decode() {
        let conn = Connection::open_in_memory().unwrap();
        scratch_table(&conn);
        conn.execute(
            "INSERT INTO rows VALUES ('g1', 'example.com', NULL, NULL, NULL, NULL,
             100, NULL, 100, 'bob', NULL)",
            [],
        )
        .unwrap();

        let err = conn
            .query_row_and_then("SELECT * FROM rows", [], |row| Login::from_row(row))
            .unwrap_err();

        match err {
            Error::MissingField { column } => assert_eq!(column, "password"),
            other => panic!("expected MissingField, got {other:?}"),
        }
    }
}
