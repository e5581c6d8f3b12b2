//! Error types for loginstore.
//!
//! Callers need to distinguish three failure shapes: the backing store
//! rejected a statement, a row could not be decoded into a typed record,
//! and an operation targeted a GUID present in neither record set.

use thiserror::Error;

/// Result type alias for loginstore operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in loginstore operations.
#[derive(Error, Debug)]
pub enum Error {
    /// An operation required a record that exists in neither the local
    /// overlay nor the mirror.
    #[error("No record with GUID {guid}")]
    NoSuchRecord { guid: String },

    /// A persisted row was missing a required field and could not be
    /// decoded into a typed record.
    #[error("Row is missing required column '{column}'")]
    MissingField { column: &'static str },

    /// The caller supplied a login that cannot be stored.
    #[error("Invalid login: {0}")]
    InvalidLogin(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl Error {
    /// True when the failure means "nothing to act on" rather than a
    /// storage or decoding fault.
    #[must_use]
    pub const fn is_no_such_record(&self) -> bool {
        matches!(self, Self::NoSuchRecord { .. })
    }
}
