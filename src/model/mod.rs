//! Data models for loginstore.
//!
//! This module contains the domain types:
//! - Site (the lookup key: host plus optional HTTP realm)
//! - Credentials (username/password payload)
//! - Login (full credential record)
//! - LoginEntry (the narrower view returned by site lookups)

pub mod login;

pub use login::{Credentials, Login, LoginEntry, Site};
