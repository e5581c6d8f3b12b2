//! SQLite storage layer for loginstore.
//!
//! This module provides the persistence layer using SQLite with:
//! - WAL mode for concurrent reads
//! - Transaction discipline for atomic writes
//! - Clone-on-write materialization of overlay rows
//! - `should_upload` / `is_deleted` change tracking for sync
//!
//! # Submodules
//!
//! - [`schema`] - Record-set DDL and the destructive upgrade policy
//! - [`sqlite`] - The [`LoginStore`] repository

pub mod schema;
pub mod sqlite;

pub use sqlite::LoginStore;
