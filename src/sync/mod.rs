//! The contract exposed to a reconciliation engine.
//!
//! A sync engine sits outside this crate: it talks to the server, writes
//! the mirror, and consumes the overlay's `should_upload` and `is_deleted`
//! flags. [`SyncableStore`] declares the operations it needs from the
//! store. The implementations here are pass-throughs so the repository can
//! be embedded before any engine exists.
//!
//! Timestamps on this surface are milliseconds, the resolution the sync
//! protocol exchanges.

use tracing::debug;

use crate::error::Result;
use crate::storage::LoginStore;

/// Milliseconds since the epoch, as exchanged with the server.
pub type Timestamp = i64;

/// Store operations a reconciliation engine drives.
///
/// Only this collaborator may write to the mirror record set.
pub trait SyncableStore {
    /// Apply a server-side deletion of `guid`, recorded at `deleted_at`.
    /// Succeeds when the GUID is unknown.
    fn delete_by_guid(&mut self, guid: &str, deleted_at: Timestamp) -> Result<()>;

    /// Record that the server has accepted these records, returning the
    /// new sync checkpoint time.
    fn mark_as_synchronized(&mut self, guids: &[String], modified: Timestamp)
    -> Result<Timestamp>;

    /// Record that the server has accepted these deletions.
    fn mark_as_deleted(&mut self, guids: &[String]) -> Result<()>;

    /// Clean up sync metadata after the account is removed from the device.
    fn on_removed_account(&mut self) -> Result<()>;
}

// TODO: replace these pass-throughs with real reconciliation once the sync
// engine lands.
impl SyncableStore for LoginStore {
    fn delete_by_guid(&mut self, guid: &str, deleted_at: Timestamp) -> Result<()> {
        debug!(guid, deleted_at, "delete_by_guid is a pass-through");
        Ok(())
    }

    fn mark_as_synchronized(
        &mut self,
        guids: &[String],
        modified: Timestamp,
    ) -> Result<Timestamp> {
        debug!(count = guids.len(), "mark_as_synchronized is a pass-through");
        let _ = modified;
        Ok(0)
    }

    fn mark_as_deleted(&mut self, guids: &[String]) -> Result<()> {
        debug!(count = guids.len(), "mark_as_deleted is a pass-through");
        Ok(())
    }

    fn on_removed_account(&mut self) -> Result<()> {
        debug!("on_removed_account is a pass-through");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Credentials, Login, Site};

    #[test]
    fn test_sync_surface_leaves_store_untouched() {
        let mut store = LoginStore::open_memory().unwrap();
        let login = Login::new(
            Site::new("example.com"),
            Credentials::new(Some("bob"), "hunter2"),
        );
        store.add_login(&login).unwrap();

        store.delete_by_guid(&login.guid, 1000).unwrap();
        let checkpoint = store
            .mark_as_synchronized(&[login.guid.clone()], 1000)
            .unwrap();
        assert_eq!(checkpoint, 0);
        store.mark_as_deleted(&[login.guid.clone()]).unwrap();
        store.on_removed_account().unwrap();

        // Pass-throughs must not consume the pending upload.
        let found = store
            .get_logins_for_site(&Site::new("example.com"))
            .unwrap();
        assert_eq!(found.len(), 1);
    }
}
