//! Registration and read-state of synced groups.

use crate::database::models::SyncCursorRecord;
use crate::database::repositories::SyncCursorRepository;
use crate::database::{Database, StoreError};
use crate::events::{EventBus, SyncEvent};
use anyhow::Result;

#[derive(Clone)]
pub struct GroupService {
    database: Database,
    events: EventBus,
}

impl GroupService {
    pub fn new(database: Database, events: EventBus) -> Self {
        Self { database, events }
    }

    /// Registers a group for syncing. Idempotent.
    pub fn register(&self, group_id: &str) -> Result<()> {
        self.database
            .with_repositories(|repos| repos.sync_cursors().ensure(group_id))?;
        tracing::info!(group_id = %group_id, "group registered for sync");
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<SyncCursorRecord>> {
        self.database
            .with_repositories(|repos| repos.sync_cursors().list())
    }

    pub fn get(&self, group_id: &str) -> Result<Option<SyncCursorRecord>> {
        self.database
            .with_repositories(|repos| repos.sync_cursors().get(group_id))
    }

    /// Snaps the read mark to the latest observed item and clears the
    /// unread count, the only operation allowed to reset it.
    pub fn mark_read(&self, group_id: &str) -> Result<SyncCursorRecord> {
        let cursor = self.database.with_transaction(|repos| {
            repos.sync_cursors().mark_read(group_id)?;
            repos
                .sync_cursors()
                .get(group_id)?
                .ok_or_else(|| StoreError::UnknownGroup(group_id.to_string()).into())
        })?;
        self.events.emit(SyncEvent::UnreadCountChanged {
            group_id: group_id.to_string(),
            unread_count: 0,
        });
        Ok(cursor)
    }
}
