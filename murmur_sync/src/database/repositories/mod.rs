mod content;
mod notifications;
mod profiles;
mod summary;
mod sync_cursors;

use super::models::{
    ContentQuery, ContentRecord, NotificationRecord, NotificationType, ProfileRecord,
    SummaryKind, SummaryRecord, SyncCursorRecord,
};
use anyhow::Result;
use rusqlite::Connection;

pub trait ContentRepository {
    fn create(&self, record: &ContentRecord) -> Result<i64>;
    fn bulk_create(&self, records: &[ContentRecord]) -> Result<()>;
    fn get_by_trx_id(&self, trx_id: &str) -> Result<Option<ContentRecord>>;
    /// Order-preserving lookup: the result has one entry per requested id.
    fn bulk_get_by_trx_ids(&self, trx_ids: &[String]) -> Result<Vec<Option<ContentRecord>>>;
    fn list(&self, query: &ContentQuery) -> Result<Vec<ContentRecord>>;
    /// Attaches the confirming publisher and timestamp to a local row and
    /// marks it synced.
    fn settle(&self, id: i64, publisher: &str, timestamp: i64) -> Result<()>;
    fn count_for_publisher(&self, group_id: &str, publisher: &str) -> Result<i64>;
    fn count_comments_for(&self, group_id: &str, object_trx_id: &str) -> Result<i64>;
    fn count_likes_for(&self, group_id: &str, object_trx_id: &str) -> Result<i64>;
}

pub trait ProfileRepository {
    fn add(&self, record: &ProfileRecord) -> Result<()>;
    /// Most recent submission for the pair; pass an empty group id for the
    /// cross-group default.
    fn latest(&self, group_id: &str, publisher: &str) -> Result<Option<ProfileRecord>>;
}

pub trait SummaryRepository {
    fn upsert(&self, record: &SummaryRecord) -> Result<()>;
    fn get(&self, group_id: &str, object_id: &str, kind: SummaryKind)
        -> Result<Option<SummaryRecord>>;
    fn get_count(&self, group_id: &str, object_id: &str, kind: SummaryKind) -> Result<i64>;
}

pub trait NotificationRepository {
    fn create(&self, record: &NotificationRecord) -> Result<()>;
    fn get(&self, id: &str) -> Result<Option<NotificationRecord>>;
    /// Returns whether a row was updated.
    fn mark_read(&self, id: &str) -> Result<bool>;
    fn list(
        &self,
        group_id: &str,
        kinds: &[NotificationType],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<NotificationRecord>>;
    fn count_unread(&self, group_id: &str, kind: NotificationType) -> Result<i64>;
}

pub trait SyncCursorRepository {
    fn ensure(&self, group_id: &str) -> Result<()>;
    fn get(&self, group_id: &str) -> Result<Option<SyncCursorRecord>>;
    fn list(&self) -> Result<Vec<SyncCursorRecord>>;
    /// Adds to the unread count and moves the observed high-water mark
    /// forward. Neither value ever moves backwards.
    fn advance(&self, group_id: &str, unread_delta: i64, observed_timestamp: i64) -> Result<()>;
    /// Snaps the read mark to the latest observed item and clears unread.
    fn mark_read(&self, group_id: &str) -> Result<()>;
}

pub struct SqliteRepositories<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRepositories<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn content(&self) -> impl ContentRepository + '_ {
        content::SqliteContentRepository { conn: self.conn }
    }

    pub fn profiles(&self) -> impl ProfileRepository + '_ {
        profiles::SqliteProfileRepository { conn: self.conn }
    }

    pub fn summary(&self) -> impl SummaryRepository + '_ {
        summary::SqliteSummaryRepository { conn: self.conn }
    }

    pub fn notifications(&self) -> impl NotificationRepository + '_ {
        notifications::SqliteNotificationRepository { conn: self.conn }
    }

    pub fn sync_cursors(&self) -> impl SyncCursorRepository + '_ {
        sync_cursors::SqliteSyncCursorRepository { conn: self.conn }
    }

    pub fn conn(&self) -> &'conn Connection {
        self.conn
    }
}
