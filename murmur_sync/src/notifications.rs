//! Recording and reading of per-author notification events.

use crate::content::{pack_in, PackedContent};
use crate::database::models::{
    ContentKind, NotificationRecord, NotificationStatus, NotificationType,
};
use crate::database::repositories::{ContentRepository, NotificationRepository, SqliteRepositories};
use crate::database::{Database, StoreError};
use crate::events::{EventBus, SyncEvent};
use crate::summary::{self, SummaryKey};
use crate::utils::now_timestamp_nanos;
use anyhow::Result;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

/// Unread counters for the four notification types, used for UI badges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCountMap {
    pub object_like: i64,
    pub comment_like: i64,
    pub comment_object: i64,
    pub comment_reply: i64,
}

/// The dereferenced item a notification points at. Targets removed since
/// the notification was recorded resolve to no target at all; callers
/// render a fallback instead of failing.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "payload", rename_all = "camelCase")]
pub enum NotificationTarget {
    Object(PackedContent),
    Comment(PackedContent),
}

#[derive(Debug, Clone, Serialize)]
pub struct PackedNotification {
    pub notification: NotificationRecord,
    pub target: Option<NotificationTarget>,
}

/// Reads the four unread counters for a group, defaulting missing entries
/// to zero.
pub(crate) fn unread_count_map_in(
    repos: &SqliteRepositories<'_>,
    group_id: &str,
) -> Result<UnreadCountMap> {
    let keys: Vec<SummaryKey> = NotificationType::ALL
        .iter()
        .map(|kind| SummaryKey {
            group_id: group_id.to_string(),
            object_id: String::new(),
            kind: kind.unread_summary_kind(),
        })
        .collect();
    let counts = summary::get_many(repos, &keys)?;
    Ok(UnreadCountMap {
        object_like: counts[0],
        comment_like: counts[1],
        comment_object: counts[2],
        comment_reply: counts[3],
    })
}

/// Inserts an unread notification and refreshes its unread counter inside
/// the caller's transaction scope.
pub(crate) fn record_in(
    repos: &SqliteRepositories<'_>,
    group_id: &str,
    object_trx_id: &str,
    kind: NotificationType,
) -> Result<NotificationRecord> {
    let record = NotificationRecord {
        id: Uuid::new_v4().to_string(),
        group_id: group_id.to_string(),
        object_trx_id: object_trx_id.to_string(),
        kind,
        status: NotificationStatus::Unread,
        timestamp: now_timestamp_nanos(),
    };
    repos.notifications().create(&record)?;
    summary::sync_count(repos, group_id, "", kind.unread_summary_kind())?;
    Ok(record)
}

#[derive(Clone)]
pub struct NotificationService {
    database: Database,
    events: EventBus,
    optimistic_timeout: Duration,
}

impl NotificationService {
    pub fn new(database: Database, events: EventBus, optimistic_timeout: Duration) -> Self {
        Self {
            database,
            events,
            optimistic_timeout,
        }
    }

    pub fn record(
        &self,
        group_id: &str,
        object_trx_id: &str,
        kind: NotificationType,
    ) -> Result<NotificationRecord> {
        let record = self
            .database
            .with_transaction(|repos| record_in(&repos, group_id, object_trx_id, kind))?;
        self.emit_list_changed(group_id)?;
        Ok(record)
    }

    pub fn mark_read(&self, id: &str) -> Result<()> {
        let group_id = self.database.with_transaction(|repos| {
            let Some(record) = repos.notifications().get(id)? else {
                return Err(StoreError::UnknownNotification(id.to_string()).into());
            };
            repos.notifications().mark_read(id)?;
            summary::sync_count(
                &repos,
                &record.group_id,
                "",
                record.kind.unread_summary_kind(),
            )?;
            Ok(record.group_id)
        })?;
        self.emit_list_changed(&group_id)?;
        Ok(())
    }

    /// Notifications of the requested types, newest first, each packed with
    /// its target item.
    pub fn list(
        &self,
        group_id: &str,
        kinds: &[NotificationType],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PackedNotification>> {
        let now = now_timestamp_nanos();
        self.database.with_repositories(|repos| {
            let rows = repos.notifications().list(group_id, kinds, limit, offset)?;
            let mut packed = Vec::with_capacity(rows.len());
            for row in rows {
                let target = self.pack_target(&repos, &row, now)?;
                packed.push(PackedNotification {
                    notification: row,
                    target,
                });
            }
            Ok(packed)
        })
    }

    pub fn unread_count_map(&self, group_id: &str) -> Result<UnreadCountMap> {
        self.database
            .with_repositories(|repos| unread_count_map_in(&repos, group_id))
    }

    fn pack_target(
        &self,
        repos: &SqliteRepositories<'_>,
        notification: &NotificationRecord,
        now: i64,
    ) -> Result<Option<NotificationTarget>> {
        let Some(record) = repos.content().get_by_trx_id(&notification.object_trx_id)? else {
            return Ok(None);
        };
        let kind = record.kind;
        let mut packed = pack_in(repos, vec![record], self.optimistic_timeout, now)?;
        let Some(item) = packed.pop() else {
            return Ok(None);
        };
        Ok(Some(match kind {
            ContentKind::Comment => NotificationTarget::Comment(item),
            _ => NotificationTarget::Object(item),
        }))
    }

    fn emit_list_changed(&self, group_id: &str) -> Result<()> {
        let unread = self.unread_count_map(group_id)?;
        self.events.emit(SyncEvent::NotificationListChanged {
            group_id: group_id.to_string(),
            unread,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{ContentRecord, ContentStatus};
    use rusqlite::Connection;

    fn setup() -> (Database, NotificationService) {
        let conn = Connection::open_in_memory().expect("in-memory db");
        let database = Database::from_connection(conn, true);
        database.ensure_migrations().expect("migrations");
        let service = NotificationService::new(
            database.clone(),
            EventBus::default(),
            Duration::from_secs(20),
        );
        (database, service)
    }

    fn seed_comment(database: &Database, trx_id: &str) {
        database
            .with_repositories(|repos| {
                repos.content().create(&ContentRecord {
                    id: None,
                    trx_id: trx_id.into(),
                    group_id: "g".into(),
                    publisher: Some("them".into()),
                    kind: ContentKind::Comment,
                    timestamp: 100,
                    body: "a comment".into(),
                    object_trx_id: Some("obj-1".into()),
                    thread_trx_id: None,
                    reply_trx_id: None,
                    status: ContentStatus::Synced,
                })?;
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn unread_counts_track_records_and_reads() {
        let (_database, service) = setup();
        let first = service
            .record("g", "cmt-1", NotificationType::CommentReply)
            .unwrap();
        service
            .record("g", "cmt-2", NotificationType::CommentReply)
            .unwrap();

        let map = service.unread_count_map("g").unwrap();
        assert_eq!(map.comment_reply, 2);
        assert_eq!(map.object_like, 0);

        service.mark_read(&first.id).unwrap();
        let map = service.unread_count_map("g").unwrap();
        assert_eq!(map.comment_reply, 1);
    }

    #[test]
    fn mark_read_on_unknown_notification_is_an_error() {
        let (_database, service) = setup();
        let err = service.mark_read("missing").unwrap_err();
        assert!(err.downcast_ref::<StoreError>().is_some());
    }

    #[test]
    fn list_packs_comment_targets() {
        let (database, service) = setup();
        seed_comment(&database, "cmt-1");
        service
            .record("g", "cmt-1", NotificationType::CommentObject)
            .unwrap();

        let packed = service
            .list("g", &[NotificationType::CommentObject], 10, 0)
            .unwrap();
        assert_eq!(packed.len(), 1);
        match packed[0].target.as_ref().unwrap() {
            NotificationTarget::Comment(item) => assert_eq!(item.item.trx_id, "cmt-1"),
            other => panic!("unexpected target: {other:?}"),
        }
    }

    #[test]
    fn missing_targets_pack_to_none() {
        let (_database, service) = setup();
        service
            .record("g", "deleted-trx", NotificationType::ObjectLike)
            .unwrap();

        let packed = service.list("g", &[NotificationType::ObjectLike], 10, 0).unwrap();
        assert_eq!(packed.len(), 1);
        assert!(packed[0].target.is_none());
    }

    #[test]
    fn list_respects_type_filter_and_pagination() {
        let (_database, service) = setup();
        for trx in ["a", "b", "c"] {
            service
                .record("g", trx, NotificationType::CommentReply)
                .unwrap();
        }
        service.record("g", "d", NotificationType::ObjectLike).unwrap();

        let page = service
            .list("g", &[NotificationType::CommentReply], 2, 1)
            .unwrap();
        assert_eq!(page.len(), 2);
        assert!(page
            .iter()
            .all(|n| n.notification.kind == NotificationType::CommentReply));
    }

    #[test]
    fn events_fire_after_record_and_mark_read() {
        let (database, _) = setup();
        let events = EventBus::default();
        let service = NotificationService::new(database, events.clone(), Duration::from_secs(20));
        let mut rx = events.subscribe();

        let record = service
            .record("g", "cmt-1", NotificationType::CommentReply)
            .unwrap();
        service.mark_read(&record.id).unwrap();

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert!(matches!(first, SyncEvent::NotificationListChanged { .. }));
        match second {
            SyncEvent::NotificationListChanged { unread, .. } => {
                assert_eq!(unread.comment_reply, 0);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
