//! Maintenance of the derived counters cached in the summary table.
//!
//! Counters are always recomputed from their base table and then upserted,
//! never incremented against a previously read value. Replayed batches and
//! out-of-order ingestion therefore converge on the true count instead of
//! drifting.

use crate::database::models::{NotificationType, SummaryKind, SummaryRecord};
use crate::database::repositories::{
    ContentRepository, NotificationRepository, SqliteRepositories, SummaryRepository,
};
use anyhow::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryKey {
    pub group_id: String,
    pub object_id: String,
    pub kind: SummaryKind,
}

/// Recounts the metric identified by `(group_id, object_id, kind)` from its
/// base table and upserts the cached row. Returns the fresh count.
pub fn sync_count(
    repos: &SqliteRepositories<'_>,
    group_id: &str,
    object_id: &str,
    kind: SummaryKind,
) -> Result<i64> {
    let count = match kind {
        SummaryKind::PublisherContent => repos.content().count_for_publisher(group_id, object_id)?,
        SummaryKind::ObjectComment => repos.content().count_comments_for(group_id, object_id)?,
        SummaryKind::ObjectUpVote => repos.content().count_likes_for(group_id, object_id)?,
        SummaryKind::NotificationUnreadObjectLike => repos
            .notifications()
            .count_unread(group_id, NotificationType::ObjectLike)?,
        SummaryKind::NotificationUnreadCommentLike => repos
            .notifications()
            .count_unread(group_id, NotificationType::CommentLike)?,
        SummaryKind::NotificationUnreadCommentObject => repos
            .notifications()
            .count_unread(group_id, NotificationType::CommentObject)?,
        SummaryKind::NotificationUnreadCommentReply => repos
            .notifications()
            .count_unread(group_id, NotificationType::CommentReply)?,
    };
    repos.summary().upsert(&SummaryRecord {
        group_id: group_id.to_string(),
        object_id: object_id.to_string(),
        object_type: kind,
        count,
    })?;
    Ok(count)
}

/// Reads cached counts for `keys`, preserving order and defaulting missing
/// entries to zero.
pub fn get_many(repos: &SqliteRepositories<'_>, keys: &[SummaryKey]) -> Result<Vec<i64>> {
    let mut counts = Vec::with_capacity(keys.len());
    for key in keys {
        counts.push(
            repos
                .summary()
                .get_count(&key.group_id, &key.object_id, key.kind)?,
        );
    }
    Ok(counts)
}
