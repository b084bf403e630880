//! Merging of remotely fetched content batches into the local replica.
//!
//! One call ingests one batch for one group inside a single transaction
//! spanning the content, summary, notification and cursor tables. Replaying
//! a batch is a no-op: rows that already settled are never rewritten and
//! unread accounting only considers rows the pass actually inserted.

use crate::database::models::{
    ContentKind, ContentRecord, ContentStatus, NotificationType, SummaryKind,
};
use crate::database::repositories::{ContentRepository, SqliteRepositories, SyncCursorRepository};
use crate::database::{Database, StoreError};
use crate::node_api::RemoteContent;
use crate::notifications;
use crate::summary;
use anyhow::Result;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

/// Trx ids currently held by the in-memory view of the authoring layer.
/// Items the user is already looking at never count as unread.
#[derive(Clone, Default)]
pub struct ActiveView {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl ActiveView {
    pub fn insert(&self, trx_id: &str) {
        self.lock().insert(trx_id.to_string());
    }

    pub fn remove(&self, trx_id: &str) {
        self.lock().remove(trx_id);
    }

    pub fn snapshot(&self) -> HashSet<String> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// What one reconciliation pass did, reported after its transaction has
/// committed so the caller can emit events.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileOutcome {
    /// Trx ids inserted as fresh synced rows.
    pub added: Vec<String>,
    /// Trx ids of local optimistic rows confirmed by this batch.
    pub settled: Vec<String>,
    pub unread_added: i64,
    /// Highest timestamp observed in the batch.
    pub latest_timestamp: i64,
    pub notifications_recorded: usize,
}

#[derive(Clone)]
pub struct ContentReconciler {
    database: Database,
    local_pubkey: Option<String>,
}

impl ContentReconciler {
    pub fn new(database: Database, local_pubkey: Option<String>) -> Self {
        Self {
            database,
            local_pubkey,
        }
    }

    /// Ingests `batch` for `group_id`. Returns `None` without touching the
    /// store when the batch is empty; otherwise returns what changed.
    pub fn reconcile(
        &self,
        group_id: &str,
        kind: ContentKind,
        batch: &[RemoteContent],
        active: &HashSet<String>,
    ) -> Result<Option<ReconcileOutcome>> {
        if batch.is_empty() {
            return Ok(None);
        }
        let trx_ids: Vec<String> = batch.iter().map(|item| item.trx_id.clone()).collect();

        let outcome = self.database.with_transaction(|repos| {
            let cursor = repos
                .sync_cursors()
                .get(group_id)?
                .ok_or_else(|| StoreError::UnknownGroup(group_id.to_string()))?;
            let existing = repos.content().bulk_get_by_trx_ids(&trx_ids)?;

            let mut seen = HashSet::new();
            let mut to_insert: Vec<ContentRecord> = Vec::new();
            let mut to_settle: Vec<(i64, &RemoteContent)> = Vec::new();
            let mut settled = Vec::new();
            for (item, existing) in batch.iter().zip(existing) {
                // a remote batch is not guaranteed to be unique internally
                if !seen.insert(item.trx_id.clone()) {
                    continue;
                }
                match existing {
                    None => to_insert.push(item.to_record(group_id, kind, ContentStatus::Synced)),
                    Some(row) => match row.status {
                        ContentStatus::Pending | ContentStatus::Syncing => {
                            let Some(row_id) = row.id else {
                                continue;
                            };
                            to_settle.push((row_id, item));
                            settled.push(item.trx_id.clone());
                        }
                        // settled rows are never rewritten
                        ContentStatus::Synced | ContentStatus::Failed => {}
                    },
                }
            }

            let unread_added = if kind == ContentKind::Like {
                0
            } else {
                to_insert
                    .iter()
                    .filter(|record| {
                        record.timestamp > cursor.latest_read_timestamp
                            && !active.contains(&record.trx_id)
                            && record.publisher.as_deref() != self.local_pubkey.as_deref()
                    })
                    .count() as i64
            };

            repos.content().bulk_create(&to_insert)?;
            for (row_id, item) in &to_settle {
                repos.content().settle(*row_id, &item.publisher, item.time_stamp)?;
            }

            let observed = batch
                .iter()
                .map(|item| item.time_stamp)
                .max()
                .unwrap_or(cursor.latest_object_timestamp);
            repos.sync_cursors().advance(group_id, unread_added, observed)?;

            let notifications_recorded =
                self.apply_derived_state(&repos, group_id, kind, &to_insert)?;

            Ok(ReconcileOutcome {
                added: to_insert.iter().map(|record| record.trx_id.clone()).collect(),
                settled,
                unread_added,
                latest_timestamp: observed,
                notifications_recorded,
            })
        })?;

        tracing::debug!(
            group_id = %group_id,
            kind = %kind.as_str(),
            added = outcome.added.len(),
            settled = outcome.settled.len(),
            unread_added = outcome.unread_added,
            "reconciled content batch"
        );
        Ok(Some(outcome))
    }

    /// Counter resyncs and notification triggers for rows this pass
    /// inserted. Runs inside the pass transaction.
    fn apply_derived_state(
        &self,
        repos: &SqliteRepositories<'_>,
        group_id: &str,
        kind: ContentKind,
        inserted: &[ContentRecord],
    ) -> Result<usize> {
        let mut notifications_recorded = 0;
        match kind {
            ContentKind::Object => {
                // one resync per publisher no matter how many items arrived
                let mut resynced = HashSet::new();
                for record in inserted {
                    let Some(publisher) = record.publisher.clone() else {
                        continue;
                    };
                    if resynced.insert(publisher.clone()) {
                        summary::sync_count(
                            repos,
                            group_id,
                            &publisher,
                            SummaryKind::PublisherContent,
                        )?;
                    }
                }
            }
            ContentKind::Comment => {
                let mut resynced = HashSet::new();
                for record in inserted {
                    if let Some(target) = record.object_trx_id.clone() {
                        if resynced.insert(target.clone()) {
                            summary::sync_count(repos, group_id, &target, SummaryKind::ObjectComment)?;
                        }
                    }
                    notifications_recorded += self.notify_for_comment(repos, group_id, record)?;
                }
            }
            ContentKind::Like => {
                let mut resynced = HashSet::new();
                for record in inserted {
                    let Some(target) = record.object_trx_id.clone() else {
                        continue;
                    };
                    if resynced.insert(target.clone()) {
                        summary::sync_count(repos, group_id, &target, SummaryKind::ObjectUpVote)?;
                    }
                    notifications_recorded += self.notify_for_like(repos, group_id, record)?;
                }
            }
        }
        Ok(notifications_recorded)
    }

    /// A freshly arrived comment notifies at most once: as a reply when it
    /// answers one of our comments, otherwise as a comment on one of our
    /// objects.
    fn notify_for_comment(
        &self,
        repos: &SqliteRepositories<'_>,
        group_id: &str,
        record: &ContentRecord,
    ) -> Result<usize> {
        let Some(local) = self.local_pubkey.as_deref() else {
            return Ok(0);
        };
        if record.publisher.as_deref() == Some(local) {
            return Ok(0);
        }

        for parent_trx in [record.reply_trx_id.as_deref(), record.thread_trx_id.as_deref()]
            .into_iter()
            .flatten()
        {
            if let Some(parent) = repos.content().get_by_trx_id(parent_trx)? {
                if parent.publisher.as_deref() == Some(local) {
                    notifications::record_in(
                        repos,
                        group_id,
                        &record.trx_id,
                        NotificationType::CommentReply,
                    )?;
                    return Ok(1);
                }
                return Ok(0);
            }
        }

        if let Some(object_trx) = record.object_trx_id.as_deref() {
            if let Some(object) = repos.content().get_by_trx_id(object_trx)? {
                if object.publisher.as_deref() == Some(local) {
                    notifications::record_in(
                        repos,
                        group_id,
                        &record.trx_id,
                        NotificationType::CommentObject,
                    )?;
                    return Ok(1);
                }
            }
        }
        Ok(0)
    }

    fn notify_for_like(
        &self,
        repos: &SqliteRepositories<'_>,
        group_id: &str,
        record: &ContentRecord,
    ) -> Result<usize> {
        let Some(local) = self.local_pubkey.as_deref() else {
            return Ok(0);
        };
        if record.publisher.as_deref() == Some(local) {
            return Ok(0);
        }
        let Some(target_trx) = record.object_trx_id.as_deref() else {
            return Ok(0);
        };
        let Some(target) = repos.content().get_by_trx_id(target_trx)? else {
            return Ok(0);
        };
        if target.publisher.as_deref() != Some(local) {
            return Ok(0);
        }
        let kind = if target.kind == ContentKind::Comment {
            NotificationType::CommentLike
        } else {
            NotificationType::ObjectLike
        };
        notifications::record_in(repos, group_id, target_trx, kind)?;
        Ok(1)
    }
}
