//! The polling loop that drives reconciliation.
//!
//! Each tick walks the registered groups and runs one reconciliation pass
//! per group. Passes for the same group never overlap: a pass still in
//! flight suppresses the next tick's attempt for that group. The stop flag
//! is only checked between ticks, so an in-flight pass always completes
//! rather than abandoning its transaction midway.

use crate::config::SyncConfig;
use crate::database::models::ContentKind;
use crate::database::repositories::SyncCursorRepository;
use crate::database::{Database, StoreError};
use crate::events::{EventBus, SyncEvent};
use crate::node_api::{NodeApi, RemoteContent};
use crate::notifications;
use crate::reconcile::{ActiveView, ContentReconciler, ReconcileOutcome};
use anyhow::Result;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Clone)]
pub struct SyncPoller<C> {
    database: Database,
    reconciler: ContentReconciler,
    client: C,
    events: EventBus,
    config: SyncConfig,
    active: ActiveView,
    stop: Arc<AtomicBool>,
    in_flight: Arc<Mutex<HashSet<String>>>,
    consecutive_failures: Arc<AtomicU32>,
}

impl<C> SyncPoller<C>
where
    C: NodeApi + Clone + Send + Sync + 'static,
{
    pub fn new(
        database: Database,
        reconciler: ContentReconciler,
        client: C,
        events: EventBus,
        config: SyncConfig,
        active: ActiveView,
    ) -> Self {
        Self {
            database,
            reconciler,
            client,
            events,
            config,
            active,
            stop: Arc::new(AtomicBool::new(false)),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            consecutive_failures: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Cooperative stop flag. Setting it ends the loop at the next tick
    /// boundary.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub async fn run(&self) {
        tracing::info!("sync poller started");
        loop {
            if self.stop.load(Ordering::SeqCst) {
                break;
            }
            self.tick().await;
            tokio::time::sleep(self.config.poll_interval).await;
        }
        tracing::info!("sync poller stopped");
    }

    /// Kicks off one pass per registered group. Groups still syncing from
    /// an earlier tick are skipped.
    pub async fn tick(&self) {
        let cursors = match self
            .database
            .with_repositories(|repos| repos.sync_cursors().list())
        {
            Ok(cursors) => cursors,
            Err(err) => {
                tracing::warn!(error = ?err, "failed to list sync cursors");
                return;
            }
        };

        let blacklist = match self.client.fetch_blacklist().await {
            Ok(publishers) => publishers.into_iter().collect::<HashSet<_>>(),
            Err(err) => {
                tracing::debug!(error = ?err, "blacklist unavailable, syncing without it");
                HashSet::new()
            }
        };

        for cursor in cursors {
            let group_id = cursor.group_id;
            if !self.lock_in_flight().insert(group_id.clone()) {
                tracing::debug!(group_id = %group_id, "sync already in flight, skipping");
                continue;
            }
            let poller = self.clone();
            let blacklist = blacklist.clone();
            tokio::spawn(async move {
                if let Err(err) = poller.sync_group(&group_id, &blacklist).await {
                    tracing::warn!(error = ?err, group_id = %group_id, "sync pass failed");
                }
                poller.lock_in_flight().remove(&group_id);
            });
        }
    }

    /// One full reconciliation pass for one group. Fetches with the cursor
    /// captured at the start of the pass; failed passes leave the cursor
    /// untouched and are retried on a later tick.
    pub async fn sync_group(&self, group_id: &str, blacklist: &HashSet<String>) -> Result<()> {
        let cursor = self
            .database
            .with_repositories(|repos| repos.sync_cursors().get(group_id))?
            .ok_or_else(|| StoreError::UnknownGroup(group_id.to_string()))?;
        let after = cursor.latest_object_timestamp;
        let limit = self.config.batch_limit;

        let objects = match self.client.fetch_objects(group_id, after, limit).await {
            Ok(batch) => batch,
            Err(err) => {
                self.record_fetch_failure();
                return Err(err.context("fetching objects"));
            }
        };
        let comments = match self.client.fetch_comments(group_id, after, limit).await {
            Ok(batch) => batch,
            Err(err) => {
                self.record_fetch_failure();
                return Err(err.context("fetching comments"));
            }
        };
        self.record_fetch_success();

        let keep = |item: &RemoteContent| !blacklist.contains(&item.publisher);
        let (likes, objects): (Vec<_>, Vec<_>) =
            objects.into_iter().filter(keep).partition(RemoteContent::is_like);
        let comments: Vec<_> = comments.into_iter().filter(keep).collect();

        let active = self.active.snapshot();
        for (kind, batch) in [
            (ContentKind::Object, objects),
            (ContentKind::Comment, comments),
            (ContentKind::Like, likes),
        ] {
            if let Some(outcome) = self.reconciler.reconcile(group_id, kind, &batch, &active)? {
                self.emit_outcome(group_id, kind, &outcome)?;
            }
        }
        Ok(())
    }

    fn emit_outcome(
        &self,
        group_id: &str,
        kind: ContentKind,
        outcome: &ReconcileOutcome,
    ) -> Result<()> {
        if kind != ContentKind::Like {
            for trx_id in &outcome.added {
                self.events.emit(SyncEvent::ObjectAdded {
                    group_id: group_id.to_string(),
                    trx_id: trx_id.clone(),
                });
            }
        }
        for trx_id in &outcome.settled {
            self.events.emit(SyncEvent::ObjectStatusChanged {
                trx_id: trx_id.clone(),
                status: crate::database::models::ContentStatus::Synced,
            });
        }
        if outcome.unread_added > 0 {
            let cursor = self
                .database
                .with_repositories(|repos| repos.sync_cursors().get(group_id))?
                .ok_or_else(|| StoreError::UnknownGroup(group_id.to_string()))?;
            self.events.emit(SyncEvent::UnreadCountChanged {
                group_id: group_id.to_string(),
                unread_count: cursor.unread_count,
            });
        }
        if outcome.notifications_recorded > 0 {
            let unread = self
                .database
                .with_repositories(|repos| notifications::unread_count_map_in(&repos, group_id))?;
            self.events.emit(SyncEvent::NotificationListChanged {
                group_id: group_id.to_string(),
                unread,
            });
        }
        Ok(())
    }

    fn record_fetch_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures == self.config.max_consecutive_failures {
            tracing::warn!(failures, "node unreachable, prompting reconnect");
            self.events.emit(SyncEvent::NodeUnreachable {
                consecutive_failures: failures,
            });
        }
    }

    fn record_fetch_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }

    fn lock_in_flight(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
