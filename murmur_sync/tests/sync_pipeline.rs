use anyhow::Result;
use murmur_sync::config::SyncConfig;
use murmur_sync::database::models::ContentStatus;
use murmur_sync::database::repositories::{ContentRepository, SyncCursorRepository};
use murmur_sync::database::Database;
use murmur_sync::events::{EventBus, SyncEvent};
use murmur_sync::node_api::{NodeApi, RemoteBody, RemoteContent, RemoteProfile};
use murmur_sync::poller::SyncPoller;
use murmur_sync::reconcile::{ActiveView, ContentReconciler};
use rusqlite::Connection;
use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::timeout;

/// In-memory stand-in for the node process. Batches queue up per call and
/// drain in order; `failures_remaining` makes the next fetches fail.
#[derive(Clone, Default)]
struct StubNode {
    objects: Arc<Mutex<VecDeque<Vec<RemoteContent>>>>,
    comments: Arc<Mutex<VecDeque<Vec<RemoteContent>>>>,
    blacklist: Arc<Mutex<Vec<String>>>,
    failures_remaining: Arc<AtomicU32>,
}

impl StubNode {
    fn push_objects(&self, batch: Vec<RemoteContent>) {
        self.objects.lock().unwrap().push_back(batch);
    }

    fn push_comments(&self, batch: Vec<RemoteContent>) {
        self.comments.lock().unwrap().push_back(batch);
    }

    fn fail_next(&self, count: u32) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    fn take_failure(&self) -> bool {
        self.failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |value| {
                value.checked_sub(1)
            })
            .is_ok()
    }
}

impl NodeApi for StubNode {
    fn fetch_objects(
        &self,
        _group_id: &str,
        _after_timestamp: i64,
        _limit: usize,
    ) -> impl Future<Output = Result<Vec<RemoteContent>>> + Send {
        let failed = self.take_failure();
        let batch = self.objects.lock().unwrap().pop_front().unwrap_or_default();
        async move {
            if failed {
                anyhow::bail!("node offline");
            }
            Ok(batch)
        }
    }

    fn fetch_comments(
        &self,
        _group_id: &str,
        _after_timestamp: i64,
        _limit: usize,
    ) -> impl Future<Output = Result<Vec<RemoteContent>>> + Send {
        let failed = self.take_failure();
        let batch = self.comments.lock().unwrap().pop_front().unwrap_or_default();
        async move {
            if failed {
                anyhow::bail!("node offline");
            }
            Ok(batch)
        }
    }

    fn fetch_my_profile(
        &self,
        _group_id: &str,
    ) -> impl Future<Output = Result<Option<RemoteProfile>>> + Send {
        async move { Ok(None) }
    }

    fn fetch_blacklist(&self) -> impl Future<Output = Result<Vec<String>>> + Send {
        let blacklist = self.blacklist.lock().unwrap().clone();
        async move { Ok(blacklist) }
    }
}

fn remote(trx_id: &str, publisher: &str, time_stamp: i64) -> RemoteContent {
    RemoteContent {
        trx_id: trx_id.into(),
        publisher: publisher.into(),
        time_stamp,
        content: RemoteBody {
            content: format!("body of {trx_id}"),
            ..Default::default()
        },
    }
}

fn remote_comment(trx_id: &str, publisher: &str, time_stamp: i64, target: &str) -> RemoteContent {
    let mut item = remote(trx_id, publisher, time_stamp);
    item.content.object_trx_id = Some(target.into());
    item
}

struct TestEngine {
    database: Database,
    node: StubNode,
    events: EventBus,
    poller: SyncPoller<StubNode>,
}

fn setup() -> TestEngine {
    let conn = Connection::open_in_memory().expect("in-memory db");
    let database = Database::from_connection(conn, true);
    database.ensure_migrations().expect("migrations");
    database
        .with_repositories(|repos| repos.sync_cursors().ensure("group-1"))
        .expect("register group");

    let node = StubNode::default();
    let events = EventBus::default();
    let reconciler = ContentReconciler::new(database.clone(), Some("me".into()));
    let config = SyncConfig {
        poll_interval: Duration::from_millis(10),
        max_consecutive_failures: 2,
        ..Default::default()
    };
    let poller = SyncPoller::new(
        database.clone(),
        reconciler,
        node.clone(),
        events.clone(),
        config,
        ActiveView::default(),
    );
    TestEngine {
        database,
        node,
        events,
        poller,
    }
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn full_pass_ingests_objects_comments_and_notifies() {
    let engine = setup();
    let mut rx = engine.events.subscribe();

    engine.node.push_objects(vec![
        remote("obj-mine", "me", 100),
        remote("obj-theirs", "p1", 200),
    ]);
    engine
        .node
        .push_comments(vec![remote_comment("cmt-1", "p2", 300, "obj-mine")]);

    engine
        .poller
        .sync_group("group-1", &HashSet::new())
        .await
        .expect("sync pass");

    let rows = engine
        .database
        .with_repositories(|repos| {
            repos.content().bulk_get_by_trx_ids(&[
                "obj-mine".into(),
                "obj-theirs".into(),
                "cmt-1".into(),
            ])
        })
        .unwrap();
    assert!(rows
        .iter()
        .all(|row| row.as_ref().unwrap().status == ContentStatus::Synced));

    let cursor = engine
        .database
        .with_repositories(|repos| repos.sync_cursors().get("group-1"))
        .unwrap()
        .unwrap();
    assert_eq!(cursor.latest_object_timestamp, 300);
    // our own object does not count as unread
    assert_eq!(cursor.unread_count, 2);

    let events = drain(&mut rx);
    let added: Vec<_> = events
        .iter()
        .filter(|event| matches!(event, SyncEvent::ObjectAdded { .. }))
        .collect();
    assert_eq!(added.len(), 3);
    assert!(events
        .iter()
        .any(|event| matches!(event, SyncEvent::UnreadCountChanged { .. })));
    assert!(events.iter().any(|event| matches!(
        event,
        SyncEvent::NotificationListChanged { unread, .. } if unread.comment_object == 1
    )));
}

#[tokio::test]
async fn replayed_pass_emits_nothing_new() {
    let engine = setup();
    let batch = vec![remote("a", "p1", 100)];
    engine.node.push_objects(batch.clone());
    engine
        .poller
        .sync_group("group-1", &HashSet::new())
        .await
        .unwrap();

    let mut rx = engine.events.subscribe();
    engine.node.push_objects(batch);
    engine
        .poller
        .sync_group("group-1", &HashSet::new())
        .await
        .unwrap();

    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn blacklisted_publishers_are_filtered_out() {
    let engine = setup();
    engine.node.blacklist.lock().unwrap().push("spammer".into());
    engine.node.push_objects(vec![
        remote("ok", "p1", 100),
        remote("spam", "spammer", 200),
    ]);

    engine.poller.tick().await;
    // the pass runs on a spawned task
    tokio::time::sleep(Duration::from_millis(50)).await;

    let rows = engine
        .database
        .with_repositories(|repos| {
            repos
                .content()
                .bulk_get_by_trx_ids(&["ok".into(), "spam".into()])
        })
        .unwrap();
    assert!(rows[0].is_some());
    assert!(rows[1].is_none());
}

#[tokio::test]
async fn repeated_fetch_failures_surface_a_reconnect_prompt() {
    let engine = setup();
    let mut rx = engine.events.subscribe();
    engine.node.fail_next(2);

    for _ in 0..2 {
        let _ = engine.poller.sync_group("group-1", &HashSet::new()).await;
    }

    let events = drain(&mut rx);
    assert_eq!(
        events,
        vec![SyncEvent::NodeUnreachable {
            consecutive_failures: 2
        }]
    );

    // a successful fetch resets the streak
    engine.node.push_objects(vec![remote("a", "p1", 100)]);
    engine
        .poller
        .sync_group("group-1", &HashSet::new())
        .await
        .unwrap();
    engine.node.fail_next(1);
    let _ = engine.poller.sync_group("group-1", &HashSet::new()).await;
    assert!(!drain(&mut rx)
        .iter()
        .any(|event| matches!(event, SyncEvent::NodeUnreachable { .. })));
}

#[tokio::test]
async fn failed_fetch_leaves_the_cursor_untouched() {
    let engine = setup();
    engine.node.push_objects(vec![remote("a", "p1", 100)]);
    engine
        .poller
        .sync_group("group-1", &HashSet::new())
        .await
        .unwrap();

    engine.node.fail_next(1);
    let result = engine.poller.sync_group("group-1", &HashSet::new()).await;
    assert!(result.is_err());

    let cursor = engine
        .database
        .with_repositories(|repos| repos.sync_cursors().get("group-1"))
        .unwrap()
        .unwrap();
    assert_eq!(cursor.latest_object_timestamp, 100);
}

#[tokio::test]
async fn stop_flag_ends_the_run_loop() {
    let engine = setup();
    let stop = engine.poller.stop_handle();
    stop.store(true, Ordering::SeqCst);

    timeout(Duration::from_secs(1), engine.poller.run())
        .await
        .expect("poller should stop promptly");
}
