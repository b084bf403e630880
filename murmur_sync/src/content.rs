//! Read and authoring surface over the content table.
//!
//! Reads come back "packed": each row is decorated with its author's
//! resolved profile and the cached comment and up-vote counts, and its
//! display status is re-derived from the optimistic timeout on every read
//! rather than persisted.

use crate::database::models::{ContentKind, ContentQuery, ContentRecord, ContentStatus, SummaryKind};
use crate::database::repositories::{ContentRepository, SqliteRepositories, SummaryRepository};
use crate::database::Database;
use crate::profiles::{self, Profile};
use crate::status;
use crate::summary;
use crate::utils::now_timestamp_nanos;
use anyhow::Result;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CommentTarget {
    pub object_trx_id: String,
    pub thread_trx_id: Option<String>,
    pub reply_trx_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PackedContent {
    pub item: ContentRecord,
    /// Display status after applying the optimistic timeout.
    pub status: ContentStatus,
    pub author: Profile,
    pub comment_count: i64,
    pub up_vote_count: i64,
}

pub(crate) fn pack_in(
    repos: &SqliteRepositories<'_>,
    records: Vec<ContentRecord>,
    optimistic_timeout: Duration,
    now_nanos: i64,
) -> Result<Vec<PackedContent>> {
    let mut profile_cache: HashMap<(String, String), Profile> = HashMap::new();
    let mut packed = Vec::with_capacity(records.len());
    for record in records {
        let publisher = record.publisher.clone().unwrap_or_default();
        let key = (record.group_id.clone(), publisher.clone());
        let author = match profile_cache.get(&key) {
            Some(profile) => profile.clone(),
            None => {
                let profile = profiles::resolve_in(repos, &record.group_id, &publisher)?;
                profile_cache.insert(key, profile.clone());
                profile
            }
        };
        let comment_count = repos.summary().get_count(
            &record.group_id,
            &record.trx_id,
            SummaryKind::ObjectComment,
        )?;
        let up_vote_count = repos.summary().get_count(
            &record.group_id,
            &record.trx_id,
            SummaryKind::ObjectUpVote,
        )?;
        let display_status = status::classify(
            record.publisher.as_deref(),
            record.timestamp,
            now_nanos,
            optimistic_timeout,
        );
        packed.push(PackedContent {
            status: display_status,
            author,
            comment_count,
            up_vote_count,
            item: record,
        });
    }
    Ok(packed)
}

#[derive(Clone)]
pub struct ContentService {
    database: Database,
    optimistic_timeout: Duration,
}

impl ContentService {
    pub fn new(database: Database, optimistic_timeout: Duration) -> Self {
        Self {
            database,
            optimistic_timeout,
        }
    }

    pub fn list(&self, query: &ContentQuery) -> Result<Vec<PackedContent>> {
        let now = now_timestamp_nanos();
        self.database.with_repositories(|repos| {
            let records = repos.content().list(query)?;
            pack_in(&repos, records, self.optimistic_timeout, now)
        })
    }

    pub fn get(&self, trx_id: &str) -> Result<Option<PackedContent>> {
        let now = now_timestamp_nanos();
        self.database.with_repositories(|repos| {
            let Some(record) = repos.content().get_by_trx_id(trx_id)? else {
                return Ok(None);
            };
            let mut packed = pack_in(&repos, vec![record], self.optimistic_timeout, now)?;
            Ok(packed.pop())
        })
    }

    /// Stages a locally authored post. The trx id comes from the signing
    /// step; the row stays unconfirmed until a remote batch echoes it back.
    pub fn author_object(&self, group_id: &str, trx_id: &str, body: &str) -> Result<ContentRecord> {
        let record = self.local_record(group_id, trx_id, ContentKind::Object, body, None);
        self.stage_local(record, None)
    }

    pub fn author_comment(
        &self,
        group_id: &str,
        trx_id: &str,
        body: &str,
        target: CommentTarget,
    ) -> Result<ContentRecord> {
        let record = self.local_record(group_id, trx_id, ContentKind::Comment, body, Some(target));
        let object_trx_id = record.object_trx_id.clone();
        self.stage_local(record, object_trx_id.map(|id| (id, SummaryKind::ObjectComment)))
    }

    pub fn author_vote(
        &self,
        group_id: &str,
        trx_id: &str,
        object_trx_id: &str,
    ) -> Result<ContentRecord> {
        let mut record = self.local_record(group_id, trx_id, ContentKind::Like, "", None);
        record.object_trx_id = Some(object_trx_id.to_string());
        self.stage_local(
            record,
            Some((object_trx_id.to_string(), SummaryKind::ObjectUpVote)),
        )
    }

    fn local_record(
        &self,
        group_id: &str,
        trx_id: &str,
        kind: ContentKind,
        body: &str,
        target: Option<CommentTarget>,
    ) -> ContentRecord {
        let (object_trx_id, thread_trx_id, reply_trx_id) = match target {
            Some(target) => (
                Some(target.object_trx_id),
                target.thread_trx_id,
                target.reply_trx_id,
            ),
            None => (None, None, None),
        };
        ContentRecord {
            id: None,
            trx_id: trx_id.to_string(),
            group_id: group_id.to_string(),
            publisher: None,
            kind,
            timestamp: now_timestamp_nanos(),
            body: body.to_string(),
            object_trx_id,
            thread_trx_id,
            reply_trx_id,
            status: ContentStatus::Syncing,
        }
    }

    fn stage_local(
        &self,
        record: ContentRecord,
        resync: Option<(String, SummaryKind)>,
    ) -> Result<ContentRecord> {
        let staged = self.database.with_transaction(|repos| {
            let id = repos.content().create(&record)?;
            if let Some((object_id, kind)) = &resync {
                summary::sync_count(&repos, &record.group_id, object_id, *kind)?;
            }
            Ok(ContentRecord {
                id: Some(id),
                ..record.clone()
            })
        })?;
        tracing::debug!(
            group_id = %staged.group_id,
            trx_id = %staged.trx_id,
            kind = %staged.kind.as_str(),
            "staged local content"
        );
        Ok(staged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn setup() -> (Database, ContentService) {
        let conn = Connection::open_in_memory().expect("in-memory db");
        let database = Database::from_connection(conn, true);
        database.ensure_migrations().expect("migrations");
        let service = ContentService::new(database.clone(), Duration::from_secs(20));
        (database, service)
    }

    #[test]
    fn staged_items_read_back_as_syncing_within_the_grace_period() {
        let (_database, service) = setup();
        service.author_object("g", "trx-1", "hello").unwrap();

        let packed = service.get("trx-1").unwrap().unwrap();
        assert_eq!(packed.item.status, ContentStatus::Syncing);
        assert_eq!(packed.status, ContentStatus::Syncing);
        assert!(packed.item.publisher.is_none());
    }

    #[test]
    fn stale_staged_items_read_back_as_failed_without_a_write() {
        let (database, service) = setup();
        let staged = service.author_object("g", "trx-1", "hello").unwrap();

        // age the row past the timeout
        database
            .with_repositories(|repos| {
                repos.conn().execute(
                    "UPDATE content SET timestamp = timestamp - 30000000000 WHERE trx_id = 'trx-1'",
                    [],
                )?;
                Ok(())
            })
            .unwrap();

        let packed = service.get("trx-1").unwrap().unwrap();
        assert_eq!(packed.status, ContentStatus::Failed);
        // the stored status is untouched, classification is read-time only
        assert_eq!(packed.item.status, ContentStatus::Syncing);
        let _ = staged;
    }

    #[test]
    fn authored_comments_refresh_the_target_comment_count() {
        let (database, service) = setup();
        service.author_object("g", "obj-1", "post").unwrap();
        service
            .author_comment(
                "g",
                "cmt-1",
                "nice",
                CommentTarget {
                    object_trx_id: "obj-1".into(),
                    thread_trx_id: None,
                    reply_trx_id: None,
                },
            )
            .unwrap();

        let count = database
            .with_repositories(|repos| {
                repos
                    .summary()
                    .get_count("g", "obj-1", SummaryKind::ObjectComment)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn authored_votes_refresh_the_up_vote_count() {
        let (_database, service) = setup();
        service.author_object("g", "obj-1", "post").unwrap();
        service.author_vote("g", "like-1", "obj-1").unwrap();

        let packed = service.get("obj-1").unwrap().unwrap();
        assert_eq!(packed.up_vote_count, 1);
    }

    #[test]
    fn list_packs_author_profiles() {
        let (database, service) = setup();
        service.author_object("g", "obj-1", "post").unwrap();
        let _ = database;

        let packed = service
            .list(&ContentQuery {
                group_id: "g".into(),
                kind: Some(ContentKind::Object),
                limit: 10,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(packed.len(), 1);
        // unconfirmed rows have no publisher yet, so the author is a placeholder
        assert_eq!(packed[0].author, Profile::placeholder(""));
    }
}
