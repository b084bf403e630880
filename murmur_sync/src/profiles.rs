//! Resolution of author profiles from the append-only submission history.

use crate::database::models::ProfileRecord;
use crate::database::repositories::{ProfileRepository, SqliteRepositories};
use crate::database::Database;
use crate::utils::now_timestamp_nanos;
use anyhow::Result;
use serde::Serialize;
use std::collections::HashMap;

pub const DEFAULT_AVATAR: &str = "default";

/// The authoritative profile for a `(group, publisher)` pair. Resolution
/// never fails: pairs without any submission get a placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub publisher: String,
    pub name: String,
    pub avatar: String,
    pub external_account_id: Option<String>,
}

impl Profile {
    pub fn placeholder(publisher: &str) -> Self {
        Self {
            publisher: publisher.to_string(),
            name: String::new(),
            avatar: DEFAULT_AVATAR.to_string(),
            external_account_id: None,
        }
    }

    fn from_record(record: ProfileRecord) -> Self {
        Self {
            publisher: record.publisher,
            name: record.name,
            avatar: record.avatar,
            external_account_id: record.external_account_id,
        }
    }
}

/// A profile edit to submit. The submission is appended to the history;
/// the newest timestamp wins at resolution time.
#[derive(Debug, Clone)]
pub struct ProfileInput {
    pub name: String,
    pub avatar: String,
    pub external_account_id: Option<String>,
}

pub(crate) fn resolve_in(
    repos: &SqliteRepositories<'_>,
    group_id: &str,
    publisher: &str,
) -> Result<Profile> {
    if let Some(record) = repos.profiles().latest(group_id, publisher)? {
        return Ok(Profile::from_record(record));
    }
    // the cross-group default is stored under the empty group id
    if let Some(record) = repos.profiles().latest("", publisher)? {
        return Ok(Profile::from_record(record));
    }
    Ok(Profile::placeholder(publisher))
}

#[derive(Clone)]
pub struct ProfileService {
    database: Database,
}

impl ProfileService {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    pub fn resolve(&self, group_id: &str, publisher: &str) -> Result<Profile> {
        self.database
            .with_repositories(|repos| resolve_in(&repos, group_id, publisher))
    }

    /// Resolves every pair, preserving input order. Repeated pairs reuse a
    /// single lookup.
    pub fn resolve_bulk(&self, pairs: &[(String, String)]) -> Result<Vec<Profile>> {
        self.database.with_repositories(|repos| {
            let mut cache: HashMap<(String, String), Profile> = HashMap::new();
            let mut profiles = Vec::with_capacity(pairs.len());
            for (group_id, publisher) in pairs {
                let key = (group_id.clone(), publisher.clone());
                let profile = match cache.get(&key) {
                    Some(profile) => profile.clone(),
                    None => {
                        let profile = resolve_in(&repos, group_id, publisher)?;
                        cache.insert(key, profile.clone());
                        profile
                    }
                };
                profiles.push(profile);
            }
            Ok(profiles)
        })
    }

    pub fn submit(
        &self,
        group_id: &str,
        publisher: &str,
        input: ProfileInput,
        apply_to_all_groups: bool,
    ) -> Result<()> {
        let record = ProfileRecord {
            id: None,
            group_id: if apply_to_all_groups {
                String::new()
            } else {
                group_id.to_string()
            },
            publisher: publisher.to_string(),
            name: input.name,
            avatar: input.avatar,
            external_account_id: input.external_account_id,
            timestamp: now_timestamp_nanos(),
        };
        self.database
            .with_repositories(|repos| repos.profiles().add(&record))?;
        tracing::debug!(group_id = %record.group_id, publisher = %publisher, "profile submitted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn setup_service() -> ProfileService {
        let conn = Connection::open_in_memory().expect("in-memory db");
        let database = Database::from_connection(conn, true);
        database.ensure_migrations().expect("migrations");
        ProfileService::new(database)
    }

    fn input(name: &str) -> ProfileInput {
        ProfileInput {
            name: name.into(),
            avatar: "avatar".into(),
            external_account_id: None,
        }
    }

    #[test]
    fn resolves_latest_submission() {
        let service = setup_service();
        service.submit("g", "p", input("first"), false).unwrap();
        service.submit("g", "p", input("second"), false).unwrap();

        let profile = service.resolve("g", "p").unwrap();
        assert_eq!(profile.name, "second");
    }

    #[test]
    fn falls_back_to_cross_group_default_then_placeholder() {
        let service = setup_service();
        service.submit("other", "p", input("everywhere"), true).unwrap();

        let profile = service.resolve("g", "p").unwrap();
        assert_eq!(profile.name, "everywhere");

        let missing = service.resolve("g", "nobody").unwrap();
        assert_eq!(missing, Profile::placeholder("nobody"));
        assert_eq!(missing.avatar, DEFAULT_AVATAR);
    }

    #[test]
    fn per_group_submission_beats_the_default() {
        let service = setup_service();
        service.submit("g", "p", input("everywhere"), true).unwrap();
        service.submit("g", "p", input("here"), false).unwrap();

        let profile = service.resolve("g", "p").unwrap();
        assert_eq!(profile.name, "here");
    }

    #[test]
    fn bulk_resolution_preserves_order() {
        let service = setup_service();
        service.submit("g", "p1", input("alice"), false).unwrap();

        let profiles = service
            .resolve_bulk(&[
                ("g".into(), "p2".into()),
                ("g".into(), "p1".into()),
                ("g".into(), "p1".into()),
            ])
            .unwrap();
        assert_eq!(profiles.len(), 3);
        assert_eq!(profiles[0].name, "");
        assert_eq!(profiles[1].name, "alice");
        assert_eq!(profiles[2].name, "alice");
    }
}
