//! Client for the external node process that owns transport and signing.
//!
//! The engine only consumes its fetch API; every call can fail without
//! corrupting local state, since ingestion is transactional and retried.

use crate::config::NodeConfig;
use crate::database::models::{ContentKind, ContentRecord, ContentStatus};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// One content item as returned by the node's fetch API. Remote items are
/// always confirmed, so the publisher is always present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemoteContent {
    pub trx_id: String,
    pub publisher: String,
    pub time_stamp: i64,
    #[serde(default)]
    pub content: RemoteBody,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteBody {
    #[serde(default)]
    pub content: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_trx_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_trx_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_trx_id: Option<String>,
}

impl RemoteContent {
    pub fn is_like(&self) -> bool {
        self.content.kind.as_deref() == Some("Like")
    }

    pub fn to_record(&self, group_id: &str, kind: ContentKind, status: ContentStatus) -> ContentRecord {
        ContentRecord {
            id: None,
            trx_id: self.trx_id.clone(),
            group_id: group_id.to_string(),
            publisher: Some(self.publisher.clone()),
            kind,
            timestamp: self.time_stamp,
            body: self.content.content.clone(),
            object_trx_id: self.content.object_trx_id.clone(),
            thread_trx_id: self.content.thread_trx_id.clone(),
            reply_trx_id: self.content.reply_trx_id.clone(),
            status,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemoteProfile {
    pub publisher: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_account_id: Option<String>,
}

/// The subset of the node API the engine consumes. Kept as a trait so the
/// poller can be driven by a stub in tests.
pub trait NodeApi {
    fn fetch_objects(
        &self,
        group_id: &str,
        after_timestamp: i64,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<RemoteContent>>> + Send;

    fn fetch_comments(
        &self,
        group_id: &str,
        after_timestamp: i64,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<RemoteContent>>> + Send;

    fn fetch_my_profile(
        &self,
        group_id: &str,
    ) -> impl Future<Output = Result<Option<RemoteProfile>>> + Send;

    fn fetch_blacklist(&self) -> impl Future<Output = Result<Vec<String>>> + Send;
}

#[derive(Clone)]
pub struct NodeClient {
    http: reqwest::Client,
    base_url: String,
    jwt: Option<String>,
}

impl NodeClient {
    pub fn new(config: &NodeConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            jwt: config.jwt.clone(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}/{}", self.base_url, path);
        let mut request = self.http.get(&url).query(query);
        if let Some(jwt) = &self.jwt {
            request = request.bearer_auth(jwt);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;
        let response = response
            .error_for_status()
            .with_context(|| format!("request to {url} rejected"))?;
        response
            .json()
            .await
            .with_context(|| format!("invalid response body from {url}"))
    }

    async fn fetch_content(
        &self,
        group_id: &str,
        content_type: &str,
        after_timestamp: i64,
        limit: usize,
    ) -> Result<Vec<RemoteContent>> {
        self.get_json(
            &format!("api/v1/group/{group_id}/content"),
            &[
                ("type", content_type.to_string()),
                ("after", after_timestamp.to_string()),
                ("num", limit.to_string()),
            ],
        )
        .await
    }
}

impl NodeApi for NodeClient {
    fn fetch_objects(
        &self,
        group_id: &str,
        after_timestamp: i64,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<RemoteContent>>> + Send {
        self.fetch_content(group_id, "object", after_timestamp, limit)
    }

    fn fetch_comments(
        &self,
        group_id: &str,
        after_timestamp: i64,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<RemoteContent>>> + Send {
        self.fetch_content(group_id, "comment", after_timestamp, limit)
    }

    fn fetch_my_profile(
        &self,
        group_id: &str,
    ) -> impl Future<Output = Result<Option<RemoteProfile>>> + Send {
        async move {
            let profiles: Vec<RemoteProfile> = self
                .get_json(&format!("api/v1/group/{group_id}/profile"), &[])
                .await?;
            Ok(profiles.into_iter().next())
        }
    }

    fn fetch_blacklist(&self) -> impl Future<Output = Result<Vec<String>>> + Send {
        self.get_json::<Vec<String>>("api/v1/node/deniedlist", &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_content_deserializes_node_wire_format() {
        let raw = r#"{
            "TrxId": "trx-1",
            "Publisher": "pub-1",
            "TimeStamp": 1700000000000000000,
            "Content": {
                "content": "hello",
                "type": "Like",
                "objectTrxId": "obj-1"
            }
        }"#;
        let item: RemoteContent = serde_json::from_str(raw).unwrap();
        assert_eq!(item.trx_id, "trx-1");
        assert!(item.is_like());
        assert_eq!(item.content.object_trx_id.as_deref(), Some("obj-1"));
    }

    #[test]
    fn to_record_carries_linkage_and_publisher() {
        let item = RemoteContent {
            trx_id: "t".into(),
            publisher: "p".into(),
            time_stamp: 42,
            content: RemoteBody {
                content: "body".into(),
                object_trx_id: Some("obj".into()),
                ..Default::default()
            },
        };
        let record = item.to_record("g", ContentKind::Comment, ContentStatus::Synced);
        assert_eq!(record.publisher.as_deref(), Some("p"));
        assert_eq!(record.object_trx_id.as_deref(), Some("obj"));
        assert_eq!(record.timestamp, 42);
    }
}
