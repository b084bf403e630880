use anyhow::{anyhow, Result};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct MurmurConfig {
    pub paths: MurmurPaths,
    pub node: NodeConfig,
    pub sync: SyncConfig,
}

impl MurmurConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            paths: MurmurPaths::discover()?,
            node: NodeConfig::from_env(),
            sync: SyncConfig::from_env(),
        })
    }

    pub fn new(paths: MurmurPaths, node: NodeConfig, sync: SyncConfig) -> Self {
        Self { paths, node, sync }
    }
}

/// Connection details for the external node process that owns transport,
/// consensus and signing. The engine only ever talks to it over its local
/// HTTP API.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub base_url: String,
    pub jwt: Option<String>,
    /// Key the local node signs authored content with. Items published by
    /// this key never count toward unread badges.
    pub local_pubkey: Option<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8002".into(),
            jwt: None,
            local_pubkey: None,
        }
    }
}

impl NodeConfig {
    pub fn from_env() -> Self {
        let base_url = env::var("MURMUR_NODE_URL")
            .ok()
            .filter(|raw| !raw.trim().is_empty())
            .unwrap_or_else(|| "http://127.0.0.1:8002".into());
        let jwt = env::var("MURMUR_NODE_JWT")
            .ok()
            .filter(|raw| !raw.trim().is_empty());
        let local_pubkey = env::var("MURMUR_NODE_PUBKEY")
            .ok()
            .filter(|raw| !raw.trim().is_empty());
        Self {
            base_url,
            jwt,
            local_pubkey,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Delay between polling passes over the registered groups.
    pub poll_interval: Duration,
    /// Grace period before an unconfirmed local item is shown as failed.
    pub optimistic_timeout: Duration,
    /// Maximum number of items requested per fetch.
    pub batch_limit: usize,
    /// Consecutive fetch failures tolerated before a reconnect prompt is
    /// surfaced to subscribers.
    pub max_consecutive_failures: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(2_000),
            optimistic_timeout: Duration::from_secs(20),
            batch_limit: 200,
            max_consecutive_failures: 10,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let poll_interval = env::var("MURMUR_POLL_INTERVAL_MS")
            .ok()
            .and_then(|raw| raw.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll_interval);
        let optimistic_timeout = env::var("MURMUR_OPTIMISTIC_TIMEOUT_MS")
            .ok()
            .and_then(|raw| raw.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.optimistic_timeout);
        let batch_limit = env::var("MURMUR_BATCH_LIMIT")
            .ok()
            .and_then(|raw| raw.parse::<usize>().ok())
            .unwrap_or(defaults.batch_limit);
        let max_consecutive_failures = env::var("MURMUR_MAX_FETCH_FAILURES")
            .ok()
            .and_then(|raw| raw.parse::<u32>().ok())
            .unwrap_or(defaults.max_consecutive_failures);
        Self {
            poll_interval,
            optimistic_timeout,
            batch_limit,
            max_consecutive_failures,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MurmurPaths {
    pub base: PathBuf,
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub logs_dir: PathBuf,
}

impl MurmurPaths {
    pub fn discover() -> Result<Self> {
        if let Ok(raw) = env::var("MURMUR_DATA_DIR") {
            if !raw.trim().is_empty() {
                return Self::from_base_dir(raw);
            }
        }
        let exe_path = std::env::current_exe()
            .map_err(|err| anyhow!("failed to resolve current executable: {err}"))?;
        let base = exe_path
            .parent()
            .ok_or_else(|| anyhow!("executable path missing parent"))?
            .to_path_buf();
        Self::from_base_dir(base)
    }

    pub fn from_base_dir<P: AsRef<Path>>(base: P) -> Result<Self> {
        let base = base.as_ref().to_path_buf();
        let data_dir = base.join("data");
        let db_path = data_dir.join("murmur.db");
        let logs_dir = base.join("logs");
        Ok(Self {
            base,
            data_dir,
            db_path,
            logs_dir,
        })
    }
}
