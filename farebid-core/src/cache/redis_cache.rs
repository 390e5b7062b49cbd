use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{RedisResult, Script};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

use super::{CacheError, SnapshotCache};
use crate::model::SessionSnapshot;

/// Put-if-newer on a hash of `version` and the JSON `snapshot`. Equal
/// versions replace. Returns 1 if the entry was written.
const PUT_IF_NEWER: &str = r#"
local current = redis.call('HGET', KEYS[1], 'version')
if current and tonumber(current) > tonumber(ARGV[1]) then
  return 0
end
redis.call('HSET', KEYS[1], 'version', ARGV[1], 'snapshot', ARGV[2])
redis.call('PEXPIRE', KEYS[1], ARGV[3])
return 1
"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisCacheConfig {
    /// e.g. `redis://cache:6379/0`
    pub url: String,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Lifetime of an entry for a session that is still open.
    #[serde(default = "default_open_ttl_secs")]
    pub open_ttl_secs: u64,
    /// Lifetime of an entry once the session is terminal.
    #[serde(default = "default_terminal_ttl_secs")]
    pub terminal_ttl_secs: u64,
}

fn default_key_prefix() -> String {
    "farebid:snapshot".into()
}

fn default_timeout_ms() -> u64 {
    250
}

fn default_open_ttl_secs() -> u64 {
    900
}

fn default_terminal_ttl_secs() -> u64 {
    300
}

/// Key naming and expiry, kept apart from the connection.
#[derive(Debug, Clone)]
struct Layout {
    key_prefix: String,
    open_ttl: Duration,
    terminal_ttl: Duration,
}

impl Layout {
    fn new(config: &RedisCacheConfig) -> Self {
        Self {
            key_prefix: config.key_prefix.clone(),
            open_ttl: Duration::from_secs(config.open_ttl_secs),
            terminal_ttl: Duration::from_secs(config.terminal_ttl_secs),
        }
    }

    fn key(&self, session_id: Uuid) -> String {
        format!("{}:{}", self.key_prefix, session_id)
    }

    fn ttl_millis(&self, snapshot: &SessionSnapshot) -> u64 {
        let ttl = if snapshot.status.is_terminal() {
            self.terminal_ttl
        } else {
            self.open_ttl
        };
        u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
    }
}

fn unavailable(err: redis::RedisError) -> CacheError {
    CacheError::Unavailable(err.to_string())
}

/// Snapshot cache shared across instances through Redis.
///
/// Every entry carries a TTL, shorter once the session is terminal, so Redis
/// expires entries by itself and [`SnapshotCache::purge_terminal`] has
/// nothing to do.
pub struct RedisSnapshotCache {
    conn: ConnectionManager,
    put_if_newer: Script,
    layout: Layout,
    timeout: Duration,
}

impl RedisSnapshotCache {
    pub async fn connect(config: RedisCacheConfig) -> Result<Self, CacheError> {
        let timeout = Duration::from_millis(config.timeout_ms);
        let client = redis::Client::open(config.url.as_str()).map_err(unavailable)?;
        let conn = tokio::time::timeout(timeout, client.get_connection_manager())
            .await
            .map_err(|_| CacheError::Unavailable("redis connect timed out".into()))?
            .map_err(unavailable)?;
        Ok(Self {
            conn,
            put_if_newer: Script::new(PUT_IF_NEWER),
            layout: Layout::new(&config),
            timeout,
        })
    }

    async fn bounded<T>(
        &self,
        operation: impl Future<Output = RedisResult<T>>,
    ) -> Result<T, CacheError> {
        tokio::time::timeout(self.timeout, operation)
            .await
            .map_err(|_| CacheError::Unavailable("redis call timed out".into()))?
            .map_err(unavailable)
    }
}

#[async_trait]
impl SnapshotCache for RedisSnapshotCache {
    #[tracing::instrument(skip_all, err, name = "REDIS:GetSnapshot")]
    async fn get(&self, session_id: Uuid) -> Result<Option<SessionSnapshot>, CacheError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = self
            .bounded(
                redis::cmd("HGET")
                    .arg(self.layout.key(session_id))
                    .arg("snapshot")
                    .query_async(&mut conn),
            )
            .await?;
        raw.map(|json| {
            serde_json::from_str(&json).map_err(|e| CacheError::Malformed(e.to_string()))
        })
        .transpose()
    }

    #[tracing::instrument(skip_all, err, name = "REDIS:PutSnapshot")]
    async fn put(&self, snapshot: SessionSnapshot) -> Result<(), CacheError> {
        let payload =
            serde_json::to_string(&snapshot).map_err(|e| CacheError::Malformed(e.to_string()))?;
        let mut conn = self.conn.clone();
        let _written: i64 = self
            .bounded(
                self.put_if_newer
                    .key(self.layout.key(snapshot.id))
                    .arg(snapshot.version)
                    .arg(payload)
                    .arg(self.layout.ttl_millis(&snapshot))
                    .invoke_async(&mut conn),
            )
            .await?;
        Ok(())
    }

    async fn evict(&self, session_id: Uuid) {
        let mut conn = self.conn.clone();
        let deleted: Result<(), CacheError> = self
            .bounded(
                redis::cmd("DEL")
                    .arg(self.layout.key(session_id))
                    .query_async(&mut conn),
            )
            .await;
        if let Err(err) = deleted {
            warn!(%session_id, error = %err, "Failed to evict snapshot from redis");
        }
    }

    async fn purge_terminal(&self, _before: OffsetDateTime) -> usize {
        0
    }
}
