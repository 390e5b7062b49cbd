//! Read-through/write-through snapshot cache.
//!
//! The cache is never authoritative. `put` only ever moves an entry forward
//! in version, so a slow writer cannot overwrite a newer snapshot.
//!
//! [`MemorySnapshotCache`] serves a single instance. [`RedisSnapshotCache`]
//! is shared by every instance pointed at the same Redis.

mod redis_cache;

pub use redis_cache::{RedisCacheConfig, RedisSnapshotCache};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::model::SessionSnapshot;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
    #[error("malformed cache entry: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait SnapshotCache: Send + Sync {
    async fn get(&self, session_id: Uuid) -> Result<Option<SessionSnapshot>, CacheError>;

    /// Stores `snapshot` unless the cache already holds a newer version.
    /// Equal versions replace, which lets participant changes that do not
    /// bump the version reach the cache.
    async fn put(&self, snapshot: SessionSnapshot) -> Result<(), CacheError>;

    async fn evict(&self, session_id: Uuid);

    /// Drops terminal snapshots last updated before `before`. Returns how
    /// many were dropped.
    async fn purge_terminal(&self, before: OffsetDateTime) -> usize;
}

#[derive(Debug, Default)]
pub struct MemorySnapshotCache {
    entries: DashMap<Uuid, SessionSnapshot>,
}

impl MemorySnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SnapshotCache for MemorySnapshotCache {
    async fn get(&self, session_id: Uuid) -> Result<Option<SessionSnapshot>, CacheError> {
        Ok(self.entries.get(&session_id).map(|e| e.value().clone()))
    }

    async fn put(&self, snapshot: SessionSnapshot) -> Result<(), CacheError> {
        match self.entries.entry(snapshot.id) {
            Entry::Occupied(mut existing) => {
                if existing.get().version <= snapshot.version {
                    existing.insert(snapshot);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(snapshot);
            }
        }
        Ok(())
    }

    async fn evict(&self, session_id: Uuid) {
        self.entries.remove(&session_id);
    }

    async fn purge_terminal(&self, before: OffsetDateTime) -> usize {
        let len = self.entries.len();
        self.entries
            .retain(|_, s| !(s.status.is_terminal() && s.updated_at < before));
        len.saturating_sub(self.entries.len())
    }
}
