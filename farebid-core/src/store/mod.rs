//! Durable, authoritative storage of sessions, offer logs and participant
//! bindings.
//!
//! Every mutation of the session row is a compare-and-set on `version`.
//! A mutation either commits atomically (row + offer + binding) or not at
//! all.

mod memory;
mod postgres;

pub use memory::MemorySessionStore;
pub use postgres::PgSessionStore;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::entities::SessionStatus;
use crate::model::{Actor, Offer, Participant, Session, SessionTimeline};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Transient: the caller may retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// Another writer committed first.
    #[error("version mismatch")]
    VersionMismatch,
    #[error("session {0} not found")]
    NotFound(Uuid),
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Counter-offer commit: append `offer` and move the row forward.
#[derive(Debug, Clone)]
pub struct OfferAppend {
    pub expected_version: i64,
    pub actor: Actor,
    pub offer: Offer,
    pub status: SessionStatus,
    pub deadline_at: OffsetDateTime,
    /// Set when the acting driver becomes the session's driver.
    pub bind_driver: Option<Uuid>,
}

/// Terminal commit: accept, reject, withdraw or expire.
#[derive(Debug, Clone)]
pub struct Termination {
    pub session_id: Uuid,
    pub expected_version: i64,
    pub status: SessionStatus,
    /// `None` for system-driven expiry.
    pub actor: Option<Actor>,
    pub bind_driver: Option<Uuid>,
    pub at: OffsetDateTime,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a new session (version 1), its first offer and the rider
    /// binding. An id that already exists yields
    /// [`StoreError::VersionMismatch`].
    async fn create(&self, session: &Session, first_offer: &Offer) -> Result<(), StoreError>;

    /// Returns the new version.
    async fn append_offer(&self, append: &OfferAppend) -> Result<i64, StoreError>;

    /// Returns the new version.
    async fn terminate(&self, termination: &Termination) -> Result<i64, StoreError>;

    async fn load(&self, session_id: Uuid) -> Result<SessionTimeline, StoreError>;

    /// Ids of open sessions whose deadline is at or before `before`.
    async fn scan_expiring(
        &self,
        before: OffsetDateTime,
        limit: i64,
    ) -> Result<Vec<Uuid>, StoreError>;

    /// Idempotent. Returns `true` if a new binding was written.
    async fn bind_participant(&self, participant: &Participant) -> Result<bool, StoreError>;

    /// Marks a driver binding as rejected, creating it if needed. Does not
    /// touch the session row or its version.
    async fn mark_rejected(
        &self,
        session_id: Uuid,
        actor_id: Uuid,
        at: OffsetDateTime,
    ) -> Result<(), StoreError>;

    async fn count_open_for_rider(&self, rider_id: Uuid) -> Result<i64, StoreError>;
}
