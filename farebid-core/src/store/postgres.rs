use async_trait::async_trait;
use kanau::processor::Processor;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{OfferAppend, SessionStore, StoreError, Termination};
use crate::entities::participant_records::{BindParticipant, MarkParticipantRejected};
use crate::entities::session_records::{
    CasAppendOffer, CasTerminateSession, CountOpenSessionsForRider, GetSessionById,
    InsertSession, LoadSessionTimeline, ScanExpiringSessions,
};
use crate::framework::{DatabaseProcessor, DbFailure, classify};
use crate::model::{Offer, Participant, Session, SessionTimeline};

pub struct PgSessionStore {
    db: DatabaseProcessor,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            db: DatabaseProcessor { pool },
        }
    }

    /// A CAS update that matched no row is either a lost race or a missing
    /// session.
    async fn cas_miss(&self, session_id: Uuid) -> StoreError {
        match self.db.process(GetSessionById { session_id }).await {
            Ok(Some(_)) => StoreError::VersionMismatch,
            Ok(None) => StoreError::NotFound(session_id),
            Err(e) => map_sqlx(e),
        }
    }
}

fn map_sqlx(err: sqlx::Error) -> StoreError {
    match classify(&err) {
        DbFailure::Transient => StoreError::Unavailable(err.to_string()),
        DbFailure::Conflict => StoreError::VersionMismatch,
        DbFailure::Permanent => StoreError::Backend(err.to_string()),
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create(&self, session: &Session, first_offer: &Offer) -> Result<(), StoreError> {
        self.db
            .process(InsertSession {
                session: session.clone(),
                first_offer: first_offer.clone(),
            })
            .await
            .map_err(map_sqlx)
    }

    async fn append_offer(&self, append: &OfferAppend) -> Result<i64, StoreError> {
        let result = self
            .db
            .process(CasAppendOffer {
                expected_version: append.expected_version,
                offer: append.offer.clone(),
                status: append.status,
                deadline_at: append.deadline_at,
                bind_driver: append.bind_driver,
                actor_id: append.actor.id,
            })
            .await
            .map_err(map_sqlx)?;
        match result {
            Some(version) => Ok(version),
            None => Err(self.cas_miss(append.offer.session_id).await),
        }
    }

    async fn terminate(&self, termination: &Termination) -> Result<i64, StoreError> {
        let result = self
            .db
            .process(CasTerminateSession {
                session_id: termination.session_id,
                expected_version: termination.expected_version,
                status: termination.status,
                closed_by: termination.actor.map(|a| a.id),
                closed_by_role: termination.actor.map(|a| a.role),
                bind_driver: termination.bind_driver,
                at: termination.at,
            })
            .await
            .map_err(map_sqlx)?;
        match result {
            Some(version) => Ok(version),
            None => Err(self.cas_miss(termination.session_id).await),
        }
    }

    async fn load(&self, session_id: Uuid) -> Result<SessionTimeline, StoreError> {
        let (record, offers, participants) = self
            .db
            .process(LoadSessionTimeline { session_id })
            .await
            .map_err(map_sqlx)?
            .ok_or(StoreError::NotFound(session_id))?;
        Ok(SessionTimeline {
            session: record.into(),
            offers: offers.into_iter().map(Into::into).collect(),
            participants: participants.into_iter().map(Into::into).collect(),
        })
    }

    async fn scan_expiring(
        &self,
        before: OffsetDateTime,
        limit: i64,
    ) -> Result<Vec<Uuid>, StoreError> {
        self.db
            .process(ScanExpiringSessions { before, limit })
            .await
            .map_err(map_sqlx)
    }

    async fn bind_participant(&self, participant: &Participant) -> Result<bool, StoreError> {
        self.db
            .process(BindParticipant {
                participant: participant.clone(),
            })
            .await
            .map_err(map_sqlx)
    }

    async fn mark_rejected(
        &self,
        session_id: Uuid,
        actor_id: Uuid,
        at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        self.db
            .process(MarkParticipantRejected {
                session_id,
                actor_id,
                at,
            })
            .await
            .map_err(map_sqlx)
    }

    async fn count_open_for_rider(&self, rider_id: Uuid) -> Result<i64, StoreError> {
        self.db
            .process(CountOpenSessionsForRider { rider_id })
            .await
            .map_err(map_sqlx)
    }
}
