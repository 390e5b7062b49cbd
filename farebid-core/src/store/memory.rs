use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{OfferAppend, SessionStore, StoreError, Termination};
use crate::entities::PartyRole;
use crate::model::{Offer, Participant, Session, SessionTimeline};

/// Process-local store with the same compare-and-set semantics as
/// [`super::PgSessionStore`].
///
/// Faults and latency can be injected to exercise retry and deadline paths.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<Uuid, SessionTimeline>>,
    unavailable_remaining: AtomicU32,
    latency: parking_lot::Mutex<Option<Duration>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `count` calls fail with [`StoreError::Unavailable`].
    pub fn fail_next(&self, count: u32) {
        self.unavailable_remaining.store(count, Ordering::SeqCst);
    }

    /// Every call sleeps this long before touching state.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    async fn enter(&self) -> Result<(), StoreError> {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let injected = self
            .unavailable_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if injected.is_ok() {
            return Err(StoreError::Unavailable("injected fault".into()));
        }
        Ok(())
    }
}

fn bind(timeline: &mut SessionTimeline, actor_id: Uuid, role: PartyRole, at: OffsetDateTime) {
    if timeline.participants.iter().any(|p| p.actor_id == actor_id) {
        return;
    }
    timeline.participants.push(Participant {
        session_id: timeline.session.id,
        actor_id,
        role,
        bound_at: at,
        rejected_at: None,
    });
}

fn check_cas(
    timeline: &SessionTimeline,
    expected_version: i64,
) -> Result<(), StoreError> {
    if timeline.session.version != expected_version || !timeline.session.status.is_open() {
        return Err(StoreError::VersionMismatch);
    }
    Ok(())
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, session: &Session, first_offer: &Offer) -> Result<(), StoreError> {
        self.enter().await?;
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.id) {
            return Err(StoreError::VersionMismatch);
        }
        let mut timeline = SessionTimeline {
            session: session.clone(),
            offers: vec![first_offer.clone()],
            participants: Vec::new(),
        };
        bind(&mut timeline, session.rider_id, PartyRole::Rider, session.created_at);
        sessions.insert(session.id, timeline);
        Ok(())
    }

    async fn append_offer(&self, append: &OfferAppend) -> Result<i64, StoreError> {
        self.enter().await?;
        let offer = &append.offer;
        let mut sessions = self.sessions.write().await;
        let timeline = sessions
            .get_mut(&offer.session_id)
            .ok_or(StoreError::NotFound(offer.session_id))?;
        check_cas(timeline, append.expected_version)?;
        let next_ordinal = timeline.offers.last().map_or(1, |o| o.ordinal + 1);
        if offer.ordinal != next_ordinal {
            return Err(StoreError::VersionMismatch);
        }

        timeline.offers.push(offer.clone());
        bind(timeline, append.actor.id, append.actor.role, offer.created_at);
        let s = &mut timeline.session;
        s.status = append.status;
        s.current_offer_id = offer.id;
        s.last_originator = offer.originator;
        s.deadline_at = append.deadline_at;
        s.driver_id = s.driver_id.or(append.bind_driver);
        s.updated_at = offer.created_at;
        s.version += 1;
        Ok(s.version)
    }

    async fn terminate(&self, termination: &Termination) -> Result<i64, StoreError> {
        self.enter().await?;
        let mut sessions = self.sessions.write().await;
        let timeline = sessions
            .get_mut(&termination.session_id)
            .ok_or(StoreError::NotFound(termination.session_id))?;
        check_cas(timeline, termination.expected_version)?;

        if let Some(actor) = termination.actor {
            bind(timeline, actor.id, actor.role, termination.at);
        }
        let s = &mut timeline.session;
        s.status = termination.status;
        s.closed_by = termination.actor.map(|a| a.id);
        s.driver_id = s.driver_id.or(termination.bind_driver);
        s.updated_at = termination.at;
        s.version += 1;
        Ok(s.version)
    }

    async fn load(&self, session_id: Uuid) -> Result<SessionTimeline, StoreError> {
        self.enter().await?;
        self.sessions
            .read()
            .await
            .get(&session_id)
            .cloned()
            .ok_or(StoreError::NotFound(session_id))
    }

    async fn scan_expiring(
        &self,
        before: OffsetDateTime,
        limit: i64,
    ) -> Result<Vec<Uuid>, StoreError> {
        self.enter().await?;
        let sessions = self.sessions.read().await;
        let mut due: Vec<(OffsetDateTime, Uuid)> = sessions
            .values()
            .map(|t| &t.session)
            .filter(|s| s.status.is_open() && s.deadline_at <= before)
            .map(|s| (s.deadline_at, s.id))
            .collect();
        due.sort();
        Ok(due
            .into_iter()
            .take(usize::try_from(limit).unwrap_or(0))
            .map(|(_, id)| id)
            .collect())
    }

    async fn bind_participant(&self, participant: &Participant) -> Result<bool, StoreError> {
        self.enter().await?;
        let mut sessions = self.sessions.write().await;
        let timeline = sessions
            .get_mut(&participant.session_id)
            .ok_or(StoreError::NotFound(participant.session_id))?;
        if timeline
            .participants
            .iter()
            .any(|p| p.actor_id == participant.actor_id)
        {
            return Ok(false);
        }
        timeline.participants.push(participant.clone());
        Ok(true)
    }

    async fn mark_rejected(
        &self,
        session_id: Uuid,
        actor_id: Uuid,
        at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        self.enter().await?;
        let mut sessions = self.sessions.write().await;
        let timeline = sessions
            .get_mut(&session_id)
            .ok_or(StoreError::NotFound(session_id))?;
        bind(timeline, actor_id, PartyRole::Driver, at);
        if let Some(p) = timeline
            .participants
            .iter_mut()
            .find(|p| p.actor_id == actor_id)
        {
            p.rejected_at.get_or_insert(at);
        }
        Ok(())
    }

    async fn count_open_for_rider(&self, rider_id: Uuid) -> Result<i64, StoreError> {
        self.enter().await?;
        let sessions = self.sessions.read().await;
        let count = sessions
            .values()
            .filter(|t| t.session.rider_id == rider_id && t.session.status.is_open())
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::SessionStatus;
    use crate::model::{Actor, GeoPoint};
    use rust_decimal::Decimal;

    fn fixture(now: OffsetDateTime) -> (Session, Offer) {
        let id = Uuid::now_v7();
        let offer = Offer {
            id: Uuid::now_v7(),
            session_id: id,
            ordinal: 1,
            originator: PartyRole::Rider,
            amount: Decimal::from(50),
            currency: "INR".into(),
            created_at: now,
        };
        let session = Session {
            id,
            rider_id: Uuid::from_u128(1),
            driver_id: None,
            pickup: GeoPoint { lat: 1.0, lng: 1.0 },
            drop_off: GeoPoint { lat: 1.1, lng: 1.1 },
            ride_type_id: "auto".into(),
            currency: "INR".into(),
            baseline: Decimal::from(60),
            floor: Decimal::from(40),
            ceiling: Decimal::from(100),
            status: SessionStatus::Proposed,
            current_offer_id: offer.id,
            last_originator: PartyRole::Rider,
            created_at: now,
            updated_at: now,
            deadline_at: now + Duration::from_secs(120),
            version: 1,
            closed_by: None,
        };
        (session, offer)
    }

    fn counter(session: &Session, ordinal: i32, expected_version: i64) -> OfferAppend {
        let driver = Actor::driver(Uuid::from_u128(2));
        OfferAppend {
            expected_version,
            actor: driver,
            offer: Offer {
                id: Uuid::now_v7(),
                session_id: session.id,
                ordinal,
                originator: PartyRole::Driver,
                amount: Decimal::from(70),
                currency: "INR".into(),
                created_at: session.created_at,
            },
            status: SessionStatus::Countered,
            deadline_at: session.deadline_at,
            bind_driver: Some(driver.id),
        }
    }

    #[tokio::test]
    async fn create_binds_rider_and_loads_back() {
        let store = MemorySessionStore::new();
        let (session, offer) = fixture(OffsetDateTime::now_utc());
        store.create(&session, &offer).await.unwrap();

        let timeline = store.load(session.id).await.unwrap();
        assert_eq!(timeline.offers.len(), 1);
        assert_eq!(timeline.participants.len(), 1);
        assert_eq!(timeline.participants[0].role, PartyRole::Rider);
        assert!(timeline.check_invariants().is_ok());
    }

    #[tokio::test]
    async fn stale_version_is_rejected() {
        let store = MemorySessionStore::new();
        let (session, offer) = fixture(OffsetDateTime::now_utc());
        store.create(&session, &offer).await.unwrap();

        assert_eq!(store.append_offer(&counter(&session, 2, 1)).await.unwrap(), 2);
        let err = store.append_offer(&counter(&session, 3, 1)).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionMismatch));

        let timeline = store.load(session.id).await.unwrap();
        assert_eq!(timeline.session.version, 2);
        assert_eq!(timeline.session.driver_id, Some(Uuid::from_u128(2)));
        assert_eq!(timeline.offers.len(), 2);
    }

    #[tokio::test]
    async fn terminal_session_refuses_writes() {
        let store = MemorySessionStore::new();
        let now = OffsetDateTime::now_utc();
        let (session, offer) = fixture(now);
        store.create(&session, &offer).await.unwrap();

        let withdraw = Termination {
            session_id: session.id,
            expected_version: 1,
            status: SessionStatus::Withdrawn,
            actor: Some(Actor::rider(session.rider_id)),
            bind_driver: None,
            at: now,
        };
        assert_eq!(store.terminate(&withdraw).await.unwrap(), 2);
        let err = store.append_offer(&counter(&session, 2, 2)).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionMismatch));
        assert!(store.scan_expiring(now + Duration::from_secs(999), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn injected_faults_are_transient() {
        let store = MemorySessionStore::new();
        store.fail_next(1);
        let err = store.load(Uuid::nil()).await.unwrap_err();
        assert!(err.is_transient());
        assert!(matches!(store.load(Uuid::nil()).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn reject_marks_binding_without_touching_version() {
        let store = MemorySessionStore::new();
        let now = OffsetDateTime::now_utc();
        let (session, offer) = fixture(now);
        store.create(&session, &offer).await.unwrap();

        store.mark_rejected(session.id, Uuid::from_u128(9), now).await.unwrap();
        let timeline = store.load(session.id).await.unwrap();
        assert_eq!(timeline.session.version, 1);
        assert_eq!(timeline.rejected_drivers(), vec![Uuid::from_u128(9)]);
    }
}
