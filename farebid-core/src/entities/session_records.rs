use compact_str::CompactString;
use kanau::processor::Processor;
use rust_decimal::Decimal;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::entities::offer_records::OfferRecord;
use crate::entities::participant_records::ParticipantRecord;
use crate::entities::{PartyRole, SessionStatus};
use crate::framework::DatabaseProcessor;
use crate::model::{GeoPoint, Offer, Session};

const SESSION_COLUMNS: &str = r#"
    id, rider_id, driver_id,
    pickup_lat, pickup_lng, drop_lat, drop_lng,
    ride_type_id, currency, baseline, floor, ceiling,
    status, current_offer_id, last_originator,
    created_at, updated_at, deadline_at, version, closed_by
"#;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct SessionRecord {
    pub id: Uuid,
    pub rider_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub pickup_lat: f64,
    pub pickup_lng: f64,
    pub drop_lat: f64,
    pub drop_lng: f64,
    pub ride_type_id: CompactString,
    pub currency: CompactString,
    pub baseline: Decimal,
    pub floor: Decimal,
    pub ceiling: Decimal,
    pub status: SessionStatus,
    pub current_offer_id: Uuid,
    pub last_originator: PartyRole,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub deadline_at: OffsetDateTime,
    pub version: i64,
    pub closed_by: Option<Uuid>,
}

impl From<SessionRecord> for Session {
    fn from(r: SessionRecord) -> Self {
        Session {
            id: r.id,
            rider_id: r.rider_id,
            driver_id: r.driver_id,
            pickup: GeoPoint {
                lat: r.pickup_lat,
                lng: r.pickup_lng,
            },
            drop_off: GeoPoint {
                lat: r.drop_lat,
                lng: r.drop_lng,
            },
            ride_type_id: r.ride_type_id,
            currency: r.currency,
            baseline: r.baseline,
            floor: r.floor,
            ceiling: r.ceiling,
            status: r.status,
            current_offer_id: r.current_offer_id,
            last_originator: r.last_originator,
            created_at: r.created_at,
            updated_at: r.updated_at,
            deadline_at: r.deadline_at,
            version: r.version,
            closed_by: r.closed_by,
        }
    }
}

#[derive(Debug, Clone)]
/// Insert a new session together with its first offer and the rider binding.
pub struct InsertSession {
    pub session: Session,
    pub first_offer: Offer,
}

impl Processor<InsertSession> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertSession")]
    async fn process(&self, cmd: InsertSession) -> Result<(), sqlx::Error> {
        let s = &cmd.session;
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO negotiation_sessions (
                id, rider_id, driver_id,
                pickup_lat, pickup_lng, drop_lat, drop_lng,
                ride_type_id, currency, baseline, floor, ceiling,
                status, current_offer_id, last_originator,
                created_at, updated_at, deadline_at, version, closed_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            "#,
        )
        .bind(s.id)
        .bind(s.rider_id)
        .bind(s.driver_id)
        .bind(s.pickup.lat)
        .bind(s.pickup.lng)
        .bind(s.drop_off.lat)
        .bind(s.drop_off.lng)
        .bind(s.ride_type_id.as_str())
        .bind(s.currency.as_str())
        .bind(s.baseline)
        .bind(s.floor)
        .bind(s.ceiling)
        .bind(s.status)
        .bind(s.current_offer_id)
        .bind(s.last_originator)
        .bind(s.created_at)
        .bind(s.updated_at)
        .bind(s.deadline_at)
        .bind(s.version)
        .bind(s.closed_by)
        .execute(&mut *tx)
        .await?;
        OfferRecord::insert_tx(&mut tx, &cmd.first_offer).await?;
        ParticipantRecord::bind_tx(&mut tx, s.id, s.rider_id, PartyRole::Rider, s.created_at)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct GetSessionById {
    pub session_id: Uuid,
}

impl Processor<GetSessionById> for DatabaseProcessor {
    type Output = Option<SessionRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetSessionById")]
    async fn process(&self, query: GetSessionById) -> Result<Option<SessionRecord>, sqlx::Error> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM negotiation_sessions WHERE id = $1");
        sqlx::query_as::<_, SessionRecord>(&sql)
            .bind(query.session_id)
            .fetch_optional(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
/// Read the row, offer log and bindings from one consistent snapshot.
pub struct LoadSessionTimeline {
    pub session_id: Uuid,
}

pub type SessionTimelineRecords = (SessionRecord, Vec<OfferRecord>, Vec<ParticipantRecord>);

impl Processor<LoadSessionTimeline> for DatabaseProcessor {
    type Output = Option<SessionTimelineRecords>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:LoadSessionTimeline")]
    async fn process(
        &self,
        query: LoadSessionTimeline,
    ) -> Result<Option<SessionTimelineRecords>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;
        let sql = format!("SELECT {SESSION_COLUMNS} FROM negotiation_sessions WHERE id = $1");
        let Some(session) = sqlx::query_as::<_, SessionRecord>(&sql)
            .bind(query.session_id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            tx.rollback().await?;
            return Ok(None);
        };
        let offers = OfferRecord::list_tx(&mut tx, query.session_id).await?;
        let participants = ParticipantRecord::list_tx(&mut tx, query.session_id).await?;
        tx.commit().await?;
        Ok(Some((session, offers, participants)))
    }
}

#[derive(Debug, Clone)]
/// Compare-and-set: append an offer and move the session forward.
///
/// Returns the new version, or `None` when the session is not open at
/// `expected_version`.
pub struct CasAppendOffer {
    pub expected_version: i64,
    pub offer: Offer,
    pub status: SessionStatus,
    pub deadline_at: OffsetDateTime,
    pub bind_driver: Option<Uuid>,
    pub actor_id: Uuid,
}

impl Processor<CasAppendOffer> for DatabaseProcessor {
    type Output = Option<i64>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:CasAppendOffer")]
    async fn process(&self, cmd: CasAppendOffer) -> Result<Option<i64>, sqlx::Error> {
        let offer = &cmd.offer;
        let mut tx = self.pool.begin().await?;
        let version: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE negotiation_sessions
            SET status = $3,
                current_offer_id = $4,
                last_originator = $5,
                deadline_at = $6,
                driver_id = COALESCE(driver_id, $7),
                updated_at = $8,
                version = version + 1
            WHERE id = $1
              AND version = $2
              AND status IN ('proposed', 'countered')
            RETURNING version
            "#,
        )
        .bind(offer.session_id)
        .bind(cmd.expected_version)
        .bind(cmd.status)
        .bind(offer.id)
        .bind(offer.originator)
        .bind(cmd.deadline_at)
        .bind(cmd.bind_driver)
        .bind(offer.created_at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(version) = version else {
            tx.rollback().await?;
            return Ok(None);
        };
        OfferRecord::insert_tx(&mut tx, offer).await?;
        ParticipantRecord::bind_tx(
            &mut tx,
            offer.session_id,
            cmd.actor_id,
            offer.originator,
            offer.created_at,
        )
        .await?;
        tx.commit().await?;
        Ok(Some(version))
    }
}

#[derive(Debug, Clone)]
/// Compare-and-set: move an open session to a terminal status.
///
/// Returns the new version, or `None` when the session is not open at
/// `expected_version`.
pub struct CasTerminateSession {
    pub session_id: Uuid,
    pub expected_version: i64,
    pub status: SessionStatus,
    pub closed_by: Option<Uuid>,
    pub closed_by_role: Option<PartyRole>,
    pub bind_driver: Option<Uuid>,
    pub at: OffsetDateTime,
}

impl Processor<CasTerminateSession> for DatabaseProcessor {
    type Output = Option<i64>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:CasTerminateSession")]
    async fn process(&self, cmd: CasTerminateSession) -> Result<Option<i64>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let version: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE negotiation_sessions
            SET status = $3,
                closed_by = $4,
                driver_id = COALESCE(driver_id, $5),
                updated_at = $6,
                version = version + 1
            WHERE id = $1
              AND version = $2
              AND status IN ('proposed', 'countered')
            RETURNING version
            "#,
        )
        .bind(cmd.session_id)
        .bind(cmd.expected_version)
        .bind(cmd.status)
        .bind(cmd.closed_by)
        .bind(cmd.bind_driver)
        .bind(cmd.at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(version) = version else {
            tx.rollback().await?;
            return Ok(None);
        };
        if let (Some(actor_id), Some(role)) = (cmd.closed_by, cmd.closed_by_role) {
            ParticipantRecord::bind_tx(&mut tx, cmd.session_id, actor_id, role, cmd.at).await?;
        }
        tx.commit().await?;
        Ok(Some(version))
    }
}

#[derive(Debug, Clone)]
/// Open sessions whose deadline is at or before `before`, oldest first.
pub struct ScanExpiringSessions {
    pub before: OffsetDateTime,
    pub limit: i64,
}

impl Processor<ScanExpiringSessions> for DatabaseProcessor {
    type Output = Vec<Uuid>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ScanExpiringSessions")]
    async fn process(&self, query: ScanExpiringSessions) -> Result<Vec<Uuid>, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT id
            FROM negotiation_sessions
            WHERE status IN ('proposed', 'countered')
              AND deadline_at <= $1
            ORDER BY deadline_at
            LIMIT $2
            "#,
        )
        .bind(query.before)
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct CountOpenSessionsForRider {
    pub rider_id: Uuid,
}

impl Processor<CountOpenSessionsForRider> for DatabaseProcessor {
    type Output = i64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:CountOpenSessionsForRider")]
    async fn process(&self, query: CountOpenSessionsForRider) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM negotiation_sessions
            WHERE rider_id = $1
              AND status IN ('proposed', 'countered')
            "#,
        )
        .bind(query.rider_id)
        .fetch_one(&self.pool)
        .await
    }
}
