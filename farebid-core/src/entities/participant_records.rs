use kanau::processor::Processor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::entities::PartyRole;
use crate::framework::DatabaseProcessor;
use crate::model::Participant;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ParticipantRecord {
    pub session_id: Uuid,
    pub actor_id: Uuid,
    pub role: PartyRole,
    pub bound_at: OffsetDateTime,
    pub rejected_at: Option<OffsetDateTime>,
}

impl From<ParticipantRecord> for Participant {
    fn from(r: ParticipantRecord) -> Self {
        Participant {
            session_id: r.session_id,
            actor_id: r.actor_id,
            role: r.role,
            bound_at: r.bound_at,
            rejected_at: r.rejected_at,
        }
    }
}

impl ParticipantRecord {
    /// Idempotent: an existing binding is left untouched.
    pub async fn bind_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        session_id: Uuid,
        actor_id: Uuid,
        role: PartyRole,
        at: OffsetDateTime,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO negotiation_participants (session_id, actor_id, role, bound_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (session_id, actor_id) DO NOTHING
            "#,
        )
        .bind(session_id)
        .bind(actor_id)
        .bind(role)
        .bind(at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn list_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        session_id: Uuid,
    ) -> Result<Vec<ParticipantRecord>, sqlx::Error> {
        sqlx::query_as::<_, ParticipantRecord>(
            r#"
            SELECT session_id, actor_id, role, bound_at, rejected_at
            FROM negotiation_participants
            WHERE session_id = $1
            ORDER BY bound_at
            "#,
        )
        .bind(session_id)
        .fetch_all(&mut **tx)
        .await
    }
}

#[derive(Debug, Clone)]
/// Bind an actor to a session outside of a state transition (driver join).
///
/// Returns `true` if a new binding was written.
pub struct BindParticipant {
    pub participant: Participant,
}

impl Processor<BindParticipant> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:BindParticipant")]
    async fn process(&self, cmd: BindParticipant) -> Result<bool, sqlx::Error> {
        let p = cmd.participant;
        let result = sqlx::query(
            r#"
            INSERT INTO negotiation_participants (session_id, actor_id, role, bound_at, rejected_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (session_id, actor_id) DO NOTHING
            "#,
        )
        .bind(p.session_id)
        .bind(p.actor_id)
        .bind(p.role)
        .bind(p.bound_at)
        .bind(p.rejected_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, Clone)]
/// Record that a not-yet-bound driver declined the session.
pub struct MarkParticipantRejected {
    pub session_id: Uuid,
    pub actor_id: Uuid,
    pub at: OffsetDateTime,
}

impl Processor<MarkParticipantRejected> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:MarkParticipantRejected")]
    async fn process(&self, cmd: MarkParticipantRejected) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO negotiation_participants (session_id, actor_id, role, bound_at, rejected_at)
            VALUES ($1, $2, 'driver', $3, $3)
            ON CONFLICT (session_id, actor_id)
            DO UPDATE SET rejected_at = COALESCE(negotiation_participants.rejected_at, EXCLUDED.rejected_at)
            "#,
        )
        .bind(cmd.session_id)
        .bind(cmd.actor_id)
        .bind(cmd.at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
