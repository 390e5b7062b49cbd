use compact_str::CompactString;
use rust_decimal::Decimal;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::entities::PartyRole;
use crate::model::Offer;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct OfferRecord {
    pub id: Uuid,
    pub session_id: Uuid,
    pub ordinal: i32,
    pub originator: PartyRole,
    pub amount: Decimal,
    pub currency: CompactString,
    pub created_at: OffsetDateTime,
}

impl From<OfferRecord> for Offer {
    fn from(r: OfferRecord) -> Self {
        Offer {
            id: r.id,
            session_id: r.session_id,
            ordinal: r.ordinal,
            originator: r.originator,
            amount: r.amount,
            currency: r.currency,
            created_at: r.created_at,
        }
    }
}

impl OfferRecord {
    /// Append one offer. The `(session_id, ordinal)` unique key rejects a
    /// second writer for the same position.
    pub async fn insert_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        offer: &Offer,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO negotiation_offers (id, session_id, ordinal, originator, amount, currency, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(offer.id)
        .bind(offer.session_id)
        .bind(offer.ordinal)
        .bind(offer.originator)
        .bind(offer.amount)
        .bind(offer.currency.as_str())
        .bind(offer.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn list_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        session_id: Uuid,
    ) -> Result<Vec<OfferRecord>, sqlx::Error> {
        sqlx::query_as::<_, OfferRecord>(
            r#"
            SELECT id, session_id, ordinal, originator, amount, currency, created_at
            FROM negotiation_offers
            WHERE session_id = $1
            ORDER BY ordinal
            "#,
        )
        .bind(session_id)
        .fetch_all(&mut **tx)
        .await
    }
}
