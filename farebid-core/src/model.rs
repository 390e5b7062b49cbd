//! Negotiation aggregate: a session, its append-only offer log and the
//! participants bound to it.

use compact_str::CompactString;
use farebid_sdk::objects::{OfferView, SessionSnapshotView, SessionView};
use itertools::Itertools;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::entities::{PartyRole, SessionStatus};

pub use farebid_sdk::objects::GeoPoint;

/// Authenticated caller identity, as asserted by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Actor {
    pub id: Uuid,
    pub role: PartyRole,
}

impl Actor {
    pub fn rider(id: Uuid) -> Self {
        Self {
            id,
            role: PartyRole::Rider,
        }
    }

    pub fn driver(id: Uuid) -> Self {
        Self {
            id,
            role: PartyRole::Driver,
        }
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.role, self.id)
    }
}

/// One immutable entry of the offer log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub id: Uuid,
    pub session_id: Uuid,
    pub ordinal: i32,
    pub originator: PartyRole,
    pub amount: Decimal,
    pub currency: CompactString,
    pub created_at: OffsetDateTime,
}

/// Binding of an actor to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub session_id: Uuid,
    pub actor_id: Uuid,
    pub role: PartyRole,
    pub bound_at: OffsetDateTime,
    pub rejected_at: Option<OffsetDateTime>,
}

/// Session row. `current_offer_id` names the latest entry of the offer log.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: Uuid,
    pub rider_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub pickup: GeoPoint,
    pub drop_off: GeoPoint,
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

/// Everything the store knows about one session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionTimeline {
    pub session: Session,
    /// Ordered by ordinal.
    pub offers: Vec<Offer>,
    pub participants: Vec<Participant>,
}

impl SessionTimeline {
    pub fn current_offer(&self) -> Option<&Offer> {
        self.offers
            .iter()
            .rev()
            .find(|offer| offer.id == self.session.current_offer_id)
    }

    pub fn rejected_drivers(&self) -> Vec<Uuid> {
        self.participants
            .iter()
            .filter(|p| p.role == PartyRole::Driver && p.rejected_at.is_some())
            .map(|p| p.actor_id)
            .collect()
    }

    /// Compact form used by the cache, push frames and the bus.
    ///
    /// Returns `None` if the session row points at an offer missing from the
    /// log.
    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        let current_offer = self.current_offer()?.clone();
        let s = &self.session;
        Some(SessionSnapshot {
            id: s.id,
            rider_id: s.rider_id,
            driver_id: s.driver_id,
            currency: s.currency.clone(),
            floor: s.floor,
            ceiling: s.ceiling,
            status: s.status,
            current_offer,
            created_at: s.created_at,
            updated_at: s.updated_at,
            deadline_at: s.deadline_at,
            version: s.version,
            closed_by: s.closed_by,
            rejected_drivers: self.rejected_drivers(),
        })
    }

    pub fn to_view(&self) -> Option<SessionView> {
        let s = &self.session;
        Some(SessionView {
            id: s.id,
            rider_id: s.rider_id,
            driver_id: s.driver_id,
            pickup: s.pickup,
            drop_off: s.drop_off,
            ride_type_id: s.ride_type_id.clone(),
            currency: s.currency.clone(),
            baseline: s.baseline,
            floor: s.floor,
            ceiling: s.ceiling,
            status: s.status.into(),
            current_offer: self.current_offer()?.into(),
            offers: self.offers.iter().map(OfferView::from).collect(),
            version: s.version,
            created_at: s.created_at.unix_timestamp(),
            deadline_at: s.deadline_at.unix_timestamp(),
        })
    }

    /// Checks the structural invariants of the offer log against the row.
    ///
    /// Returns a description of the first violation found.
    pub fn check_invariants(&self) -> Result<(), String> {
        let s = &self.session;
        let Some(first) = self.offers.first() else {
            return Err("offer log is empty".into());
        };
        if first.ordinal != 1 || first.originator != PartyRole::Rider {
            return Err(format!("first offer is #{} by {}", first.ordinal, first.originator));
        }
        if let Some((a, b)) = self
            .offers
            .iter()
            .tuple_windows()
            .find(|(a, b)| b.ordinal != a.ordinal + 1 || a.originator == b.originator)
        {
            return Err(format!(
                "offers #{} ({}) and #{} ({}) break alternation",
                a.ordinal, a.originator, b.ordinal, b.originator
            ));
        }
        let Some(last) = self.offers.last() else {
            return Err("offer log is empty".into());
        };
        if last.id != s.current_offer_id || last.originator != s.last_originator {
            return Err("session does not point at the latest offer".into());
        }
        if s.status.is_open() && (last.amount < s.floor || last.amount > s.ceiling) {
            return Err(format!(
                "current amount {} outside [{}, {}]",
                last.amount, s.floor, s.ceiling
            ));
        }
        if s.status == SessionStatus::Accepted && s.driver_id.is_none() {
            return Err("accepted session without a bound driver".into());
        }
        if self
            .offers
            .iter()
            .any(|o| o.originator == PartyRole::Driver && s.driver_id.is_none())
        {
            return Err("driver offer on a session without a bound driver".into());
        }
        Ok(())
    }
}

/// Compact session state held by the snapshot cache.
///
/// Carries everything the engine needs to validate a mutation without
/// reading the offer log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub rider_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub currency: CompactString,
    pub floor: Decimal,
    pub ceiling: Decimal,
    pub status: SessionStatus,
    pub current_offer: Offer,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub deadline_at: OffsetDateTime,
    pub version: i64,
    pub closed_by: Option<Uuid>,
    pub rejected_drivers: Vec<Uuid>,
}

impl SessionSnapshot {
    pub fn to_view(&self) -> SessionSnapshotView {
        SessionSnapshotView {
            id: self.id,
            rider_id: self.rider_id,
            driver_id: self.driver_id,
            status: self.status.into(),
            version: self.version,
            current_offer: (&self.current_offer).into(),
            floor: self.floor,
            ceiling: self.ceiling,
            deadline_at: self.deadline_at.unix_timestamp(),
        }
    }
}

impl From<&Offer> for OfferView {
    fn from(offer: &Offer) -> Self {
        OfferView {
            id: offer.id,
            ordinal: offer.ordinal,
            originator: offer.originator.into(),
            amount: offer.amount,
            currency: offer.currency.clone(),
            created_at: offer.created_at.unix_timestamp(),
        }
    }
}
