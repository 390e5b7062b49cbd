use compact_str::CompactString;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Negotiation session status for API responses.
///
/// This is the API/DTO version without sqlx::Type.
/// For database operations, use the version in `farebid-core::entities`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Proposed,
    Countered,
    Accepted,
    Rejected,
    Withdrawn,
    Expired,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Accepted
                | SessionStatus::Rejected
                | SessionStatus::Withdrawn
                | SessionStatus::Expired
        )
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Proposed => write!(f, "proposed"),
            SessionStatus::Countered => write!(f, "countered"),
            SessionStatus::Accepted => write!(f, "accepted"),
            SessionStatus::Rejected => write!(f, "rejected"),
            SessionStatus::Withdrawn => write!(f, "withdrawn"),
            SessionStatus::Expired => write!(f, "expired"),
        }
    }
}

/// Which side of the negotiation an actor is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyRole {
    Rider,
    Driver,
}

impl PartyRole {
    pub fn as_str(self) -> &'static str {
        match self {
            PartyRole::Rider => "rider",
            PartyRole::Driver => "driver",
        }
    }
}

impl std::fmt::Display for PartyRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PartyRole {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rider" => Ok(PartyRole::Rider),
            "driver" => Ok(PartyRole::Driver),
            _ => Err(UnknownRole),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown party role")]
pub struct UnknownRole;

/// WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// Request payload for opening a negotiation session.
///
/// Sent by the rider through the API gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub pickup: GeoPoint,
    #[serde(rename = "drop")]
    pub drop_off: GeoPoint,
    pub ride_type_id: CompactString,
    pub initial_amount: Decimal,
    pub currency: CompactString,
}

/// Request payload for a counter-offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterRequest {
    pub amount: Decimal,
}

/// One entry of the offer log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferView {
    pub id: Uuid,
    pub ordinal: i32,
    pub originator: PartyRole,
    pub amount: Decimal,
    pub currency: CompactString,
    /// Unix timestamp of when the offer was made.
    pub created_at: i64,
}

/// Full session state returned by every session endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionView {
    pub id: Uuid,
    pub rider_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub pickup: GeoPoint,
    #[serde(rename = "drop")]
    pub drop_off: GeoPoint,
    pub ride_type_id: CompactString,
    pub currency: CompactString,
    pub baseline: Decimal,
    pub floor: Decimal,
    pub ceiling: Decimal,
    pub status: SessionStatus,
    pub current_offer: OfferView,
    /// Offer log ordered by ordinal.
    pub offers: Vec<OfferView>,
    pub version: i64,
    /// Unix timestamp of when the session was opened.
    pub created_at: i64,
    /// Unix timestamp after which the session expires unless extended.
    pub deadline_at: i64,
}

/// Compact session state carried by push frames and bus messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshotView {
    pub id: Uuid,
    pub rider_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub status: SessionStatus,
    pub version: i64,
    pub current_offer: OfferView,
    pub floor: Decimal,
    pub ceiling: Decimal,
    pub deadline_at: i64,
}
