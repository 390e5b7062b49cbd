pub mod offer_records;
pub mod participant_records;
pub mod session_records;

use farebid_sdk::objects::{PartyRole as SdkPartyRole, SessionStatus as SdkSessionStatus};

/// Negotiation status for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `farebid_sdk::objects::SessionStatus`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type, serde::Serialize, serde::Deserialize,
)]
#[sqlx(rename_all = "lowercase", type_name = "negotiation_status")]
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
    pub fn is_open(self) -> bool {
        matches!(self, SessionStatus::Proposed | SessionStatus::Countered)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_open()
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        SdkSessionStatus::from(*self).fmt(f)
    }
}

impl From<SessionStatus> for SdkSessionStatus {
    fn from(value: SessionStatus) -> Self {
        match value {
            SessionStatus::Proposed => SdkSessionStatus::Proposed,
            SessionStatus::Countered => SdkSessionStatus::Countered,
            SessionStatus::Accepted => SdkSessionStatus::Accepted,
            SessionStatus::Rejected => SdkSessionStatus::Rejected,
            SessionStatus::Withdrawn => SdkSessionStatus::Withdrawn,
            SessionStatus::Expired => SdkSessionStatus::Expired,
        }
    }
}

impl From<SdkSessionStatus> for SessionStatus {
    fn from(value: SdkSessionStatus) -> Self {
        match value {
            SdkSessionStatus::Proposed => SessionStatus::Proposed,
            SdkSessionStatus::Countered => SessionStatus::Countered,
            SdkSessionStatus::Accepted => SessionStatus::Accepted,
            SdkSessionStatus::Rejected => SessionStatus::Rejected,
            SdkSessionStatus::Withdrawn => SessionStatus::Withdrawn,
            SdkSessionStatus::Expired => SessionStatus::Expired,
        }
    }
}

/// Party role for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `farebid_sdk::objects::PartyRole`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type, serde::Serialize, serde::Deserialize,
)]
#[sqlx(rename_all = "lowercase", type_name = "party_role")]
#[serde(rename_all = "lowercase")]
pub enum PartyRole {
    Rider,
    Driver,
}

impl PartyRole {
    pub fn other(self) -> Self {
        match self {
            PartyRole::Rider => PartyRole::Driver,
            PartyRole::Driver => PartyRole::Rider,
        }
    }
}

impl std::fmt::Display for PartyRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        SdkPartyRole::from(*self).fmt(f)
    }
}

impl From<PartyRole> for SdkPartyRole {
    fn from(value: PartyRole) -> Self {
        match value {
            PartyRole::Rider => SdkPartyRole::Rider,
            PartyRole::Driver => SdkPartyRole::Driver,
        }
    }
}

impl From<SdkPartyRole> for PartyRole {
    fn from(value: SdkPartyRole) -> Self {
        match value {
            SdkPartyRole::Rider => PartyRole::Rider,
            SdkPartyRole::Driver => PartyRole::Driver,
        }
    }
}
