//! WebSocket frames for the negotiation push stream.
//!
//! `GET /negotiation/ws?session_id={id}` upgrades to a WebSocket connection
//! and pushes [`PushFrame`] JSON objects.
//!
//! # Protocol
//!
//! 1. The server sends a frame of type [`PushEventType::Snapshot`] with the
//!    current session state immediately after the upgrade.
//! 2. One frame is sent per committed state transition, in version order.
//! 3. After a terminal frame (`accepted`, `rejected`, `withdrawn`,
//!    `expired`) the server sends a normal close frame.
//! 4. A client that cannot keep up is disconnected. Clients reconcile by
//!    re-fetching the session and comparing `version`.

use serde::{Deserialize, Serialize};

use super::session::SessionSnapshotView;

/// Kind of event carried by a [`PushFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushEventType {
    /// Current state at subscription time. Not a transition.
    Snapshot,
    Created,
    Countered,
    Accepted,
    Rejected,
    Withdrawn,
    Expired,
}

impl PushEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            PushEventType::Snapshot => "snapshot",
            PushEventType::Created => "created",
            PushEventType::Countered => "countered",
            PushEventType::Accepted => "accepted",
            PushEventType::Rejected => "rejected",
            PushEventType::Withdrawn => "withdrawn",
            PushEventType::Expired => "expired",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PushEventType::Accepted
                | PushEventType::Rejected
                | PushEventType::Withdrawn
                | PushEventType::Expired
        )
    }
}

/// Server-to-client push frame.
///
/// ```json
/// {"type":"countered","version":2,"session":{ ... }}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushFrame {
    #[serde(rename = "type")]
    pub event_type: PushEventType,
    pub version: i64,
    pub session: SessionSnapshotView,
}

/// Well-known WebSocket close codes used by the push stream.
///
/// Codes in the 4000–4999 range are reserved for application use by
/// [RFC 6455 §7.4.2](https://www.rfc-editor.org/rfc/rfc6455#section-7.4.2).
pub struct WsCloseCode;

impl WsCloseCode {
    /// Normal closure after a terminal frame has been delivered.
    pub const NORMAL: u16 = 1000;

    /// The server is shutting down or dropped the subscription.
    pub const GOING_AWAY: u16 = 1001;

    /// An unexpected server-side error prevented the connection from
    /// continuing.
    pub const INTERNAL_ERROR: u16 = 1011;

    /// The actor is not a participant of the session.
    pub const NOT_PARTICIPANT: u16 = 4003;

    /// The requested session does not exist.
    pub const SESSION_NOT_FOUND: u16 = 4004;

    /// The client could not keep up and was dropped.
    pub const SLOW_CONSUMER: u16 = 4008;
}
