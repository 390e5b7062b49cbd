use farebid_sdk::objects::{BusMessage, PushEventType, PushFrame};
use time::OffsetDateTime;

use crate::entities::SessionStatus;
use crate::model::SessionSnapshot;

/// What happened to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Created,
    Countered,
    Accepted,
    Rejected,
    Withdrawn,
    Expired,
}

impl EventKind {
    /// Event for a transition into `status`.
    pub fn for_status(status: SessionStatus) -> Self {
        match status {
            SessionStatus::Proposed => EventKind::Created,
            SessionStatus::Countered => EventKind::Countered,
            SessionStatus::Accepted => EventKind::Accepted,
            SessionStatus::Rejected => EventKind::Rejected,
            SessionStatus::Withdrawn => EventKind::Withdrawn,
            SessionStatus::Expired => EventKind::Expired,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EventKind::Accepted | EventKind::Rejected | EventKind::Withdrawn | EventKind::Expired
        )
    }
}

impl From<EventKind> for PushEventType {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Created => PushEventType::Created,
            EventKind::Countered => PushEventType::Countered,
            EventKind::Accepted => PushEventType::Accepted,
            EventKind::Rejected => PushEventType::Rejected,
            EventKind::Withdrawn => PushEventType::Withdrawn,
            EventKind::Expired => PushEventType::Expired,
        }
    }
}

/// A committed transition, carrying the post-commit snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationEvent {
    pub kind: EventKind,
    pub snapshot: SessionSnapshot,
    pub occurred_at: OffsetDateTime,
}

impl NegotiationEvent {
    pub fn version(&self) -> i64 {
        self.snapshot.version
    }

    pub fn to_push_frame(&self) -> PushFrame {
        PushFrame {
            event_type: self.kind.into(),
            version: self.snapshot.version,
            session: self.snapshot.to_view(),
        }
    }

    pub fn to_bus_message(&self) -> BusMessage {
        let event_type = PushEventType::from(self.kind);
        BusMessage {
            subject: BusMessage::subject_for(event_type),
            event_type,
            version: self.snapshot.version,
            session: self.snapshot.to_view(),
            occurred_at: self.occurred_at.unix_timestamp(),
        }
    }
}
