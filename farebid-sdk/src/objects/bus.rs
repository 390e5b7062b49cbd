//! Event-bus envelope delivered to downstream consumers (matchmaking,
//! billing, analytics).

use serde::{Deserialize, Serialize};

use super::push::PushEventType;
use super::session::SessionSnapshotView;
use crate::signature::Signature;

/// Bus message published after every committed transition.
///
/// Delivery is at-least-once; consumers deduplicate on
/// `(session.id, version)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusMessage {
    /// `negotiation.<type>`, e.g. `negotiation.accepted`.
    pub subject: String,
    #[serde(rename = "type")]
    pub event_type: PushEventType,
    pub version: i64,
    pub session: SessionSnapshotView,
    /// Unix timestamp of the commit.
    pub occurred_at: i64,
}

impl Signature for BusMessage {}

impl BusMessage {
    pub fn subject_for(event_type: PushEventType) -> String {
        format!("negotiation.{}", event_type.as_str())
    }

    /// Deduplication key for consumers.
    pub fn dedup_key(&self) -> (uuid::Uuid, i64) {
        (self.session.id, self.version)
    }
}
