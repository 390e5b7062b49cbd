//! In-process registry of live push subscriptions, grouped per session.
//!
//! Each subscriber owns a bounded queue. Publishing never blocks: a full
//! queue means the subscriber is too slow and it is dropped. Delivery
//! happens under the group lock so every subscriber sees events in the
//! order they were published, and an event older than the last one
//! published for the session is discarded.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::events::NegotiationEvent;

/// Default per-subscriber queue depth.
pub const DEFAULT_PUSH_BUFFER: usize = 32;

pub type PushReceiver = mpsc::Receiver<Arc<NegotiationEvent>>;

struct Subscriber {
    id: u64,
    actor_id: Uuid,
    sender: mpsc::Sender<Arc<NegotiationEvent>>,
    evicted: Arc<AtomicBool>,
}

#[derive(Default)]
struct GroupState {
    subscribers: Vec<Subscriber>,
    last_version: i64,
}

#[derive(Default)]
struct SessionGroup {
    state: Mutex<GroupState>,
}

/// Handle returned by [`PushHub::subscribe`]. The receiver yields events
/// until the session closes or the subscriber is dropped.
#[derive(Debug)]
pub struct PushSubscription {
    pub id: u64,
    pub session_id: Uuid,
    pub receiver: PushReceiver,
    evicted: Arc<AtomicBool>,
}

impl PushSubscription {
    /// `true` if the hub dropped this subscriber for falling behind.
    pub fn was_evicted(&self) -> bool {
        self.evicted.load(Ordering::Relaxed)
    }
}

pub struct PushHub {
    groups: DashMap<Uuid, Arc<SessionGroup>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl Default for PushHub {
    fn default() -> Self {
        Self::new(DEFAULT_PUSH_BUFFER)
    }
}

impl PushHub {
    pub fn new(buffer: usize) -> Self {
        Self {
            groups: DashMap::new(),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    fn group(&self, session_id: Uuid) -> Option<Arc<SessionGroup>> {
        self.groups.get(&session_id).map(|g| Arc::clone(g.value()))
    }

    /// Register `actor_id` for events of `session_id`. Authorization is the
    /// caller's job.
    pub fn subscribe(&self, session_id: Uuid, actor_id: Uuid) -> PushSubscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.buffer);
        let evicted = Arc::new(AtomicBool::new(false));
        // Push while the map entry is held so a concurrent `drop_if_empty`
        // cannot orphan the group.
        let entry = self.groups.entry(session_id).or_default();
        entry.value().state.lock().subscribers.push(Subscriber {
            id,
            actor_id,
            sender,
            evicted: Arc::clone(&evicted),
        });
        drop(entry);
        debug!(%session_id, %actor_id, subscription = id, "Push subscriber added");
        PushSubscription {
            id,
            session_id,
            receiver,
            evicted,
        }
    }

    pub fn unsubscribe(&self, session_id: Uuid, subscription_id: u64) {
        if let Some(group) = self.group(session_id) {
            group
                .state
                .lock()
                .subscribers
                .retain(|s| s.id != subscription_id);
        }
        self.drop_if_empty(session_id);
    }

    /// Drops every subscription `actor_id` holds on the session.
    pub fn remove_actor(&self, session_id: Uuid, actor_id: Uuid) -> usize {
        let Some(group) = self.group(session_id) else {
            return 0;
        };
        let removed = {
            let mut state = group.state.lock();
            let before = state.subscribers.len();
            state.subscribers.retain(|s| s.actor_id != actor_id);
            before - state.subscribers.len()
        };
        self.drop_if_empty(session_id);
        removed
    }

    /// Delivers `event` to every subscriber of its session. Returns the
    /// number of subscribers that accepted it.
    pub fn publish(&self, event: NegotiationEvent) -> usize {
        let session_id = event.snapshot.id;
        let Some(group) = self.group(session_id) else {
            return 0;
        };
        let version = event.version();
        let event = Arc::new(event);
        let delivered = {
            let mut state = group.state.lock();
            if version <= state.last_version {
                debug!(%session_id, version, last = state.last_version, "Stale push event skipped");
                return 0;
            }
            state.last_version = version;
            state.subscribers.retain(|s| {
                match s.sender.try_send(Arc::clone(&event)) {
                    Ok(()) => true,
                    Err(TrySendError::Full(_)) => {
                        warn!(%session_id, subscription = s.id, "Dropping slow push subscriber");
                        s.evicted.store(true, Ordering::Relaxed);
                        false
                    }
                    Err(TrySendError::Closed(_)) => false,
                }
            });
            state.subscribers.len()
        };
        self.drop_if_empty(session_id);
        delivered
    }

    /// Ends every subscription on the session. Queued events are still
    /// delivered before the receivers report closed.
    pub fn close(&self, session_id: Uuid) {
        if let Some((_, group)) = self.groups.remove(&session_id) {
            group.state.lock().subscribers.clear();
        }
    }

    pub fn subscriber_count(&self, session_id: Uuid) -> usize {
        self.group(session_id)
            .map(|g| g.state.lock().subscribers.len())
            .unwrap_or(0)
    }

    fn drop_if_empty(&self, session_id: Uuid) {
        self.groups
            .remove_if(&session_id, |_, g| g.state.lock().subscribers.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{PartyRole, SessionStatus};
    use crate::events::EventKind;
    use crate::model::{Offer, SessionSnapshot};
    use rust_decimal::Decimal;
    use time::OffsetDateTime;

    fn event(session_id: Uuid, version: i64, kind: EventKind) -> NegotiationEvent {
        let now = OffsetDateTime::now_utc();
        NegotiationEvent {
            kind,
            occurred_at: now,
            snapshot: SessionSnapshot {
                id: session_id,
                rider_id: Uuid::from_u128(1),
                driver_id: None,
                currency: "INR".into(),
                floor: Decimal::from(40),
                ceiling: Decimal::from(100),
                status: SessionStatus::Countered,
                current_offer: Offer {
                    id: Uuid::now_v7(),
                    session_id,
                    ordinal: version as i32,
                    originator: PartyRole::Driver,
                    amount: Decimal::from(60),
                    currency: "INR".into(),
                    created_at: now,
                },
                created_at: now,
                updated_at: now,
                deadline_at: now,
                version,
                closed_by: None,
                rejected_drivers: Vec::new(),
            },
        }
    }

    #[tokio::test]
    async fn delivers_in_version_order_and_skips_stale() {
        let hub = PushHub::new(8);
        let session = Uuid::now_v7();
        let mut sub = hub.subscribe(session, Uuid::from_u128(1));

        assert_eq!(hub.publish(event(session, 2, EventKind::Countered)), 1);
        assert_eq!(hub.publish(event(session, 4, EventKind::Countered)), 1);
        assert_eq!(hub.publish(event(session, 3, EventKind::Countered)), 0);

        assert_eq!(sub.receiver.recv().await.unwrap().version(), 2);
        assert_eq!(sub.receiver.recv().await.unwrap().version(), 4);
        assert!(sub.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn slow_subscriber_is_dropped_without_blocking_others() {
        let hub = PushHub::new(1);
        let session = Uuid::now_v7();
        let slow = hub.subscribe(session, Uuid::from_u128(1));
        let mut fast = hub.subscribe(session, Uuid::from_u128(2));

        assert_eq!(hub.publish(event(session, 2, EventKind::Countered)), 2);
        fast.receiver.recv().await.unwrap();
        assert_eq!(hub.publish(event(session, 3, EventKind::Countered)), 1);
        assert!(slow.was_evicted());
        assert!(!fast.was_evicted());
        assert_eq!(hub.subscriber_count(session), 1);
    }

    #[tokio::test]
    async fn close_ends_streams_after_queued_events() {
        let hub = PushHub::new(8);
        let session = Uuid::now_v7();
        let mut sub = hub.subscribe(session, Uuid::from_u128(1));

        hub.publish(event(session, 2, EventKind::Accepted));
        hub.close(session);

        assert_eq!(sub.receiver.recv().await.unwrap().kind, EventKind::Accepted);
        assert!(sub.receiver.recv().await.is_none());
        assert_eq!(hub.subscriber_count(session), 0);
    }

    #[tokio::test]
    async fn remove_actor_only_drops_that_actor() {
        let hub = PushHub::new(8);
        let session = Uuid::now_v7();
        let mut leaving = hub.subscribe(session, Uuid::from_u128(7));
        let _staying = hub.subscribe(session, Uuid::from_u128(8));

        assert_eq!(hub.remove_actor(session, Uuid::from_u128(7)), 1);
        assert!(leaving.receiver.recv().await.is_none());
        assert_eq!(hub.subscriber_count(session), 1);
    }
}
