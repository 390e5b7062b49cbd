//! The session engine: the only writer of sessions and offers.
//!
//! Every mutation follows the same path:
//!
//! 1. Read the snapshot (cache first, store on miss).
//! 2. Decide the transition with [`rules::evaluate`]. A refusal based on a
//!    cached snapshot is re-checked once against the store.
//! 3. Commit with a compare-and-set on `version`. A lost race reloads and
//!    re-evaluates, up to `max_cas_retries` times.
//! 4. Write the new snapshot through to the cache and publish the event to
//!    the push hub and the bus.
//!
//! Step 3 runs inside the caller's deadline: a caller that gives up aborts
//! the write. Step 4 runs on its own task once the write has committed, so
//! a committed transition is always announced.

mod error;
pub mod rules;

pub use error::{ErrorKind, NegotiationError};
pub use rules::{Action, Transition};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use farebid_sdk::objects::CreateSessionRequest;
use rust_decimal::Decimal;
use time::OffsetDateTime;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cache::SnapshotCache;
use crate::clock::Clock;
use crate::config::{ConfigStore, NegotiationPolicy};
use crate::entities::{PartyRole, SessionStatus};
use crate::events::{BusSender, EventKind, NegotiationEvent};
use crate::model::{Actor, Offer, Participant, Session, SessionSnapshot, SessionTimeline};
use crate::pricing::{PricingOracle, QuoteRequest};
use crate::push::{PushHub, PushSubscription};
use crate::store::{OfferAppend, SessionStore, StoreError, Termination};
use crate::utils::backoff::store_backoff;

/// Point in time after which the caller no longer wants an answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    pub const NONE: Deadline = Deadline(None);

    pub fn within(budget: Duration) -> Self {
        Self(Some(Instant::now() + budget))
    }

    pub fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }

    /// The sooner of the two.
    pub fn min(self, other: Deadline) -> Self {
        match (self.0, other.0) {
            (Some(a), Some(b)) => Self(Some(a.min(b))),
            (a, b) => Self(a.or(b)),
        }
    }

    async fn run<T, F>(self, operation: F) -> Result<T, NegotiationError>
    where
        F: Future<Output = Result<T, NegotiationError>>,
    {
        match self.0 {
            None => operation.await,
            Some(at) => tokio::time::timeout_at(at, operation)
                .await
                .unwrap_or(Err(NegotiationError::DeadlineExceeded)),
        }
    }
}

/// Everything the engine depends on. All of it is injected.
pub struct EngineComponents {
    pub store: Arc<dyn SessionStore>,
    pub cache: Arc<dyn SnapshotCache>,
    pub pricing: Arc<dyn PricingOracle>,
    pub clock: Arc<dyn Clock>,
    pub push: Arc<PushHub>,
    pub bus: BusSender,
    pub policy: ConfigStore<NegotiationPolicy>,
}

#[derive(Clone)]
pub struct SessionEngine {
    parts: Arc<EngineComponents>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Cache,
    Store,
}

/// A versioned write and the snapshot it was planned against.
#[derive(Debug, Clone)]
enum Commit {
    Append {
        before: SessionSnapshot,
        append: OfferAppend,
    },
    Terminate {
        before: SessionSnapshot,
        termination: Termination,
    },
}

impl Commit {
    fn plan(
        before: &SessionSnapshot,
        actor: Actor,
        transition: Transition,
        offer_id: Uuid,
        now: OffsetDateTime,
    ) -> Option<Self> {
        match transition {
            Transition::Counter {
                amount,
                deadline_at,
                bind_driver,
            } => Some(Commit::Append {
                before: before.clone(),
                append: OfferAppend {
                    expected_version: before.version,
                    actor,
                    offer: Offer {
                        id: offer_id,
                        session_id: before.id,
                        ordinal: before.current_offer.ordinal + 1,
                        originator: actor.role,
                        amount,
                        currency: before.currency.clone(),
                        created_at: now,
                    },
                    status: SessionStatus::Countered,
                    deadline_at,
                    bind_driver,
                },
            }),
            Transition::Terminate {
                status,
                bind_driver,
            } => Some(Commit::Terminate {
                before: before.clone(),
                termination: Termination {
                    session_id: before.id,
                    expected_version: before.version,
                    status,
                    actor: Some(actor),
                    bind_driver,
                    at: now,
                },
            }),
            Transition::DriverRejected | Transition::Join | Transition::Observe => None,
        }
    }

    fn expiry(before: &SessionSnapshot, now: OffsetDateTime) -> Self {
        Commit::Terminate {
            before: before.clone(),
            termination: Termination {
                session_id: before.id,
                expected_version: before.version,
                status: SessionStatus::Expired,
                actor: None,
                bind_driver: None,
                at: now,
            },
        }
    }

    fn kind(&self) -> EventKind {
        match self {
            Commit::Append { append, .. } => EventKind::for_status(append.status),
            Commit::Terminate { termination, .. } => EventKind::for_status(termination.status),
        }
    }

    /// The snapshot the store now holds, given the version it returned.
    fn apply(&self, version: i64) -> SessionSnapshot {
        match self {
            Commit::Append { before, append } => SessionSnapshot {
                status: append.status,
                current_offer: append.offer.clone(),
                deadline_at: append.deadline_at,
                driver_id: before.driver_id.or(append.bind_driver),
                updated_at: append.offer.created_at,
                version,
                ..before.clone()
            },
            Commit::Terminate {
                before,
                termination,
            } => SessionSnapshot {
                status: termination.status,
                closed_by: termination.actor.map(|a| a.id),
                driver_id: before.driver_id.or(termination.bind_driver),
                updated_at: termination.at,
                version,
                ..before.clone()
            },
        }
    }

    fn before(&self) -> &SessionSnapshot {
        match self {
            Commit::Append { before, .. } | Commit::Terminate { before, .. } => before,
        }
    }

    /// Whether `fresh` already reflects this write, e.g. because an earlier
    /// attempt committed but its acknowledgement was lost.
    fn already_applied(&self, fresh: &SessionSnapshot) -> bool {
        match self {
            Commit::Append { append, .. } => fresh.current_offer.id == append.offer.id,
            Commit::Terminate { termination, .. } => {
                fresh.status == termination.status
                    && fresh.closed_by == termination.actor.map(|a| a.id)
            }
        }
    }
}

impl SessionEngine {
    pub fn new(components: EngineComponents) -> Self {
        Self {
            parts: Arc::new(components),
        }
    }

    pub fn push(&self) -> &PushHub {
        &self.parts.push
    }

    pub fn policy(&self) -> &ConfigStore<NegotiationPolicy> {
        &self.parts.policy
    }

    pub fn now(&self) -> OffsetDateTime {
        self.parts.clock.now()
    }

    /// Opens a session for `rider` priced by the pricing oracle.
    pub async fn create(
        &self,
        rider: Actor,
        request: CreateSessionRequest,
        deadline: Deadline,
    ) -> Result<SessionTimeline, NegotiationError> {
        deadline.run(self.open_session(rider, request)).await
    }

    pub async fn counter(
        &self,
        session_id: Uuid,
        actor: Actor,
        amount: Decimal,
        deadline: Deadline,
    ) -> Result<SessionTimeline, NegotiationError> {
        self.act(session_id, actor, Action::Counter(amount), deadline)
            .await
    }

    pub async fn accept(
        &self,
        session_id: Uuid,
        actor: Actor,
        deadline: Deadline,
    ) -> Result<SessionTimeline, NegotiationError> {
        self.act(session_id, actor, Action::Accept, deadline).await
    }

    pub async fn withdraw(
        &self,
        session_id: Uuid,
        actor: Actor,
        deadline: Deadline,
    ) -> Result<SessionTimeline, NegotiationError> {
        self.act(session_id, actor, Action::Withdraw, deadline).await
    }

    /// A bound driver ends the session; an unbound driver only leaves the
    /// fan-out and may not come back.
    pub async fn reject(
        &self,
        session_id: Uuid,
        actor: Actor,
        deadline: Deadline,
    ) -> Result<SessionTimeline, NegotiationError> {
        self.act(session_id, actor, Action::Reject, deadline).await
    }

    /// Explicit driver binding while the session is still unbound.
    pub async fn join(
        &self,
        session_id: Uuid,
        actor: Actor,
        deadline: Deadline,
    ) -> Result<SessionTimeline, NegotiationError> {
        self.act(session_id, actor, Action::Join, deadline).await
    }

    /// Full view with the ordered offer log, always read from the store.
    pub async fn get(
        &self,
        session_id: Uuid,
        actor: Actor,
        deadline: Deadline,
    ) -> Result<SessionTimeline, NegotiationError> {
        deadline
            .run(async {
                let policy = self.parts.policy.snapshot().await;
                let timeline = self.load_timeline(session_id, &policy).await?;
                let snapshot = snapshot_of(&timeline)?;
                rules::evaluate(&snapshot, actor, Action::View, self.now(), &policy)?;
                Ok(timeline)
            })
            .await
    }

    /// Registers a push subscription and returns the state it starts from.
    ///
    /// The subscription is taken before the snapshot is read, so no event
    /// committed in between is lost; receivers skip versions at or below the
    /// snapshot's. For a session that is already terminal the subscription
    /// is returned closed.
    pub async fn open_push(
        &self,
        session_id: Uuid,
        actor: Actor,
    ) -> Result<(SessionSnapshot, PushSubscription), NegotiationError> {
        let policy = self.parts.policy.snapshot().await;
        let subscription = self.parts.push.subscribe(session_id, actor.id);
        let authorized = async {
            let snapshot = self.fresh_snapshot(session_id, &policy).await?;
            rules::evaluate(&snapshot, actor, Action::View, self.now(), &policy)?;
            Ok::<_, NegotiationError>(snapshot)
        }
        .await;

        let snapshot = match authorized {
            Ok(snapshot) => snapshot,
            Err(err) => {
                self.parts.push.unsubscribe(session_id, subscription.id);
                return Err(err);
            }
        };
        if snapshot.status.is_terminal() {
            self.parts.push.unsubscribe(session_id, subscription.id);
        } else if actor.role == PartyRole::Driver && snapshot.driver_id.is_none() {
            if let Err(err) = self.bind_driver(session_id, actor, &policy).await {
                warn!(%session_id, driver_id = %actor.id, error = %err, "Implicit join on subscribe failed");
            }
        }
        Ok((snapshot, subscription))
    }

    /// Expires every open session whose deadline is at or before `now`.
    /// Returns how many this call expired.
    ///
    /// Scans in batches of `sweep_batch_size` until a batch comes back short,
    /// or until a full batch makes no progress (every session in it failed).
    pub async fn sweep_expired(&self, now: OffsetDateTime) -> Result<usize, NegotiationError> {
        let policy = self.parts.policy.snapshot().await;
        let batch_size = policy.sweep_batch_size.max(1);
        let mut expired = 0;
        loop {
            let due = self
                .retry_store(&policy, "scan_expiring", || {
                    self.parts.store.scan_expiring(now, batch_size)
                })
                .await?;
            let scanned = due.len();

            let mut progressed = 0;
            for session_id in due {
                match self.expire_session(session_id, now, &policy).await {
                    Ok(true) => progressed += 1,
                    Ok(false) => {}
                    Err(err) => warn!(%session_id, error = %err, "Failed to expire session"),
                }
            }
            expired += progressed;

            if (scanned as i64) < batch_size {
                return Ok(expired);
            }
            if progressed == 0 {
                warn!(scanned, "Sweep batch made no progress, deferring to the next tick");
                return Ok(expired);
            }
            debug!(scanned, progressed, "Full sweep batch, scanning again");
        }
    }

    /// Drops terminal snapshots older than the retention window.
    pub async fn purge_terminal_snapshots(&self, now: OffsetDateTime) -> usize {
        let retention = self.parts.policy.read().await.terminal_snapshot_retention;
        self.parts.cache.purge_terminal(now - retention).await
    }

    async fn act(
        &self,
        session_id: Uuid,
        actor: Actor,
        action: Action,
        deadline: Deadline,
    ) -> Result<SessionTimeline, NegotiationError> {
        deadline
            .run(async {
                let policy = self.parts.policy.snapshot().await;
                self.mutate(session_id, actor, action, &policy).await?;
                self.load_timeline(session_id, &policy).await
            })
            .await
    }

    async fn mutate(
        &self,
        session_id: Uuid,
        actor: Actor,
        action: Action,
        policy: &NegotiationPolicy,
    ) -> Result<(), NegotiationError> {
        let (mut snapshot, mut source) = self.current_snapshot(session_id, policy).await?;
        let offer_id = Uuid::now_v7();
        let mut conflicts = 0u32;

        loop {
            let now = self.now();
            let transition = match rules::evaluate(&snapshot, actor, action, now, policy) {
                Ok(transition) => transition,
                Err(err) if source == Source::Cache => {
                    debug!(%session_id, error = %err, "Cached snapshot refused the action, re-checking against the store");
                    snapshot = self.fresh_snapshot(session_id, policy).await?;
                    source = Source::Store;
                    continue;
                }
                Err(NegotiationError::SessionExpired) if snapshot.status.is_open() => {
                    self.expire_overdue(&snapshot, now, policy).await;
                    return Err(NegotiationError::SessionExpired);
                }
                Err(err) => {
                    debug!(%session_id, %actor, error = %err, "Action refused");
                    return Err(err);
                }
            };

            // Unversioned writes have no CAS to catch a stale snapshot.
            if source == Source::Cache
                && matches!(transition, Transition::DriverRejected | Transition::Join)
            {
                snapshot = self.fresh_snapshot(session_id, policy).await?;
                source = Source::Store;
                continue;
            }

            let commit = match transition {
                Transition::DriverRejected => {
                    return self.drop_driver(session_id, actor, now, policy).await;
                }
                Transition::Join => {
                    return self.bind_driver(session_id, actor, policy).await.map(|_| ());
                }
                Transition::Observe => return Ok(()),
                versioned => Commit::plan(&snapshot, actor, versioned, offer_id, now),
            };
            let Some(commit) = commit else {
                return Ok(());
            };

            match self.commit(&commit, policy).await {
                Ok(_) => return Ok(()),
                Err(StoreError::VersionMismatch) => {
                    conflicts += 1;
                    snapshot = self.fresh_snapshot(session_id, policy).await?;
                    source = Source::Store;
                    if commit.already_applied(&snapshot) {
                        debug!(%session_id, version = snapshot.version, "Write already committed by an earlier attempt");
                        self.publish(commit.kind(), snapshot);
                        return Ok(());
                    }
                    // Acceptance binds to the offer the caller saw, never to a newer one.
                    if action == Action::Accept
                        && snapshot.current_offer.id != commit.before().current_offer.id
                    {
                        debug!(%session_id, %actor, version = snapshot.version, "Offer changed under an accept");
                        return Err(NegotiationError::Conflict);
                    }
                    if conflicts > policy.max_cas_retries {
                        warn!(%session_id, %actor, conflicts, "Giving up after repeated version conflicts");
                        return Err(NegotiationError::Conflict);
                    }
                    debug!(%session_id, conflicts, "Version conflict, re-evaluating");
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn open_session(
        &self,
        rider: Actor,
        request: CreateSessionRequest,
    ) -> Result<SessionTimeline, NegotiationError> {
        if rider.role != PartyRole::Rider {
            return Err(NegotiationError::ActionNotPermitted(
                "only riders open sessions",
            ));
        }
        let policy = self.parts.policy.snapshot().await;
        rules::check_geography(request.pickup, request.drop_off)?;
        rules::check_currency(&request.currency)?;

        if let Some(limit) = policy.max_open_sessions_per_rider {
            let open = self
                .retry_store(&policy, "count_open_for_rider", || {
                    self.parts.store.count_open_for_rider(rider.id)
                })
                .await?;
            if open >= i64::from(limit) {
                debug!(rider_id = %rider.id, open, limit, "Admission limit reached");
                return Err(NegotiationError::AdmissionLimit { limit });
            }
        }

        let quote_request = QuoteRequest {
            pickup: request.pickup,
            drop_off: request.drop_off,
            ride_type_id: request.ride_type_id.clone(),
            currency: request.currency.clone(),
        };
        let quote = tokio::time::timeout(
            policy.pricing_timeout,
            self.parts.pricing.quote(&quote_request),
        )
        .await
        .map_err(|_| NegotiationError::PricingUnavailable("pricing timed out".into()))??;
        if !quote.is_coherent() {
            warn!(ride_type_id = %request.ride_type_id, ?quote, "Pricing returned an incoherent band");
            return Err(NegotiationError::PricingUnavailable(
                "incoherent quote".into(),
            ));
        }
        rules::check_amount(request.initial_amount, quote.floor, quote.ceiling)?;

        let now = self.now();
        let ttl = quote
            .ttl
            .unwrap_or(policy.default_ttl)
            .min(policy.max_session_lifetime);
        let session_id = Uuid::now_v7();
        let offer = Offer {
            id: Uuid::now_v7(),
            session_id,
            ordinal: 1,
            originator: PartyRole::Rider,
            amount: request.initial_amount,
            currency: request.currency.clone(),
            created_at: now,
        };
        let session = Session {
            id: session_id,
            rider_id: rider.id,
            driver_id: None,
            pickup: request.pickup,
            drop_off: request.drop_off,
            ride_type_id: request.ride_type_id,
            currency: request.currency,
            baseline: quote.baseline,
            floor: quote.floor,
            ceiling: quote.ceiling,
            status: SessionStatus::Proposed,
            current_offer_id: offer.id,
            last_originator: PartyRole::Rider,
            created_at: now,
            updated_at: now,
            deadline_at: now + ttl,
            version: 1,
            closed_by: None,
        };

        self.persist_new(session, offer, &policy).await
    }

    async fn persist_new(
        &self,
        session: Session,
        offer: Offer,
        policy: &NegotiationPolicy,
    ) -> Result<SessionTimeline, NegotiationError> {
        let created = self
            .retry_store(policy, "create", || self.parts.store.create(&session, &offer))
            .await;
        match created {
            Ok(()) => {}
            // A retried insert finding its own row: the first attempt landed.
            Err(StoreError::VersionMismatch) => {
                let existing = self.load_timeline(session.id, policy).await?;
                if existing.session.rider_id != session.rider_id {
                    return Err(NegotiationError::Internal(format!(
                        "session id {} collided",
                        session.id
                    )));
                }
            }
            Err(err) => return Err(err.into()),
        }

        let timeline = SessionTimeline {
            participants: vec![Participant {
                session_id: session.id,
                actor_id: session.rider_id,
                role: PartyRole::Rider,
                bound_at: session.created_at,
                rejected_at: None,
            }],
            offers: vec![offer],
            session,
        };
        let snapshot = snapshot_of(&timeline)?;
        info!(
            session_id = %snapshot.id,
            rider_id = %snapshot.rider_id,
            amount = %snapshot.current_offer.amount,
            deadline_at = %snapshot.deadline_at,
            "Session created"
        );
        self.announce_detached(EventKind::Created, snapshot).await;
        Ok(timeline)
    }

    async fn commit(
        &self,
        commit: &Commit,
        policy: &NegotiationPolicy,
    ) -> Result<SessionSnapshot, StoreError> {
        let version = match commit {
            Commit::Append { append, .. } => {
                self.retry_store(policy, "append_offer", || {
                    self.parts.store.append_offer(append)
                })
                .await?
            }
            Commit::Terminate { termination, .. } => {
                self.retry_store(policy, "terminate", || {
                    self.parts.store.terminate(termination)
                })
                .await?
            }
        };
        let after = commit.apply(version);
        info!(
            session_id = %after.id,
            version,
            status = %after.status,
            amount = %after.current_offer.amount,
            "Session transition committed"
        );
        self.announce_detached(commit.kind(), after.clone()).await;
        Ok(after)
    }

    /// Write-through and publish on their own task, so they finish even if
    /// the caller is dropped after the commit.
    async fn announce_detached(&self, kind: EventKind, after: SessionSnapshot) {
        let session_id = after.id;
        let engine = self.clone();
        let announced = tokio::spawn(async move {
            engine.write_through(after.clone()).await;
            engine.publish(kind, after);
        })
        .await;
        if let Err(e) = announced {
            error!(%session_id, error = %e, "Announcement task failed");
        }
    }

    /// Best-effort expiry of a session found open past its deadline.
    async fn expire_overdue(
        &self,
        snapshot: &SessionSnapshot,
        now: OffsetDateTime,
        policy: &NegotiationPolicy,
    ) {
        let session_id = snapshot.id;
        match self.commit(&Commit::expiry(snapshot, now), policy).await {
            Ok(_) => {}
            Err(StoreError::VersionMismatch) => {
                debug!(%session_id, "Overdue session already moved on");
            }
            Err(err) => warn!(%session_id, error = %err, "Eager expiry failed"),
        }
    }

    /// Returns `true` if this call moved the session to `expired`.
    async fn expire_session(
        &self,
        session_id: Uuid,
        now: OffsetDateTime,
        policy: &NegotiationPolicy,
    ) -> Result<bool, NegotiationError> {
        for _ in 0..=policy.max_cas_retries {
            let snapshot = self.fresh_snapshot(session_id, policy).await?;
            if !snapshot.status.is_open() || snapshot.deadline_at > now {
                return Ok(false);
            }
            match self.commit(&Commit::expiry(&snapshot, now), policy).await {
                Ok(_) => return Ok(true),
                Err(StoreError::VersionMismatch) => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Err(NegotiationError::Conflict)
    }

    async fn drop_driver(
        &self,
        session_id: Uuid,
        actor: Actor,
        now: OffsetDateTime,
        policy: &NegotiationPolicy,
    ) -> Result<(), NegotiationError> {
        self.retry_store(policy, "mark_rejected", || {
            self.parts.store.mark_rejected(session_id, actor.id, now)
        })
        .await?;
        let removed = self.parts.push.remove_actor(session_id, actor.id);
        info!(%session_id, driver_id = %actor.id, subscriptions = removed, "Driver left the session");
        // Version is unchanged; the equal-version put replaces the entry.
        self.fresh_snapshot(session_id, policy).await.map(|_| ())
    }

    async fn bind_driver(
        &self,
        session_id: Uuid,
        actor: Actor,
        policy: &NegotiationPolicy,
    ) -> Result<bool, NegotiationError> {
        let participant = Participant {
            session_id,
            actor_id: actor.id,
            role: PartyRole::Driver,
            bound_at: self.now(),
            rejected_at: None,
        };
        let created = self
            .retry_store(policy, "bind_participant", || {
                self.parts.store.bind_participant(&participant)
            })
            .await?;
        if created {
            info!(%session_id, driver_id = %actor.id, "Driver joined the session");
        }
        Ok(created)
    }

    async fn current_snapshot(
        &self,
        session_id: Uuid,
        policy: &NegotiationPolicy,
    ) -> Result<(SessionSnapshot, Source), NegotiationError> {
        match self.parts.cache.get(session_id).await {
            Ok(Some(snapshot)) => return Ok((snapshot, Source::Cache)),
            Ok(None) => {}
            Err(err) => warn!(%session_id, error = %err, "Snapshot cache read failed"),
        }
        let snapshot = self.fresh_snapshot(session_id, policy).await?;
        Ok((snapshot, Source::Store))
    }

    /// Loads from the store and repopulates the cache.
    async fn fresh_snapshot(
        &self,
        session_id: Uuid,
        policy: &NegotiationPolicy,
    ) -> Result<SessionSnapshot, NegotiationError> {
        let timeline = self.load_timeline(session_id, policy).await?;
        let snapshot = snapshot_of(&timeline)?;
        self.write_through(snapshot.clone()).await;
        Ok(snapshot)
    }

    async fn load_timeline(
        &self,
        session_id: Uuid,
        policy: &NegotiationPolicy,
    ) -> Result<SessionTimeline, NegotiationError> {
        Ok(self
            .retry_store(policy, "load", || self.parts.store.load(session_id))
            .await?)
    }

    async fn write_through(&self, snapshot: SessionSnapshot) {
        let session_id = snapshot.id;
        if let Err(err) = self.parts.cache.put(snapshot).await {
            warn!(%session_id, error = %err, "Snapshot cache write failed, evicting");
            self.parts.cache.evict(session_id).await;
        }
    }

    fn publish(&self, kind: EventKind, snapshot: SessionSnapshot) {
        let session_id = snapshot.id;
        let event = NegotiationEvent {
            kind,
            snapshot,
            occurred_at: self.now(),
        };
        let delivered = self.parts.push.publish(event.clone());
        if kind.is_terminal() {
            self.parts.push.close(session_id);
        }
        debug!(%session_id, ?kind, delivered, "Push event published");
        if let Err(err) = self.parts.bus.try_send(event) {
            warn!(%session_id, ?kind, error = %err, "Dropping bus event");
        }
    }

    async fn retry_store<T, F, Fut>(
        &self,
        policy: &NegotiationPolicy,
        operation: &'static str,
        mut call: F,
    ) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 0u32;
        loop {
            match call().await {
                Err(err) if err.is_transient() && attempt + 1 < policy.store_retry_attempts => {
                    let delay = store_backoff(policy.store_retry_base, attempt);
                    warn!(operation, attempt, error = %err, ?delay, "Transient store failure, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) if err.is_transient() => {
                    error!(operation, attempts = attempt + 1, error = %err, "Store unavailable");
                    return Err(err);
                }
                other => return other,
            }
        }
    }
}

fn snapshot_of(timeline: &SessionTimeline) -> Result<SessionSnapshot, NegotiationError> {
    timeline.snapshot().ok_or_else(|| {
        NegotiationError::Internal(format!(
            "session {} has no current offer",
            timeline.session.id
        ))
    })
}

#[cfg(test)]
mod tests;
