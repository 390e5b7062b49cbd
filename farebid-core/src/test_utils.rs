//! Shared fixtures for engine and processor tests.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use farebid_sdk::objects::CreateSessionRequest;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::cache::MemorySnapshotCache;
use crate::clock::ManualClock;
use crate::config::{ConfigStore, NegotiationPolicy};
use crate::engine::{Deadline, EngineComponents, SessionEngine};
use crate::events::{BusReceiver, EventKind, bus_channel};
use crate::model::{Actor, GeoPoint, SessionTimeline};
use crate::pricing::{
    PricingError, PricingOracle, Quote, QuoteRequest, RideTypeRate, StaticPricingConfig,
    StaticPricingOracle,
};
use crate::push::PushHub;
use crate::store::{MemorySessionStore, SessionStore};

pub const RIDER: Uuid = Uuid::from_u128(1);
pub const OTHER_RIDER: Uuid = Uuid::from_u128(2);
pub const D1: Uuid = Uuid::from_u128(11);
pub const D2: Uuid = Uuid::from_u128(12);

pub fn dec(v: i64) -> Decimal {
    Decimal::from(v)
}

pub fn start() -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(1_750_000_000).unwrap()
}

#[derive(Debug, Clone, Copy)]
pub enum PricingMode {
    Normal,
    Down,
    Slow(Duration),
}

/// Flat rate card (baseline 50, band 40..=100) that can be switched off.
pub struct ScriptedOracle {
    inner: StaticPricingOracle,
    mode: Mutex<PricingMode>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self {
            inner: StaticPricingOracle::new(StaticPricingConfig {
                currency: "INR".into(),
                max_trip_km: Some(50.0),
                ride_types: vec![RideTypeRate {
                    id: "auto".into(),
                    base_fare: dec(50),
                    per_km: Decimal::ZERO,
                    floor_ratio: Decimal::from_str("0.8").unwrap(),
                    ceiling_ratio: dec(2),
                    ttl_secs: None,
                }],
            }),
            mode: Mutex::new(PricingMode::Normal),
        }
    }

    pub fn set(&self, mode: PricingMode) {
        *self.mode.lock() = mode;
    }
}

#[async_trait]
impl PricingOracle for ScriptedOracle {
    async fn quote(&self, request: &QuoteRequest) -> Result<Quote, PricingError> {
        let mode = *self.mode.lock();
        match mode {
            PricingMode::Normal => self.inner.quote(request).await,
            PricingMode::Down => Err(PricingError::Unavailable("connection refused".into())),
            PricingMode::Slow(delay) => {
                tokio::time::sleep(delay).await;
                self.inner.quote(request).await
            }
        }
    }
}

/// An engine over in-memory adapters with handles to each of them.
pub struct Harness {
    pub engine: SessionEngine,
    pub store: Arc<MemorySessionStore>,
    pub cache: Arc<MemorySnapshotCache>,
    pub clock: Arc<ManualClock>,
    pub pricing: Arc<ScriptedOracle>,
    pub bus: BusReceiver,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_policy(NegotiationPolicy::default())
    }

    pub fn with_policy(policy: NegotiationPolicy) -> Self {
        Self::sharing(
            Arc::new(MemorySessionStore::new()),
            Arc::new(ManualClock::new(start())),
            policy,
        )
    }

    /// A second engine instance over the same store, with its own cache.
    pub fn sharing(
        store: Arc<MemorySessionStore>,
        clock: Arc<ManualClock>,
        policy: NegotiationPolicy,
    ) -> Self {
        let cache = Arc::new(MemorySnapshotCache::new());
        let pricing = Arc::new(ScriptedOracle::new());
        let (bus_tx, bus) = bus_channel();
        let engine = SessionEngine::new(EngineComponents {
            store: store.clone(),
            cache: cache.clone(),
            pricing: pricing.clone(),
            clock: clock.clone(),
            push: Arc::new(PushHub::default()),
            bus: bus_tx,
            policy: ConfigStore::new(policy),
        });
        Self {
            engine,
            store,
            cache,
            clock,
            pricing,
            bus,
        }
    }

    pub async fn open(&self, amount: i64) -> Uuid {
        self.engine
            .create(Actor::rider(RIDER), request(amount), Deadline::NONE)
            .await
            .unwrap()
            .session
            .id
    }

    pub async fn load(&self, id: Uuid) -> SessionTimeline {
        self.store.load(id).await.unwrap()
    }

    pub fn drain_bus(&mut self) -> Vec<(EventKind, i64)> {
        let mut events = Vec::new();
        while let Ok(event) = self.bus.try_recv() {
            events.push((event.kind, event.version()));
        }
        events
    }
}

pub fn request(amount: i64) -> CreateSessionRequest {
    CreateSessionRequest {
        pickup: GeoPoint {
            lat: 12.9716,
            lng: 77.5946,
        },
        drop_off: GeoPoint {
            lat: 12.9352,
            lng: 77.6245,
        },
        ride_type_id: "auto".into(),
        initial_amount: dec(amount),
        currency: "INR".into(),
    }
}
