use super::*;

use proptest::prelude::*;

use crate::clock::ManualClock;
use crate::store::MemorySessionStore;
use crate::test_utils::*;

#[tokio::test]
async fn create_opens_proposed_session_with_rider_offer() {
    let mut h = Harness::new();
    let timeline = h
        .engine
        .create(Actor::rider(RIDER), request(50), Deadline::NONE)
        .await
        .unwrap();

    let s = &timeline.session;
    assert_eq!(s.status, SessionStatus::Proposed);
    assert_eq!(s.version, 1);
    assert_eq!((s.floor, s.ceiling), (dec(40), dec(100)));
    assert_eq!(s.deadline_at, start() + Duration::from_secs(120));
    assert_eq!(timeline.offers.len(), 1);
    let offer = &timeline.offers[0];
    assert_eq!(offer.ordinal, 1);
    assert_eq!(offer.originator, PartyRole::Rider);
    assert_eq!(offer.amount, dec(50));

    assert_eq!(h.load(s.id).await, timeline);
    assert_eq!(h.drain_bus(), vec![(EventKind::Created, 1)]);
    assert_eq!(h.cache.len(), 1);
}

#[tokio::test]
async fn alternating_counters_then_accept() {
    let mut h = Harness::new();
    let id = h.open(50).await;
    let (snapshot, mut rider_push) = h.engine.open_push(id, Actor::rider(RIDER)).await.unwrap();
    assert_eq!(snapshot.version, 1);

    let t = h
        .engine
        .counter(id, Actor::driver(D1), dec(80), Deadline::NONE)
        .await
        .unwrap();
    assert_eq!(t.session.status, SessionStatus::Countered);
    assert_eq!(t.session.version, 2);
    assert_eq!(t.session.driver_id, Some(D1));
    let last = t.offers.last().unwrap();
    assert_eq!((last.ordinal, last.originator, last.amount), (2, PartyRole::Driver, dec(80)));

    let frame = rider_push.receiver.recv().await.unwrap();
    assert_eq!((frame.kind, frame.version()), (EventKind::Countered, 2));

    let t = h
        .engine
        .counter(id, Actor::rider(RIDER), dec(60), Deadline::NONE)
        .await
        .unwrap();
    assert_eq!(t.session.version, 3);
    assert_eq!(t.offers.last().unwrap().ordinal, 3);

    let t = h
        .engine
        .accept(id, Actor::driver(D1), Deadline::NONE)
        .await
        .unwrap();
    assert_eq!(t.session.status, SessionStatus::Accepted);
    assert_eq!(t.session.version, 4);
    assert_eq!(t.session.driver_id, Some(D1));
    assert_eq!(t.current_offer().unwrap().amount, dec(60));
    t.check_invariants().unwrap();

    let err = h
        .engine
        .counter(id, Actor::rider(RIDER), dec(70), Deadline::NONE)
        .await
        .unwrap_err();
    assert_eq!(err, NegotiationError::SessionTerminal(SessionStatus::Accepted));

    assert_eq!(rider_push.receiver.recv().await.unwrap().version(), 3);
    assert_eq!(rider_push.receiver.recv().await.unwrap().kind, EventKind::Accepted);
    assert!(rider_push.receiver.recv().await.is_none());
    assert_eq!(
        h.drain_bus(),
        vec![
            (EventKind::Created, 1),
            (EventKind::Countered, 2),
            (EventKind::Countered, 3),
            (EventKind::Accepted, 4),
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_driver_accepts_bind_exactly_one() {
    let h = Harness::new();
    let id = h.open(50).await;
    h.store.set_latency(Some(Duration::from_millis(5)));

    let (a, b) = tokio::join!(
        h.engine.accept(id, Actor::driver(D1), Deadline::NONE),
        h.engine.accept(id, Actor::driver(D2), Deadline::NONE),
    );
    let (winner, loser) = match (a, b) {
        (Ok(t), Err(e)) => (t, e),
        (Err(e), Ok(t)) => (t, e),
        other => panic!("expected exactly one winner, got {other:?}"),
    };
    assert!(
        matches!(
            loser,
            NegotiationError::Conflict | NegotiationError::DriverAlreadyBound
        ),
        "{loser:?}"
    );
    assert_eq!(winner.session.status, SessionStatus::Accepted);

    h.store.set_latency(None);
    let stored = h.load(id).await;
    assert_eq!(stored.session.driver_id, winner.session.driver_id);
    assert_eq!(stored.session.version, 2);
}

#[tokio::test]
async fn counter_below_floor_leaves_session_untouched() {
    let h = Harness::new();
    let id = h.open(50).await;
    h.engine
        .counter(id, Actor::driver(D1), dec(80), Deadline::NONE)
        .await
        .unwrap();
    let before = h.load(id).await;

    let err = h
        .engine
        .counter(id, Actor::rider(RIDER), dec(35), Deadline::NONE)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        NegotiationError::OutOfPolicyAmount {
            amount: dec(35),
            floor: dec(40),
            ceiling: dec(100),
        }
    );
    assert_eq!(h.load(id).await, before);
}

#[tokio::test]
async fn sweeper_expires_idle_sessions_once() {
    let mut h = Harness::new();
    let id = h.open(50).await;
    h.clock.advance(Duration::from_secs(121));

    assert_eq!(h.engine.sweep_expired(h.clock.now()).await.unwrap(), 1);
    assert_eq!(h.engine.sweep_expired(h.clock.now()).await.unwrap(), 0);

    let stored = h.load(id).await;
    assert_eq!(stored.session.status, SessionStatus::Expired);
    assert_eq!(stored.session.version, 2);
    assert_eq!(stored.session.closed_by, None);

    let err = h
        .engine
        .counter(id, Actor::driver(D1), dec(80), Deadline::NONE)
        .await
        .unwrap_err();
    assert_eq!(err, NegotiationError::SessionExpired);
    assert_eq!(
        h.drain_bus(),
        vec![(EventKind::Created, 1), (EventKind::Expired, 2)]
    );
}

#[tokio::test]
async fn overdue_session_is_expired_on_touch() {
    let h = Harness::new();
    let id = h.open(50).await;
    h.clock.advance(Duration::from_secs(120));

    let err = h
        .engine
        .accept(id, Actor::driver(D1), Deadline::NONE)
        .await
        .unwrap_err();
    assert_eq!(err, NegotiationError::SessionExpired);

    let stored = h.load(id).await;
    assert_eq!(stored.session.status, SessionStatus::Expired);
    assert_eq!(stored.session.driver_id, None);
    assert_eq!(h.engine.sweep_expired(h.clock.now()).await.unwrap(), 0);
}

#[tokio::test]
async fn counters_extend_deadline_up_to_lifetime() {
    let h = Harness::with_policy(NegotiationPolicy {
        max_session_lifetime: Duration::from_secs(150),
        ..NegotiationPolicy::default()
    });
    let id = h.open(50).await;

    h.clock.advance(Duration::from_secs(100));
    let t = h
        .engine
        .counter(id, Actor::driver(D1), dec(80), Deadline::NONE)
        .await
        .unwrap();
    assert_eq!(t.session.deadline_at, start() + Duration::from_secs(150));

    h.clock.advance(Duration::from_secs(30));
    assert_eq!(h.engine.sweep_expired(h.clock.now()).await.unwrap(), 0);
    let t = h
        .engine
        .counter(id, Actor::rider(RIDER), dec(60), Deadline::NONE)
        .await
        .unwrap();
    assert_eq!(t.session.deadline_at, start() + Duration::from_secs(150));
}

#[tokio::test]
async fn transient_store_failures_are_retried() {
    let h = Harness::with_policy(NegotiationPolicy {
        store_retry_base: Duration::from_millis(1),
        ..NegotiationPolicy::default()
    });
    let id = h.open(50).await;

    h.store.fail_next(2);
    let t = h
        .engine
        .counter(id, Actor::driver(D1), dec(80), Deadline::NONE)
        .await
        .unwrap();
    assert_eq!(t.session.version, 2);

    h.store.fail_next(3);
    let err = h
        .engine
        .counter(id, Actor::rider(RIDER), dec(60), Deadline::NONE)
        .await
        .unwrap_err();
    assert!(matches!(err, NegotiationError::StoreUnavailable(_)), "{err:?}");
    assert!(err.is_retryable());
    assert_eq!(h.load(id).await.session.version, 2);
}

#[tokio::test(start_paused = true)]
async fn slow_store_reports_deadline_exceeded() {
    let h = Harness::new();
    let id = h.open(50).await;
    h.store.set_latency(Some(Duration::from_secs(10)));

    let err = h
        .engine
        .get(id, Actor::rider(RIDER), Deadline::within(Duration::from_secs(1)))
        .await
        .unwrap_err();
    assert_eq!(err, NegotiationError::DeadlineExceeded);
}

#[tokio::test(start_paused = true)]
async fn abandoned_caller_aborts_the_commit() {
    let mut h = Harness::new();
    let id = h.open(50).await;
    h.drain_bus();
    h.store.set_latency(Some(Duration::from_secs(10)));

    let err = h
        .engine
        .counter(
            id,
            Actor::driver(D1),
            dec(80),
            Deadline::within(Duration::from_secs(1)),
        )
        .await
        .unwrap_err();
    assert_eq!(err, NegotiationError::DeadlineExceeded);
    assert!(err.is_retryable());

    tokio::time::sleep(Duration::from_secs(30)).await;
    h.store.set_latency(None);
    assert_eq!(h.load(id).await.session.version, 1);
    assert!(h.drain_bus().is_empty());

    // Nothing landed, so the retry goes through.
    let t = h
        .engine
        .counter(id, Actor::driver(D1), dec(80), Deadline::NONE)
        .await
        .unwrap();
    assert_eq!(t.session.version, 2);
    assert_eq!(h.drain_bus(), vec![(EventKind::Countered, 2)]);
}

#[tokio::test(start_paused = true)]
async fn abandoned_create_leaves_no_session() {
    let mut h = Harness::new();
    h.store.set_latency(Some(Duration::from_secs(10)));

    let err = h
        .engine
        .create(
            Actor::rider(RIDER),
            request(50),
            Deadline::within(Duration::from_secs(1)),
        )
        .await
        .unwrap_err();
    assert_eq!(err, NegotiationError::DeadlineExceeded);

    tokio::time::sleep(Duration::from_secs(30)).await;
    h.store.set_latency(None);
    assert!(h.store.is_empty().await);
    assert!(h.drain_bus().is_empty());
}

#[tokio::test]
async fn sweep_drains_more_than_one_batch() {
    let h = Harness::with_policy(NegotiationPolicy {
        sweep_batch_size: 2,
        ..NegotiationPolicy::default()
    });
    let mut ids = Vec::new();
    for amount in 50..55 {
        ids.push(h.open(amount).await);
    }

    h.clock.advance(Duration::from_secs(121));
    let expired = h.engine.sweep_expired(h.clock.now()).await.unwrap();
    assert_eq!(expired, 5);
    for id in ids {
        assert_eq!(h.load(id).await.session.status, SessionStatus::Expired);
    }
    assert_eq!(h.engine.sweep_expired(h.clock.now()).await.unwrap(), 0);
}

#[tokio::test]
async fn create_validates_inputs_and_pricing() {
    let h = Harness::new();
    let rider = Actor::rider(RIDER);

    let err = h
        .engine
        .create(Actor::driver(D1), request(50), Deadline::NONE)
        .await
        .unwrap_err();
    assert!(matches!(err, NegotiationError::ActionNotPermitted(_)));

    let mut same_spot = request(50);
    same_spot.drop_off = same_spot.pickup;
    let err = h.engine.create(rider, same_spot, Deadline::NONE).await.unwrap_err();
    assert!(matches!(err, NegotiationError::InvalidGeography(_)));

    let mut limo = request(50);
    limo.ride_type_id = "limo".into();
    let err = h.engine.create(rider, limo, Deadline::NONE).await.unwrap_err();
    assert_eq!(err, NegotiationError::UnknownRideType("limo".into()));

    let mut dollars = request(50);
    dollars.currency = "USD".into();
    let err = h.engine.create(rider, dollars, Deadline::NONE).await.unwrap_err();
    assert_eq!(err, NegotiationError::UnsupportedCurrency("USD".into()));

    let err = h.engine.create(rider, request(101), Deadline::NONE).await.unwrap_err();
    assert!(matches!(err, NegotiationError::OutOfPolicyAmount { .. }));

    h.pricing.set(PricingMode::Down);
    let err = h.engine.create(rider, request(50), Deadline::NONE).await.unwrap_err();
    assert!(matches!(err, NegotiationError::PricingUnavailable(_)));

    assert!(h.store.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn slow_pricing_times_out() {
    let h = Harness::new();
    h.pricing.set(PricingMode::Slow(Duration::from_secs(5)));
    let err = h
        .engine
        .create(Actor::rider(RIDER), request(50), Deadline::NONE)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        NegotiationError::PricingUnavailable("pricing timed out".into())
    );
}

#[tokio::test]
async fn admission_limit_counts_open_sessions() {
    let h = Harness::with_policy(NegotiationPolicy {
        max_open_sessions_per_rider: Some(1),
        ..NegotiationPolicy::default()
    });
    let id = h.open(50).await;
    let err = h
        .engine
        .create(Actor::rider(RIDER), request(60), Deadline::NONE)
        .await
        .unwrap_err();
    assert_eq!(err, NegotiationError::AdmissionLimit { limit: 1 });

    h.engine
        .create(Actor::rider(OTHER_RIDER), request(60), Deadline::NONE)
        .await
        .unwrap();
    h.engine
        .withdraw(id, Actor::rider(RIDER), Deadline::NONE)
        .await
        .unwrap();
    h.engine
        .create(Actor::rider(RIDER), request(60), Deadline::NONE)
        .await
        .unwrap();
}

#[tokio::test]
async fn unbound_driver_reject_only_leaves_the_fan_out() {
    let h = Harness::new();
    let id = h.open(50).await;
    let (_, mut d2_push) = h.engine.open_push(id, Actor::driver(D2)).await.unwrap();

    let t = h
        .engine
        .reject(id, Actor::driver(D2), Deadline::NONE)
        .await
        .unwrap();
    assert_eq!(t.session.status, SessionStatus::Proposed);
    assert_eq!(t.session.version, 1);
    assert_eq!(t.rejected_drivers(), vec![D2]);
    assert!(d2_push.receiver.recv().await.is_none());

    for result in [
        h.engine.get(id, Actor::driver(D2), Deadline::NONE).await,
        h.engine.join(id, Actor::driver(D2), Deadline::NONE).await,
        h.engine
            .counter(id, Actor::driver(D2), dec(80), Deadline::NONE)
            .await,
    ] {
        assert_eq!(result.unwrap_err(), NegotiationError::NotParticipant);
    }

    let t = h
        .engine
        .counter(id, Actor::driver(D1), dec(80), Deadline::NONE)
        .await
        .unwrap();
    assert_eq!(t.session.version, 2);
}

#[tokio::test]
async fn bound_driver_reject_ends_the_session() {
    let mut h = Harness::new();
    let id = h.open(50).await;
    h.engine
        .counter(id, Actor::driver(D1), dec(80), Deadline::NONE)
        .await
        .unwrap();
    let t = h
        .engine
        .reject(id, Actor::driver(D1), Deadline::NONE)
        .await
        .unwrap();
    assert_eq!(t.session.status, SessionStatus::Rejected);
    assert_eq!(t.session.closed_by, Some(D1));
    assert_eq!(h.drain_bus().last(), Some(&(EventKind::Rejected, 3)));
}

#[tokio::test]
async fn withdraw_is_rider_only_and_final() {
    let h = Harness::new();
    let id = h.open(50).await;

    let err = h
        .engine
        .withdraw(id, Actor::driver(D1), Deadline::NONE)
        .await
        .unwrap_err();
    assert!(matches!(err, NegotiationError::ActionNotPermitted(_)));

    let t = h
        .engine
        .withdraw(id, Actor::rider(RIDER), Deadline::NONE)
        .await
        .unwrap();
    assert_eq!(t.session.status, SessionStatus::Withdrawn);
    let before = h.load(id).await;

    let err = h
        .engine
        .accept(id, Actor::driver(D1), Deadline::NONE)
        .await
        .unwrap_err();
    assert_eq!(err, NegotiationError::SessionTerminal(SessionStatus::Withdrawn));
    assert_eq!(h.load(id).await, before);

    h.clock.advance(Duration::from_secs(301));
    assert_eq!(h.engine.purge_terminal_snapshots(h.clock.now()).await, 1);
    assert!(h.cache.is_empty());
}

#[tokio::test]
async fn join_binds_without_bumping_version() {
    let h = Harness::new();
    let id = h.open(50).await;

    let t = h.engine.join(id, Actor::driver(D1), Deadline::NONE).await.unwrap();
    assert_eq!(t.session.version, 1);
    assert!(t.participants.iter().any(|p| p.actor_id == D1));

    let err = h
        .engine
        .join(id, Actor::rider(RIDER), Deadline::NONE)
        .await
        .unwrap_err();
    assert!(matches!(err, NegotiationError::ActionNotPermitted(_)));

    h.engine
        .counter(id, Actor::driver(D1), dec(80), Deadline::NONE)
        .await
        .unwrap();
    let err = h
        .engine
        .join(id, Actor::driver(D2), Deadline::NONE)
        .await
        .unwrap_err();
    assert_eq!(err, NegotiationError::DriverAlreadyBound);
}

#[tokio::test]
async fn get_authorizes_and_reports_missing_sessions() {
    let h = Harness::new();
    let id = h.open(50).await;

    let t = h.engine.get(id, Actor::rider(RIDER), Deadline::NONE).await.unwrap();
    assert_eq!(t.session.id, id);
    let err = h
        .engine
        .get(id, Actor::rider(OTHER_RIDER), Deadline::NONE)
        .await
        .unwrap_err();
    assert_eq!(err, NegotiationError::NotParticipant);

    let missing = Uuid::now_v7();
    let err = h
        .engine
        .get(missing, Actor::rider(RIDER), Deadline::NONE)
        .await
        .unwrap_err();
    assert_eq!(err, NegotiationError::NotFound(missing));
}

#[tokio::test]
async fn push_on_terminal_session_returns_closed_subscription() {
    let h = Harness::new();
    let id = h.open(50).await;
    h.engine
        .withdraw(id, Actor::rider(RIDER), Deadline::NONE)
        .await
        .unwrap();

    let (snapshot, mut sub) = h.engine.open_push(id, Actor::rider(RIDER)).await.unwrap();
    assert_eq!(snapshot.status, SessionStatus::Withdrawn);
    assert!(sub.receiver.recv().await.is_none());
    assert_eq!(h.engine.push().subscriber_count(id), 0);

    let err = h
        .engine
        .open_push(id, Actor::rider(OTHER_RIDER))
        .await
        .unwrap_err();
    assert_eq!(err, NegotiationError::NotParticipant);
}

#[tokio::test]
async fn stale_cache_is_reconciled_against_the_store() {
    let store = Arc::new(MemorySessionStore::new());
    let clock = Arc::new(ManualClock::new(start()));
    let a = Harness::sharing(store.clone(), clock.clone(), NegotiationPolicy::default());
    let b = Harness::sharing(store.clone(), clock.clone(), NegotiationPolicy::default());

    let id = a.open(50).await;
    b.engine
        .counter(id, Actor::driver(D1), dec(80), Deadline::NONE)
        .await
        .unwrap();

    // A still caches version 1 (rider spoke last) and would refuse this.
    let t = a
        .engine
        .counter(id, Actor::rider(RIDER), dec(60), Deadline::NONE)
        .await
        .unwrap();
    assert_eq!(t.session.version, 3);

    // B caches version 2 (driver spoke last).
    let t = b
        .engine
        .counter(id, Actor::driver(D1), dec(70), Deadline::NONE)
        .await
        .unwrap();
    assert_eq!(t.session.version, 4);

    // A's cache allows this; the CAS fails and the fresh state refuses it.
    let err = a
        .engine
        .counter(id, Actor::driver(D1), dec(75), Deadline::NONE)
        .await
        .unwrap_err();
    assert_eq!(err, NegotiationError::AlternationViolation);

    let stored = store.load(id).await.unwrap();
    assert_eq!(stored.session.version, 4);
    stored.check_invariants().unwrap();
}

#[tokio::test]
async fn accept_against_a_superseded_offer_conflicts() {
    let store = Arc::new(MemorySessionStore::new());
    let clock = Arc::new(ManualClock::new(start()));
    let a = Harness::sharing(store.clone(), clock.clone(), NegotiationPolicy::default());
    let b = Harness::sharing(store.clone(), clock.clone(), NegotiationPolicy::default());

    let id = a.open(50).await;
    a.engine
        .counter(id, Actor::driver(D1), dec(80), Deadline::NONE)
        .await
        .unwrap();
    let seen = a
        .engine
        .counter(id, Actor::rider(RIDER), dec(60), Deadline::NONE)
        .await
        .unwrap();
    assert_eq!(seen.session.version, 3);

    // Two more offers land through B while A still caches the rider's 60.
    b.engine
        .counter(id, Actor::driver(D1), dec(70), Deadline::NONE)
        .await
        .unwrap();
    b.engine
        .counter(id, Actor::rider(RIDER), dec(41), Deadline::NONE)
        .await
        .unwrap();

    let err = a
        .engine
        .accept(id, Actor::driver(D1), Deadline::NONE)
        .await
        .unwrap_err();
    assert_eq!(err, NegotiationError::Conflict);

    let stored = store.load(id).await.unwrap();
    assert_eq!(stored.session.status, SessionStatus::Countered);
    assert_eq!(stored.session.version, 5);

    // After the conflict A holds the current offer and the accept binds to it.
    let t = a
        .engine
        .accept(id, Actor::driver(D1), Deadline::NONE)
        .await
        .unwrap();
    assert_eq!(t.session.status, SessionStatus::Accepted);
    assert_eq!(t.session.version, 6);
    assert_eq!(t.offers.last().unwrap().amount, dec(41));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn interleaved_counters_keep_the_log_alternating() {
    let h = Harness::new();
    let id = h.open(50).await;
    h.engine
        .counter(id, Actor::driver(D1), dec(90), Deadline::NONE)
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for i in 0..20i64 {
        let engine = h.engine.clone();
        let actor = if i % 2 == 0 {
            Actor::rider(RIDER)
        } else {
            Actor::driver(D1)
        };
        tasks.push(tokio::spawn(async move {
            engine
                .counter(id, actor, dec(41 + i), Deadline::NONE)
                .await
        }));
    }
    let mut committed = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => committed += 1,
            Err(NegotiationError::AlternationViolation | NegotiationError::Conflict) => {}
            Err(other) => panic!("unexpected error {other:?}"),
        }
    }

    let stored = h.load(id).await;
    stored.check_invariants().unwrap();
    assert_eq!(stored.offers.len(), 2 + committed);
    assert_eq!(stored.session.version, 2 + committed as i64);
}

#[derive(Debug, Clone, Copy)]
enum Who {
    Rider,
    Driver1,
    Driver2,
}

impl Who {
    fn actor(self) -> Actor {
        match self {
            Who::Rider => Actor::rider(RIDER),
            Who::Driver1 => Actor::driver(D1),
            Who::Driver2 => Actor::driver(D2),
        }
    }
}

#[derive(Debug, Clone)]
enum Step {
    Counter(Who, i64),
    Accept(Who),
    Withdraw(Who),
    Reject(Who),
    Join(Who),
    Wait(u64),
}

fn who() -> impl Strategy<Value = Who> {
    prop_oneof![Just(Who::Rider), Just(Who::Driver1), Just(Who::Driver2)]
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => (who(), 30i64..=110).prop_map(|(w, a)| Step::Counter(w, a)),
        2 => who().prop_map(Step::Accept),
        1 => who().prop_map(Step::Withdraw),
        1 => who().prop_map(Step::Reject),
        1 => who().prop_map(Step::Join),
        1 => (0u64..=90).prop_map(Step::Wait),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_interleavings_preserve_invariants(steps in prop::collection::vec(step(), 1..24)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let h = Harness::new();
            let id = h.open(50).await;
            let mut before = h.load(id).await;

            for step in steps {
                let d = Deadline::NONE;
                let result = match step {
                    Step::Counter(w, amount) => h.engine.counter(id, w.actor(), dec(amount), d).await,
                    Step::Accept(w) => h.engine.accept(id, w.actor(), d).await,
                    Step::Withdraw(w) => h.engine.withdraw(id, w.actor(), d).await,
                    Step::Reject(w) => h.engine.reject(id, w.actor(), d).await,
                    Step::Join(w) => h.engine.join(id, w.actor(), d).await,
                    Step::Wait(secs) => {
                        h.clock.advance(Duration::from_secs(secs));
                        continue;
                    }
                };
                let after = h.load(id).await;
                prop_assert_eq!(after.check_invariants(), Ok(()));

                let appended = after.offers.len() - before.offers.len();
                let closed = usize::from(before.session.status.is_open() && after.session.status.is_terminal());
                prop_assert_eq!(after.session.version - before.session.version, (appended + closed) as i64);

                if before.session.status.is_terminal() {
                    prop_assert!(result.is_err());
                    prop_assert_eq!(&after.session, &before.session);
                    prop_assert_eq!(&after.offers, &before.offers);
                }
                match &result {
                    Err(NegotiationError::SessionExpired) => {}
                    Err(_) => prop_assert_eq!(&after.session, &before.session),
                    Ok(_) => {}
                }
                before = after;
            }
            Ok::<(), TestCaseError>(())
        })?;
    }
}
