//! Full auction lifecycles driven through the round clock.

use std::sync::Arc;

use chrono::{Duration, Utc};
use gavel_engine::{
    AuctionStore, AutoBidEngine, InMemoryCache, PlaceBidRequest, SettlementEngine,
};
use gavel_ledger::Ledger;
use gavel_rounds::{AuctionLifecycle, RoundClock};
use gavel_types::{
    AuctionConfig, AuctionId, AuctionStatus, AutoBidStopReason, BidStatus, Clock, EngineConfig,
    EngineEvent, ManualClock, MemorySink, MutexConfig, RoundId, RoundStatus, UserId,
};
use rust_decimal::Decimal;

fn dec(n: i64) -> Decimal {
    Decimal::new(n, 0)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct Harness {
    settlement: Arc<SettlementEngine>,
    autobids: Arc<AutoBidEngine>,
    lifecycle: Arc<AuctionLifecycle>,
    round_clock: RoundClock,
    ledger: Arc<Ledger>,
    store: Arc<AuctionStore>,
    clock: Arc<ManualClock>,
    sink: Arc<MemorySink>,
}

fn harness() -> Harness {
    init_tracing();
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let store = Arc::new(AuctionStore::new());
    let ledger = Arc::new(Ledger::new());
    let cache = Arc::new(InMemoryCache::new(clock.clone()));
    let sink = Arc::new(MemorySink::new());
    let config = EngineConfig {
        mutex: MutexConfig {
            retry_interval: std::time::Duration::ZERO,
            ..MutexConfig::default()
        },
        ..EngineConfig::default()
    };
    let settlement = Arc::new(SettlementEngine::new(
        store.clone(),
        ledger.clone(),
        cache.clone(),
        sink.clone(),
        clock.clone(),
        config.clone(),
    ));
    let autobids = Arc::new(AutoBidEngine::new(
        store.clone(),
        settlement.clone(),
        sink.clone(),
        clock.clone(),
        config.clone(),
    ));
    let lifecycle = Arc::new(AuctionLifecycle::new(
        store.clone(),
        ledger.clone(),
        autobids.clone(),
        cache,
        sink.clone(),
        clock.clone(),
        config.clone(),
    ));
    let round_clock = RoundClock::new(
        store.clone(),
        lifecycle.clone(),
        autobids.clone(),
        sink.clone(),
        clock.clone(),
        config,
    );
    Harness {
        settlement,
        autobids,
        lifecycle,
        round_clock,
        ledger,
        store,
        clock,
        sink,
    }
}

fn fund(h: &Harness, amount: i64) -> UserId {
    let user = UserId::new();
    h.ledger
        .add_funds(user, dec(amount), None, h.clock.now())
        .unwrap();
    user
}

fn place_bid(h: &Harness, user: UserId, auction_id: AuctionId, round_id: RoundId, amount: i64) {
    h.settlement
        .place_bid(&PlaceBidRequest {
            user_id: user,
            auction_id,
            round_id,
            amount: dec(amount),
            is_auto_bid: false,
        })
        .unwrap();
    h.autobids.on_bid_committed(auction_id, round_id);
}

/// Drive the clock forward one second at a time.
fn run_ticks(h: &Harness, seconds: i64) {
    for _ in 0..seconds {
        h.clock.advance(Duration::seconds(1));
        h.round_clock.tick(h.clock.now());
    }
}

/// A bid inside the snipe window extends the round, and the auction still
/// settles at the extended deadline.
#[test]
fn snipe_bid_extends_and_round_settles_late() {
    let h = harness();
    let auction = h.lifecycle.create_auction(AuctionConfig::default()).unwrap();
    h.lifecycle.start_auction(auction.id).unwrap();
    let round = h.store.active_round(auction.id).unwrap();
    let user = fund(&h, 1000);

    // Five seconds before the deadline: the bid fires an extension.
    run_ticks(&h, 595);
    place_bid(&h, user, auction.id, round.id, 100);
    let extended = h.store.round(round.id).unwrap();
    assert_eq!(extended.extension_count, 1);
    assert_eq!(
        extended.ends_at,
        extended.original_ends_at + Duration::seconds(30)
    );

    // The old deadline passes without settlement.
    run_ticks(&h, 10);
    assert_eq!(h.store.round(round.id).unwrap().status, RoundStatus::Active);

    // The extended deadline settles the round and the auction.
    run_ticks(&h, 30);
    assert_eq!(
        h.store.round(round.id).unwrap().status,
        RoundStatus::Completed
    );
    assert_eq!(
        h.store.auction(auction.id).unwrap().status,
        AuctionStatus::Completed
    );
    let bal = h.ledger.balance(user);
    assert_eq!(bal.available, dec(900));
    assert_eq!(bal.locked, Decimal::ZERO);
}

/// An auto-bid that cannot fund its counter gets one retry through the
/// clock, then deactivates with `insufficient_funds`.
#[test]
fn underfunded_auto_bid_retries_once_then_deactivates() {
    let h = harness();
    let auction = h.lifecycle.create_auction(AuctionConfig::default()).unwrap();
    h.lifecycle.start_auction(auction.id).unwrap();
    let round = h.store.active_round(auction.id).unwrap();

    // The auto-bidder leads at 100 with 40 spare.
    let auto_user = fund(&h, 140);
    place_bid(&h, auto_user, auction.id, round.id, 100);
    h.autobids
        .setup_auto_bid(auto_user, auction.id, dec(500))
        .unwrap();

    // A rival bids 150; the 200 counter cannot be funded (the refunded
    // 100 leaves only 140 available).
    let rival = fund(&h, 1000);
    place_bid(&h, rival, auction.id, round.id, 150);
    assert!(h.sink.snapshot().iter().any(|e| matches!(
        e,
        EngineEvent::AutoBidRetrying { required, .. } if *required == dec(200)
    )));
    assert!(h.autobids.get(auto_user, auction.id).unwrap().is_active);

    // The retry fires on the tick after the 5s delay and fails again.
    run_ticks(&h, 6);
    let record = h.autobids.get(auto_user, auction.id).unwrap();
    assert!(!record.is_active);
    assert_eq!(
        record.stopped_reason,
        Some(AutoBidStopReason::InsufficientFunds)
    );
    // The rival still leads.
    let leader = h.store.highest_active_bid(round.id).unwrap();
    assert_eq!(leader.user_id, rival);
}

/// Two full rounds: winners are charged, the grace delay separates the
/// rounds, and funds are conserved across the whole auction.
#[test]
fn multi_round_auction_runs_to_completion() {
    let h = harness();
    let auction = h
        .lifecycle
        .create_auction(AuctionConfig {
            rounds_total: 2,
            ..AuctionConfig::default()
        })
        .unwrap();
    h.lifecycle.start_auction(auction.id).unwrap();
    let round1 = h.store.active_round(auction.id).unwrap();

    let alice = fund(&h, 1000);
    let bob = fund(&h, 1000);
    place_bid(&h, alice, auction.id, round1.id, 100);
    place_bid(&h, bob, auction.id, round1.id, 200);

    // Round 1 expires: bob wins and is charged, alice was already refunded.
    run_ticks(&h, 601);
    let settled = h.store.round(round1.id).unwrap();
    assert_eq!(settled.status, RoundStatus::Completed);
    assert_eq!(settled.winning_bid_ids.len(), 1);
    assert_eq!(
        h.store.bid(settled.winning_bid_ids[0]).unwrap().status,
        BidStatus::Won
    );
    assert_eq!(h.ledger.balance(bob).available, dec(800));
    assert_eq!(h.ledger.balance(bob).locked, Decimal::ZERO);
    assert_eq!(h.ledger.balance(alice).available, dec(1000));

    // Grace delay, then round 2 opens and runs.
    run_ticks(&h, 10);
    let round2 = h.store.active_round(auction.id).unwrap();
    assert_eq!(round2.round_number, 2);
    place_bid(&h, alice, auction.id, round2.id, 100);
    run_ticks(&h, 601);

    assert_eq!(
        h.store.auction(auction.id).unwrap().status,
        AuctionStatus::Completed
    );
    assert!(h
        .sink
        .snapshot()
        .iter()
        .any(|e| matches!(e, EngineEvent::AuctionCompleted { .. })));
    // 100 + 200 deposited minus the two winning charges (200 + 100).
    assert_eq!(h.ledger.total_supply(), dec(1700));
    assert_eq!(h.ledger.balance(alice).available, dec(900));
}

/// Pausing freezes the round clock; cancelling refunds the leader.
#[test]
fn pause_then_cancel_returns_all_funds() {
    let h = harness();
    let auction = h.lifecycle.create_auction(AuctionConfig::default()).unwrap();
    h.lifecycle.start_auction(auction.id).unwrap();
    let round = h.store.active_round(auction.id).unwrap();
    let user = fund(&h, 1000);
    place_bid(&h, user, auction.id, round.id, 300);

    run_ticks(&h, 100);
    h.lifecycle.pause_auction(auction.id).unwrap();
    // Hours pass; the paused round neither ticks nor settles.
    run_ticks(&h, 7200);
    assert_eq!(h.store.round(round.id).unwrap().status, RoundStatus::Active);

    h.lifecycle.cancel_auction(auction.id).unwrap();
    assert_eq!(
        h.store.auction(auction.id).unwrap().status,
        AuctionStatus::Cancelled
    );
    let bal = h.ledger.balance(user);
    assert_eq!(bal.available, dec(1000));
    assert_eq!(bal.locked, Decimal::ZERO);
    assert_eq!(h.store.bid(h.store.bids_for_round(round.id)[0].id).unwrap().status,
        BidStatus::Refunded);
}

/// Pausing inside the inter-round grace gap must not burn the next
/// round's bidding window: after a long pause, round 2 still opens with
/// its full duration and accepts bids.
#[test]
fn pause_during_grace_preserves_next_round_window() {
    let h = harness();
    let auction = h
        .lifecycle
        .create_auction(AuctionConfig {
            rounds_total: 2,
            ..AuctionConfig::default()
        })
        .unwrap();
    h.lifecycle.start_auction(auction.id).unwrap();
    let round1 = h.store.active_round(auction.id).unwrap();
    let alice = fund(&h, 1000);
    place_bid(&h, alice, auction.id, round1.id, 100);

    // Round 1 settles; round 2 is pending, 10s of grace away.
    run_ticks(&h, 601);
    assert_eq!(
        h.store.round(round1.id).unwrap().status,
        RoundStatus::Completed
    );
    let round2 = h.store.rounds_for(auction.id)[1].clone();
    assert_eq!(round2.status, RoundStatus::Pending);

    // Pause 4s into the gap, then let hours pass.
    run_ticks(&h, 4);
    h.lifecycle.pause_auction(auction.id).unwrap();
    run_ticks(&h, 7200);
    assert_eq!(
        h.store.round(round2.id).unwrap().status,
        RoundStatus::Pending
    );

    // Resume: the remaining 6s of grace elapse, then round 2 opens with
    // its full window.
    h.lifecycle.start_auction(auction.id).unwrap();
    run_ticks(&h, 6);
    let active = h.store.round(round2.id).unwrap();
    assert_eq!(active.status, RoundStatus::Active);
    assert_eq!(active.remaining(h.clock.now()), Duration::seconds(600));

    // The round actually takes bids instead of settling on the next tick.
    let bob = fund(&h, 1000);
    place_bid(&h, bob, auction.id, round2.id, 100);
    run_ticks(&h, 1);
    assert_eq!(h.store.round(round2.id).unwrap().status, RoundStatus::Active);
    assert_eq!(h.ledger.balance(bob).locked, dec(100));
}

/// An auto-bid war plays out across the clock and the cap loser's funds
/// come back before the round settles.
#[test]
fn auto_bid_war_settles_cleanly() {
    let h = harness();
    let auction = h.lifecycle.create_auction(AuctionConfig::default()).unwrap();
    h.lifecycle.start_auction(auction.id).unwrap();
    let round = h.store.active_round(auction.id).unwrap();

    let alice = fund(&h, 1000);
    let bob = fund(&h, 1000);
    h.autobids.setup_auto_bid(alice, auction.id, dec(300)).unwrap();
    h.autobids.setup_auto_bid(bob, auction.id, dec(600)).unwrap();
    h.autobids.on_bid_committed(auction.id, round.id);

    // Bob outlasts alice's cap; only his lock remains.
    let leader = h.store.highest_active_bid(round.id).unwrap();
    assert_eq!(leader.user_id, bob);
    assert_eq!(h.ledger.balance(alice).locked, Decimal::ZERO);
    assert_eq!(h.ledger.balance(alice).available, dec(1000));

    run_ticks(&h, 601);
    assert_eq!(
        h.store.auction(auction.id).unwrap().status,
        AuctionStatus::Completed
    );
    let bob_bal = h.ledger.balance(bob);
    assert_eq!(bob_bal.locked, Decimal::ZERO);
    assert_eq!(bob_bal.available + leader.amount, dec(1000));
    // Records are stopped with the auction.
    assert!(h.autobids.active_for_auction(auction.id).is_empty());
    assert_eq!(h.ledger.total_supply(), dec(2000) - leader.amount);
}
