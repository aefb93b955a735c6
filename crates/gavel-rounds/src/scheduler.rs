//! The round clock: a once-per-second scheduler over live auctions.
//!
//! Each tick is synchronous and deterministic — the async runtime only
//! supplies the cadence — so tests drive `tick` directly with a manual
//! clock. Ticks are idempotent: a missed or doubled tick never
//! double-settles a round or repeats a countdown signal.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use gavel_engine::{AuctionStore, AutoBidEngine};
use gavel_types::{
    AuctionStatus, Clock, EngineConfig, EngineEvent, EventSink, GavelError, Round, RoundId,
    RoundStatus,
};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::lifecycle::AuctionLifecycle;

/// Periodic driver for round activation, countdown signals, expiry
/// settlement, and auto-bid retries.
pub struct RoundClock {
    store: Arc<AuctionStore>,
    lifecycle: Arc<AuctionLifecycle>,
    autobids: Arc<AutoBidEngine>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    /// (round, threshold) pairs whose ending-soon signal already fired.
    /// A threshold fires once per round; an anti-snipe extension does not
    /// re-arm it.
    fired: Mutex<HashSet<(RoundId, u64)>>,
}

impl RoundClock {
    #[must_use]
    pub fn new(
        store: Arc<AuctionStore>,
        lifecycle: Arc<AuctionLifecycle>,
        autobids: Arc<AutoBidEngine>,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            lifecycle,
            autobids,
            events,
            clock,
            config,
            fired: Mutex::new(HashSet::new()),
        }
    }

    /// One scheduler pass at `now`.
    pub fn tick(&self, now: DateTime<Utc>) {
        self.autobids.process_due_retries(now);

        for auction in self.store.auctions() {
            if auction.status != AuctionStatus::Active {
                continue;
            }
            for round in self.store.rounds_for(auction.id) {
                match round.status {
                    RoundStatus::Pending if now >= round.starts_at => {
                        if let Err(err) = self.lifecycle.activate_round(round.id) {
                            warn!(round_id = %round.id, %err, "round activation failed");
                        }
                    }
                    RoundStatus::Active if round.has_ended(now) => {
                        self.settle(round.id);
                    }
                    RoundStatus::Active => {
                        self.countdown(&round, now);
                    }
                    _ => {}
                }
            }
        }
    }

    fn settle(&self, round_id: RoundId) {
        match self.lifecycle.complete_round(round_id) {
            Ok(true) => {
                if let Ok(mut fired) = self.fired.lock() {
                    fired.retain(|(id, _)| *id != round_id);
                }
            }
            Ok(false) => {
                debug!(%round_id, "round already being settled");
            }
            Err(GavelError::ServerBusy { .. }) => {
                // The bid path holds the auction; the next tick retries.
            }
            Err(err) => {
                warn!(%round_id, %err, "round settlement failed");
            }
        }
    }

    fn countdown(&self, round: &Round, now: DateTime<Utc>) {
        let remaining_secs = round.remaining(now).num_seconds();
        self.events.publish(EngineEvent::RoundTick {
            round_id: round.id,
            remaining_secs,
        });
        for &threshold_secs in &self.config.ending_soon_thresholds_secs {
            if remaining_secs > i64::try_from(threshold_secs).unwrap_or(i64::MAX) {
                continue;
            }
            let newly_fired = self
                .fired
                .lock()
                .map(|mut fired| fired.insert((round.id, threshold_secs)))
                .unwrap_or(false);
            if newly_fired {
                self.events.publish(EngineEvent::RoundEndingSoon {
                    round_id: round.id,
                    threshold_secs,
                    remaining_secs,
                });
            }
        }
    }

    /// Run the clock until `shutdown` flips to `true`.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let now = self.clock.now();
                    self.tick(now);
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("round clock stopped");
    }

    /// Spawn the clock on the current runtime; returns the task handle and
    /// the shutdown switch.
    #[must_use]
    pub fn spawn(self: Arc<Self>) -> (tokio::task::JoinHandle<()>, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(self.run(rx));
        (handle, tx)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;
    use gavel_engine::{InMemoryCache, PlaceBidRequest, SettlementEngine};
    use gavel_ledger::Ledger;
    use gavel_types::{
        AuctionConfig, AuctionId, ManualClock, MemorySink, MutexConfig, UserId,
    };
    use rust_decimal::Decimal;

    use super::*;

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    struct Fixture {
        round_clock: RoundClock,
        settlement: Arc<SettlementEngine>,
        lifecycle: Arc<AuctionLifecycle>,
        ledger: Arc<Ledger>,
        store: Arc<AuctionStore>,
        clock: Arc<ManualClock>,
        sink: Arc<MemorySink>,
    }

    fn fixture() -> Fixture {
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
            autobids,
            sink.clone(),
            clock.clone(),
            config,
        );
        Fixture {
            round_clock,
            settlement,
            lifecycle,
            ledger,
            store,
            clock,
            sink,
        }
    }

    fn started_auction(f: &Fixture) -> AuctionId {
        let auction = f
            .lifecycle
            .create_auction(AuctionConfig {
                rounds_total: 2,
                ..AuctionConfig::default()
            })
            .unwrap();
        f.lifecycle.start_auction(auction.id).unwrap();
        auction.id
    }

    #[test]
    fn tick_broadcasts_countdown() {
        let f = fixture();
        let auction_id = started_auction(&f);
        let round = f.store.active_round(auction_id).unwrap();

        f.round_clock.tick(f.clock.now());
        assert!(f.sink.snapshot().iter().any(|e| matches!(
            e,
            EngineEvent::RoundTick { round_id, remaining_secs }
                if *round_id == round.id && *remaining_secs == 600
        )));
        // No ending-soon signal this far out.
        assert!(!f
            .sink
            .snapshot()
            .iter()
            .any(|e| matches!(e, EngineEvent::RoundEndingSoon { .. })));
    }

    #[test]
    fn ending_soon_fires_once_per_threshold() {
        let f = fixture();
        let auction_id = started_auction(&f);

        f.clock.advance(ChronoDuration::seconds(545)); // 55s remaining
        f.round_clock.tick(f.clock.now());
        f.round_clock.tick(f.clock.now());
        let sixty_count = f
            .sink
            .snapshot()
            .iter()
            .filter(|e| matches!(e, EngineEvent::RoundEndingSoon { threshold_secs: 60, .. }))
            .count();
        assert_eq!(sixty_count, 1, "repeated ticks do not repeat the signal");

        f.clock.advance(ChronoDuration::seconds(30)); // 25s remaining
        f.round_clock.tick(f.clock.now());
        assert!(f
            .sink
            .snapshot()
            .iter()
            .any(|e| matches!(e, EngineEvent::RoundEndingSoon { threshold_secs: 30, .. })));
    }

    #[test]
    fn expired_round_is_settled_and_next_activated() {
        let f = fixture();
        let auction_id = started_auction(&f);
        let round = f.store.active_round(auction_id).unwrap();
        let user = UserId::new();
        f.ledger
            .add_funds(user, dec(500), None, f.clock.now())
            .unwrap();
        f.settlement
            .place_bid(&PlaceBidRequest {
                user_id: user,
                auction_id,
                round_id: round.id,
                amount: dec(100),
                is_auto_bid: false,
            })
            .unwrap();

        f.clock.advance(ChronoDuration::seconds(601));
        f.round_clock.tick(f.clock.now());
        assert_eq!(
            f.store.round(round.id).unwrap().status,
            RoundStatus::Completed
        );
        // The next round waits out the grace delay.
        let rounds = f.store.rounds_for(auction_id);
        assert_eq!(rounds[1].status, RoundStatus::Pending);
        f.round_clock.tick(f.clock.now());
        assert_eq!(
            f.store.round(rounds[1].id).unwrap().status,
            RoundStatus::Pending
        );

        f.clock.advance(ChronoDuration::seconds(10));
        f.round_clock.tick(f.clock.now());
        assert_eq!(
            f.store.round(rounds[1].id).unwrap().status,
            RoundStatus::Active
        );
    }

    #[test]
    fn paused_auctions_are_skipped() {
        let f = fixture();
        let auction_id = started_auction(&f);
        let round = f.store.active_round(auction_id).unwrap();
        f.lifecycle.pause_auction(auction_id).unwrap();

        f.clock.advance(ChronoDuration::seconds(3600));
        f.round_clock.tick(f.clock.now());
        // Not settled while paused, even long past the old deadline.
        assert_ne!(
            f.store.round(round.id).unwrap().status,
            RoundStatus::Completed
        );
    }
}
