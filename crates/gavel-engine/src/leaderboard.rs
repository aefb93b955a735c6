//! Ranked per-round leaderboard projection.
//!
//! An advisory read-side view: computed from bid rows, cached for a short
//! TTL, and allowed to lag the authoritative store by up to that TTL.
//! Winner selection never reads it.
//!
//! The projection is pull-based: nothing on the bid-commit path touches
//! it. A read serves the cached snapshot until the TTL lapses, then
//! rebuilds from bid rows, so the settlement critical section carries no
//! projection work and staleness is bounded by the TTL alone. Consumers
//! that must not serve a stale board after settling a round call
//! [`LeaderboardProjection::invalidate`] or
//! [`LeaderboardProjection::recompute`] themselves.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use gavel_types::{Clock, Result, RoundId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::store::AuctionStore;

/// One bidder's aggregate position in a round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: UserId,
    /// The user's best bid in the round, outbid ones included.
    pub amount: Decimal,
    /// All bids the user placed in the round.
    pub bid_count: u32,
    pub earliest_bid_at: DateTime<Utc>,
    /// 1-based position.
    pub rank: u32,
    /// Whether the user holds an active bid inside the winner cut-off.
    pub is_winning: bool,
}

/// A computed ranking snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Leaderboard {
    pub round_id: RoundId,
    pub computed_at: DateTime<Utc>,
    pub entries: Vec<LeaderboardEntry>,
}

/// TTL-cached leaderboard computation over the store.
pub struct LeaderboardProjection {
    store: Arc<AuctionStore>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
    cache: Mutex<HashMap<RoundId, Leaderboard>>,
}

impl LeaderboardProjection {
    #[must_use]
    pub fn new(store: Arc<AuctionStore>, clock: Arc<dyn Clock>, ttl: std::time::Duration) -> Self {
        Self {
            store,
            clock,
            ttl: chrono::Duration::milliseconds(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// The leaderboard for a round, served from cache while fresh.
    ///
    /// # Errors
    /// `RoundNotFound` / `AuctionNotFound` when the ids are unknown.
    pub fn get(&self, round_id: RoundId) -> Result<Leaderboard> {
        let now = self.clock.now();
        if let Ok(cache) = self.cache.lock() {
            if let Some(cached) = cache.get(&round_id) {
                if cached.computed_at + self.ttl > now {
                    return Ok(cached.clone());
                }
            }
        }
        self.recompute(round_id)
    }

    /// Rebuild the ranking from bid rows, bypassing the cache.
    ///
    /// # Errors
    /// `RoundNotFound` / `AuctionNotFound` when the ids are unknown.
    pub fn recompute(&self, round_id: RoundId) -> Result<Leaderboard> {
        let now = self.clock.now();
        let round = self.store.round(round_id)?;
        let auction = self.store.auction(round.auction_id)?;
        let cutoff = auction.config.winners_per_round as usize;

        struct Agg {
            amount: Decimal,
            bid_count: u32,
            earliest_bid_at: DateTime<Utc>,
        }
        let mut per_user: HashMap<UserId, Agg> = HashMap::new();
        for bid in self.store.bids_for_round(round_id) {
            per_user
                .entry(bid.user_id)
                .and_modify(|agg| {
                    agg.amount = agg.amount.max(bid.amount);
                    agg.bid_count += 1;
                    agg.earliest_bid_at = agg.earliest_bid_at.min(bid.placed_at);
                })
                .or_insert(Agg {
                    amount: bid.amount,
                    bid_count: 1,
                    earliest_bid_at: bid.placed_at,
                });
        }

        let winning: Vec<UserId> = self
            .store
            .active_bids_ranked(round_id)
            .into_iter()
            .take(cutoff)
            .map(|b| b.user_id)
            .collect();

        let mut entries: Vec<LeaderboardEntry> = per_user
            .into_iter()
            .map(|(user_id, agg)| LeaderboardEntry {
                user_id,
                amount: agg.amount,
                bid_count: agg.bid_count,
                earliest_bid_at: agg.earliest_bid_at,
                rank: 0,
                is_winning: winning.contains(&user_id),
            })
            .collect();
        entries.sort_by(|a, b| {
            b.amount
                .cmp(&a.amount)
                .then(a.earliest_bid_at.cmp(&b.earliest_bid_at))
        });
        for (index, entry) in entries.iter_mut().enumerate() {
            entry.rank = u32::try_from(index + 1).unwrap_or(u32::MAX);
        }

        let board = Leaderboard {
            round_id,
            computed_at: now,
            entries,
        };
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(round_id, board.clone());
        }
        Ok(board)
    }

    /// Drop the cached snapshot for a completed round.
    pub fn invalidate(&self, round_id: RoundId) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.remove(&round_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;
    use gavel_types::{
        Auction, AuctionConfig, AuctionStatus, Bid, ManualClock, Round, RoundStatus,
    };

    use super::*;
    use crate::store::BidCommit;

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    fn setup() -> (Arc<AuctionStore>, Arc<ManualClock>, Auction, Round) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let now = clock.now();
        let store = Arc::new(AuctionStore::new());
        let mut auction = Auction::new(AuctionConfig::default(), now);
        auction.status = AuctionStatus::Active;
        let mut round = Round::new(auction.id, 1, 10, now, ChronoDuration::seconds(600));
        round.status = RoundStatus::Active;
        store.insert_auction(auction.clone()).unwrap();
        store.insert_round(round.clone()).unwrap();
        (store, clock, auction, round)
    }

    fn commit(store: &AuctionStore, bid: Bid, outbid: Vec<gavel_types::BidId>) {
        let now = bid.placed_at;
        store
            .commit_bid(BidCommit {
                new_bid: bid,
                outbid,
                extend_to: None,
                now,
            })
            .unwrap();
    }

    #[test]
    fn ranks_by_best_amount_and_counts_all_bids() {
        let (store, clock, auction, round) = setup();
        let now = clock.now();
        let alice = UserId::new();
        let bob = UserId::new();

        let a1 = Bid::dummy(auction.id, round.id, alice, dec(100), now);
        commit(&store, a1.clone(), vec![]);
        let b1 = Bid::dummy(auction.id, round.id, bob, dec(150), now + ChronoDuration::seconds(1));
        commit(&store, b1.clone(), vec![a1.id]);
        let a2 = Bid::dummy(auction.id, round.id, alice, dec(200), now + ChronoDuration::seconds(2));
        commit(&store, a2.clone(), vec![b1.id]);

        let projection = LeaderboardProjection::new(
            store,
            clock,
            std::time::Duration::from_secs(2),
        );
        let board = projection.get(round.id).unwrap();
        assert_eq!(board.entries.len(), 2);
        assert_eq!(board.entries[0].user_id, alice);
        assert_eq!(board.entries[0].amount, dec(200));
        assert_eq!(board.entries[0].bid_count, 2);
        assert_eq!(board.entries[0].rank, 1);
        assert!(board.entries[0].is_winning);
        assert_eq!(board.entries[1].user_id, bob);
        assert_eq!(board.entries[1].rank, 2);
        assert!(!board.entries[1].is_winning, "bob's bid was swept to outbid");
    }

    #[test]
    fn cache_serves_stale_until_ttl() {
        let (store, clock, auction, round) = setup();
        let now = clock.now();
        let alice = UserId::new();
        let a1 = Bid::dummy(auction.id, round.id, alice, dec(100), now);
        commit(&store, a1.clone(), vec![]);

        let projection = LeaderboardProjection::new(
            store.clone(),
            clock.clone(),
            std::time::Duration::from_secs(2),
        );
        let first = projection.get(round.id).unwrap();
        assert_eq!(first.entries.len(), 1);

        // New bid lands; within the TTL the projection still shows one entry.
        let b1 = Bid::dummy(
            auction.id,
            round.id,
            UserId::new(),
            dec(150),
            now + ChronoDuration::seconds(1),
        );
        commit(&store, b1, vec![a1.id]);
        clock.advance(ChronoDuration::seconds(1));
        assert_eq!(projection.get(round.id).unwrap().entries.len(), 1);

        // Past the TTL it refreshes.
        clock.advance(ChronoDuration::seconds(2));
        assert_eq!(projection.get(round.id).unwrap().entries.len(), 2);
    }

    #[test]
    fn invalidate_forces_refresh() {
        let (store, clock, auction, round) = setup();
        let now = clock.now();
        let a1 = Bid::dummy(auction.id, round.id, UserId::new(), dec(100), now);
        commit(&store, a1.clone(), vec![]);

        let projection = LeaderboardProjection::new(
            store.clone(),
            clock,
            std::time::Duration::from_secs(60),
        );
        assert_eq!(projection.get(round.id).unwrap().entries.len(), 1);
        let b1 = Bid::dummy(auction.id, round.id, UserId::new(), dec(150), now);
        commit(&store, b1, vec![a1.id]);
        projection.invalidate(round.id);
        assert_eq!(projection.get(round.id).unwrap().entries.len(), 2);
    }

    #[test]
    fn empty_round_yields_empty_board() {
        let (store, clock, _, round) = setup();
        let projection =
            LeaderboardProjection::new(store, clock, std::time::Duration::from_secs(2));
        let board = projection.get(round.id).unwrap();
        assert!(board.entries.is_empty());
    }
}
