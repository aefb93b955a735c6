//! Authoritative auction/round/bid store.
//!
//! One interior lock guards all three maps, so a [`BidCommit`] applies as
//! a single multi-record transaction: no reader ever observes a bid
//! without its outbid transitions or round extension. Denormalized auction
//! counters are recomputed from bid rows inside the same commit and are
//! never used for invariant checks.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use gavel_types::{
    Auction, AuctionId, Bid, BidId, BidStatus, GavelError, Result, Round, RoundId, RoundStatus,
    UserId,
};
use rust_decimal::Decimal;

struct StoreInner {
    auctions: HashMap<AuctionId, Auction>,
    rounds: HashMap<RoundId, Round>,
    bids: HashMap<BidId, Bid>,
}

/// The multi-record write applied atomically when a bid settles.
#[derive(Debug, Clone)]
pub struct BidCommit {
    /// The new ACTIVE bid.
    pub new_bid: Bid,
    /// Previously-active bids to transition to OUTBID (the new leader's own
    /// superseded bid included).
    pub outbid: Vec<BidId>,
    /// Anti-snipe extension target, if the bid fired one.
    pub extend_to: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
}

/// In-memory rendition of the durable store's atomic multi-record commit.
pub struct AuctionStore {
    inner: Mutex<StoreInner>,
}

impl AuctionStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                auctions: HashMap::new(),
                rounds: HashMap::new(),
                bids: HashMap::new(),
            }),
        }
    }

    fn guard(&self) -> Result<MutexGuard<'_, StoreInner>> {
        self.inner
            .lock()
            .map_err(|_| GavelError::Internal("store mutex poisoned".into()))
    }

    // -- auctions ----------------------------------------------------------

    pub fn insert_auction(&self, auction: Auction) -> Result<()> {
        let mut inner = self.guard()?;
        inner.auctions.insert(auction.id, auction);
        Ok(())
    }

    pub fn auction(&self, id: AuctionId) -> Result<Auction> {
        let inner = self.guard()?;
        inner
            .auctions
            .get(&id)
            .cloned()
            .ok_or(GavelError::AuctionNotFound(id))
    }

    pub fn auctions(&self) -> Vec<Auction> {
        self.guard()
            .map(|inner| inner.auctions.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Mutate an auction in place; returns the updated snapshot.
    pub fn update_auction(
        &self,
        id: AuctionId,
        f: impl FnOnce(&mut Auction),
    ) -> Result<Auction> {
        let mut inner = self.guard()?;
        let auction = inner
            .auctions
            .get_mut(&id)
            .ok_or(GavelError::AuctionNotFound(id))?;
        f(auction);
        Ok(auction.clone())
    }

    // -- rounds ------------------------------------------------------------

    pub fn insert_round(&self, round: Round) -> Result<()> {
        let mut inner = self.guard()?;
        inner.rounds.insert(round.id, round);
        Ok(())
    }

    pub fn round(&self, id: RoundId) -> Result<Round> {
        let inner = self.guard()?;
        inner
            .rounds
            .get(&id)
            .cloned()
            .ok_or(GavelError::RoundNotFound(id))
    }

    /// The single ACTIVE round of an auction, if any.
    pub fn active_round(&self, auction_id: AuctionId) -> Option<Round> {
        self.guard().ok().and_then(|inner| {
            inner
                .rounds
                .values()
                .find(|r| r.auction_id == auction_id && r.status == RoundStatus::Active)
                .cloned()
        })
    }

    /// All rounds of an auction, ordered by round number.
    pub fn rounds_for(&self, auction_id: AuctionId) -> Vec<Round> {
        let mut rounds: Vec<Round> = self
            .guard()
            .map(|inner| {
                inner
                    .rounds
                    .values()
                    .filter(|r| r.auction_id == auction_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        rounds.sort_by_key(|r| r.round_number);
        rounds
    }

    pub fn update_round(&self, id: RoundId, f: impl FnOnce(&mut Round)) -> Result<Round> {
        let mut inner = self.guard()?;
        let round = inner
            .rounds
            .get_mut(&id)
            .ok_or(GavelError::RoundNotFound(id))?;
        f(round);
        Ok(round.clone())
    }

    /// Idempotent ACTIVE → PROCESSING transition. Returns `true` for the
    /// single caller that wins the transition; redundant schedulers get
    /// `false` and must not process the round.
    pub fn begin_processing(&self, id: RoundId) -> Result<bool> {
        let mut inner = self.guard()?;
        let round = inner
            .rounds
            .get_mut(&id)
            .ok_or(GavelError::RoundNotFound(id))?;
        if round.status != RoundStatus::Active {
            return Ok(false);
        }
        round.status = RoundStatus::Processing;
        Ok(true)
    }

    // -- bids --------------------------------------------------------------

    pub fn bid(&self, id: BidId) -> Result<Bid> {
        let inner = self.guard()?;
        inner.bids.get(&id).cloned().ok_or(GavelError::BidNotFound(id))
    }

    pub fn bids_for_round(&self, round_id: RoundId) -> Vec<Bid> {
        self.guard()
            .map(|inner| {
                inner
                    .bids
                    .values()
                    .filter(|b| b.round_id == round_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// ACTIVE bids of a round, ranked: amount descending, then earliest
    /// placement, then bid id. This ordering is the winner cut-off order.
    pub fn active_bids_ranked(&self, round_id: RoundId) -> Vec<Bid> {
        let mut bids: Vec<Bid> = self
            .guard()
            .map(|inner| {
                inner
                    .bids
                    .values()
                    .filter(|b| b.round_id == round_id && b.is_active())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        bids.sort_by(|a, b| {
            b.amount
                .cmp(&a.amount)
                .then(a.placed_at.cmp(&b.placed_at))
                .then(a.id.cmp(&b.id))
        });
        bids
    }

    /// The current leader of a round.
    pub fn highest_active_bid(&self, round_id: RoundId) -> Option<Bid> {
        self.active_bids_ranked(round_id).into_iter().next()
    }

    /// A user's ACTIVE bid in a round, if they hold one.
    pub fn active_bid_for_user(&self, round_id: RoundId, user_id: UserId) -> Option<Bid> {
        self.guard().ok().and_then(|inner| {
            inner
                .bids
                .values()
                .find(|b| b.round_id == round_id && b.user_id == user_id && b.is_active())
                .cloned()
        })
    }

    pub fn update_bid(&self, id: BidId, f: impl FnOnce(&mut Bid)) -> Result<Bid> {
        let mut inner = self.guard()?;
        let bid = inner.bids.get_mut(&id).ok_or(GavelError::BidNotFound(id))?;
        f(bid);
        Ok(bid.clone())
    }

    // -- the atomic bid commit ---------------------------------------------

    /// Apply a settled bid as one multi-record transaction: outbid
    /// transitions, bid insert, round extension and counters, and the
    /// denormalized auction caches.
    ///
    /// # Errors
    /// Returns `DuplicateActiveBid` if the commit would leave a second
    /// ACTIVE bid for any user in the round; nothing is applied.
    pub fn commit_bid(&self, commit: BidCommit) -> Result<()> {
        let mut inner = self.guard()?;
        let round_id = commit.new_bid.round_id;
        let auction_id = commit.new_bid.auction_id;
        if !inner.rounds.contains_key(&round_id) {
            return Err(GavelError::RoundNotFound(round_id));
        }
        if !inner.auctions.contains_key(&auction_id) {
            return Err(GavelError::AuctionNotFound(auction_id));
        }

        // Hard single-active-bid constraint, checked before any mutation:
        // every currently-active bid in the round must be in the outbid set.
        let violating = inner.bids.values().find(|b| {
            b.round_id == round_id && b.is_active() && !commit.outbid.contains(&b.id)
        });
        if let Some(bid) = violating {
            return Err(GavelError::DuplicateActiveBid {
                user_id: bid.user_id,
                round_id,
            });
        }

        for bid_id in &commit.outbid {
            if let Some(bid) = inner.bids.get_mut(bid_id) {
                if bid.is_active() {
                    bid.status = BidStatus::Outbid;
                }
            }
        }
        inner.bids.insert(commit.new_bid.id, commit.new_bid.clone());

        if let Some(round) = inner.rounds.get_mut(&round_id) {
            round.total_bids += 1;
            if let Some(extend_to) = commit.extend_to {
                // ends_at only ever moves forward.
                if extend_to > round.ends_at {
                    round.ends_at = extend_to;
                    round.extension_count += 1;
                }
            }
        }

        // Refresh denormalized caches from authoritative bid rows.
        let highest = inner
            .bids
            .values()
            .filter(|b| b.auction_id == auction_id && b.is_active())
            .map(|b| b.amount)
            .max()
            .unwrap_or(Decimal::ZERO);
        let total = u64::try_from(
            inner
                .bids
                .values()
                .filter(|b| b.auction_id == auction_id)
                .count(),
        )
        .unwrap_or(u64::MAX);
        if let Some(auction) = inner.auctions.get_mut(&auction_id) {
            auction.highest_bid_amount = highest;
            auction.total_bid_count = total;
            auction.updated_at = commit.now;
        }
        Ok(())
    }
}

impl Default for AuctionStore {
    fn default() -> Self {
        Self::new()
    }
}
