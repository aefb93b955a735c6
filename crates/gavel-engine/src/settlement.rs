//! The bid settlement critical section and the read-side query surface.
//!
//! `place_bid` runs entirely under the per-auction mutex: validate, lock
//! the incremental amount, commit the multi-record state transition, then
//! release and broadcast. Funds are locked before the commit; if the
//! commit fails the lock is compensated, so no path leaves money reserved
//! behind a bid that does not exist.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use gavel_ledger::Ledger;
use gavel_types::{
    AuctionId, Bid, BidId, BidStatus, Clock, EngineConfig, EngineEvent, EventSink, GavelError,
    Result, Round, RoundId, RoundStatus, UserId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::mutex::{AuctionMutex, SharedCache};
use crate::store::{AuctionStore, BidCommit};

/// A bid submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceBidRequest {
    pub user_id: UserId,
    pub auction_id: AuctionId,
    pub round_id: RoundId,
    pub amount: Decimal,
    /// Set by the auto-bid engine for its own counter-bids; suppresses the
    /// caller-driven cascade.
    pub is_auto_bid: bool,
}

/// The outcome of an accepted bid.
#[derive(Debug, Clone)]
pub struct BidAcceptance {
    pub bid: Bid,
    /// Whether this bid fired an anti-snipe extension.
    pub triggered_extension: bool,
    /// The extended deadline, when an extension fired.
    pub new_ends_at: Option<DateTime<Utc>>,
}

/// Public per-round statistics snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundStats {
    pub round_id: RoundId,
    pub status: RoundStatus,
    pub total_bids: u64,
    pub unique_bidders: usize,
    pub highest_bid: Option<Decimal>,
    /// The smallest amount a new bid must carry to be accepted.
    pub minimum_next_bid: Decimal,
    pub remaining_secs: i64,
    pub extension_count: u32,
}

/// Refund owed to an outbid user, released after the commit lands.
struct Refund {
    user_id: UserId,
    amount: Decimal,
    bid_id: BidId,
}

/// The settlement engine: owns the bid path end to end.
pub struct SettlementEngine {
    store: Arc<AuctionStore>,
    ledger: Arc<Ledger>,
    mutex: AuctionMutex,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

fn to_chrono(d: std::time::Duration) -> chrono::Duration {
    chrono::Duration::milliseconds(i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

impl SettlementEngine {
    #[must_use]
    pub fn new(
        store: Arc<AuctionStore>,
        ledger: Arc<Ledger>,
        cache: Arc<dyn SharedCache>,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        let mutex = AuctionMutex::new(cache, config.mutex.clone());
        Self {
            store,
            ledger,
            mutex,
            events,
            clock,
            config,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<AuctionStore> {
        &self.store
    }

    #[must_use]
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Place a bid.
    ///
    /// Serialized per auction by the distributed mutex; events are
    /// broadcast only after the lock is released.
    ///
    /// # Errors
    /// `ServerBusy` under contention, `AuctionNotActive`,
    /// `RoundNotAcceptingBids`, `BidTooLow`, `SelfOutbid`, or
    /// `InsufficientFunds`; every failure leaves balances and bid state
    /// untouched.
    pub fn place_bid(&self, request: &PlaceBidRequest) -> Result<BidAcceptance> {
        let guard = self.mutex.acquire(request.auction_id)?;
        let result = self.settle(request);
        drop(guard);

        let (acceptance, events) = result?;
        for event in events {
            self.events.publish(event);
        }
        Ok(acceptance)
    }

    /// The critical section proper. Returns the acceptance plus the events
    /// to broadcast once the mutex is released.
    fn settle(&self, request: &PlaceBidRequest) -> Result<(BidAcceptance, Vec<EngineEvent>)> {
        let now = self.clock.now();
        let auction = self.store.auction(request.auction_id)?;
        if !auction.is_active() {
            return Err(GavelError::AuctionNotActive {
                status: auction.status,
            });
        }

        let round = self.store.round(request.round_id)?;
        if round.auction_id != request.auction_id {
            return Err(GavelError::RoundNotFound(request.round_id));
        }
        if !round.is_active() {
            return Err(GavelError::RoundNotAcceptingBids {
                reason: format!("round is {}", round.status),
            });
        }
        if now >= round.ends_at - to_chrono(self.config.bidding_buffer) {
            return Err(GavelError::RoundNotAcceptingBids {
                reason: "round is closing".into(),
            });
        }

        let cfg = &auction.config;
        if request.amount < cfg.min_bid {
            return Err(GavelError::BidTooLow {
                minimum: cfg.min_bid,
            });
        }
        if let Some(leader) = self.store.highest_active_bid(round.id) {
            if leader.user_id == request.user_id {
                return Err(GavelError::SelfOutbid);
            }
            let minimum = leader.amount + cfg.bid_increment;
            if request.amount < minimum {
                return Err(GavelError::BidTooLow { minimum });
            }
        }

        // A raising bidder only locks the difference over their still-active
        // earlier bid.
        let existing = self.store.active_bid_for_user(round.id, request.user_id);
        let delta = match &existing {
            Some(prior) => request.amount - prior.amount,
            None => request.amount,
        };

        let bid_id = BidId::new();
        self.ledger.lock(
            request.user_id,
            delta,
            Some(format!("bid:{bid_id}")),
            now,
        )?;

        // Anti-snipe: measured from the *current* deadline, bounded per round.
        let threshold = chrono::Duration::seconds(
            i64::try_from(cfg.anti_snipe_threshold_secs).unwrap_or(i64::MAX),
        );
        let triggered = round.remaining(now) <= threshold
            && round.extension_count < cfg.max_anti_snipe_extensions;
        let extend_to = triggered.then(|| {
            round.ends_at
                + chrono::Duration::seconds(
                    i64::try_from(cfg.anti_snipe_extension_secs).unwrap_or(i64::MAX),
                )
        });

        let new_bid = Bid {
            id: bid_id,
            auction_id: request.auction_id,
            round_id: round.id,
            user_id: request.user_id,
            amount: request.amount,
            status: BidStatus::Active,
            is_auto_bid: request.is_auto_bid,
            placed_at: now,
            triggered_extension: triggered,
        };

        // Everyone currently active is swept to OUTBID: the bidder's own
        // superseded bid plus all other contenders, who get refunds.
        let active = self.store.active_bids_ranked(round.id);
        let outbid: Vec<BidId> = active.iter().map(|b| b.id).collect();
        let refunds: Vec<Refund> = active
            .iter()
            .filter(|b| b.user_id != request.user_id)
            .map(|b| Refund {
                user_id: b.user_id,
                amount: b.amount,
                bid_id: b.id,
            })
            .collect();

        let commit = BidCommit {
            new_bid: new_bid.clone(),
            outbid,
            extend_to,
            now,
        };
        if let Err(err) = self.store.commit_bid(commit) {
            // Compensate the funds lock; the bid never existed.
            if let Err(unlock_err) =
                self.ledger
                    .unlock(request.user_id, delta, Some(format!("bid:{bid_id}")), now)
            {
                warn!(user_id = %request.user_id, %unlock_err, "compensating unlock failed");
            }
            return Err(err);
        }

        // Refund the outbid contenders. Their locks were placed by earlier
        // accepted bids, so these cannot fail while the ledger invariants
        // hold; a failure is logged and skipped rather than unwinding an
        // already-committed bid.
        let mut events = Vec::with_capacity(2 + refunds.len());
        for refund in &refunds {
            match self.ledger.unlock(
                refund.user_id,
                refund.amount,
                Some(format!("outbid:{}", refund.bid_id)),
                now,
            ) {
                Ok(_) => events.push(EngineEvent::UserOutbid {
                    round_id: round.id,
                    user_id: refund.user_id,
                    refunded: refund.amount,
                    outbid_by: request.amount,
                }),
                Err(err) => {
                    warn!(user_id = %refund.user_id, %err, "outbid refund failed");
                }
            }
        }

        events.push(EngineEvent::BidPlaced {
            auction_id: request.auction_id,
            round_id: round.id,
            bid_id,
            user_id: request.user_id,
            amount: request.amount,
            is_auto_bid: request.is_auto_bid,
        });
        if let Some(new_ends_at) = extend_to {
            events.push(EngineEvent::RoundExtended {
                round_id: round.id,
                new_ends_at,
                extension_count: round.extension_count + 1,
            });
        }

        debug!(
            %bid_id,
            user_id = %request.user_id,
            amount = %request.amount,
            extended = triggered,
            "bid settled"
        );
        Ok((
            BidAcceptance {
                bid: new_bid,
                triggered_extension: triggered,
                new_ends_at: extend_to,
            },
            events,
        ))
    }

    // -- queries -------------------------------------------------------------

    /// The smallest acceptable bid amount for a round right now.
    ///
    /// # Errors
    /// `RoundNotFound` / `AuctionNotFound` when the ids are unknown.
    pub fn minimum_bid_amount(&self, round_id: RoundId) -> Result<Decimal> {
        let round = self.store.round(round_id)?;
        let auction = self.store.auction(round.auction_id)?;
        Ok(match self.store.highest_active_bid(round_id) {
            Some(leader) => leader.amount + auction.config.bid_increment,
            None => auction.config.min_bid,
        })
    }

    /// Whether the user currently sits inside the winner cut-off.
    ///
    /// # Errors
    /// `RoundNotFound` / `AuctionNotFound` when the ids are unknown.
    pub fn is_user_winning(&self, user_id: UserId, round_id: RoundId) -> Result<bool> {
        let round = self.store.round(round_id)?;
        let auction = self.store.auction(round.auction_id)?;
        let cutoff = auction.config.winners_per_round as usize;
        Ok(self
            .store
            .active_bids_ranked(round_id)
            .iter()
            .take(cutoff)
            .any(|b| b.user_id == user_id))
    }

    /// The top `limit` active bids of a round in winner order.
    #[must_use]
    pub fn top_bids(&self, round_id: RoundId, limit: usize) -> Vec<Bid> {
        let mut bids = self.store.active_bids_ranked(round_id);
        bids.truncate(limit);
        bids
    }

    /// Public statistics for a round.
    ///
    /// # Errors
    /// `RoundNotFound` / `AuctionNotFound` when the ids are unknown.
    pub fn round_stats(&self, round_id: RoundId) -> Result<RoundStats> {
        let round = self.store.round(round_id)?;
        let minimum_next_bid = self.minimum_bid_amount(round_id)?;
        let bids = self.store.bids_for_round(round_id);
        let unique_bidders = {
            let mut users: Vec<UserId> = bids.iter().map(|b| b.user_id).collect();
            users.sort_unstable();
            users.dedup();
            users.len()
        };
        Ok(RoundStats {
            round_id,
            status: round.status,
            total_bids: round.total_bids,
            unique_bidders,
            highest_bid: self.store.highest_active_bid(round_id).map(|b| b.amount),
            minimum_next_bid,
            remaining_secs: round.remaining(self.clock.now()).num_seconds(),
            extension_count: round.extension_count,
        })
    }

    #[must_use]
    pub fn round(&self, round_id: RoundId) -> Option<Round> {
        self.store.round(round_id).ok()
    }
}
