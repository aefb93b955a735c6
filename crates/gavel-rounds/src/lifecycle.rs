//! Administrative auction transitions and round settlement.
//!
//! Everything that moves money here runs under the same per-auction mutex
//! the bid path uses, so settlement never races a landing bid. Round
//! completion is guarded twice: the mutex serializes processes, and the
//! ACTIVE → PROCESSING compare-and-set makes the winner selection itself
//! one-shot.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use gavel_engine::{AuctionMutex, AuctionStore, AutoBidEngine, SharedCache};
use gavel_ledger::Ledger;
use gavel_types::{
    Auction, AuctionConfig, AuctionId, AuctionStatus, AutoBidStopReason, BidStatus, Clock,
    EngineConfig, EngineEvent, EventSink, GavelError, Result, Round, RoundId, RoundStatus,
};
use tracing::{info, warn};

/// Drives auctions through start, pause, resume, cancel, and round
/// completion.
pub struct AuctionLifecycle {
    store: Arc<AuctionStore>,
    ledger: Arc<Ledger>,
    autobids: Arc<AutoBidEngine>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    mutex: AuctionMutex,
}

fn secs(value: u64) -> chrono::Duration {
    chrono::Duration::seconds(i64::try_from(value).unwrap_or(i64::MAX))
}

impl AuctionLifecycle {
    #[must_use]
    pub fn new(
        store: Arc<AuctionStore>,
        ledger: Arc<Ledger>,
        autobids: Arc<AutoBidEngine>,
        cache: Arc<dyn SharedCache>,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        let mutex = AuctionMutex::new(cache, config.mutex.clone());
        Self {
            store,
            ledger,
            autobids,
            events,
            clock,
            config,
            mutex,
        }
    }

    /// Create an auction in DRAFT state.
    ///
    /// # Errors
    /// `InvalidAuctionConfig` for incoherent rules; propagates store
    /// failures.
    pub fn create_auction(&self, config: AuctionConfig) -> Result<Auction> {
        config.validate()?;
        let auction = Auction::new(config, self.clock.now());
        self.store.insert_auction(auction.clone())?;
        info!(auction_id = %auction.id, "auction created");
        Ok(auction)
    }

    /// Start a DRAFT/SCHEDULED auction, or resume a PAUSED one.
    ///
    /// Starting creates and activates round 1. Resuming restores the
    /// paused round's deadline from its frozen remaining time.
    ///
    /// # Errors
    /// `AuctionNotStartable` from any other state.
    pub fn start_auction(&self, auction_id: AuctionId) -> Result<Auction> {
        let now = self.clock.now();
        let auction = self.store.auction(auction_id)?;
        match auction.status {
            AuctionStatus::Draft | AuctionStatus::Scheduled => {
                let round = Round::new(
                    auction_id,
                    1,
                    auction.config.items_per_round,
                    now,
                    secs(auction.config.round_duration_secs),
                );
                self.store.insert_round(round.clone())?;
                let updated = self.store.update_auction(auction_id, |a| {
                    a.status = AuctionStatus::Active;
                    a.current_round_number = 1;
                    a.updated_at = now;
                })?;
                self.activate_round(round.id)?;
                info!(%auction_id, "auction started");
                Ok(updated)
            }
            AuctionStatus::Paused => self.resume(auction_id, now),
            status => Err(GavelError::AuctionNotStartable { status }),
        }
    }

    fn resume(&self, auction_id: AuctionId, now: DateTime<Utc>) -> Result<Auction> {
        for round in self.store.rounds_for(auction_id) {
            let Some(remaining_ms) = round.paused_remaining_ms else {
                continue;
            };
            let offset = chrono::Duration::milliseconds(remaining_ms);
            if round.status == RoundStatus::Pending {
                // An unstarted round froze its time-until-start; shift its
                // whole window so the full duration survives the pause.
                let duration = round.ends_at - round.starts_at;
                self.store.update_round(round.id, |r| {
                    r.starts_at = now + offset;
                    r.ends_at = r.starts_at + duration;
                    r.original_ends_at = r.ends_at;
                    r.paused_remaining_ms = None;
                })?;
            } else {
                self.store.update_round(round.id, |r| {
                    r.ends_at = now + offset;
                    r.paused_remaining_ms = None;
                })?;
            }
        }
        let updated = self.store.update_auction(auction_id, |a| {
            a.status = AuctionStatus::Active;
            a.updated_at = now;
        })?;
        info!(%auction_id, "auction resumed");
        Ok(updated)
    }

    /// Pause an ACTIVE auction, freezing the round clock: the active
    /// round's remaining time, and the start offset of any round still
    /// waiting out the inter-round grace.
    ///
    /// # Errors
    /// `AuctionNotActive` from any other state.
    pub fn pause_auction(&self, auction_id: AuctionId) -> Result<Auction> {
        let now = self.clock.now();
        let auction = self.store.auction(auction_id)?;
        if !auction.is_active() {
            return Err(GavelError::AuctionNotActive {
                status: auction.status,
            });
        }
        // Freeze every round that still has clock time to lose: the active
        // round's remaining window, and a pending round's time-until-start
        // (a pause inside the inter-round grace gap must not burn the next
        // round's bidding window).
        for round in self.store.rounds_for(auction_id) {
            let frozen_ms = match round.status {
                RoundStatus::Active => round.remaining(now).num_milliseconds().max(0),
                RoundStatus::Pending => (round.starts_at - now).num_milliseconds().max(0),
                _ => continue,
            };
            self.store.update_round(round.id, |r| {
                r.paused_remaining_ms = Some(frozen_ms);
            })?;
        }
        let updated = self.store.update_auction(auction_id, |a| {
            a.status = AuctionStatus::Paused;
            a.updated_at = now;
        })?;
        info!(%auction_id, "auction paused");
        Ok(updated)
    }

    /// Cancel an auction: refund every active bid, close every round, and
    /// stop every auto-bid.
    ///
    /// # Errors
    /// `AuctionNotActive` when the auction is already terminal;
    /// `ServerBusy` under mutex contention.
    pub fn cancel_auction(&self, auction_id: AuctionId) -> Result<Auction> {
        let auction = self.store.auction(auction_id)?;
        if auction.status.is_terminal() {
            return Err(GavelError::AuctionNotActive {
                status: auction.status,
            });
        }

        let guard = self.mutex.acquire(auction_id)?;
        let now = self.clock.now();
        for round in self.store.rounds_for(auction_id) {
            for bid in self.store.active_bids_ranked(round.id) {
                match self.ledger.unlock(
                    bid.user_id,
                    bid.amount,
                    Some(format!("cancel:{}", bid.id)),
                    now,
                ) {
                    Ok(_) => {
                        self.store
                            .update_bid(bid.id, |b| b.status = BidStatus::Refunded)?;
                    }
                    Err(err) => {
                        warn!(bid_id = %bid.id, %err, "cancel refund failed");
                    }
                }
            }
            if round.status != RoundStatus::Completed {
                self.store
                    .update_round(round.id, |r| r.status = RoundStatus::Completed)?;
            }
        }
        let updated = self.store.update_auction(auction_id, |a| {
            a.status = AuctionStatus::Cancelled;
            a.updated_at = now;
        })?;
        drop(guard);

        self.autobids
            .deactivate_for_auction(auction_id, AutoBidStopReason::AuctionEnded);
        self.events
            .publish(EngineEvent::AuctionCancelled { auction_id });
        info!(%auction_id, "auction cancelled");
        Ok(updated)
    }

    /// Transition a PENDING round to ACTIVE and announce it.
    ///
    /// # Errors
    /// `RoundNotFound` for unknown ids; a non-PENDING round is left as-is.
    pub fn activate_round(&self, round_id: RoundId) -> Result<Round> {
        let round = self.store.round(round_id)?;
        if round.status != RoundStatus::Pending {
            return Ok(round);
        }
        let updated = self
            .store
            .update_round(round_id, |r| r.status = RoundStatus::Active)?;
        self.events.publish(EngineEvent::RoundStarted {
            auction_id: updated.auction_id,
            round_id,
            round_number: updated.round_number,
            ends_at: updated.ends_at,
        });
        info!(%round_id, round_number = updated.round_number, "round started");
        Ok(updated)
    }

    /// Settle an expired round: the top bids win and are charged, the rest
    /// are refunded, and the next round is scheduled (or the auction
    /// completes).
    ///
    /// Returns `false` when another caller already won the
    /// ACTIVE → PROCESSING transition.
    ///
    /// # Errors
    /// `ServerBusy` under mutex contention; the caller retries on its next
    /// tick.
    pub fn complete_round(&self, round_id: RoundId) -> Result<bool> {
        let round = self.store.round(round_id)?;
        let auction = self.store.auction(round.auction_id)?;

        let guard = self.mutex.acquire(round.auction_id)?;
        if !self.store.begin_processing(round_id)? {
            drop(guard);
            return Ok(false);
        }
        let now = self.clock.now();

        let ranked = self.store.active_bids_ranked(round_id);
        let cutoff = auction.config.winners_per_round as usize;
        let mut winning_bid_ids = Vec::new();
        for (index, bid) in ranked.iter().enumerate() {
            if index < cutoff {
                match self.ledger.deduct_locked(
                    bid.user_id,
                    bid.amount,
                    Some(format!("won:{}", bid.id)),
                    now,
                ) {
                    Ok(_) => {
                        self.store.update_bid(bid.id, |b| b.status = BidStatus::Won)?;
                        winning_bid_ids.push(bid.id);
                    }
                    Err(err) => {
                        warn!(bid_id = %bid.id, %err, "winner charge failed");
                    }
                }
            } else {
                match self.ledger.unlock(
                    bid.user_id,
                    bid.amount,
                    Some(format!("refund:{}", bid.id)),
                    now,
                ) {
                    Ok(_) => {
                        self.store
                            .update_bid(bid.id, |b| b.status = BidStatus::Refunded)?;
                    }
                    Err(err) => {
                        warn!(bid_id = %bid.id, %err, "loser refund failed");
                    }
                }
            }
        }
        self.store.update_round(round_id, |r| {
            r.status = RoundStatus::Completed;
            r.winning_bid_ids = winning_bid_ids.clone();
        })?;

        let finished = auction.is_final_round(round.round_number);
        if finished {
            self.store.update_auction(round.auction_id, |a| {
                a.status = AuctionStatus::Completed;
                a.updated_at = now;
            })?;
        } else {
            let next = Round::new(
                round.auction_id,
                round.round_number + 1,
                auction.config.items_per_round,
                now + chrono::Duration::milliseconds(
                    i64::try_from(self.config.inter_round_grace.as_millis()).unwrap_or(i64::MAX),
                ),
                secs(auction.config.round_duration_secs),
            );
            self.store.insert_round(next)?;
            self.store.update_auction(round.auction_id, |a| {
                a.current_round_number = round.round_number + 1;
                a.updated_at = now;
            })?;
        }
        drop(guard);

        self.events.publish(EngineEvent::RoundEnded {
            auction_id: round.auction_id,
            round_id,
            winning_bid_ids: self.store.round(round_id)?.winning_bid_ids,
        });
        if finished {
            self.autobids
                .deactivate_for_auction(round.auction_id, AutoBidStopReason::AuctionEnded);
            self.events.publish(EngineEvent::AuctionCompleted {
                auction_id: round.auction_id,
            });
        }
        info!(%round_id, winners = self.store.round(round_id)?.winning_bid_ids.len(), "round settled");
        Ok(true)
    }
}
