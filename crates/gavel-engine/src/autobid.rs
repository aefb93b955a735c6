//! Reactive auto-bidding.
//!
//! Each record is a standing instruction: keep the user in the lead up to
//! a cap. The cascade runs after a committed *manual* bid — an engine bid
//! never triggers the cascade directly; the cascade itself loops until no
//! record wants to counter. A funding failure gets exactly one scheduled
//! retry, drained by the round clock's tick.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use gavel_types::{
    AuctionId, AutoBid, AutoBidStopReason, Clock, EngineConfig, EngineEvent, EventSink,
    GavelError, Result, RoundId, UserId,
};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::settlement::{PlaceBidRequest, SettlementEngine};
use crate::store::AuctionStore;

/// A deferred second funding attempt.
#[derive(Debug, Clone)]
struct PendingRetry {
    user_id: UserId,
    auction_id: AuctionId,
    round_id: RoundId,
    due_at: DateTime<Utc>,
}

/// Owns all auto-bid records and the counter-bid cascade.
pub struct AutoBidEngine {
    store: Arc<AuctionStore>,
    settlement: Arc<SettlementEngine>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    records: Mutex<HashMap<(UserId, AuctionId), AutoBid>>,
    retries: Mutex<Vec<PendingRetry>>,
}

impl AutoBidEngine {
    #[must_use]
    pub fn new(
        store: Arc<AuctionStore>,
        settlement: Arc<SettlementEngine>,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            settlement,
            events,
            clock,
            config,
            records: Mutex::new(HashMap::new()),
            retries: Mutex::new(Vec::new()),
        }
    }

    fn records_guard(&self) -> Result<std::sync::MutexGuard<'_, HashMap<(UserId, AuctionId), AutoBid>>> {
        self.records
            .lock()
            .map_err(|_| GavelError::Internal("auto-bid mutex poisoned".into()))
    }

    /// Register (or replace) an auto-bid for a user on an auction, and
    /// place the opening counter-bid if the user is not already leading.
    ///
    /// # Errors
    /// `AuctionNotActive` outside the ACTIVE state, `AutoBidCapExceeded`
    /// when the cap is below the current requirement, plus any bid-path
    /// error from the opening bid; on a bid-path error the registration is
    /// rolled back.
    pub fn setup_auto_bid(
        &self,
        user_id: UserId,
        auction_id: AuctionId,
        max_amount: Decimal,
    ) -> Result<AutoBid> {
        let now = self.clock.now();
        let auction = self.store.auction(auction_id)?;
        if !auction.is_active() {
            return Err(GavelError::AuctionNotActive {
                status: auction.status,
            });
        }

        let active_round = self.store.active_round(auction_id);
        let required = match &active_round {
            Some(round) => self.settlement.minimum_bid_amount(round.id)?,
            None => auction.config.min_bid,
        };
        if max_amount < required {
            return Err(GavelError::AutoBidCapExceeded {
                max_amount,
                required,
            });
        }

        let record = AutoBid::new(user_id, auction_id, max_amount, now);
        let prior = self
            .records_guard()?
            .insert((user_id, auction_id), record.clone());

        // Opening bid, unless the user already leads the round.
        if let Some(round) = active_round {
            let already_leading = self
                .store
                .highest_active_bid(round.id)
                .is_some_and(|b| b.user_id == user_id);
            if !already_leading {
                if let Err(err) = self.counter_bid(user_id, auction_id, round.id, required) {
                    // Roll the registration back; the record never took effect.
                    let mut records = self.records_guard()?;
                    match prior {
                        Some(prev) => {
                            records.insert((user_id, auction_id), prev);
                        }
                        None => {
                            records.remove(&(user_id, auction_id));
                        }
                    }
                    return Err(err);
                }
            }
        }

        self.get(user_id, auction_id)
            .ok_or_else(|| GavelError::Internal("auto-bid record vanished".into()))
    }

    /// Cancel a user's auto-bid.
    ///
    /// # Errors
    /// `AutoBidNotFound` when no record exists.
    pub fn cancel_auto_bid(&self, user_id: UserId, auction_id: AuctionId) -> Result<AutoBid> {
        let now = self.clock.now();
        let mut records = self.records_guard()?;
        let record = records
            .get_mut(&(user_id, auction_id))
            .ok_or(GavelError::AutoBidNotFound {
                user_id,
                auction_id,
            })?;
        record.deactivate(AutoBidStopReason::Manual, now);
        let snapshot = record.clone();
        drop(records);
        self.events.publish(EngineEvent::AutoBidStopped {
            auction_id,
            user_id,
            reason: AutoBidStopReason::Manual,
        });
        Ok(snapshot)
    }

    /// Run the counter-bid cascade after a committed manual bid.
    ///
    /// Loops until no active record wants (or is able) to counter. Records
    /// whose cap falls below the requirement are deactivated; funding
    /// failures schedule one retry.
    pub fn on_bid_committed(&self, auction_id: AuctionId, round_id: RoundId) {
        // Strictly increasing amounts bounded by the caps, so this loop
        // terminates.
        while self.cascade_pass(auction_id, round_id) {}
    }

    /// One pass: the highest-cap eligible record attempts a counter-bid.
    /// Returns whether a bid landed (the cascade then re-evaluates).
    fn cascade_pass(&self, auction_id: AuctionId, round_id: RoundId) -> bool {
        let leader = self.store.highest_active_bid(round_id).map(|b| b.user_id);
        let mut candidates: Vec<AutoBid> = match self.records_guard() {
            Ok(records) => records
                .values()
                .filter(|r| {
                    r.auction_id == auction_id && r.is_active && Some(r.user_id) != leader
                })
                .cloned()
                .collect(),
            Err(_) => return false,
        };
        candidates.sort_by(|a, b| b.max_amount.cmp(&a.max_amount));

        for record in candidates {
            let Ok(required) = self.settlement.minimum_bid_amount(round_id) else {
                return false;
            };
            if record.max_amount < required {
                self.stop(record.user_id, auction_id, AutoBidStopReason::Outbid);
                continue;
            }
            match self.counter_bid(record.user_id, auction_id, round_id, required) {
                Ok(()) => return true,
                Err(GavelError::InsufficientFunds { .. }) => {
                    self.schedule_retry(record.user_id, auction_id, round_id, required);
                }
                Err(GavelError::BidTooLow { .. } | GavelError::SelfOutbid) => {
                    // Raced with another bid; the next pass re-evaluates.
                }
                Err(err) => {
                    warn!(user_id = %record.user_id, %err, "auto-bid attempt failed");
                }
            }
        }
        false
    }

    /// Place one counter-bid and update the record. Deactivates the record
    /// with `MaxReached` when the bid lands exactly at the cap.
    fn counter_bid(
        &self,
        user_id: UserId,
        auction_id: AuctionId,
        round_id: RoundId,
        amount: Decimal,
    ) -> Result<()> {
        self.settlement.place_bid(&PlaceBidRequest {
            user_id,
            auction_id,
            round_id,
            amount,
            is_auto_bid: true,
        })?;
        let now = self.clock.now();
        let mut reached_max = false;
        if let Ok(mut records) = self.records_guard() {
            if let Some(record) = records.get_mut(&(user_id, auction_id)) {
                record.current_bid = Some(amount);
                record.bid_count += 1;
                record.updated_at = now;
                if amount >= record.max_amount {
                    record.deactivate(AutoBidStopReason::MaxReached, now);
                    reached_max = true;
                }
            }
        }
        debug!(%user_id, %auction_id, %amount, "auto-bid placed");
        self.events.publish(EngineEvent::AutoBidTriggered {
            auction_id,
            user_id,
            amount,
        });
        if reached_max {
            self.events.publish(EngineEvent::AutoBidStopped {
                auction_id,
                user_id,
                reason: AutoBidStopReason::MaxReached,
            });
        }
        Ok(())
    }

    fn schedule_retry(
        &self,
        user_id: UserId,
        auction_id: AuctionId,
        round_id: RoundId,
        required: Decimal,
    ) {
        let due_at = self.clock.now()
            + chrono::Duration::milliseconds(
                i64::try_from(self.config.auto_bid_retry_delay.as_millis()).unwrap_or(i64::MAX),
            );
        if let Ok(mut retries) = self.retries.lock() {
            retries.push(PendingRetry {
                user_id,
                auction_id,
                round_id,
                due_at,
            });
        }
        self.events.publish(EngineEvent::AutoBidRetrying {
            auction_id,
            user_id,
            required,
        });
    }

    /// Drain retries whose due time has passed. Called by the round clock
    /// once per tick. A second funding failure deactivates the record.
    pub fn process_due_retries(&self, now: DateTime<Utc>) {
        let due: Vec<PendingRetry> = match self.retries.lock() {
            Ok(mut retries) => {
                let (ready, pending): (Vec<_>, Vec<_>) =
                    retries.drain(..).partition(|r| r.due_at <= now);
                *retries = pending;
                ready
            }
            Err(_) => return,
        };

        for retry in due {
            let still_active = self
                .get(retry.user_id, retry.auction_id)
                .is_some_and(|r| r.is_active);
            if !still_active {
                continue;
            }
            // The round may have completed while the retry waited.
            let current = self.store.active_round(retry.auction_id);
            if current.as_ref().map(|r| r.id) != Some(retry.round_id) {
                continue;
            }
            let Ok(required) = self.settlement.minimum_bid_amount(retry.round_id) else {
                continue;
            };
            let record = match self.get(retry.user_id, retry.auction_id) {
                Some(record) => record,
                None => continue,
            };
            if record.max_amount < required {
                self.stop(retry.user_id, retry.auction_id, AutoBidStopReason::Outbid);
                continue;
            }
            match self.counter_bid(retry.user_id, retry.auction_id, retry.round_id, required) {
                Ok(()) => {
                    // A successful retry can re-open the cascade.
                    self.on_bid_committed(retry.auction_id, retry.round_id);
                }
                Err(GavelError::InsufficientFunds { .. }) => {
                    self.stop(
                        retry.user_id,
                        retry.auction_id,
                        AutoBidStopReason::InsufficientFunds,
                    );
                }
                Err(err) => {
                    warn!(user_id = %retry.user_id, %err, "auto-bid retry failed");
                }
            }
        }
    }

    /// Deactivate every active record on an auction, e.g. at completion or
    /// cancellation.
    pub fn deactivate_for_auction(&self, auction_id: AuctionId, reason: AutoBidStopReason) {
        let now = self.clock.now();
        let stopped: Vec<UserId> = match self.records_guard() {
            Ok(mut records) => records
                .values_mut()
                .filter(|r| r.auction_id == auction_id && r.is_active)
                .map(|r| {
                    r.deactivate(reason, now);
                    r.user_id
                })
                .collect(),
            Err(_) => return,
        };
        for user_id in stopped {
            self.events.publish(EngineEvent::AutoBidStopped {
                auction_id,
                user_id,
                reason,
            });
        }
    }

    fn stop(&self, user_id: UserId, auction_id: AuctionId, reason: AutoBidStopReason) {
        let now = self.clock.now();
        if let Ok(mut records) = self.records_guard() {
            if let Some(record) = records.get_mut(&(user_id, auction_id)) {
                record.deactivate(reason, now);
            }
        }
        self.events.publish(EngineEvent::AutoBidStopped {
            auction_id,
            user_id,
            reason,
        });
    }

    /// The record for one (user, auction), if any.
    #[must_use]
    pub fn get(&self, user_id: UserId, auction_id: AuctionId) -> Option<AutoBid> {
        self.records
            .lock()
            .ok()
            .and_then(|records| records.get(&(user_id, auction_id)).cloned())
    }

    /// All active records on an auction.
    #[must_use]
    pub fn active_for_auction(&self, auction_id: AuctionId) -> Vec<AutoBid> {
        self.records
            .lock()
            .map(|records| {
                records
                    .values()
                    .filter(|r| r.auction_id == auction_id && r.is_active)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}
