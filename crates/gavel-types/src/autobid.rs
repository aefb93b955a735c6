//! Auto-bid record: standing instruction to counter-bid on behalf of a
//! user, up to a cap.
//!
//! At most one record exists per (user, auction). Deactivated by the user
//! or by the engine when funding, cap, or auction-end conditions are hit.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AuctionId, UserId};

/// Why an auto-bid was deactivated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AutoBidStopReason {
    /// The user cancelled it.
    Manual,
    /// The cap was reached by a counter-bid.
    MaxReached,
    /// The required counter-bid moved past the cap.
    Outbid,
    /// The auction completed or was cancelled.
    AuctionEnded,
    /// Funding failed twice (initial attempt plus the one retry).
    InsufficientFunds,
}

impl std::fmt::Display for AutoBidStopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::MaxReached => write!(f, "max_reached"),
            Self::Outbid => write!(f, "outbid"),
            Self::AuctionEnded => write!(f, "auction_ended"),
            Self::InsufficientFunds => write!(f, "insufficient_funds"),
        }
    }
}

/// Standing counter-bid instruction for one (user, auction).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoBid {
    pub user_id: UserId,
    pub auction_id: AuctionId,
    /// Never counter-bid above this amount.
    pub max_amount: Decimal,
    /// The last amount this record bid, if any.
    pub current_bid: Option<Decimal>,
    pub is_active: bool,
    /// Counter-bids placed on behalf of the user.
    pub bid_count: u32,
    pub stopped_reason: Option<AutoBidStopReason>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AutoBid {
    /// Create an active record with no bids yet.
    #[must_use]
    pub fn new(
        user_id: UserId,
        auction_id: AuctionId,
        max_amount: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            auction_id,
            max_amount,
            current_bid: None,
            is_active: true,
            bid_count: 0,
            stopped_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Deactivate with a reason. Idempotent: an inactive record keeps its
    /// original reason.
    pub fn deactivate(&mut self, reason: AutoBidStopReason, now: DateTime<Utc>) {
        if self.is_active {
            self.is_active = false;
            self.stopped_reason = Some(reason);
            self.updated_at = now;
        }
    }
}
