//! Bid entity.
//!
//! Invariant: at most one ACTIVE bid per (round, user). A user's second bid
//! in a round supersedes the first, which transitions to OUTBID. A bid is
//! immutable once WON or REFUNDED.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AuctionId, BidId, RoundId, UserId};

/// Lifecycle status of a bid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BidStatus {
    /// Holding a lock, in contention for the round.
    Active,
    /// Superseded by a higher bid; its lock has been released.
    Outbid,
    /// Selected as a round winner; its lock was deducted.
    Won,
    /// Returned at round end or auction cancel; its lock was released.
    Refunded,
}

impl std::fmt::Display for BidStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Outbid => write!(f, "OUTBID"),
            Self::Won => write!(f, "WON"),
            Self::Refunded => write!(f, "REFUNDED"),
        }
    }
}

impl BidStatus {
    /// WON and REFUNDED bids never change again.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Won | Self::Refunded)
    }
}

/// A single bid in a round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bid {
    pub id: BidId,
    pub auction_id: AuctionId,
    pub round_id: RoundId,
    pub user_id: UserId,
    pub amount: Decimal,
    pub status: BidStatus,
    pub is_auto_bid: bool,
    pub placed_at: DateTime<Utc>,
    /// Set when this bid fired an anti-snipe extension.
    pub triggered_extension: bool,
}

impl Bid {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == BidStatus::Active
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Bid {
    pub fn dummy(
        auction_id: AuctionId,
        round_id: RoundId,
        user_id: UserId,
        amount: Decimal,
        placed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: BidId::new(),
            auction_id,
            round_id,
            user_id,
            amount,
            status: BidStatus::Active,
            is_auto_bid: false,
            placed_at,
            triggered_extension: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dummy_bid_is_active() {
        let b = Bid::dummy(
            AuctionId::new(),
            RoundId::new(),
            UserId::new(),
            Decimal::new(100, 0),
            Utc::now(),
        );
        assert!(b.is_active());
        assert!(!b.triggered_extension);
        assert!(!b.is_auto_bid);
    }

    #[test]
    fn terminal_statuses() {
        assert!(BidStatus::Won.is_terminal());
        assert!(BidStatus::Refunded.is_terminal());
        assert!(!BidStatus::Active.is_terminal());
        assert!(!BidStatus::Outbid.is_terminal());
    }

    #[test]
    fn status_display() {
        assert_eq!(format!("{}", BidStatus::Outbid), "OUTBID");
        assert_eq!(format!("{}", BidStatus::Won), "WON");
    }
}
