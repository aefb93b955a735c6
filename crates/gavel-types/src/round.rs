//! Round entity: one timed bidding window within a multi-round auction.
//!
//! `ends_at` is mutable (anti-snipe extensions push it forward);
//! `original_ends_at` is the immutable baseline. At most one round per
//! auction is ACTIVE at a time.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{AuctionId, BidId, RoundId};

/// Lifecycle status of a round. `PROCESSING` is the one-shot window in
/// which winners are selected; only one caller can win the
/// ACTIVE → PROCESSING transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoundStatus {
    Pending,
    Active,
    Processing,
    Completed,
}

impl std::fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Active => write!(f, "ACTIVE"),
            Self::Processing => write!(f, "PROCESSING"),
            Self::Completed => write!(f, "COMPLETED"),
        }
    }
}

/// One timed bidding window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
    pub id: RoundId,
    pub auction_id: AuctionId,
    /// 1-based, unique per auction.
    pub round_number: u32,
    pub status: RoundStatus,
    pub items_available: u32,
    pub starts_at: DateTime<Utc>,
    /// Current deadline; only ever moves forward.
    pub ends_at: DateTime<Utc>,
    /// Immutable baseline deadline set at creation.
    pub original_ends_at: DateTime<Utc>,
    pub extension_count: u32,
    pub winning_bid_ids: Vec<BidId>,
    pub total_bids: u64,
    /// Clock time frozen by an administrative pause, in milliseconds: the
    /// time left on an ACTIVE round, or the time until a PENDING round
    /// starts.
    pub paused_remaining_ms: Option<i64>,
}

impl Round {
    /// Create a round in PENDING state for the given window.
    #[must_use]
    pub fn new(
        auction_id: AuctionId,
        round_number: u32,
        items_available: u32,
        starts_at: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        let ends_at = starts_at + duration;
        Self {
            id: RoundId::new(),
            auction_id,
            round_number,
            status: RoundStatus::Pending,
            items_available,
            starts_at,
            ends_at,
            original_ends_at: ends_at,
            extension_count: 0,
            winning_bid_ids: Vec::new(),
            total_bids: 0,
            paused_remaining_ms: None,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == RoundStatus::Active
    }

    /// Time left on the clock; negative once the deadline has passed.
    #[must_use]
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        self.ends_at - now
    }

    #[must_use]
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        now >= self.ends_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_round(now: DateTime<Utc>) -> Round {
        Round::new(AuctionId::new(), 1, 5, now, Duration::seconds(600))
    }

    #[test]
    fn new_round_is_pending() {
        let now = Utc::now();
        let r = make_round(now);
        assert_eq!(r.status, RoundStatus::Pending);
        assert_eq!(r.ends_at, r.original_ends_at);
        assert_eq!(r.extension_count, 0);
        assert!(r.winning_bid_ids.is_empty());
    }

    #[test]
    fn remaining_counts_down() {
        let now = Utc::now();
        let r = make_round(now);
        assert_eq!(r.remaining(now).num_seconds(), 600);
        assert_eq!(r.remaining(now + Duration::seconds(400)).num_seconds(), 200);
        assert!(r.has_ended(now + Duration::seconds(600)));
        assert!(!r.has_ended(now + Duration::seconds(599)));
    }

    #[test]
    fn status_display() {
        assert_eq!(format!("{}", RoundStatus::Pending), "PENDING");
        assert_eq!(format!("{}", RoundStatus::Processing), "PROCESSING");
    }

    #[test]
    fn round_serde_roundtrip() {
        let r = make_round(Utc::now());
        let json = serde_json::to_string(&r).unwrap();
        let back: Round = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, r.id);
        assert_eq!(back.status, r.status);
        assert_eq!(back.ends_at, r.ends_at);
    }
}
