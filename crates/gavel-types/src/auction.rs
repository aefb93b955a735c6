//! Auction entity and per-auction configuration.
//!
//! An auction is created administratively, progresses through rounds driven
//! by the round clock, and is immutable once COMPLETED or CANCELLED except
//! for audit fields.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AuctionId, GavelError, Result, constants};

/// Lifecycle status of an auction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuctionStatus {
    Draft,
    Scheduled,
    Active,
    Paused,
    Completed,
    Cancelled,
}

impl std::fmt::Display for AuctionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "DRAFT"),
            Self::Scheduled => write!(f, "SCHEDULED"),
            Self::Active => write!(f, "ACTIVE"),
            Self::Paused => write!(f, "PAUSED"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

impl AuctionStatus {
    /// Terminal states never transition again.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// Per-auction bidding and timing rules, fixed at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionConfig {
    /// Total items across all rounds.
    pub total_items: u32,
    /// Number of bidding rounds.
    pub rounds_total: u32,
    /// Items awarded in each round.
    pub items_per_round: u32,
    /// How many top bids win each round.
    pub winners_per_round: u32,
    /// Minimum acceptable opening bid.
    pub min_bid: Decimal,
    /// Minimum step over the current highest bid.
    pub bid_increment: Decimal,
    /// Length of one round in seconds.
    pub round_duration_secs: u64,
    /// A bid within this many seconds of the deadline extends the round.
    pub anti_snipe_threshold_secs: u64,
    /// Length of one extension in seconds.
    pub anti_snipe_extension_secs: u64,
    /// Cap on extensions per round; later snipe-window bids are accepted
    /// but no longer extend the clock.
    pub max_anti_snipe_extensions: u32,
}

impl AuctionConfig {
    /// Check the rules are internally coherent before an auction is built
    /// from them. A zero `bid_increment` would let equal-amount bids tie
    /// the leader, so both money fields must be strictly positive.
    ///
    /// # Errors
    /// `InvalidAuctionConfig` naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.min_bid <= Decimal::ZERO {
            return Err(GavelError::InvalidAuctionConfig {
                reason: format!("min_bid must be positive, got {}", self.min_bid),
            });
        }
        if self.bid_increment <= Decimal::ZERO {
            return Err(GavelError::InvalidAuctionConfig {
                reason: format!("bid_increment must be positive, got {}", self.bid_increment),
            });
        }
        if self.rounds_total == 0 {
            return Err(GavelError::InvalidAuctionConfig {
                reason: "rounds_total must be at least 1".into(),
            });
        }
        if self.items_per_round == 0 {
            return Err(GavelError::InvalidAuctionConfig {
                reason: "items_per_round must be at least 1".into(),
            });
        }
        if self.winners_per_round == 0 {
            return Err(GavelError::InvalidAuctionConfig {
                reason: "winners_per_round must be at least 1".into(),
            });
        }
        if self.round_duration_secs == 0 {
            return Err(GavelError::InvalidAuctionConfig {
                reason: "round_duration_secs must be at least 1".into(),
            });
        }
        Ok(())
    }
}

impl Default for AuctionConfig {
    fn default() -> Self {
        Self {
            total_items: 10,
            rounds_total: 1,
            items_per_round: 10,
            winners_per_round: 10,
            min_bid: Decimal::new(100, 0),
            bid_increment: Decimal::new(50, 0),
            round_duration_secs: constants::DEFAULT_ROUND_DURATION_SECS,
            anti_snipe_threshold_secs: constants::DEFAULT_ANTI_SNIPE_THRESHOLD_SECS,
            anti_snipe_extension_secs: constants::DEFAULT_ANTI_SNIPE_EXTENSION_SECS,
            max_anti_snipe_extensions: constants::DEFAULT_MAX_ANTI_SNIPE_EXTENSIONS,
        }
    }
}

/// A multi-round timed auction.
///
/// `highest_bid_amount` and `total_bid_count` are denormalized caches
/// refreshed from authoritative bid rows at commit time; invariant checks
/// never read them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Auction {
    pub id: AuctionId,
    pub config: AuctionConfig,
    pub status: AuctionStatus,
    /// Round number currently in play (1-based, 0 before start).
    pub current_round_number: u32,
    pub highest_bid_amount: Decimal,
    pub total_bid_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Auction {
    /// Create a new auction in DRAFT state.
    #[must_use]
    pub fn new(config: AuctionConfig, now: DateTime<Utc>) -> Self {
        Self {
            id: AuctionId::new(),
            config,
            status: AuctionStatus::Draft,
            current_round_number: 0,
            highest_bid_amount: Decimal::ZERO,
            total_bid_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == AuctionStatus::Active
    }

    /// Whether `round_number` is the last round of this auction.
    #[must_use]
    pub fn is_final_round(&self, round_number: u32) -> bool {
        round_number >= self.config.rounds_total
    }
}
