//! Error types for the Gavel auction engine.
//!
//! All errors use the `GV_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Bid errors
//! - 2xx: Balance / ledger errors
//! - 3xx: Round errors
//! - 4xx: Auction errors
//! - 5xx: Mutex / contention errors
//! - 6xx: Auto-bid errors
//! - 9xx: General / internal errors

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{AuctionId, AuctionStatus, BidId, RoundId, UserId};

/// Central error enum for all Gavel operations.
///
/// Every variant is a typed failure surfaced to the immediate caller with
/// no partial state change behind it.
#[derive(Debug, Error)]
pub enum GavelError {
    // =================================================================
    // Bid Errors (1xx)
    // =================================================================
    /// The bid does not beat the current requirement (minimum bid, or
    /// highest bid plus increment).
    #[error("GV_ERR_100: Bid too low: minimum acceptable is {minimum}")]
    BidTooLow { minimum: Decimal },

    /// The current highest bidder tried to raise against themselves.
    #[error("GV_ERR_101: Current leader cannot outbid their own bid")]
    SelfOutbid,

    /// The requested bid was not found.
    #[error("GV_ERR_102: Bid not found: {0}")]
    BidNotFound(BidId),

    /// A commit would leave two active bids for one user in one round.
    #[error("GV_ERR_103: Duplicate active bid for {user_id} in {round_id}")]
    DuplicateActiveBid { user_id: UserId, round_id: RoundId },

    // =================================================================
    // Balance / Ledger Errors (2xx)
    // =================================================================
    /// Not enough available balance to lock.
    #[error("GV_ERR_200: Insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: Decimal, available: Decimal },

    /// Not enough locked balance to unlock or deduct.
    #[error("GV_ERR_201: Insufficient locked balance: need {needed}, have {locked}")]
    InsufficientLocked { needed: Decimal, locked: Decimal },

    /// A ledger operation was given a zero or negative amount.
    #[error("GV_ERR_202: Ledger amount must be positive, got {amount}")]
    InvalidAmount { amount: Decimal },

    // =================================================================
    // Round Errors (3xx)
    // =================================================================
    /// The requested round was not found.
    #[error("GV_ERR_300: Round not found: {0}")]
    RoundNotFound(RoundId),

    /// The round is not accepting bids (not active, or inside the closing
    /// buffer before the deadline).
    #[error("GV_ERR_301: Round not accepting bids: {reason}")]
    RoundNotAcceptingBids { reason: String },

    // =================================================================
    // Auction Errors (4xx)
    // =================================================================
    /// The requested auction was not found.
    #[error("GV_ERR_400: Auction not found: {0}")]
    AuctionNotFound(AuctionId),

    /// The auction is not in the ACTIVE state.
    #[error("GV_ERR_401: Auction not active (status {status})")]
    AuctionNotActive { status: AuctionStatus },

    /// The auction cannot be started from its current state.
    #[error("GV_ERR_402: Auction cannot be started from status {status}")]
    AuctionNotStartable { status: AuctionStatus },

    /// The auction configuration is internally inconsistent.
    #[error("GV_ERR_403: Invalid auction config: {reason}")]
    InvalidAuctionConfig { reason: String },

    // =================================================================
    // Mutex / Contention Errors (5xx)
    // =================================================================
    /// The per-auction mutex could not be acquired within the configured
    /// attempts. Callers may retry.
    #[error("GV_ERR_500: Auction busy, retry later: {auction_id}")]
    ServerBusy { auction_id: AuctionId },

    // =================================================================
    // Auto-Bid Errors (6xx)
    // =================================================================
    /// The requested cap is below the current price plus increment.
    #[error("GV_ERR_600: Auto-bid cap {max_amount} below required {required}")]
    AutoBidCapExceeded {
        max_amount: Decimal,
        required: Decimal,
    },

    /// No auto-bid record exists for this (user, auction).
    #[error("GV_ERR_601: No auto-bid for {user_id} on {auction_id}")]
    AutoBidNotFound {
        user_id: UserId,
        auction_id: AuctionId,
    },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("GV_ERR_900: Internal error: {0}")]
    Internal(String),
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, GavelError>;

impl GavelError {
    /// Whether the caller may retry the operation unchanged.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ServerBusy { .. })
    }
}
