//! # gavel-engine
//!
//! **Bid Settlement Plane**: accepts a bid, validates it against the
//! current highest bid and the bidder's reserved funds, and atomically
//! commits the winner/loser state transition.
//!
//! ## Architecture
//!
//! 1. **AuctionStore**: authoritative auction/round/bid state with atomic
//!    multi-record commits
//! 2. **AuctionMutex**: per-auction serialization over a shared cache
//!    service, with expiry and owner-token release
//! 3. **SettlementEngine**: the `place_bid` critical section plus the
//!    query surface (`minimum_bid_amount`, `top_bids`, ...)
//! 4. **AutoBidEngine**: reactive counter-bidding with a single scheduled
//!    funding retry
//! 5. **LeaderboardProjection**: advisory ranked view with a short TTL
//!
//! ## Bid Flow
//!
//! ```text
//! API → AuctionMutex.acquire() → validate → Ledger.lock(delta)
//!     → AuctionStore.commit_bid() → release → events + auto-bid cascade
//! ```
//!
//! The cascade is triggered by the *caller* after a committed manual bid,
//! never by the engine for its own bids.

pub mod autobid;
pub mod leaderboard;
pub mod mutex;
pub mod settlement;
pub mod store;

pub use autobid::AutoBidEngine;
pub use leaderboard::{Leaderboard, LeaderboardEntry, LeaderboardProjection};
pub use mutex::{AuctionGuard, AuctionMutex, InMemoryCache, SharedCache};
pub use settlement::{BidAcceptance, PlaceBidRequest, RoundStats, SettlementEngine};
pub use store::{AuctionStore, BidCommit};
