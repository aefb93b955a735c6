//! # gavel-rounds
//!
//! **Round Timing Plane**: drives auctions through their round lifecycle.
//!
//! ## Architecture
//!
//! 1. **AuctionLifecycle**: administrative transitions (start, pause,
//!    resume, cancel) and the winner settlement that closes a round
//! 2. **RoundClock**: the once-per-second scheduler that activates due
//!    rounds, broadcasts countdown signals, completes expired rounds, and
//!    drains pending auto-bid retries
//!
//! Round completion is idempotent: the ACTIVE → PROCESSING transition is a
//! compare-and-set, so overlapping schedulers settle each round exactly
//! once.

pub mod lifecycle;
pub mod scheduler;

pub use lifecycle::AuctionLifecycle;
pub use scheduler::RoundClock;
