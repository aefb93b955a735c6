//! # gavel-types
//!
//! Shared types, errors, and configuration for the **Gavel** auction
//! settlement engine.
//!
//! This crate is the leaf dependency of the workspace — every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`AuctionId`], [`RoundId`], [`BidId`], [`UserId`], [`TransactionId`]
//! - **Auction model**: [`Auction`], [`AuctionConfig`], [`AuctionStatus`]
//! - **Round model**: [`Round`], [`RoundStatus`]
//! - **Bid model**: [`Bid`], [`BidStatus`]
//! - **Balance model**: [`Balance`], [`LedgerEntry`], [`LedgerOp`]
//! - **Auto-bid model**: [`AutoBid`], [`AutoBidStopReason`]
//! - **Events**: [`EngineEvent`] with the [`EventSink`] broadcast seam
//! - **Configuration**: [`EngineConfig`], [`MutexConfig`]
//! - **Clock**: the [`Clock`] injection point for deterministic timing
//! - **Errors**: [`GavelError`] with `GV_ERR_` prefix codes

pub mod auction;
pub mod autobid;
pub mod balance;
pub mod bid;
pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod event;
pub mod ids;
pub mod round;

// Re-export all primary types at crate root for ergonomic imports:
//   use gavel_types::{Auction, Bid, Round, Balance, ...};

pub use auction::*;
pub use autobid::*;
pub use balance::*;
pub use bid::*;
pub use clock::*;
pub use config::*;
pub use error::*;
pub use event::*;
pub use ids::*;
pub use round::*;

// Constants are accessed via `gavel_types::constants::FOO`
// (not re-exported to avoid name collisions).
