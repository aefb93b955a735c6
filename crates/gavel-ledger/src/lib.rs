//! # gavel-ledger
//!
//! **Balance Ledger**: per-user two-bucket accounting (available/locked)
//! plus the append-only transaction journal.
//!
//! ## Contract
//!
//! Balances mutate only through the four ledger operations:
//!
//! 1. **lock** — available → locked (bid reservation)
//! 2. **unlock** — locked → available (outbid / refund)
//! 3. **deduct_locked** — locked leaves the system (round win)
//! 4. **add_funds** — deposit into available
//!
//! Each operation and its journal append happen under one interior lock:
//! either both land or neither does. The journal is the audit trail and is
//! never bypassed.

pub mod ledger;

pub use ledger::Ledger;
