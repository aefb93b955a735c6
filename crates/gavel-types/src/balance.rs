//! Balance and ledger journal types.
//!
//! Every user has an `available` balance (usable for new bids) and a
//! `locked` balance (reserved behind active bids). The ledger journal is
//! the audit trail: every bucket mutation appends a [`LedgerEntry`] with a
//! before/after snapshot of both buckets.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{TransactionId, UserId};

/// A single user balance: two buckets, both always ≥ 0.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Balance {
    /// Spendable on new bids.
    pub available: Decimal,
    /// Reserved behind currently active bids.
    pub locked: Decimal,
}

impl Balance {
    /// Create a zero balance.
    #[must_use]
    pub fn new() -> Self {
        Self {
            available: Decimal::ZERO,
            locked: Decimal::ZERO,
        }
    }

    /// Total balance (available + locked).
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.available + self.locked
    }

    /// Whether this balance holds no funds at all.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.available.is_zero() && self.locked.is_zero()
    }
}

impl Default for Balance {
    fn default() -> Self {
        Self::new()
    }
}

/// The four ledger operations. No other code path mutates balances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedgerOp {
    /// available → locked (bid reservation).
    Lock,
    /// locked → available (outbid / refund).
    Unlock,
    /// locked leaves the system (round win).
    DeductLocked,
    /// external deposit into available.
    AddFunds,
}

impl std::fmt::Display for LedgerOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lock => write!(f, "LOCK"),
            Self::Unlock => write!(f, "UNLOCK"),
            Self::DeductLocked => write!(f, "DEDUCT_LOCKED"),
            Self::AddFunds => write!(f, "ADD_FUNDS"),
        }
    }
}

/// One append-only journal record, written in the same atomic step as the
/// balance mutation it describes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: TransactionId,
    pub user_id: UserId,
    pub op: LedgerOp,
    pub amount: Decimal,
    pub available_before: Decimal,
    pub available_after: Decimal,
    pub locked_before: Decimal,
    pub locked_after: Decimal,
    /// What drove the mutation, e.g. `bid:<id>` or `win:<id>`.
    pub reference: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Signed effect of this entry on `available + locked`. Only deposits
    /// and win deductions change the total; lock/unlock shift buckets.
    #[must_use]
    pub fn total_delta(&self) -> Decimal {
        match self.op {
            LedgerOp::AddFunds => self.amount,
            LedgerOp::DeductLocked => -self.amount,
            LedgerOp::Lock | LedgerOp::Unlock => Decimal::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_default_is_zero() {
        let b = Balance::default();
        assert_eq!(b.available, Decimal::ZERO);
        assert_eq!(b.locked, Decimal::ZERO);
        assert!(b.is_zero());
    }

    #[test]
    fn balance_total() {
        let b = Balance {
            available: Decimal::new(100, 0),
            locked: Decimal::new(50, 0),
        };
        assert_eq!(b.total(), Decimal::new(150, 0));
        assert!(!b.is_zero());
    }

    #[test]
    fn total_delta_by_op() {
        let mut entry = LedgerEntry {
            id: TransactionId::new(),
            user_id: UserId::new(),
            op: LedgerOp::Lock,
            amount: Decimal::new(100, 0),
            available_before: Decimal::new(100, 0),
            available_after: Decimal::ZERO,
            locked_before: Decimal::ZERO,
            locked_after: Decimal::new(100, 0),
            reference: None,
            recorded_at: Utc::now(),
        };
        assert_eq!(entry.total_delta(), Decimal::ZERO);
        entry.op = LedgerOp::AddFunds;
        assert_eq!(entry.total_delta(), Decimal::new(100, 0));
        entry.op = LedgerOp::DeductLocked;
        assert_eq!(entry.total_delta(), Decimal::new(-100, 0));
    }

    #[test]
    fn balance_serde_roundtrip() {
        let b = Balance {
            available: Decimal::new(12345, 2),
            locked: Decimal::new(678, 1),
        };
        let json = serde_json::to_string(&b).unwrap();
        let back: Balance = serde_json::from_str(&json).unwrap();
        assert_eq!(b, back);
    }
}
