//! The balance ledger.
//!
//! Source of truth for all funds. The settlement engine calls into it to
//! reserve, release, and consume bid amounts; every mutation appends a
//! [`LedgerEntry`] in the same atomic step, so the journal can always
//! reconstruct both buckets.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use gavel_types::{Balance, GavelError, LedgerEntry, LedgerOp, Result, TransactionId, UserId};
use rust_decimal::Decimal;
use tracing::debug;

struct LedgerInner {
    balances: HashMap<UserId, Balance>,
    journal: Vec<LedgerEntry>,
}

/// Per-user two-bucket accounts plus the append-only journal.
///
/// All mutations are atomic: either the balance shift and the journal
/// append both land, or the balance is unchanged and nothing is appended.
pub struct Ledger {
    inner: Mutex<LedgerInner>,
}

impl Ledger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LedgerInner {
                balances: HashMap::new(),
                journal: Vec::new(),
            }),
        }
    }

    fn guard(&self) -> Result<MutexGuard<'_, LedgerInner>> {
        self.inner
            .lock()
            .map_err(|_| GavelError::Internal("ledger mutex poisoned".into()))
    }

    fn check_amount(amount: Decimal) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Err(GavelError::InvalidAmount { amount });
        }
        Ok(())
    }

    fn append(
        inner: &mut LedgerInner,
        user_id: UserId,
        op: LedgerOp,
        amount: Decimal,
        before: Balance,
        reference: Option<String>,
        now: DateTime<Utc>,
    ) -> LedgerEntry {
        let after = inner.balances.get(&user_id).cloned().unwrap_or_default();
        let entry = LedgerEntry {
            id: TransactionId::new(),
            user_id,
            op,
            amount,
            available_before: before.available,
            available_after: after.available,
            locked_before: before.locked,
            locked_after: after.locked,
            reference,
            recorded_at: now,
        };
        debug!(%user_id, %op, %amount, "ledger entry appended");
        inner.journal.push(entry.clone());
        entry
    }

    /// Deposit funds into `available`.
    ///
    /// # Errors
    /// Returns `InvalidAmount` if `amount` is not positive.
    pub fn add_funds(
        &self,
        user_id: UserId,
        amount: Decimal,
        reference: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry> {
        Self::check_amount(amount)?;
        let mut inner = self.guard()?;
        let before = inner.balances.get(&user_id).cloned().unwrap_or_default();
        inner.balances.entry(user_id).or_default().available += amount;
        Ok(Self::append(
            &mut inner,
            user_id,
            LedgerOp::AddFunds,
            amount,
            before,
            reference,
            now,
        ))
    }

    /// Reserve funds behind a bid: available → locked.
    ///
    /// # Errors
    /// Returns `InsufficientFunds` if `available < amount`; the balance is
    /// unchanged and nothing is journaled.
    pub fn lock(
        &self,
        user_id: UserId,
        amount: Decimal,
        reference: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry> {
        Self::check_amount(amount)?;
        let mut inner = self.guard()?;
        let before = inner.balances.get(&user_id).cloned().unwrap_or_default();
        if before.available < amount {
            return Err(GavelError::InsufficientFunds {
                needed: amount,
                available: before.available,
            });
        }
        let entry = inner.balances.entry(user_id).or_default();
        entry.available -= amount;
        entry.locked += amount;
        Ok(Self::append(
            &mut inner,
            user_id,
            LedgerOp::Lock,
            amount,
            before,
            reference,
            now,
        ))
    }

    /// Release a reservation: locked → available.
    ///
    /// # Errors
    /// Returns `InsufficientLocked` if `locked < amount`.
    pub fn unlock(
        &self,
        user_id: UserId,
        amount: Decimal,
        reference: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry> {
        Self::check_amount(amount)?;
        let mut inner = self.guard()?;
        let before = inner.balances.get(&user_id).cloned().unwrap_or_default();
        if before.locked < amount {
            return Err(GavelError::InsufficientLocked {
                needed: amount,
                locked: before.locked,
            });
        }
        let entry = inner.balances.entry(user_id).or_default();
        entry.locked -= amount;
        entry.available += amount;
        Ok(Self::append(
            &mut inner,
            user_id,
            LedgerOp::Unlock,
            amount,
            before,
            reference,
            now,
        ))
    }

    /// Consume a reservation on a round win. Funds leave the system;
    /// `available` is untouched.
    ///
    /// # Errors
    /// Returns `InsufficientLocked` if `locked < amount`.
    pub fn deduct_locked(
        &self,
        user_id: UserId,
        amount: Decimal,
        reference: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry> {
        Self::check_amount(amount)?;
        let mut inner = self.guard()?;
        let before = inner.balances.get(&user_id).cloned().unwrap_or_default();
        if before.locked < amount {
            return Err(GavelError::InsufficientLocked {
                needed: amount,
                locked: before.locked,
            });
        }
        inner.balances.entry(user_id).or_default().locked -= amount;
        Ok(Self::append(
            &mut inner,
            user_id,
            LedgerOp::DeductLocked,
            amount,
            before,
            reference,
            now,
        ))
    }

    /// Current balance for a user. Unknown users hold zero.
    #[must_use]
    pub fn balance(&self, user_id: UserId) -> Balance {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.balances.get(&user_id).cloned())
            .unwrap_or_default()
    }

    /// All journal entries for a user, oldest first.
    #[must_use]
    pub fn entries_for(&self, user_id: UserId) -> Vec<LedgerEntry> {
        self.inner
            .lock()
            .map(|inner| {
                inner
                    .journal
                    .iter()
                    .filter(|e| e.user_id == user_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Total journal length.
    #[must_use]
    pub fn journal_len(&self) -> usize {
        self.inner.lock().map(|inner| inner.journal.len()).unwrap_or(0)
    }

    /// Sum of every user's available + locked. Conservation checks compare
    /// this against the signed sum of journal deltas.
    #[must_use]
    pub fn total_supply(&self) -> Decimal {
        self.inner
            .lock()
            .map(|inner| inner.balances.values().map(Balance::total).sum())
            .unwrap_or(Decimal::ZERO)
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}
