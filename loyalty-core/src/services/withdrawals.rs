//! Withdrawal service - spends accrued points
//!
//! The balance check and the append must not interleave with another
//! withdrawal by the same owner, so each owner gets its own async mutex.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};

use crate::domain::result::{Error, Result};
use crate::domain::{parse_order_number, Withdrawal};
use crate::ports::{InsertOutcome, LedgerStore};

use super::BalanceService;

/// Result of a withdrawal request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "withdrawal", rename_all = "snake_case")]
pub enum WithdrawOutcome {
    Accepted(Withdrawal),
    /// Current balance is below the requested amount; nothing recorded
    InsufficientBalance,
    /// This owner already withdrew against this order number
    AlreadyWithdrawn,
}

/// Registry of per-owner locks
#[derive(Default)]
pub struct OwnerLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl OwnerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock guarding `owner`, created on first use
    pub fn lock_for(&self, owner: &str) -> Result<Arc<AsyncMutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| Error::store("owner lock registry poisoned"))?;
        Ok(Arc::clone(locks.entry(owner.to_string()).or_default()))
    }
}

/// Withdrawal controller
pub struct WithdrawalService {
    store: Arc<dyn LedgerStore>,
    balances: BalanceService,
    locks: OwnerLocks,
}

impl WithdrawalService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            balances: BalanceService::new(Arc::clone(&store)),
            store,
            locks: OwnerLocks::new(),
        }
    }

    /// Withdraw `amount` points from `owner` against `order_id`.
    pub async fn withdraw(
        &self,
        owner: &str,
        order_id: &str,
        amount: Decimal,
    ) -> Result<WithdrawOutcome> {
        let order_id = parse_order_number(order_id)?;
        if amount.round_dp(2) <= Decimal::ZERO {
            return Err(Error::InvalidAmount(amount));
        }
        let amount = amount.round_dp(2);

        let lock = self.locks.lock_for(owner)?;
        let _guard = lock.lock().await;

        let balance = self.balances.balance(owner).await?;
        if !balance.covers(amount) {
            debug!(owner, %amount, current = %balance.current, "Insufficient balance");
            return Ok(WithdrawOutcome::InsufficientBalance);
        }

        let withdrawal = Withdrawal::new(owner, order_id, amount);
        match self.store.insert_withdrawal(&withdrawal).await? {
            InsertOutcome::Inserted => {
                info!(owner, order = %withdrawal.order_id, amount = %withdrawal.amount, "Withdrawal accepted");
                Ok(WithdrawOutcome::Accepted(withdrawal))
            }
            InsertOutcome::Existing(_) => {
                debug!(owner, order = %withdrawal.order_id, "Withdrawal already recorded");
                Ok(WithdrawOutcome::AlreadyWithdrawn)
            }
        }
    }

    /// The owner's withdrawals, oldest first
    pub async fn withdrawals(&self, owner: &str) -> Result<Vec<Withdrawal>> {
        let withdrawals = self.store.list_withdrawals(owner).await?;
        if withdrawals.is_empty() {
            return Err(Error::not_found(format!("no withdrawals for {owner}")));
        }
        Ok(withdrawals)
    }
}
