//! In-memory ledger store
//!
//! Volatile implementation of [`LedgerStore`] for tests and throwaway runs.
//! Every operation takes one mutex, which makes each insert-if-absent atomic.
//! Rows the DuckDB schema would reject by CHECK constraint are rejected here
//! too.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::result::{Error, Result};
use crate::domain::{Credential, Order, OrderStatus, Withdrawal};
use crate::ports::{InsertOutcome, LedgerStore};

#[derive(Debug, Default)]
struct Ledger {
    orders: BTreeMap<String, Order>,
    /// Keyed by (owner, order_id)
    withdrawals: BTreeMap<(String, String), Withdrawal>,
    credentials: HashMap<String, Credential>,
}

/// Ledger store backed by process memory
#[derive(Debug, Default)]
pub struct InMemoryStore {
    ledger: Mutex<Ledger>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn ledger(&self) -> Result<MutexGuard<'_, Ledger>> {
        self.ledger
            .lock()
            .map_err(|_| Error::store("in-memory ledger lock poisoned"))
    }

    /// Number of stored orders
    pub fn order_count(&self) -> Result<usize> {
        Ok(self.ledger()?.orders.len())
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn get_order(&self, order_id: &str) -> Result<Option<Order>> {
        Ok(self.ledger()?.orders.get(order_id).cloned())
    }

    async fn insert_order(&self, order: &Order) -> Result<InsertOutcome<Order>> {
        check_accrual(&order.order_id, order.accrual)?;
        let mut ledger = self.ledger()?;
        if let Some(existing) = ledger.orders.get(&order.order_id) {
            return Ok(InsertOutcome::Existing(existing.clone()));
        }
        ledger.orders.insert(order.order_id.clone(), order.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn update_order(
        &self,
        order_id: &str,
        status: OrderStatus,
        accrual: Decimal,
    ) -> Result<bool> {
        check_accrual(order_id, accrual)?;
        let mut ledger = self.ledger()?;
        match ledger.orders.get_mut(order_id) {
            Some(order) => {
                order.status = status;
                order.accrual = accrual;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_order_ids(&self) -> Result<Vec<String>> {
        Ok(self.ledger()?.orders.keys().cloned().collect())
    }

    async fn list_open_order_ids(&self) -> Result<Vec<String>> {
        Ok(self
            .ledger()?
            .orders
            .values()
            .filter(|o| !o.status.is_terminal())
            .map(|o| o.order_id.clone())
            .collect())
    }

    async fn list_orders(&self, owner: &str) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .ledger()?
            .orders
            .values()
            .filter(|o| o.owner == owner)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }

    async fn list_withdrawals(&self, owner: &str) -> Result<Vec<Withdrawal>> {
        let mut withdrawals: Vec<Withdrawal> = self
            .ledger()?
            .withdrawals
            .values()
            .filter(|w| w.owner == owner)
            .cloned()
            .collect();
        withdrawals.sort_by_key(|w| w.processed_at);
        Ok(withdrawals)
    }

    async fn insert_withdrawal(
        &self,
        withdrawal: &Withdrawal,
    ) -> Result<InsertOutcome<Withdrawal>> {
        if withdrawal.amount <= Decimal::ZERO {
            return Err(Error::store(format!(
                "withdrawal amount {} for order {} must be positive",
                withdrawal.amount, withdrawal.order_id
            )));
        }
        let mut ledger = self.ledger()?;
        let key = (withdrawal.owner.clone(), withdrawal.order_id.clone());
        if let Some(existing) = ledger.withdrawals.get(&key) {
            return Ok(InsertOutcome::Existing(existing.clone()));
        }
        ledger.withdrawals.insert(key, withdrawal.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn insert_credential(&self, credential: &Credential) -> Result<bool> {
        let mut ledger = self.ledger()?;
        if ledger.credentials.contains_key(&credential.login) {
            return Ok(false);
        }
        ledger
            .credentials
            .insert(credential.login.clone(), credential.clone());
        Ok(true)
    }

    async fn get_credential(&self, login: &str) -> Result<Option<Credential>> {
        Ok(self.ledger()?.credentials.get(login).cloned())
    }
}

fn check_accrual(order_id: &str, accrual: Decimal) -> Result<()> {
    if accrual < Decimal::ZERO {
        return Err(Error::store(format!(
            "accrual {accrual} for order {order_id} is negative"
        )));
    }
    Ok(())
}
