//! Balance service - derives an owner's points balance from the ledger

use std::sync::Arc;

use crate::domain::result::Result;
use crate::domain::Balance;
use crate::ports::LedgerStore;

/// Read-only view over an owner's orders and withdrawals
pub struct BalanceService {
    store: Arc<dyn LedgerStore>,
}

impl BalanceService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Current balance and withdrawn-to-date for `owner`.
    ///
    /// An owner with no history has a zero balance. Only store failures are
    /// errors.
    pub async fn balance(&self, owner: &str) -> Result<Balance> {
        let orders = self.store.list_orders(owner).await?;
        let withdrawals = self.store.list_withdrawals(owner).await?;
        Ok(Balance::from_ledger(&orders, &withdrawals))
    }
}
