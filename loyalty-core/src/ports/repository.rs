//! Ledger store port - persistence abstraction

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::result::Result;
use crate::domain::{Credential, Order, OrderStatus, Withdrawal};

/// Outcome of an insert-if-absent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome<T> {
    /// The record was written
    Inserted,
    /// A record with the same key already existed; it is returned untouched
    Existing(T),
}

/// Durable storage for credentials, orders and withdrawals.
///
/// "Absent" is always `Ok(None)` or an empty `Vec`; `Err` means the store
/// itself failed. Implementations must make every insert-if-absent a single
/// atomic step: two concurrent inserts of the same key must never both see
/// `Inserted`.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    // === Orders ===

    /// Look up an order by number
    async fn get_order(&self, order_id: &str) -> Result<Option<Order>>;

    /// Insert an order unless its number is already taken
    async fn insert_order(&self, order: &Order) -> Result<InsertOutcome<Order>>;

    /// Overwrite status and accrual of an existing order.
    /// Returns false if no such order exists.
    async fn update_order(
        &self,
        order_id: &str,
        status: OrderStatus,
        accrual: Decimal,
    ) -> Result<bool>;

    /// Every order number in the store
    async fn list_order_ids(&self) -> Result<Vec<String>>;

    /// Order numbers still in NEW or PROCESSING
    async fn list_open_order_ids(&self) -> Result<Vec<String>>;

    /// An owner's orders, oldest first
    async fn list_orders(&self, owner: &str) -> Result<Vec<Order>>;

    // === Withdrawals ===

    /// An owner's withdrawals, oldest first
    async fn list_withdrawals(&self, owner: &str) -> Result<Vec<Withdrawal>>;

    /// Insert a withdrawal unless `(owner, order_id)` already exists
    async fn insert_withdrawal(&self, withdrawal: &Withdrawal)
        -> Result<InsertOutcome<Withdrawal>>;

    // === Credentials ===

    /// Insert a credential. Returns false if the login is taken.
    async fn insert_credential(&self, credential: &Credential) -> Result<bool>;

    async fn get_credential(&self, login: &str) -> Result<Option<Credential>>;
}
