//! Order service - admission of submitted order numbers

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::domain::result::{Error, Result};
use crate::domain::{parse_order_number, Order};
use crate::ports::{InsertOutcome, LedgerStore};

/// Result of submitting an order number
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "order", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// New order stored with status NEW
    Accepted(Order),
    /// The caller already owns this order; nothing changed
    AlreadySubmittedBySelf,
    /// Another owner holds this order number
    OwnedByOther,
}

/// Order admission controller
pub struct OrderService {
    store: Arc<dyn LedgerStore>,
}

impl OrderService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Submit an order number on behalf of `owner`.
    ///
    /// The number is checked before the store is touched. Ownership is decided
    /// by the store's insert-if-absent, so concurrent submitters of one number
    /// see exactly one winner.
    pub async fn submit(&self, owner: &str, order_id: &str) -> Result<SubmitOutcome> {
        let order_id = parse_order_number(order_id)?;
        let order = Order::new(order_id, owner);

        match self.store.insert_order(&order).await? {
            InsertOutcome::Inserted => {
                info!(order = %order.order_id, owner, "Order accepted");
                Ok(SubmitOutcome::Accepted(order))
            }
            InsertOutcome::Existing(existing) if existing.owner == owner => {
                debug!(order = %existing.order_id, owner, "Order already submitted by owner");
                Ok(SubmitOutcome::AlreadySubmittedBySelf)
            }
            InsertOutcome::Existing(existing) => {
                info!(order = %existing.order_id, owner, "Order owned by another user");
                Ok(SubmitOutcome::OwnedByOther)
            }
        }
    }

    /// The owner's orders, oldest first
    pub async fn orders(&self, owner: &str) -> Result<Vec<Order>> {
        let orders = self.store.list_orders(owner).await?;
        if orders.is_empty() {
            return Err(Error::not_found(format!("no orders for {owner}")));
        }
        Ok(orders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryStore;
    use crate::domain::OrderStatus;
    use rust_decimal::Decimal;

    fn service() -> (Arc<InMemoryStore>, OrderService) {
        let store = Arc::new(InMemoryStore::new());
        let service = OrderService::new(store.clone());
        (store, service)
    }

    #[tokio::test]
    async fn test_submit_new_order() {
        let (store, service) = service();
        match service.submit("alice", "2377225624").await.unwrap() {
            SubmitOutcome::Accepted(order) => {
                assert_eq!(order.owner, "alice");
                assert_eq!(order.status, OrderStatus::New);
                assert_eq!(order.accrual, Decimal::ZERO);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(store.order_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_resubmit_is_noop() {
        let (store, service) = service();
        service.submit("alice", "2377225624").await.unwrap();
        let again = service.submit("alice", "2377225624").await.unwrap();
        assert_eq!(again, SubmitOutcome::AlreadySubmittedBySelf);
        assert_eq!(store.order_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_other_owner_conflict_leaves_order_untouched() {
        let (store, service) = service();
        service.submit("alice", "2377225624").await.unwrap();
        assert_eq!(
            service.submit("bob", "2377225624").await.unwrap(),
            SubmitOutcome::OwnedByOther
        );
        let stored = store.get_order("2377225624").await.unwrap().unwrap();
        assert_eq!(stored.owner, "alice");
    }

    #[tokio::test]
    async fn test_invalid_number_never_reaches_store() {
        let (store, service) = service();
        for bad in ["123", "193892", "", "12ab"] {
            let err = service.submit("alice", bad).await.unwrap_err();
            assert!(matches!(err, Error::InvalidOrderFormat(_)), "{bad}: {err}");
        }
        assert_eq!(store.order_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_orders_empty_is_not_found() {
        let (_, service) = service();
        assert!(matches!(
            service.orders("alice").await,
            Err(Error::NotFound(_))
        ));

        service.submit("alice", "18").await.unwrap();
        service.submit("alice", "2377225624").await.unwrap();
        let orders = service.orders("alice").await.unwrap();
        assert_eq!(orders.len(), 2);
    }
}
