//! Balance domain model
//!
//! The balance is never stored. It is re-derived from the order and
//! withdrawal history every time it is read.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Order, Withdrawal};

/// An owner's derived points balance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Accrued points minus everything withdrawn
    pub current: Decimal,
    /// Total withdrawn to date
    pub withdrawn: Decimal,
}

impl Balance {
    /// Derive the balance from an owner's ledger.
    ///
    /// Orders that have not been processed carry zero accrual, so summing
    /// every order is the same as summing the processed ones.
    pub fn from_ledger(orders: &[Order], withdrawals: &[Withdrawal]) -> Self {
        let accrued: Decimal = orders.iter().map(|o| o.accrual).sum();
        let withdrawn: Decimal = withdrawals.iter().map(|w| w.amount).sum();
        Self {
            current: accrued - withdrawn,
            withdrawn,
        }
    }

    /// Whether `amount` can be withdrawn without going negative
    pub fn covers(&self, amount: Decimal) -> bool {
        self.current >= amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OrderStatus;

    fn processed(order_id: &str, accrual: Decimal) -> Order {
        let mut order = Order::new(order_id, "alice");
        order.status = OrderStatus::Processed;
        order.accrual = accrual;
        order
    }

    #[test]
    fn test_empty_ledger_is_zero() {
        let balance = Balance::from_ledger(&[], &[]);
        assert_eq!(balance.current, Decimal::ZERO);
        assert_eq!(balance.withdrawn, Decimal::ZERO);
    }

    #[test]
    fn test_unprocessed_orders_contribute_nothing() {
        let orders = vec![Order::new("18", "alice"), processed("26", Decimal::new(5000, 2))];
        let balance = Balance::from_ledger(&orders, &[]);
        assert_eq!(balance.current, Decimal::new(5000, 2));
    }

    #[test]
    fn test_withdrawals_reduce_current() {
        let orders = vec![processed("18", Decimal::new(72998, 2))];
        let withdrawals = vec![
            Withdrawal::new("alice", "2377225624", Decimal::new(500, 0)),
            Withdrawal::new("alice", "79927398713", Decimal::new(2998, 2)),
        ];
        let balance = Balance::from_ledger(&orders, &withdrawals);
        assert_eq!(balance.current, Decimal::new(200, 0));
        assert_eq!(balance.withdrawn, Decimal::new(52998, 2));
    }

    #[test]
    fn test_covers_exact_amount() {
        let balance = Balance {
            current: Decimal::new(550, 1),
            withdrawn: Decimal::ZERO,
        };
        assert!(balance.covers(Decimal::new(55, 0)));
        assert!(!balance.covers(Decimal::new(5501, 2)));
    }
}
