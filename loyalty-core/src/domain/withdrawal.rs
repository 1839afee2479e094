//! Withdrawal domain model

use chrono::{DateTime, SubsecRound, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Points spent by an owner against a future purchase.
///
/// `(owner, order_id)` is unique. The order number does not have to refer to
/// a submitted order. Records are never updated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub owner: String,
    pub order_id: String,
    pub amount: Decimal,
    pub processed_at: DateTime<Utc>,
}

impl Withdrawal {
    pub fn new(owner: impl Into<String>, order_id: impl Into<String>, amount: Decimal) -> Self {
        Self {
            owner: owner.into(),
            order_id: order_id.into(),
            amount,
            processed_at: Utc::now().trunc_subsecs(6),
        }
    }
}
