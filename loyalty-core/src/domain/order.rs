//! Order domain model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::result::{Error, Result};

/// Lifecycle of a submitted order
///
/// NEW -> PROCESSING -> {PROCESSED, INVALID}. The last two are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    New,
    Processing,
    Processed,
    Invalid,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Processed => "PROCESSED",
            OrderStatus::Invalid => "INVALID",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Processed | OrderStatus::Invalid)
    }

    fn rank(&self) -> u8 {
        match self {
            OrderStatus::New => 0,
            OrderStatus::Processing => 1,
            OrderStatus::Processed | OrderStatus::Invalid => 2,
        }
    }

    /// Whether moving from `self` to `next` respects the state machine.
    ///
    /// Staying in the same non-terminal state is allowed so reconciliation can
    /// overwrite unconditionally. Nothing leaves a terminal state, except that
    /// re-applying the same terminal state is a no-op that callers may skip.
    pub fn can_advance_to(&self, next: OrderStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next.rank() >= self.rank()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "NEW" => Ok(OrderStatus::New),
            "PROCESSING" => Ok(OrderStatus::Processing),
            "PROCESSED" => Ok(OrderStatus::Processed),
            "INVALID" => Ok(OrderStatus::Invalid),
            other => Err(Error::validation(format!("unknown order status {other:?}"))),
        }
    }
}

/// A purchase order submitted by an owner for loyalty accrual
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Externally assigned order number, globally unique
    pub order_id: String,
    pub owner: String,
    pub status: OrderStatus,
    /// Points awarded; zero until the authority processes the order
    pub accrual: Decimal,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Create a freshly submitted order (status NEW, no accrual)
    pub fn new(order_id: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            owner: owner.into(),
            status: OrderStatus::New,
            accrual: Decimal::ZERO,
            created_at: Utc::now().trunc_subsecs(6),
        }
    }
}
