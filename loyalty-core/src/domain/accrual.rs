//! Accrual authority answers

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::result::{Error, Result};
use super::OrderStatus;

/// Order status as reported by the accrual authority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccrualStatus {
    /// Known to the authority, not yet looked at
    Registered,
    Processing,
    Processed,
    Invalid,
}

impl AccrualStatus {
    /// Map onto the local order lifecycle
    pub fn order_status(&self) -> OrderStatus {
        match self {
            AccrualStatus::Registered => OrderStatus::New,
            AccrualStatus::Processing => OrderStatus::Processing,
            AccrualStatus::Processed => OrderStatus::Processed,
            AccrualStatus::Invalid => OrderStatus::Invalid,
        }
    }
}

/// The authority's current view of one order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccrualReport {
    pub order: String,
    pub status: AccrualStatus,
    /// Only present once the order is processed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accrual: Option<Decimal>,
}

impl AccrualReport {
    /// Reject an answer that is about another order or awards negative
    /// points.
    pub fn check_for(&self, order_id: &str) -> Result<()> {
        if self.order != order_id {
            return Err(Error::InvalidAccrualAnswer(format!(
                "asked about order {order_id}, answer is for order {}",
                self.order
            )));
        }
        match self.accrual {
            Some(accrual) if accrual < Decimal::ZERO => {
                Err(Error::InvalidAccrualAnswer(format!(
                    "negative accrual {accrual} for order {order_id}"
                )))
            }
            _ => Ok(()),
        }
    }

    /// Accrual to record locally. Anything but PROCESSED records zero.
    pub fn awarded(&self) -> Decimal {
        match self.status {
            AccrualStatus::Processed => self.accrual.unwrap_or(Decimal::ZERO).round_dp(2),
            _ => Decimal::ZERO,
        }
    }
}
