//! Result and error types for the core library
//!
//! Business outcomes (ownership conflicts, insufficient balance, duplicate
//! submissions) are not errors. They live next to the services that return
//! them as plain enums. Only validation, store and network failures end up
//! here.

use std::time::Duration;

use rust_decimal::Decimal;
use thiserror::Error;

/// Core library error type
#[derive(Error, Debug)]
pub enum Error {
    /// Order number is not a decimal digit string or fails the Luhn check
    #[error("Invalid order number: {0:?}")]
    InvalidOrderFormat(String),

    /// Withdrawal amount must be strictly positive
    #[error("Invalid amount: {0}")]
    InvalidAmount(Decimal),

    #[error("Validation error: {0}")]
    Validation(String),

    /// No order or withdrawal history for an owner
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Accrual authority unreachable: {0}")]
    AuthorityUnreachable(String),

    /// The authority answered, but the answer cannot be recorded
    #[error("Rejected accrual answer: {0}")]
    InvalidAccrualAnswer(String),

    /// The accrual authority asked us to back off
    #[error("Accrual authority rate limit, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an authority error
    pub fn authority(msg: impl Into<String>) -> Self {
        Self::AuthorityUnreachable(msg.into())
    }

    /// True for failures caused by the caller's input rather than the service
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidOrderFormat(_) | Self::InvalidAmount(_) | Self::Validation(_)
        )
    }
}

impl From<duckdb::Error> for Error {
    fn from(e: duckdb::Error) -> Self {
        Self::StoreUnavailable(e.to_string())
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;
