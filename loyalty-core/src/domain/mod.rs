//! Core domain entities
//!
//! All business entities are defined here. These are pure data structures
//! with validation logic - no I/O or external dependencies.

mod accrual;
pub mod balance;
mod credential;
mod order;
pub mod order_number;
pub mod result;
mod withdrawal;

pub use accrual::{AccrualReport, AccrualStatus};
pub use balance::Balance;
pub use credential::Credential;
pub use order::{Order, OrderStatus};
pub use order_number::{is_valid_order_number, parse_order_number};
pub use withdrawal::Withdrawal;
