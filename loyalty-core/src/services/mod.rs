//! Service layer - business logic orchestration
//!
//! Services coordinate domain rules and port interactions. Each service owns
//! one use case of the ledger.

mod balance;
mod credentials;
pub mod migration;
mod orders;
pub mod reconcile;
mod withdrawals;

pub use balance::BalanceService;
pub use credentials::{CredentialCheck, CredentialService, RegisterOutcome};
pub use migration::{MigrationResult, MigrationService};
pub use orders::{OrderService, SubmitOutcome};
pub use reconcile::{
    CycleReport, LoopExit, ReconcileScope, Reconciler, ReconcilerConfig, ReconcilerState,
};
pub use withdrawals::{OwnerLocks, WithdrawOutcome, WithdrawalService};
