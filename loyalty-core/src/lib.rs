//! Loyalty Core - ledger consistency and reconciliation for loyalty points
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Core business entities (Order, Withdrawal, Balance, etc.)
//! - **ports**: Trait definitions for external dependencies (LedgerStore, AccrualAuthority)
//! - **services**: Business logic orchestration
//! - **adapters**: Concrete implementations (DuckDB, in-memory, HTTP accrual client)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use adapters::accrual_http::HttpAccrualClient;
use adapters::duckdb::{DuckDbStore, IN_MEMORY};
use config::Config;
use ports::{AccrualAuthority, LedgerStore};
use services::*;

// Re-export commonly used types at crate root
pub use domain::result::Error;
pub use domain::{
    AccrualReport, AccrualStatus, Balance, Order, OrderStatus, Withdrawal,
};
pub use services::{
    CredentialCheck, CycleReport, LoopExit, RegisterOutcome, SubmitOutcome, WithdrawOutcome,
};

/// Main context for loyalty ledger operations
///
/// Holds the store, the configuration, and every service wired to them.
pub struct LoyaltyContext {
    pub config: Config,
    pub store: Arc<dyn LedgerStore>,
    pub order_service: OrderService,
    pub withdrawal_service: WithdrawalService,
    pub balance_service: BalanceService,
    pub credential_service: CredentialService,
    /// Present when an accrual authority is configured
    pub reconciler: Option<Arc<Reconciler>>,
}

impl LoyaltyContext {
    /// Load settings from `data_dir` and open the configured database
    pub fn new(data_dir: &Path) -> Result<Self> {
        let config = Config::load(data_dir)?;
        Self::open(data_dir, config)
    }

    /// Open the database named by `config` and wire the services
    pub fn open(data_dir: &Path, config: Config) -> Result<Self> {
        let db_path = config.database_path(data_dir);
        if db_path.as_os_str() != IN_MEMORY {
            if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let store = DuckDbStore::open(&db_path)
            .with_context(|| format!("Failed to open database {}", db_path.display()))?;
        store.ensure_schema().context("Failed to migrate database")?;
        info!(path = %db_path.display(), "Ledger database ready");

        let authority: Option<Arc<dyn AccrualAuthority>> = match &config.accrual_system_address
        {
            Some(address) => Some(Arc::new(HttpAccrualClient::new(
                address,
                config.accrual_timeout(),
            )?)),
            None => None,
        };

        Ok(Self::with_parts(config, Arc::new(store), authority))
    }

    /// Wire services around an existing store and optional authority
    pub fn with_parts(
        config: Config,
        store: Arc<dyn LedgerStore>,
        authority: Option<Arc<dyn AccrualAuthority>>,
    ) -> Self {
        let reconciler = authority.map(|authority| {
            Arc::new(Reconciler::new(
                Arc::clone(&store),
                authority,
                config.reconciler(),
            ))
        });

        Self {
            order_service: OrderService::new(Arc::clone(&store)),
            withdrawal_service: WithdrawalService::new(Arc::clone(&store)),
            balance_service: BalanceService::new(Arc::clone(&store)),
            credential_service: CredentialService::new(Arc::clone(&store)),
            reconciler,
            store,
            config,
        }
    }

    /// Run the reconciliation loop on its own task until `shutdown` flips to
    /// true. Returns `None` when no accrual authority is configured.
    pub fn spawn_reconciler(
        &self,
        shutdown: watch::Receiver<bool>,
    ) -> Option<JoinHandle<LoopExit>> {
        let reconciler = Arc::clone(self.reconciler.as_ref()?);
        Some(tokio::spawn(async move { reconciler.run(shutdown).await }))
    }
}
