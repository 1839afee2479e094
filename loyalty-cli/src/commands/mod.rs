//! CLI command implementations

pub mod balance;
pub mod orders;
pub mod reconcile;
pub mod register;
pub mod withdraw;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use loyalty_core::config::{self, Config};
use loyalty_core::services::ReconcileScope;
use loyalty_core::{CredentialCheck, LoyaltyContext};

use crate::AuthArgs;

/// Flags shared by every command; they override settings.json and env
#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// Data directory (default: $LOYALTY_DIR or ~/.loyalty)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Accrual system base URL
    #[arg(short = 'r', long = "accrual-address", global = true)]
    pub accrual_address: Option<String>,

    /// Database file, or :memory:
    #[arg(short = 'd', long = "database", global = true)]
    pub database: Option<String>,

    /// Which orders the reconciler polls (open or all)
    #[arg(long, global = true)]
    pub scope: Option<ReconcileScope>,
}

/// Resolve the data directory and layered configuration
pub fn load_config(global: &GlobalArgs) -> Result<(PathBuf, Config)> {
    let data_dir = match &global.data_dir {
        Some(dir) => dir.clone(),
        None => config::data_dir()?,
    };

    let mut config = Config::load(&data_dir)?;
    if let Some(address) = &global.accrual_address {
        config.accrual_system_address = Some(address.clone());
    }
    if let Some(database) = &global.database {
        config.database_path = Some(database.clone());
    }
    if let Some(scope) = global.scope {
        config.reconcile_scope = scope;
    }
    Ok((data_dir, config))
}

/// Open the ledger described by `config`
pub async fn open_context(data_dir: &Path, config: Config) -> Result<LoyaltyContext> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;
    // opening retries with thread sleeps while another process holds the file
    let data_dir = data_dir.to_path_buf();
    tokio::task::spawn_blocking(move || LoyaltyContext::open(&data_dir, config))
        .await
        .context("Database open task failed")?
        .context("Failed to initialize loyalty context")
}

/// Verify credentials and return the owner they identify
pub async fn authenticate(ctx: &LoyaltyContext, auth: &AuthArgs) -> Result<String> {
    match ctx
        .credential_service
        .verify(&auth.login, &auth.password)
        .await?
    {
        CredentialCheck::Valid => Ok(auth.login.trim().to_string()),
        CredentialCheck::WrongPassword | CredentialCheck::UnknownUser => {
            bail!("Invalid login or password")
        }
    }
}
