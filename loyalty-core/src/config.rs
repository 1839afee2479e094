//! Configuration management
//!
//! Settings come from `<data_dir>/settings.json`, then environment
//! variables, then whatever the caller (usually CLI flags) sets on top:
//! ```json
//! {
//!   "accrualSystemAddress": "http://localhost:8080",
//!   "databasePath": "/home/me/.loyalty/loyalty.duckdb",
//!   "reconcileIntervalMs": 1000,
//!   "maxConsecutiveFailures": 10,
//!   "accrualTimeoutMs": 5000,
//!   "reconcileScope": "open",
//!   "logLevel": "info"
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::services::{ReconcileScope, ReconcilerConfig};

pub const SETTINGS_FILE: &str = "settings.json";
pub const DEFAULT_DB_FILE: &str = "loyalty.duckdb";

pub const ENV_DIR: &str = "LOYALTY_DIR";
pub const ENV_ACCRUAL_ADDRESS: &str = "ACCRUAL_SYSTEM_ADDRESS";
pub const ENV_DATABASE: &str = "DATABASE_URI";
pub const ENV_RECONCILE_INTERVAL_MS: &str = "LOYALTY_RECONCILE_INTERVAL_MS";
pub const ENV_ACCRUAL_TIMEOUT_MS: &str = "LOYALTY_ACCRUAL_TIMEOUT_MS";
pub const ENV_LOG: &str = "LOYALTY_LOG";

/// Loyalty ledger configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Base URL of the accrual authority; reconciliation is off without it
    pub accrual_system_address: Option<String>,
    /// DuckDB file, or `:memory:`. Defaults to `<data_dir>/loyalty.duckdb`.
    pub database_path: Option<String>,
    pub reconcile_interval_ms: u64,
    pub max_consecutive_failures: u32,
    pub accrual_timeout_ms: u64,
    pub reconcile_scope: ReconcileScope,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            accrual_system_address: None,
            database_path: None,
            reconcile_interval_ms: 1000,
            max_consecutive_failures: 10,
            accrual_timeout_ms: 5000,
            reconcile_scope: ReconcileScope::Open,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load settings.json from `data_dir` and apply environment overrides
    pub fn load(data_dir: &Path) -> Result<Self> {
        let mut config = Self::load_file(data_dir)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load settings.json only. A missing file gives the defaults.
    pub fn load_file(data_dir: &Path) -> Result<Self> {
        let settings_path = data_dir.join(SETTINGS_FILE);
        if !settings_path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&settings_path)
            .with_context(|| format!("Failed to read {}", settings_path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid settings in {}", settings_path.display()))
    }

    /// Override fields from environment variables looked up through `var`
    pub fn apply_env<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        if let Some(address) = var(ENV_ACCRUAL_ADDRESS) {
            self.accrual_system_address = Some(address);
        }
        if let Some(path) = var(ENV_DATABASE) {
            self.database_path = Some(path);
        }
        if let Some(ms) = var(ENV_RECONCILE_INTERVAL_MS) {
            self.reconcile_interval_ms = ms
                .trim()
                .parse()
                .with_context(|| format!("{ENV_RECONCILE_INTERVAL_MS} must be milliseconds"))?;
        }
        if let Some(ms) = var(ENV_ACCRUAL_TIMEOUT_MS) {
            self.accrual_timeout_ms = ms
                .trim()
                .parse()
                .with_context(|| format!("{ENV_ACCRUAL_TIMEOUT_MS} must be milliseconds"))?;
        }
        if let Some(level) = var(ENV_LOG) {
            self.log_level = level;
        }
        Ok(())
    }

    /// Database location, relative to `data_dir` unless configured
    pub fn database_path(&self, data_dir: &Path) -> PathBuf {
        match &self.database_path {
            Some(path) => PathBuf::from(path),
            None => data_dir.join(DEFAULT_DB_FILE),
        }
    }

    pub fn accrual_timeout(&self) -> Duration {
        Duration::from_millis(self.accrual_timeout_ms)
    }

    pub fn reconciler(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            interval: Duration::from_millis(self.reconcile_interval_ms.max(1)),
            max_consecutive_failures: self.max_consecutive_failures,
            scope: self.reconcile_scope,
        }
    }
}

/// Data directory: `LOYALTY_DIR`, else `~/.loyalty`
pub fn data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_DIR) {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    let home = dirs::home_dir().context("Cannot determine home directory")?;
    Ok(home.join(".loyalty"))
}
