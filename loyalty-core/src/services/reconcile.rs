//! Reconciliation loop - syncs order status with the accrual authority
//!
//! Each cycle polls the authority for every order in scope and writes the
//! answer back. Failures are isolated per order. Whole failed cycles are
//! counted in [`ReconcilerState`]; once the count passes the configured limit
//! the loop stops for good until someone resets the state.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::domain::result::{Error, Result};
use crate::domain::AccrualReport;
use crate::ports::{AccrualAuthority, LedgerStore};

/// Which orders a cycle polls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileScope {
    /// Only NEW and PROCESSING orders
    #[default]
    Open,
    /// Every order, terminal ones included
    All,
}

impl FromStr for ReconcileScope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(ReconcileScope::Open),
            "all" => Ok(ReconcileScope::All),
            other => Err(Error::Config(format!(
                "unknown reconcile scope {other:?} (expected open or all)"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Pause between cycles
    pub interval: Duration,
    /// Failed cycles tolerated in a row before the loop stops
    pub max_consecutive_failures: u32,
    pub scope: ReconcileScope,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_consecutive_failures: 10,
            scope: ReconcileScope::Open,
        }
    }
}

/// Observable loop state, shared with whoever supervises the loop
#[derive(Debug, Default)]
pub struct ReconcilerState {
    consecutive_failures: AtomicU32,
    stopped: AtomicBool,
    cycles_completed: AtomicU64,
}

impl ReconcilerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed.load(Ordering::SeqCst)
    }

    /// Clear the failure counter and the stopped flag so the loop can be
    /// started again
    pub fn reset(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        self.stopped.store(false, Ordering::SeqCst);
    }

    fn record_cycle(&self, failed: bool) -> u32 {
        self.cycles_completed.fetch_add(1, Ordering::SeqCst);
        if failed {
            self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1
        } else {
            self.consecutive_failures.store(0, Ordering::SeqCst);
            0
        }
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// Tally of one reconciliation cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Orders the authority was asked about
    pub polled: usize,
    /// Orders whose status and accrual were written
    pub updated: usize,
    /// Answers ignored because they would regress the order or the order is
    /// already terminal
    pub unchanged: usize,
    /// Orders the authority does not know yet, or was too busy to answer
    pub skipped: usize,
    pub failed: usize,
    /// Set when the authority asked us to back off; the cycle ended early
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<Duration>,
}

impl CycleReport {
    /// A cycle fails when it polled something and nothing got an answer
    pub fn is_failure(&self) -> bool {
        self.polled > 0 && self.failed == self.polled
    }
}

/// Why [`Reconciler::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Shutdown,
    /// Too many failed cycles in a row
    Stopped,
}

/// Background reconciliation between the ledger and the accrual authority
pub struct Reconciler {
    store: Arc<dyn LedgerStore>,
    authority: Arc<dyn AccrualAuthority>,
    config: ReconcilerConfig,
    state: Arc<ReconcilerState>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        authority: Arc<dyn AccrualAuthority>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            store,
            authority,
            config,
            state: Arc::new(ReconcilerState::new()),
        }
    }

    pub fn state(&self) -> Arc<ReconcilerState> {
        Arc::clone(&self.state)
    }

    /// Poll the authority once for every order in scope.
    ///
    /// Only a failure to list orders is returned as an error. Per-order
    /// failures are logged and counted in the report.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let order_ids = match self.config.scope {
            ReconcileScope::Open => self.store.list_open_order_ids().await?,
            ReconcileScope::All => self.store.list_order_ids().await?,
        };

        let mut report = CycleReport::default();
        for order_id in order_ids {
            report.polled += 1;
            match self.authority.order_status(&order_id).await {
                Ok(Some(answer)) => {
                    if let Err(e) = answer.check_for(&order_id) {
                        warn!(order = %order_id, error = %e, "Rejected accrual answer");
                        report.failed += 1;
                        continue;
                    }
                    match self.apply(&order_id, &answer).await {
                        Ok(true) => report.updated += 1,
                        Ok(false) => report.unchanged += 1,
                        Err(e) => {
                            warn!(order = %order_id, error = %e, "Failed to record accrual status");
                            report.failed += 1;
                        }
                    }
                }
                Ok(None) => {
                    debug!(order = %order_id, "Order not registered with accrual authority");
                    report.skipped += 1;
                }
                Err(Error::RateLimited { retry_after }) => {
                    info!(order = %order_id, ?retry_after, "Accrual authority rate limit hit");
                    report.skipped += 1;
                    report.retry_after = Some(retry_after);
                    break;
                }
                Err(e) => {
                    warn!(order = %order_id, error = %e, "Accrual query failed");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Write the authority's answer unless it would move the order backwards.
    /// Returns true if the store was written.
    async fn apply(&self, order_id: &str, answer: &AccrualReport) -> Result<bool> {
        let Some(current) = self.store.get_order(order_id).await? else {
            return Ok(false);
        };

        let next = answer.status.order_status();
        if !current.status.can_advance_to(next) {
            debug!(
                order = %order_id,
                current = %current.status,
                reported = %next,
                "Ignoring accrual answer"
            );
            return Ok(false);
        }

        let accrual = answer.awarded();
        let written = self.store.update_order(order_id, next, accrual).await?;
        if written && current.status != next {
            info!(order = %order_id, status = %next, %accrual, "Order status changed");
        }
        Ok(written)
    }

    /// Run cycles until shutdown is signalled or the failure limit is passed.
    ///
    /// The shutdown flag is only checked between cycles. A dropped sender
    /// counts as shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> LoopExit {
        if self.state.is_stopped() {
            warn!("Reconciler is stopped; reset its state before starting again");
            return LoopExit::Stopped;
        }
        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            scope = ?self.config.scope,
            "Reconciler started"
        );

        loop {
            if *shutdown.borrow() {
                info!("Reconciler shutting down");
                return LoopExit::Shutdown;
            }

            let (failed, delay) = match self.run_cycle().await {
                Ok(report) => {
                    debug!(?report, "Reconcile cycle finished");
                    let delay = report.retry_after.unwrap_or(self.config.interval);
                    (report.is_failure(), delay)
                }
                Err(e) => {
                    error!(error = %e, "Reconcile cycle failed");
                    (true, self.config.interval)
                }
            };

            let failures = self.state.record_cycle(failed);
            if failures > self.config.max_consecutive_failures {
                self.state.stop();
                error!(
                    failures,
                    "Reconciler stopped after too many consecutive failed cycles"
                );
                return LoopExit::Stopped;
            }

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Reconciler shutting down");
                        return LoopExit::Shutdown;
                    }
                }
            }
        }
    }
}
