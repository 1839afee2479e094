//! Reconcile command - sync order status with the accrual system

use anyhow::{Context, Result};
use colored::Colorize;
use loyalty_core::{LoopExit, LoyaltyContext};
use tokio::sync::watch;

use crate::output;

pub async fn run(ctx: &LoyaltyContext, once: bool, json: bool) -> Result<()> {
    let reconciler = ctx.reconciler.as_ref().context(
        "No accrual system configured. Pass -r <address> or set ACCRUAL_SYSTEM_ADDRESS.",
    )?;

    if once {
        let report = reconciler.run_cycle().await?;
        if json {
            return output::json(&report);
        }

        let mut table = output::create_table();
        table.add_row(vec!["Polled", &report.polled.to_string()]);
        table.add_row(vec!["Updated", &report.updated.to_string()]);
        table.add_row(vec!["Unchanged", &report.unchanged.to_string()]);
        table.add_row(vec!["Skipped", &report.skipped.to_string()]);
        table.add_row(vec!["Failed", &report.failed.to_string()]);
        println!("{}", table);

        if let Some(delay) = report.retry_after {
            output::warning(&format!(
                "Accrual system asked to retry after {}s",
                delay.as_secs()
            ));
        }
        if report.is_failure() {
            anyhow::bail!("Every accrual query failed");
        }
        return Ok(());
    }

    let (tx, rx) = watch::channel(false);
    let mut handle = ctx
        .spawn_reconciler(rx)
        .context("Reconciler is not configured")?;

    if !json {
        output::info("Reconciling orders. Press Ctrl-C to stop.");
    }

    let finished = tokio::select! {
        exit = &mut handle => Some(exit),
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            None
        }
    };
    let exit = match finished {
        Some(exit) => exit,
        None => {
            let _ = tx.send(true);
            // the loop finishes its current cycle first
            handle.await
        }
    }
    .context("Reconciler task failed")?;

    let state = reconciler.state();
    if json {
        return output::json(&serde_json::json!({
            "exit": format!("{:?}", exit).to_lowercase(),
            "cyclesCompleted": state.cycles_completed(),
            "consecutiveFailures": state.consecutive_failures(),
        }));
    }

    match exit {
        LoopExit::Shutdown => {
            println!(
                "{} after {} cycles",
                "Stopped".green(),
                state.cycles_completed()
            );
            Ok(())
        }
        LoopExit::Stopped => anyhow::bail!(
            "Reconciler gave up after {} consecutive failed cycles",
            state.consecutive_failures()
        ),
    }
}
