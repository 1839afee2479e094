//! Withdrawal commands - spend points and list withdrawals

use anyhow::Result;
use loyalty_core::{Error, LoyaltyContext, WithdrawOutcome};
use rust_decimal::Decimal;

use super::authenticate;
use crate::output;
use crate::AuthArgs;

pub async fn withdraw(
    ctx: &LoyaltyContext,
    auth: &AuthArgs,
    order: &str,
    sum: Decimal,
    json: bool,
) -> Result<()> {
    let owner = authenticate(ctx, auth).await?;
    let outcome = ctx.withdrawal_service.withdraw(&owner, order, sum).await?;

    if json {
        return output::json(&outcome);
    }

    match outcome {
        WithdrawOutcome::Accepted(w) => output::success(&format!(
            "Withdrew {} points for order {}",
            output::points(w.amount),
            w.order_id
        )),
        WithdrawOutcome::InsufficientBalance => anyhow::bail!("Insufficient balance"),
        WithdrawOutcome::AlreadyWithdrawn => {
            anyhow::bail!("Points were already withdrawn for order {}", order.trim())
        }
    }
    Ok(())
}

pub async fn list(ctx: &LoyaltyContext, auth: &AuthArgs, json: bool) -> Result<()> {
    let owner = authenticate(ctx, auth).await?;
    let withdrawals = match ctx.withdrawal_service.withdrawals(&owner).await {
        Ok(withdrawals) => withdrawals,
        Err(Error::NotFound(_)) => {
            if json {
                return output::json(&Vec::<()>::new());
            }
            output::warning("No withdrawals yet");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    if json {
        return output::json(&withdrawals);
    }

    let mut table = output::create_table();
    table.set_header(vec!["Order", "Sum", "Processed"]);
    for w in &withdrawals {
        table.add_row(vec![
            w.order_id.clone(),
            output::points(w.amount),
            output::timestamp(w.processed_at),
        ]);
    }
    println!("{}", table);
    Ok(())
}
