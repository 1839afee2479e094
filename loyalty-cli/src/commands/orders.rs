//! Order commands - submit and list orders

use anyhow::Result;
use colored::Colorize;
use loyalty_core::{Error, LoyaltyContext, OrderStatus, SubmitOutcome};

use super::authenticate;
use crate::output;
use crate::AuthArgs;

pub async fn submit(ctx: &LoyaltyContext, auth: &AuthArgs, order: &str, json: bool) -> Result<()> {
    let owner = authenticate(ctx, auth).await?;
    let outcome = ctx.order_service.submit(&owner, order).await?;

    if json {
        return output::json(&outcome);
    }

    match outcome {
        SubmitOutcome::Accepted(order) => {
            output::success(&format!("Order {} accepted for processing", order.order_id))
        }
        SubmitOutcome::AlreadySubmittedBySelf => {
            output::info(&format!("Order {} was already submitted", order.trim()))
        }
        SubmitOutcome::OwnedByOther => {
            anyhow::bail!("Order {} was submitted by another user", order.trim())
        }
    }
    Ok(())
}

pub async fn list(ctx: &LoyaltyContext, auth: &AuthArgs, json: bool) -> Result<()> {
    let owner = authenticate(ctx, auth).await?;
    let orders = match ctx.order_service.orders(&owner).await {
        Ok(orders) => orders,
        Err(Error::NotFound(_)) => {
            if json {
                return output::json(&Vec::<()>::new());
            }
            output::warning("No orders submitted yet");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    if json {
        return output::json(&orders);
    }

    let mut table = output::create_table();
    table.set_header(vec!["Order", "Status", "Accrual", "Uploaded"]);
    for order in &orders {
        let status = match order.status {
            OrderStatus::Processed => order.status.as_str().green(),
            OrderStatus::Invalid => order.status.as_str().red(),
            _ => order.status.as_str().yellow(),
        };
        table.add_row(vec![
            order.order_id.clone(),
            status.to_string(),
            output::points(order.accrual),
            output::timestamp(order.created_at),
        ]);
    }
    println!("{}", table);
    Ok(())
}
