//! Balance command - show current points and withdrawn total

use anyhow::Result;
use colored::Colorize;
use loyalty_core::LoyaltyContext;

use super::authenticate;
use crate::output;
use crate::AuthArgs;

pub async fn run(ctx: &LoyaltyContext, auth: &AuthArgs, json: bool) -> Result<()> {
    let owner = authenticate(ctx, auth).await?;
    let balance = ctx.balance_service.balance(&owner).await?;

    if json {
        return output::json(&balance);
    }

    println!("{}", format!("Balance for {}", owner).bold());
    let mut table = output::create_table();
    table.add_row(vec!["Current".to_string(), output::points(balance.current)]);
    table.add_row(vec!["Withdrawn".to_string(), output::points(balance.withdrawn)]);
    println!("{}", table);
    Ok(())
}
