//! Register command - create a login

use anyhow::Result;
use loyalty_core::{LoyaltyContext, RegisterOutcome};
use serde_json::json;

use crate::output;
use crate::AuthArgs;

pub async fn run(ctx: &LoyaltyContext, auth: &AuthArgs, json: bool) -> Result<()> {
    let outcome = ctx
        .credential_service
        .register(&auth.login, &auth.password)
        .await?;

    if json {
        return output::json(&json!({ "login": auth.login.trim(), "outcome": outcome }));
    }

    match outcome {
        RegisterOutcome::Registered => output::success(&format!("Registered {}", auth.login.trim())),
        RegisterOutcome::LoginTaken => {
            anyhow::bail!("Login {} is already taken", auth.login.trim())
        }
    }
    Ok(())
}
