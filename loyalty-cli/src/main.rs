//! Loyalty CLI - loyalty points ledger in your terminal

use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{balance, orders, reconcile, register, withdraw, GlobalArgs};

/// Loyalty - points ledger with accrual reconciliation
#[derive(Parser)]
#[command(name = "loyalty", version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Credentials of the acting user
#[derive(Args, Debug, Clone)]
pub struct AuthArgs {
    #[arg(long, env = "LOYALTY_LOGIN")]
    pub login: String,
    #[arg(long, env = "LOYALTY_PASSWORD", hide_env_values = true)]
    pub password: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new login
    Register {
        #[command(flatten)]
        auth: AuthArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Submit an order number for accrual
    Submit {
        /// Order number (Luhn checked)
        order: String,
        #[command(flatten)]
        auth: AuthArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List submitted orders
    Orders {
        #[command(flatten)]
        auth: AuthArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show current balance and withdrawn total
    Balance {
        #[command(flatten)]
        auth: AuthArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Spend points against a new order
    Withdraw {
        /// Order number the points are spent on
        order: String,
        /// Points to withdraw
        sum: Decimal,
        #[command(flatten)]
        auth: AuthArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List withdrawals
    Withdrawals {
        #[command(flatten)]
        auth: AuthArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Sync order status with the accrual system
    Reconcile {
        /// Run a single cycle instead of looping until Ctrl-C
        #[arg(long)]
        once: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let (data_dir, config) = commands::load_config(&cli.global)?;
    init_logging(&config.log_level);
    let ctx = commands::open_context(&data_dir, config).await?;

    match cli.command {
        Commands::Register { auth, json } => register::run(&ctx, &auth, json).await,
        Commands::Submit { order, auth, json } => orders::submit(&ctx, &auth, &order, json).await,
        Commands::Orders { auth, json } => orders::list(&ctx, &auth, json).await,
        Commands::Balance { auth, json } => balance::run(&ctx, &auth, json).await,
        Commands::Withdraw { order, sum, auth, json } => {
            withdraw::withdraw(&ctx, &auth, &order, sum, json).await
        }
        Commands::Withdrawals { auth, json } => withdraw::list(&ctx, &auth, json).await,
        Commands::Reconcile { once, json } => reconcile::run(&ctx, once, json).await,
    }
}

/// Logs go to stderr. `RUST_LOG` wins over the configured level.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}
