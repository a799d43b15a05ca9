//! # Loyalty Register
//!
//! Cashier console over one scan session.
//!
//! ## Usage
//! ```bash
//! # Seed a development database first
//! cargo run -p loyalty-db --bin seed
//!
//! # Start the console (reads register.toml, then LOYALTY_* overrides)
//! cargo run -p loyalty-register
//!
//! # Use a specific config file
//! cargo run -p loyalty-register -- --config ./register.toml
//! ```
//!
//! Every line is one cashier action; type `help` for the list.

mod command;
mod render;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use loyalty_core::SystemClock;
use loyalty_db::Database;
use loyalty_orchestrator::{
    init_tracing, CashierSession, RegisterConfig, SessionError, SessionSettings, SqliteBackend,
};

use crate::command::{Command, ParseError, HELP};

/// How many transactions `history` shows.
const HISTORY_LIMIT: u32 = 10;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = RegisterConfig::load(config_path_from_args())?;
    info!(
        organization_id = %config.cashier.organization_id,
        branch_id = %config.cashier.branch_id,
        cashier_id = %config.cashier.cashier_id,
        database = %config.database.path.display(),
        "Register starting"
    );

    let db = Database::new(config.db_config()).await?;
    let session = CashierSession::new(
        config.session_context(),
        Arc::new(SqliteBackend::new(db.clone())),
        Arc::new(SystemClock),
        SessionSettings::from(&config),
    );

    println!("{}", render::state(&session.state().await));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match line.parse::<Command>() {
            Ok(Command::Quit) => break,
            Ok(command) => command,
            Err(ParseError::Empty) => continue,
            Err(err) => {
                println!("{}", err);
                continue;
            }
        };

        match run(&session, &db, command).await {
            Ok(text) => println!("{}", text),
            Err(err) => println!("{} [{}]", err, err.outcome().code()),
        }
    }

    info!("Register closed");
    Ok(())
}

fn config_path_from_args() -> Option<PathBuf> {
    let args: Vec<String> = std::env::args().collect();
    args.iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
}

async fn run(
    session: &CashierSession,
    db: &Database,
    command: Command,
) -> Result<String, SessionError> {
    let state = match command {
        Command::Scan(raw) => session.scan(&raw).await?,
        Command::Enroll => session.enroll().await?,
        Command::Earn => session.start_purchase().await?,
        Command::Quote(amount) => session.quote(amount).await?,
        Command::Sale { amount, notes } => {
            session.confirm_purchase(amount, notes.as_deref()).await?
        }
        Command::Rewards => session.start_redemption().await?,
        Command::Redeem(product_id) => session.confirm_redemption(&product_id).await?,
        Command::Verify => session.verify().await?,
        Command::Resubmit => session.resubmit().await?,
        Command::Back => session.back().await?,
        Command::Cancel | Command::Done => session.finish().await?,
        Command::State => session.state().await,
        Command::Offers => return Ok(render::offers(&session.active_offers().await?)),
        Command::History => return Ok(history(session, db).await),
        Command::Audit => return Ok(audit(db).await),
        Command::Help => return Ok(HELP.to_string()),
        Command::Quit => return Ok(String::new()),
    };
    Ok(render::state(&state))
}

async fn history(session: &CashierSession, db: &Database) -> String {
    let state = session.state().await;
    let Some(customer) = state.customer() else {
        return "Scan a customer first".to_string();
    };

    match db
        .ledger()
        .list_for_membership(
            &customer.identity.id,
            &session.context().organization_id,
            HISTORY_LIMIT,
        )
        .await
    {
        Ok(transactions) if transactions.is_empty() => "No transactions yet".to_string(),
        Ok(transactions) => transactions
            .iter()
            .map(render::transaction)
            .collect::<Vec<_>>()
            .join("\n"),
        Err(err) => {
            warn!(%err, "History lookup failed");
            loyalty_core::Outcome::Unavailable.message()
        }
    }
}

async fn audit(db: &Database) -> String {
    match db.ledger().audit().await {
        Ok(discrepancies) => {
            if !discrepancies.is_empty() {
                warn!(count = discrepancies.len(), "Ledger audit found mismatches");
            }
            render::audit(&discrepancies)
        }
        Err(err) => {
            warn!(%err, "Ledger audit failed");
            loyalty_core::Outcome::Unavailable.message()
        }
    }
}
