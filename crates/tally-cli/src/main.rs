//! Tally CLI - Transaction/receipt reconciliation
//!
//! Usage:
//!   tally init                 Initialize database
//!   tally import --file CSV    Import transactions (generic or TOML profile)
//!   tally receipts candidates 7   Rank match candidates for receipt 7
//!   tally serve --port 3000    Start web server

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::Import { file, profile } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_import(&db, &file, &profile)
        }
        Commands::Serve {
            port,
            host,
            no_auth,
            static_dir,
        } => {
            commands::cmd_serve(
                &cli.db,
                &host,
                port,
                no_auth,
                cli.no_encrypt,
                static_dir.as_deref(),
            )
            .await
        }
        Commands::Status => commands::cmd_status(&cli.db, cli.no_encrypt),
        Commands::Transactions { limit } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_transactions_list(&db, limit)
        }
        Commands::Receipts { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None => commands::cmd_receipts_list(&db, Some("unmatched")),
                Some(ReceiptsAction::List { status }) => {
                    commands::cmd_receipts_list(&db, status.as_deref())
                }
                Some(ReceiptsAction::Candidates { receipt_id }) => {
                    commands::cmd_receipts_candidates(&db, receipt_id)
                }
                Some(ReceiptsAction::Match {
                    receipt_id,
                    transaction_id,
                }) => commands::cmd_receipts_match(&db, receipt_id, transaction_id),
                Some(ReceiptsAction::Unmatch { receipt_id }) => {
                    commands::cmd_receipts_unmatch(&db, receipt_id)
                }
                Some(ReceiptsAction::AutoMatch) => commands::cmd_receipts_auto_match(&db),
            }
        }
        Commands::Shipments { status } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_shipments_list(&db, status.as_deref())
        }
        Commands::Export { export_type } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match export_type {
                ExportType::Transactions { output } => {
                    commands::cmd_export_transactions(&db, output.as_deref())
                }
                ExportType::Full { output } => commands::cmd_export_full(&db, &output),
            }
        }
        Commands::Reset { yes } => commands::cmd_reset(&cli.db, yes, cli.no_encrypt),
    }
}
