//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Tally - Reconcile transactions with uploaded receipts
#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Self-hosted transaction/receipt reconciliation tool", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "tally.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set TALLY_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Import transactions from CSV
    Import {
        /// CSV file to import
        #[arg(short, long)]
        file: PathBuf,

        /// Mapping profile: "generic" or a path to a TOML profile
        #[arg(short, long, default_value = "generic")]
        profile: String,
    },

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Disable authentication (for local development only)
        ///
        /// WARNING: Do not use this flag when exposing the server to a network.
        /// By default, the server requires a session token, API key, or
        /// trusted-network source address.
        #[arg(long)]
        no_auth: bool,

        /// Directory containing static files to serve (e.g., ui/dist)
        #[arg(long)]
        static_dir: Option<PathBuf>,
    },

    /// Show database status (encryption, row counts)
    Status,

    /// List transactions
    Transactions {
        /// Maximum rows to show
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Manage receipts (list, candidates, match, unmatch, auto-match)
    Receipts {
        #[command(subcommand)]
        action: Option<ReceiptsAction>,
    },

    /// List shipments
    Shipments {
        /// Filter by status (pending, in_transit, delivered, returned)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Export data
    Export {
        #[command(subcommand)]
        export_type: ExportType,
    },

    /// Clear all reconciliation data
    Reset {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
pub enum ReceiptsAction {
    /// List receipts
    List {
        /// Filter by status (unmatched, matched, processing, error)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Show ranked transaction match candidates for a receipt
    Candidates {
        /// Receipt ID
        receipt_id: i64,
    },

    /// Match a receipt to a transaction
    Match {
        /// Receipt ID
        receipt_id: i64,
        /// Transaction ID
        transaction_id: i64,
    },

    /// Unmatch a receipt from its transaction
    Unmatch {
        /// Receipt ID
        receipt_id: i64,
    },

    /// Auto-match unambiguous high-confidence receipts
    AutoMatch,
}

#[derive(Subcommand)]
pub enum ExportType {
    /// Export transactions as CSV
    Transactions {
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Export the full snapshot as gzipped JSON
    Full {
        /// Output file
        #[arg(short, long, default_value = "tally-export.json.gz")]
        output: PathBuf,
    },
}
