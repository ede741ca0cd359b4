//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `cmd_init` - Initialize the database
//! - `cmd_status` - Show database status
//! - `cmd_serve` - Start the web server
//! - `cmd_reset` - Clear reconciliation data

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tally_core::db::{Database, TransactionFilter};
use tally_server::{parse_trusted_networks, parse_users, ServerConfig};

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path.to_str().unwrap();
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

pub fn cmd_init(db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    let _db = open_db(db_path, no_encrypt)?;

    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else {
        println!("   🔒 Encryption: ENABLED");
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Import transactions: tally import --file export.csv");
    println!("  2. Start web UI: tally serve");

    Ok(())
}

pub fn cmd_status(db_path: &Path, no_encrypt: bool) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;

    let transactions = db.count_transactions(TransactionFilter::new())?;
    let receipt_stats = db.receipt_stats()?;
    let shipment_stats = db.shipment_stats()?;

    println!("📋 Tally Status");
    println!("   ─────────────────────────────");
    println!("   Database: {}", db.path());
    println!(
        "   Encryption: {}",
        if db.is_encrypted()? { "ENABLED" } else { "disabled" }
    );
    println!("   Transactions: {}", transactions);
    println!(
        "   Receipts: {} ({} matched, {} unmatched, {:.1}% match rate)",
        receipt_stats.total,
        receipt_stats.matched,
        receipt_stats.unmatched,
        receipt_stats.match_rate
    );
    println!("   Shipments: {}", shipment_stats.total);

    Ok(())
}

/// Build server config from environment variables
///
/// - TALLY_API_KEYS: comma-separated bearer keys
/// - TALLY_JWT_SECRET / TALLY_USERS ("email:password,..."): session login
/// - TALLY_TRUSTED_NETWORKS / TALLY_TRUSTED_PROXIES: CIDR lists
/// - TALLY_ALLOWED_ORIGINS: CORS origins
fn server_config_from_env(no_auth: bool) -> ServerConfig {
    let csv_env = |name: &str| -> Vec<String> {
        std::env::var(name)
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    };

    ServerConfig {
        require_auth: !no_auth,
        allowed_origins: csv_env("TALLY_ALLOWED_ORIGINS"),
        api_keys: csv_env("TALLY_API_KEYS"),
        jwt_secret: std::env::var("TALLY_JWT_SECRET").unwrap_or_default(),
        users: parse_users(&std::env::var("TALLY_USERS").unwrap_or_default()),
        trusted_networks: parse_trusted_networks(
            &std::env::var("TALLY_TRUSTED_NETWORKS").unwrap_or_default(),
        ),
        trusted_proxies: parse_trusted_networks(
            &std::env::var("TALLY_TRUSTED_PROXIES").unwrap_or_default(),
        ),
    }
}

pub async fn cmd_serve(
    db_path: &Path,
    host: &str,
    port: u16,
    no_auth: bool,
    no_encrypt: bool,
    static_dir: Option<&Path>,
) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;
    let config = server_config_from_env(no_auth);

    println!("🌐 Starting Tally server on http://{}:{}", host, port);
    if no_auth {
        println!("   ⚠️  Authentication: DISABLED (--no-auth)");
    }

    let static_dir = static_dir.and_then(|p| p.to_str());
    tally_server::serve_with_config(db, host, port, static_dir, config).await
}

pub fn cmd_reset(db_path: &Path, yes: bool, no_encrypt: bool) -> Result<()> {
    if !yes {
        print!("This deletes all transactions, receipts and shipments. Continue? [y/N] ");
        std::io::stdout().flush()?;
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer)?;
        if !answer.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    let db = open_db(db_path, no_encrypt)?;
    db.reset()?;
    println!("✅ Reconciliation data cleared.");

    Ok(())
}
