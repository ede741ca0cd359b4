//! Transaction listing command

use anyhow::Result;
use tally_core::db::{Database, TransactionFilter};

pub fn cmd_transactions_list(db: &Database, limit: i64) -> Result<()> {
    let transactions = db.search_transactions(TransactionFilter::new(), limit, 0)?;

    if transactions.is_empty() {
        println!("No transactions. Import some with 'tally import --file export.csv'.");
        return Ok(());
    }

    println!(
        "{:>6}  {:<12} {:<10} {:>12}  {:<10} {:<20} {}",
        "ID", "Date", "Status", "Amount", "Source", "Merchant", "Reference"
    );
    for tx in &transactions {
        println!(
            "{:>6}  {:<12} {:<10} {:>12.2}  {:<10} {:<20} {}",
            tx.id,
            tx.created_at.date_naive().to_string(),
            tx.status.to_string(),
            tx.amount,
            tx.source.to_string(),
            tx.merchant.as_deref().unwrap_or("-"),
            tx.reference,
        );
    }

    Ok(())
}
