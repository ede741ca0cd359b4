//! Receipt commands

use anyhow::{bail, Result};
use tally_core::db::Database;
use tally_core::models::ReceiptStatus;

pub fn cmd_receipts_list(db: &Database, status: Option<&str>) -> Result<()> {
    let status = match status {
        Some(s) => Some(
            s.parse::<ReceiptStatus>()
                .map_err(|e| anyhow::anyhow!(e))?,
        ),
        None => None,
    };

    let receipts = db.list_receipts(status)?;

    if receipts.is_empty() {
        println!("No receipts found.");
        return Ok(());
    }

    println!(
        "{:>6}  {:<10} {:>12}  {:<12} {:<20} {}",
        "ID", "Status", "Amount", "Date", "Merchant", "Filename"
    );
    for receipt in &receipts {
        println!(
            "{:>6}  {:<10} {:>12}  {:<12} {:<20} {}",
            receipt.id,
            receipt.status.to_string(),
            receipt
                .amount
                .map(|a| format!("{:.2}", a))
                .unwrap_or_else(|| "-".to_string()),
            receipt
                .receipt_date
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string()),
            receipt.merchant.as_deref().unwrap_or("-"),
            receipt.filename,
        );
    }

    Ok(())
}

pub fn cmd_receipts_candidates(db: &Database, receipt_id: i64) -> Result<()> {
    let receipt = db
        .get_receipt(receipt_id)?
        .ok_or_else(|| anyhow::anyhow!("Receipt {} not found", receipt_id))?;

    let candidates = db.find_match_candidates(receipt_id)?;

    println!(
        "🔎 Candidates for receipt {} ({}, amount {})",
        receipt_id,
        receipt.filename,
        receipt
            .amount
            .map(|a| format!("{:.2}", a))
            .unwrap_or_else(|| "unknown".to_string()),
    );

    if candidates.is_empty() {
        if receipt.amount.is_none() {
            println!("   No amount extracted yet - candidates cannot be computed.");
        } else {
            println!("   No transactions scored above zero.");
        }
        return Ok(());
    }

    for candidate in &candidates {
        println!(
            "   [{:>3}] tx {} · {} · {:.2} · {}",
            candidate.confidence,
            candidate.transaction_id,
            candidate.transaction.created_at.date_naive(),
            candidate.transaction.amount,
            candidate.transaction.reference,
        );
        for reason in &candidate.reasons {
            println!("         - {}", reason);
        }
    }

    Ok(())
}

pub fn cmd_receipts_match(db: &Database, receipt_id: i64, transaction_id: i64) -> Result<()> {
    let receipt = db
        .get_receipt(receipt_id)?
        .ok_or_else(|| anyhow::anyhow!("Receipt {} not found", receipt_id))?;
    if receipt.status == ReceiptStatus::Matched {
        bail!("Receipt {} is already matched", receipt_id);
    }

    let transaction = db
        .get_transaction(transaction_id)?
        .ok_or_else(|| anyhow::anyhow!("Transaction {} not found", transaction_id))?;
    if transaction.receipt_id.is_some() {
        bail!("Transaction {} already has a receipt attached", transaction_id);
    }

    db.link_receipt_to_transaction(receipt_id, transaction_id)?;
    println!("✅ Matched receipt {} to transaction {}.", receipt_id, transaction_id);

    Ok(())
}

pub fn cmd_receipts_unmatch(db: &Database, receipt_id: i64) -> Result<()> {
    let receipt = db
        .get_receipt(receipt_id)?
        .ok_or_else(|| anyhow::anyhow!("Receipt {} not found", receipt_id))?;
    if receipt.transaction_id.is_none() {
        bail!("Receipt {} is not matched", receipt_id);
    }

    db.unlink_receipt(receipt_id)?;
    println!("✅ Unmatched receipt {}.", receipt_id);

    Ok(())
}

pub fn cmd_receipts_auto_match(db: &Database) -> Result<()> {
    println!("🤝 Auto-matching receipts...");

    let (matched, checked) = db.auto_match_receipts()?;

    if matched > 0 {
        println!("✅ Matched {} of {} unmatched receipt(s).", matched, checked);
    } else if checked > 0 {
        println!(
            "No unambiguous high-confidence matches among {} receipt(s). \
             Use 'tally receipts candidates <id>' to review manually.",
            checked
        );
    } else {
        println!("No unmatched receipts to check.");
    }

    Ok(())
}
