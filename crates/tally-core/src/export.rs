//! Export: transactions as CSV, full snapshot as gzipped JSON

use std::io::Write;

use chrono::{DateTime, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::db::{Database, TransactionFilter};
use crate::error::{Error, Result};
use crate::models::{Receipt, Shipment, Transaction};

/// Render transactions as CSV (generic export shape, reimportable with the
/// built-in generic profile)
pub fn transactions_to_csv(transactions: &[Transaction]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer.write_record([
        "Date",
        "Reference",
        "Amount",
        "Currency",
        "Status",
        "Merchant",
        "Customer Name",
        "Customer Email",
    ])?;

    for tx in transactions {
        writer.write_record([
            tx.created_at.date_naive().to_string().as_str(),
            tx.reference.as_str(),
            format!("{:.2}", tx.amount).as_str(),
            tx.currency.as_str(),
            tx.status.as_str(),
            tx.merchant.as_deref().unwrap_or(""),
            tx.customer_name.as_deref().unwrap_or(""),
            tx.customer_email.as_deref().unwrap_or(""),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| Error::Import(format!("CSV write failed: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| Error::InvalidData(format!("CSV not UTF-8: {}", e)))
}

/// Everything needed to rebuild the reconciliation state elsewhere
#[derive(Debug, Serialize, Deserialize)]
pub struct FullExport {
    pub exported_at: DateTime<Utc>,
    pub transactions: Vec<Transaction>,
    pub receipts: Vec<Receipt>,
    pub shipments: Vec<Shipment>,
}

/// Export every transaction (filterless, high cap) as CSV
pub fn export_transactions_csv(db: &Database) -> Result<String> {
    let transactions = db.search_transactions(TransactionFilter::new(), i64::MAX, 0)?;
    transactions_to_csv(&transactions)
}

/// Build the full snapshot and gzip it
pub fn export_full_gz(db: &Database) -> Result<Vec<u8>> {
    let export = FullExport {
        exported_at: Utc::now(),
        transactions: db.search_transactions(TransactionFilter::new(), i64::MAX, 0)?,
        receipts: db.list_receipts(None)?,
        shipments: db.list_shipments(None)?,
    };

    let json = serde_json::to_vec(&export)?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    Ok(encoder.finish()?)
}
