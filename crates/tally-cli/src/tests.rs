//! CLI command tests

use std::io::Write;

use tally_core::db::{Database, TransactionFilter, TransactionInsertResult};
use tally_core::import::generate_hash;
use tally_core::models::{NewReceipt, NewTransaction, ReceiptStatus, TransactionSource, TransactionStatus};
use tempfile::NamedTempFile;

use crate::commands;

fn test_db() -> Database {
    Database::in_memory().unwrap()
}

fn seed_transaction(db: &Database, reference: &str, amount: f64) -> i64 {
    let created_at = chrono::Utc::now();
    let tx = NewTransaction {
        reference: reference.to_string(),
        created_at,
        status: TransactionStatus::Completed,
        source: TransactionSource::Manual,
        amount,
        currency: "USD".to_string(),
        customer_name: None,
        customer_email: None,
        merchant: None,
        notes: None,
        import_hash: generate_hash(&created_at, reference, amount, None),
    };
    match db.insert_transaction(&tx).unwrap() {
        TransactionInsertResult::Inserted(id) => id,
        TransactionInsertResult::Duplicate(_) => panic!("unexpected duplicate"),
    }
}

fn seed_receipt(db: &Database, amount: Option<f64>) -> i64 {
    db.create_receipt(&NewReceipt {
        filename: "r.jpg".to_string(),
        size_bytes: 10,
        amount,
        status: ReceiptStatus::Unmatched,
        ..Default::default()
    })
    .unwrap()
}

#[test]
fn import_command_loads_csv_file() {
    let db = test_db();

    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "Date,Reference,Amount,Currency,Status,Merchant,Customer Name,Customer Email").unwrap();
    writeln!(file, "2025-04-14,TRX-7845,1299.00,USD,completed,ElectroMart,,").unwrap();
    writeln!(file, "2025-04-15,TRX-7846,55.20,USD,pending,Cafe,,").unwrap();
    file.flush().unwrap();

    commands::cmd_import(&db, file.path(), "generic").unwrap();

    let count = db.count_transactions(TransactionFilter::new()).unwrap();
    assert_eq!(count, 2);

    // Re-import is idempotent
    commands::cmd_import(&db, file.path(), "generic").unwrap();
    let count = db.count_transactions(TransactionFilter::new()).unwrap();
    assert_eq!(count, 2);
}

#[test]
fn import_command_rejects_unknown_profile() {
    let db = test_db();
    let file = NamedTempFile::new().unwrap();

    assert!(commands::cmd_import(&db, file.path(), "nonexistent").is_err());
}

#[test]
fn receipts_match_and_unmatch_commands() {
    let db = test_db();
    let tx_id = seed_transaction(&db, "TRX-1", 12.5);
    let receipt_id = seed_receipt(&db, Some(12.5));

    commands::cmd_receipts_match(&db, receipt_id, tx_id).unwrap();
    let receipt = db.get_receipt(receipt_id).unwrap().unwrap();
    assert_eq!(receipt.status, ReceiptStatus::Matched);

    // Matching again fails, the transaction is taken
    let second = seed_receipt(&db, Some(12.5));
    assert!(commands::cmd_receipts_match(&db, second, tx_id).is_err());

    commands::cmd_receipts_unmatch(&db, receipt_id).unwrap();
    let receipt = db.get_receipt(receipt_id).unwrap().unwrap();
    assert_eq!(receipt.status, ReceiptStatus::Unmatched);

    // Unmatching an unmatched receipt fails
    assert!(commands::cmd_receipts_unmatch(&db, receipt_id).is_err());
}

#[test]
fn receipts_candidates_command_handles_missing_receipt() {
    let db = test_db();
    assert!(commands::cmd_receipts_candidates(&db, 404).is_err());
}

#[test]
fn export_transactions_writes_file() {
    let db = test_db();
    seed_transaction(&db, "TRX-1", 10.0);

    let out = NamedTempFile::new().unwrap();
    commands::cmd_export_transactions(&db, Some(out.path())).unwrap();

    let content = std::fs::read_to_string(out.path()).unwrap();
    assert!(content.starts_with("Date,Reference,Amount"));
    assert!(content.contains("TRX-1"));
}

#[test]
fn export_full_writes_gzip() {
    let db = test_db();
    seed_transaction(&db, "TRX-1", 10.0);

    let out = NamedTempFile::new().unwrap();
    commands::cmd_export_full(&db, out.path()).unwrap();

    let bytes = std::fs::read(out.path()).unwrap();
    // gzip magic number
    assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
}
