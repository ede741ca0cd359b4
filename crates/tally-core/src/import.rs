//! CSV import with column-mapping profiles
//!
//! Processors and banks all export slightly different CSV shapes, so the
//! import path is driven by a profile: which column holds the date, the
//! amount, the merchant, and so on. Profiles are TOML-definable; a built-in
//! generic profile covers the common `Date,Reference,Amount,...` shape.

use std::io::Read;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use csv::ReaderBuilder;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::db::{Database, TransactionInsertResult};
use crate::error::{Error, Result};
use crate::models::{NewTransaction, TransactionSource, TransactionStatus};

/// Column mapping for one CSV shape
#[derive(Debug, Clone, Deserialize)]
pub struct ImportProfile {
    pub name: String,
    /// Column holding the transaction date
    pub date_column: String,
    /// chrono format string for the date column
    #[serde(default = "default_date_format")]
    pub date_format: String,
    /// Column holding the external reference (optional; a hash of the row
    /// identity is used when absent)
    #[serde(default)]
    pub reference_column: Option<String>,
    /// Column holding the amount
    pub amount_column: String,
    #[serde(default)]
    pub merchant_column: Option<String>,
    #[serde(default)]
    pub customer_name_column: Option<String>,
    #[serde(default)]
    pub customer_email_column: Option<String>,
    #[serde(default)]
    pub currency_column: Option<String>,
    #[serde(default = "default_currency")]
    pub default_currency: String,
    #[serde(default)]
    pub status_column: Option<String>,
    /// Source recorded on imported rows
    #[serde(default)]
    pub source: TransactionSource,
}

fn default_date_format() -> String {
    "%Y-%m-%d".to_string()
}

fn default_currency() -> String {
    "USD".to_string()
}

impl ImportProfile {
    /// Built-in profile for the generic export shape:
    /// `Date,Reference,Amount,Currency,Status,Merchant,Customer Name,Customer Email`
    pub fn generic() -> Self {
        Self {
            name: "generic".to_string(),
            date_column: "Date".to_string(),
            date_format: default_date_format(),
            reference_column: Some("Reference".to_string()),
            amount_column: "Amount".to_string(),
            merchant_column: Some("Merchant".to_string()),
            customer_name_column: Some("Customer Name".to_string()),
            customer_email_column: Some("Customer Email".to_string()),
            currency_column: Some("Currency".to_string()),
            default_currency: default_currency(),
            status_column: Some("Status".to_string()),
            source: TransactionSource::Manual,
        }
    }

    /// Parse a profile from TOML
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Import(format!("Invalid import profile: {}", e)))
    }

    /// Resolve a profile by name: "generic" or a path to a TOML file
    pub fn resolve(name_or_path: &str) -> Result<Self> {
        if name_or_path == "generic" {
            return Ok(Self::generic());
        }
        let path = std::path::Path::new(name_or_path);
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            return Self::from_toml(&content);
        }
        Err(Error::UnknownProfile(name_or_path.to_string()))
    }
}

/// A row that failed to parse
#[derive(Debug, Clone, serde::Serialize)]
pub struct RowError {
    /// 1-based CSV line (header is line 1)
    pub line: usize,
    pub message: String,
}

/// Parsed CSV, with row-level failures collected rather than aborting
#[derive(Debug)]
pub struct ParsedImport {
    pub transactions: Vec<NewTransaction>,
    pub failed: Vec<RowError>,
}

/// Outcome of importing parsed rows into the database
#[derive(Debug, Clone, serde::Serialize)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped_duplicates: usize,
    pub failed: Vec<RowError>,
}

/// Generate the deduplication hash for a transaction row
pub fn generate_hash(
    date: &DateTime<Utc>,
    reference: &str,
    amount: f64,
    merchant: Option<&str>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(date.to_rfc3339().as_bytes());
    hasher.update(reference.as_bytes());
    hasher.update(amount.to_be_bytes());
    if let Some(merchant) = merchant {
        hasher.update(merchant.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Parse CSV data into transactions using a mapping profile
pub fn parse_csv<R: Read>(reader: R, profile: &ImportProfile) -> Result<ParsedImport> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let column = |name: &str| -> Option<usize> { headers.iter().position(|h| h.trim() == name) };

    let date_idx = column(&profile.date_column)
        .ok_or_else(|| Error::Import(format!("Missing column: {}", profile.date_column)))?;
    let amount_idx = column(&profile.amount_column)
        .ok_or_else(|| Error::Import(format!("Missing column: {}", profile.amount_column)))?;
    let reference_idx = profile.reference_column.as_deref().and_then(column);
    let merchant_idx = profile.merchant_column.as_deref().and_then(column);
    let customer_name_idx = profile.customer_name_column.as_deref().and_then(column);
    let customer_email_idx = profile.customer_email_column.as_deref().and_then(column);
    let currency_idx = profile.currency_column.as_deref().and_then(column);
    let status_idx = profile.status_column.as_deref().and_then(column);

    let mut transactions = Vec::new();
    let mut failed = Vec::new();

    for (i, result) in rdr.records().enumerate() {
        let line = i + 2; // 1-based, after the header
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                failed.push(RowError {
                    line,
                    message: e.to_string(),
                });
                continue;
            }
        };

        let field = |idx: Option<usize>| -> Option<String> {
            idx.and_then(|i| record.get(i))
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(String::from)
        };

        let outcome = (|| -> std::result::Result<NewTransaction, String> {
            let date_str = field(Some(date_idx)).ok_or("missing date")?;
            let created_at = parse_date(&date_str, &profile.date_format)?;

            let amount_str = field(Some(amount_idx)).ok_or("missing amount")?;
            let amount = parse_amount(&amount_str)?;

            let merchant = field(merchant_idx);
            let reference = field(reference_idx).unwrap_or_else(|| {
                // No reference column: derive a stable one from row identity
                format!("import-{}", &generate_hash(&created_at, "", amount, merchant.as_deref())[..12])
            });

            let status = field(status_idx)
                .and_then(|s| TransactionStatus::from_str(&s).ok())
                .unwrap_or(TransactionStatus::Completed);

            let import_hash = generate_hash(&created_at, &reference, amount, merchant.as_deref());

            Ok(NewTransaction {
                reference,
                created_at,
                status,
                source: profile.source,
                amount,
                currency: field(currency_idx).unwrap_or_else(|| profile.default_currency.clone()),
                customer_name: field(customer_name_idx),
                customer_email: field(customer_email_idx),
                merchant,
                notes: None,
                import_hash,
            })
        })();

        match outcome {
            Ok(tx) => transactions.push(tx),
            Err(message) => failed.push(RowError { line, message }),
        }
    }

    debug!(
        rows = transactions.len(),
        failed = failed.len(),
        profile = %profile.name,
        "Parsed CSV import"
    );

    Ok(ParsedImport {
        transactions,
        failed,
    })
}

/// Parse a date cell: profile format first, then as datetime, then RFC 3339
fn parse_date(value: &str, format: &str) -> std::result::Result<DateTime<Utc>, String> {
    if let Ok(date) = NaiveDate::parse_from_str(value, format) {
        return Ok(date.and_hms_opt(0, 0, 0).unwrap().and_utc());
    }
    if let Ok(datetime) = NaiveDateTime::parse_from_str(value, format) {
        return Ok(datetime.and_utc());
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(value) {
        return Ok(datetime.with_timezone(&Utc));
    }
    Err(format!("unparseable date '{}'", value))
}

/// Parse an amount cell, tolerating currency symbols, thousands separators,
/// and accounting-style parentheses for negatives
fn parse_amount(value: &str) -> std::result::Result<f64, String> {
    let trimmed = value.trim();
    let negative = trimmed.starts_with('(') && trimmed.ends_with(')');
    let cleaned: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();

    let amount: f64 = cleaned
        .parse()
        .map_err(|_| format!("non-numeric amount '{}'", value))?;

    Ok(if negative { -amount } else { amount })
}

/// Insert parsed transactions, skipping duplicates by import hash
pub fn import_transactions(db: &Database, parsed: ParsedImport) -> Result<ImportReport> {
    let mut imported = 0;
    let mut skipped_duplicates = 0;

    for tx in &parsed.transactions {
        match db.insert_transaction(tx)? {
            TransactionInsertResult::Inserted(_) => imported += 1,
            TransactionInsertResult::Duplicate(_) => skipped_duplicates += 1,
        }
    }

    Ok(ImportReport {
        imported,
        skipped_duplicates,
        failed: parsed.failed,
    })
}

/// Parse and import in one step
pub fn run_import<R: Read>(
    db: &Database,
    reader: R,
    profile: &ImportProfile,
) -> Result<ImportReport> {
    let parsed = parse_csv(reader, profile)?;
    import_transactions(db, parsed)
}
