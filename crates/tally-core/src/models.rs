//! Domain models for Tally

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Transaction status through its settlement lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
    Refunded,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
            Self::Cancelled => "cancelled",
        }
    }

    /// All statuses, in lifecycle order. Used for stats breakdowns.
    pub fn all() -> [TransactionStatus; 6] {
        [
            Self::Pending,
            Self::Processing,
            Self::Completed,
            Self::Failed,
            Self::Refunded,
            Self::Cancelled,
        ]
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "refunded" => Ok(Self::Refunded),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            _ => Err(format!("Unknown transaction status: {}", s)),
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Transaction source - where the record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransactionSource {
    /// Pulled from the credit card provider feed
    CreditCard,
    /// Pulled from the payment gateway feed
    PaymentGateway,
    /// Overseas/settlement partner records
    Overseas,
    /// Manually entered or CSV import
    #[default]
    Manual,
    Other,
}

impl TransactionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreditCard => "credit_card",
            Self::PaymentGateway => "payment_gateway",
            Self::Overseas => "overseas",
            Self::Manual => "manual",
            Self::Other => "other",
        }
    }
}

impl std::str::FromStr for TransactionSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "credit_card" | "creditcard" => Ok(Self::CreditCard),
            "payment_gateway" | "gateway" => Ok(Self::PaymentGateway),
            "overseas" => Ok(Self::Overseas),
            "manual" => Ok(Self::Manual),
            "other" => Ok(Self::Other),
            _ => Err(format!("Unknown transaction source: {}", s)),
        }
    }
}

impl std::fmt::Display for TransactionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A financial transaction to be reconciled against receipts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    /// External reference (processor/gateway id, bank reference)
    pub reference: String,
    /// When the transaction was created at the source
    pub created_at: DateTime<Utc>,
    pub status: TransactionStatus,
    pub source: TransactionSource,
    pub amount: f64,
    pub currency: String,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub merchant: Option<String>,
    /// Receipt attached to this transaction (None = still unmatched)
    pub receipt_id: Option<i64>,
    /// Shipment linked to this transaction
    pub shipment_id: Option<i64>,
    pub notes: Option<String>,
    /// SHA-256 over the identifying fields, used for import deduplication
    pub import_hash: String,
}

/// A new transaction before DB insertion
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub reference: String,
    pub created_at: DateTime<Utc>,
    pub status: TransactionStatus,
    pub source: TransactionSource,
    pub amount: f64,
    pub currency: String,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub merchant: Option<String>,
    pub notes: Option<String>,
    pub import_hash: String,
}

/// Receipt status for the reconciliation workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    /// Waiting for a matching transaction
    #[default]
    Unmatched,
    /// Linked to a transaction
    Matched,
    /// Upload accepted, extraction still running
    Processing,
    /// Extraction or processing failed
    Error,
}

impl ReceiptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unmatched => "unmatched",
            Self::Matched => "matched",
            Self::Processing => "processing",
            Self::Error => "error",
        }
    }
}

impl std::str::FromStr for ReceiptStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "unmatched" => Ok(Self::Unmatched),
            "matched" => Ok(Self::Matched),
            "processing" => Ok(Self::Processing),
            "error" => Ok(Self::Error),
            _ => Err(format!("Unknown receipt status: {}", s)),
        }
    }
}

impl std::fmt::Display for ReceiptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An uploaded proof-of-purchase document
///
/// Amount, merchant and date are extracted after upload and may be absent;
/// the matching engine treats missing fields as "factor does not apply".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub id: i64,
    /// Original filename of the uploaded file
    pub filename: String,
    pub size_bytes: i64,
    /// Path to the stored file
    pub file_path: Option<String>,
    /// Extracted total (None until extraction completes)
    pub amount: Option<f64>,
    pub currency: Option<String>,
    /// Extracted merchant name
    pub merchant: Option<String>,
    /// Extracted purchase date
    pub receipt_date: Option<NaiveDate>,
    pub status: ReceiptStatus,
    /// Transaction this receipt is matched to (None = unmatched)
    pub transaction_id: Option<i64>,
    /// SHA-256 of the file content, for duplicate-upload rejection
    pub content_hash: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A new receipt for creation
#[derive(Debug, Clone, Default)]
pub struct NewReceipt {
    pub filename: String,
    pub size_bytes: i64,
    pub file_path: Option<String>,
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub merchant: Option<String>,
    pub receipt_date: Option<NaiveDate>,
    pub status: ReceiptStatus,
    pub content_hash: Option<String>,
    pub notes: Option<String>,
}

/// Shipment carrier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Carrier {
    Ups,
    Fedex,
    Usps,
    Dhl,
    #[default]
    Other,
}

impl Carrier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ups => "ups",
            Self::Fedex => "fedex",
            Self::Usps => "usps",
            Self::Dhl => "dhl",
            Self::Other => "other",
        }
    }

    /// Infer the carrier from the tracking number format.
    ///
    /// UPS: "1Z" prefix. USPS: 20-22 digits starting with 9. FedEx: 12 or 15
    /// digits. DHL: 10 digits. Anything else maps to Other.
    pub fn infer(tracking_number: &str) -> Carrier {
        static UPS: OnceLock<Regex> = OnceLock::new();
        static USPS: OnceLock<Regex> = OnceLock::new();
        static FEDEX: OnceLock<Regex> = OnceLock::new();
        static DHL: OnceLock<Regex> = OnceLock::new();

        let tracking = tracking_number.trim();
        let ups = UPS.get_or_init(|| Regex::new(r"^1Z[0-9A-Z]{16}$").unwrap());
        let usps = USPS.get_or_init(|| Regex::new(r"^9[0-9]{19,21}$").unwrap());
        let fedex = FEDEX.get_or_init(|| Regex::new(r"^([0-9]{12}|[0-9]{15})$").unwrap());
        let dhl = DHL.get_or_init(|| Regex::new(r"^[0-9]{10}$").unwrap());

        if ups.is_match(tracking) {
            Carrier::Ups
        } else if usps.is_match(tracking) {
            Carrier::Usps
        } else if fedex.is_match(tracking) {
            Carrier::Fedex
        } else if dhl.is_match(tracking) {
            Carrier::Dhl
        } else {
            Carrier::Other
        }
    }
}

impl std::str::FromStr for Carrier {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ups" => Ok(Self::Ups),
            "fedex" => Ok(Self::Fedex),
            "usps" => Ok(Self::Usps),
            "dhl" => Ok(Self::Dhl),
            "other" => Ok(Self::Other),
            _ => Err(format!("Unknown carrier: {}", s)),
        }
    }
}

impl std::fmt::Display for Carrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Shipment delivery status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    #[default]
    Pending,
    InTransit,
    Delivered,
    Returned,
}

impl ShipmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InTransit => "in_transit",
            Self::Delivered => "delivered",
            Self::Returned => "returned",
        }
    }
}

impl std::str::FromStr for ShipmentStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "in_transit" | "intransit" => Ok(Self::InTransit),
            "delivered" => Ok(Self::Delivered),
            "returned" => Ok(Self::Returned),
            _ => Err(format!("Unknown shipment status: {}", s)),
        }
    }
}

impl std::fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A shipment attached to a transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shipment {
    pub id: i64,
    pub transaction_id: Option<i64>,
    pub tracking_number: String,
    pub carrier: Carrier,
    pub status: ShipmentStatus,
    pub estimated_delivery: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

/// A new shipment for creation
#[derive(Debug, Clone, Default)]
pub struct NewShipment {
    pub transaction_id: Option<i64>,
    pub tracking_number: String,
    /// Inferred from the tracking number when not supplied
    pub carrier: Option<Carrier>,
    pub status: ShipmentStatus,
    pub estimated_delivery: Option<NaiveDate>,
}

/// A status/location event in a shipment's timeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub id: i64,
    pub shipment_id: i64,
    pub status: ShipmentStatus,
    pub description: Option<String>,
    pub location: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Receipt reconciliation statistics
#[derive(Debug, Clone, Serialize)]
pub struct ReceiptStats {
    pub total: i64,
    pub matched: i64,
    pub unmatched: i64,
    /// Percentage of receipts matched to a transaction, rounded to 2 decimals
    pub match_rate: f64,
}

/// Count and amount for one status bucket
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusBreakdown {
    pub count: i64,
    pub amount: f64,
}

/// Transaction statistics
#[derive(Debug, Clone, Serialize)]
pub struct TransactionStats {
    pub total: StatusBreakdown,
    pub completed: StatusBreakdown,
    pub pending: StatusBreakdown,
    pub processing: StatusBreakdown,
    pub failed: StatusBreakdown,
    pub avg_amount: f64,
    /// Percentage of transactions with an attached receipt
    pub receipt_match_rate: f64,
}

/// Shipment statistics by status
#[derive(Debug, Clone, Serialize)]
pub struct ShipmentStats {
    pub total: i64,
    pub pending: i64,
    pub in_transit: i64,
    pub delivered: i64,
    pub returned: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips() {
        for status in TransactionStatus::all() {
            assert_eq!(status.as_str().parse::<TransactionStatus>(), Ok(status));
        }
        for status in [
            ReceiptStatus::Unmatched,
            ReceiptStatus::Matched,
            ReceiptStatus::Processing,
            ReceiptStatus::Error,
        ] {
            assert_eq!(status.as_str().parse::<ReceiptStatus>(), Ok(status));
        }
    }

    #[test]
    fn carrier_inference() {
        assert_eq!(Carrier::infer("1Z999AA10123456784"), Carrier::Ups);
        assert_eq!(Carrier::infer("9400110200881234567890"), Carrier::Usps);
        assert_eq!(Carrier::infer("123456789012"), Carrier::Fedex);
        assert_eq!(Carrier::infer("1234567890"), Carrier::Dhl);
        assert_eq!(Carrier::infer("not-a-tracking-number"), Carrier::Other);
    }
}
