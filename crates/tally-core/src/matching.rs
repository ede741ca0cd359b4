//! Receipt-to-transaction matching engine
//!
//! Pure scoring over in-memory values: one receipt against one transaction
//! produces a confidence score plus human-readable reasons; one receipt
//! against a pool of transactions produces a ranked candidate list. No I/O,
//! no shared state, safe to call concurrently. Results are computed fresh
//! per request (the pool changes as users edit records, so rankings are
//! never cached).

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{Receipt, Transaction};

// Per-factor contributions. The raw caps sum to 110 (60 + 30 + 20); the
// final confidence is clamped to CONFIDENCE_MAX after summing.
const AMOUNT_EXACT: u32 = 60;
const AMOUNT_WITHIN_5_PCT: u32 = 40;
const AMOUNT_WITHIN_10_PCT: u32 = 20;
const DATE_EXACT: u32 = 30;
const DATE_NEAR: u32 = 15;
const MERCHANT_EXACT: u32 = 20;
const MERCHANT_PARTIAL: u32 = 10;

/// How many days apart a transaction can post and still earn the near-date
/// contribution.
const DATE_WINDOW_DAYS: i64 = 3;

/// Ceiling for the reported confidence.
pub const CONFIDENCE_MAX: u8 = 100;

/// Minimum confidence for linking a receipt without manual review.
pub const AUTO_MATCH_THRESHOLD: u8 = 90;

/// Score for a single receipt/transaction pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchScore {
    /// 0..=100, sum of the triggered factor contributions
    pub confidence: u8,
    /// Triggered reasons in factor order: amount, date, merchant
    pub reasons: Vec<String>,
}

/// A ranked match candidate
///
/// Built fresh per matching request and never persisted. The embedded
/// transaction is a denormalized snapshot so callers can render the
/// candidate without a second lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub transaction_id: i64,
    pub confidence: u8,
    pub reasons: Vec<String>,
    pub transaction: Transaction,
}

/// Secondary ordering applied between candidates with equal confidence.
pub type TieBreaker = fn(&MatchCandidate, &MatchCandidate) -> std::cmp::Ordering;

/// Orders equal-confidence candidates by transaction recency (newest first).
pub fn newest_first(a: &MatchCandidate, b: &MatchCandidate) -> std::cmp::Ordering {
    b.transaction.created_at.cmp(&a.transaction.created_at)
}

/// The scorer/ranker pair
///
/// The default engine has no tie-breaker: candidates with equal confidence
/// keep the relative order of the input pool (the sort is stable).
#[derive(Default)]
pub struct MatchEngine {
    tie_breaker: Option<TieBreaker>,
}

impl MatchEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// An engine that breaks confidence ties with the given comparator.
    pub fn with_tie_breaker(tie_breaker: TieBreaker) -> Self {
        Self {
            tie_breaker: Some(tie_breaker),
        }
    }

    /// Score one receipt against one transaction.
    ///
    /// Each factor applies only when the fields it needs are present:
    /// missing receipt amount/date/merchant simply contributes nothing.
    /// A receipt amount of exactly zero is treated as absent (division
    /// guard). Non-finite amounts fail fast; downstream reconciliation
    /// must not see silently coerced garbage.
    pub fn score(&self, receipt: &Receipt, transaction: &Transaction) -> Result<MatchScore> {
        if !transaction.amount.is_finite() {
            return Err(Error::InvalidData(format!(
                "transaction {} has a non-finite amount",
                transaction.id
            )));
        }
        if receipt.amount.is_some_and(|a| !a.is_finite()) {
            return Err(Error::InvalidData(format!(
                "receipt {} has a non-finite amount",
                receipt.id
            )));
        }

        let mut confidence: u32 = 0;
        let mut reasons = Vec::new();

        // Amount factor
        if let Some(receipt_amount) = receipt.amount.filter(|a| *a != 0.0) {
            let percent_diff =
                (transaction.amount - receipt_amount).abs() / receipt_amount.abs() * 100.0;
            if percent_diff < 1.0 {
                confidence += AMOUNT_EXACT;
                reasons.push("Amount matches exactly".to_string());
            } else if percent_diff < 5.0 {
                confidence += AMOUNT_WITHIN_5_PCT;
                reasons.push("Amount within 5%".to_string());
            } else if percent_diff < 10.0 {
                confidence += AMOUNT_WITHIN_10_PCT;
                reasons.push("Amount within 10%".to_string());
            }
        }

        // Date factor: both sides normalized to UTC calendar days
        if let Some(receipt_date) = receipt.receipt_date {
            let transaction_day = transaction.created_at.date_naive();
            let diff_days = (transaction_day - receipt_date).num_days().abs();
            if diff_days == 0 {
                confidence += DATE_EXACT;
                reasons.push("Date matches exactly".to_string());
            } else if diff_days <= DATE_WINDOW_DAYS {
                confidence += DATE_NEAR;
                let unit = if diff_days == 1 { "day" } else { "days" };
                reasons.push(format!("Date within {} {}", diff_days, unit));
            }
        }

        // Merchant factor
        let receipt_merchant = non_empty(receipt.merchant.as_deref());
        let transaction_merchant = non_empty(transaction.merchant.as_deref());
        if let (Some(a), Some(b)) = (receipt_merchant, transaction_merchant) {
            let a = a.to_lowercase();
            let b = b.to_lowercase();
            if a == b {
                confidence += MERCHANT_EXACT;
                reasons.push("Merchant name matches exactly".to_string());
            } else if a.contains(&b) || b.contains(&a) {
                confidence += MERCHANT_PARTIAL;
                reasons.push("Merchant name partial match".to_string());
            }
        }

        Ok(MatchScore {
            confidence: confidence.min(CONFIDENCE_MAX as u32) as u8,
            reasons,
        })
    }

    /// Rank a pool of transactions against a receipt.
    ///
    /// Returns an empty list when the receipt has no extracted amount;
    /// matching is meaningless without an amount anchor. Callers that need
    /// to distinguish "cannot compute" from "computed zero hits" check
    /// `receipt.amount` before interpreting the empty result.
    ///
    /// The pool should already exclude transactions matched to other
    /// receipts, but any transaction claimed by a different receipt is
    /// skipped here as well so an unavailable match is never proposed.
    pub fn rank(&self, receipt: &Receipt, pool: &[Transaction]) -> Result<Vec<MatchCandidate>> {
        if receipt.amount.is_none() {
            return Ok(Vec::new());
        }

        let mut candidates = Vec::new();
        for transaction in pool {
            if transaction
                .receipt_id
                .is_some_and(|receipt_id| receipt_id != receipt.id)
            {
                continue;
            }

            let score = self.score(receipt, transaction)?;
            if score.confidence == 0 {
                continue;
            }

            candidates.push(MatchCandidate {
                transaction_id: transaction.id,
                confidence: score.confidence,
                reasons: score.reasons,
                transaction: transaction.clone(),
            });
        }

        // sort_by is stable: equal-confidence candidates keep pool order
        // unless a tie-breaker is configured.
        candidates.sort_by(|a, b| {
            b.confidence.cmp(&a.confidence).then_with(|| {
                self.tie_breaker
                    .map_or(std::cmp::Ordering::Equal, |cmp| cmp(a, b))
            })
        });

        Ok(candidates)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ReceiptStatus, TransactionSource, TransactionStatus};
    use chrono::{NaiveDate, TimeZone, Utc};

    fn receipt(amount: Option<f64>, date: Option<(i32, u32, u32)>, merchant: Option<&str>) -> Receipt {
        Receipt {
            id: 1,
            filename: "receipt.pdf".to_string(),
            size_bytes: 1024,
            file_path: None,
            amount,
            currency: Some("USD".to_string()),
            merchant: merchant.map(String::from),
            receipt_date: date.map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap()),
            status: ReceiptStatus::Unmatched,
            transaction_id: None,
            content_hash: None,
            notes: None,
            created_at: Utc::now(),
        }
    }

    fn tx(id: i64, amount: f64, created_at: (i32, u32, u32), merchant: Option<&str>) -> Transaction {
        Transaction {
            id,
            reference: format!("TRX-{:04}", id),
            created_at: Utc
                .with_ymd_and_hms(created_at.0, created_at.1, created_at.2, 9, 0, 0)
                .unwrap(),
            status: TransactionStatus::Completed,
            source: TransactionSource::CreditCard,
            amount,
            currency: "USD".to_string(),
            customer_name: None,
            customer_email: None,
            merchant: merchant.map(String::from),
            receipt_id: None,
            shipment_id: None,
            notes: None,
            import_hash: format!("hash-{}", id),
        }
    }

    #[test]
    fn perfect_match_clamps_at_ceiling() {
        let engine = MatchEngine::new();
        let receipt = receipt(Some(1299.00), Some((2025, 4, 14)), Some("ElectroMart"));
        let transaction = tx(7, 1299.00, (2025, 4, 14), Some("ElectroMart"));

        let score = engine.score(&receipt, &transaction).unwrap();
        // Raw factor sum is 110 (60 + 30 + 20); reported confidence is clamped.
        assert_eq!(score.confidence, 100);
        assert_eq!(
            score.reasons,
            vec![
                "Amount matches exactly",
                "Date matches exactly",
                "Merchant name matches exactly",
            ]
        );
    }

    #[test]
    fn near_amount_and_date_without_merchant() {
        let engine = MatchEngine::new();
        let receipt = receipt(Some(100.00), Some((2025, 1, 1)), None);
        let transaction = tx(1, 107.00, (2025, 1, 3), Some("Somewhere"));

        // 7% diff -> 20, two days apart -> 15, merchant absent on one side -> 0
        let score = engine.score(&receipt, &transaction).unwrap();
        assert_eq!(score.confidence, 35);
        assert_eq!(score.reasons, vec!["Amount within 10%", "Date within 2 days"]);
    }

    #[test]
    fn amount_band_boundaries() {
        let engine = MatchEngine::new();
        let r = receipt(Some(100.00), None, None);

        // 0.99% lands in the exact band
        let score = engine.score(&r, &tx(1, 100.99, (2025, 1, 1), None)).unwrap();
        assert_eq!(score.confidence, 60);

        // exactly 5% falls through to the 10% band
        let score = engine.score(&r, &tx(2, 105.00, (2025, 1, 1), None)).unwrap();
        assert_eq!(score.confidence, 20);
        assert_eq!(score.reasons, vec!["Amount within 10%"]);

        // exactly 10% earns nothing
        let score = engine.score(&r, &tx(3, 110.00, (2025, 1, 1), None)).unwrap();
        assert_eq!(score.confidence, 0);
        assert!(score.reasons.is_empty());
    }

    #[test]
    fn singular_day_in_reason() {
        let engine = MatchEngine::new();
        let receipt = receipt(Some(50.00), Some((2025, 3, 10)), None);
        let transaction = tx(1, 50.00, (2025, 3, 11), None);

        let score = engine.score(&receipt, &transaction).unwrap();
        assert!(score.reasons.contains(&"Date within 1 day".to_string()));
    }

    #[test]
    fn far_apart_scores_zero() {
        let engine = MatchEngine::new();
        let receipt = receipt(Some(50.00), None, None);
        let transaction = tx(1, 200.00, (2025, 1, 1), None);

        // 300% amount diff, no date or merchant on the receipt
        let score = engine.score(&receipt, &transaction).unwrap();
        assert_eq!(score.confidence, 0);
        assert!(score.reasons.is_empty());
    }

    #[test]
    fn zero_receipt_amount_skips_amount_factor() {
        let engine = MatchEngine::new();
        let receipt = receipt(Some(0.0), Some((2025, 1, 1)), Some("Cafe"));
        let transaction = tx(1, 12.50, (2025, 1, 1), Some("Cafe"));

        // No division by zero, no infinity; date and merchant still count.
        let score = engine.score(&receipt, &transaction).unwrap();
        assert_eq!(score.confidence, 50);
        assert_eq!(
            score.reasons,
            vec!["Date matches exactly", "Merchant name matches exactly"]
        );
    }

    #[test]
    fn merchant_partial_match_either_direction() {
        let engine = MatchEngine::new();
        let receipt = receipt(Some(10.0), None, Some("Starbucks"));
        let transaction = tx(1, 10.0, (2025, 1, 1), Some("STARBUCKS #1234"));

        let score = engine.score(&receipt, &transaction).unwrap();
        assert!(score
            .reasons
            .contains(&"Merchant name partial match".to_string()));
        assert_eq!(score.confidence, 70);
    }

    #[test]
    fn non_finite_amount_fails_fast() {
        let engine = MatchEngine::new();
        let receipt = receipt(Some(10.0), None, None);
        let transaction = tx(1, f64::NAN, (2025, 1, 1), None);

        assert!(matches!(
            engine.score(&receipt, &transaction),
            Err(Error::InvalidData(_))
        ));
    }

    #[test]
    fn rank_without_amount_is_empty() {
        let engine = MatchEngine::new();
        let receipt = receipt(None, Some((2025, 1, 1)), Some("ElectroMart"));
        let pool = vec![
            tx(1, 10.0, (2025, 1, 1), Some("ElectroMart")),
            tx(2, 20.0, (2025, 1, 1), Some("ElectroMart")),
        ];

        assert!(engine.rank(&receipt, &pool).unwrap().is_empty());
    }

    #[test]
    fn rank_drops_zero_confidence() {
        let engine = MatchEngine::new();
        let receipt = receipt(Some(50.00), None, None);
        let pool = vec![
            tx(1, 200.00, (2025, 1, 1), None), // 300% off -> 0
            tx(2, 50.00, (2025, 1, 1), None),  // exact -> 60
        ];

        let ranked = engine.rank(&receipt, &pool).unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].transaction_id, 2);
        assert!(ranked.iter().all(|c| c.confidence > 0));
    }

    #[test]
    fn rank_sorts_descending_and_keeps_pool_order_on_ties() {
        let engine = MatchEngine::new();
        let receipt = receipt(Some(100.00), Some((2025, 1, 1)), None);
        let pool = vec![
            tx(1, 104.00, (2025, 6, 1), None), // 40
            tx(2, 100.00, (2025, 1, 1), None), // 60 + 30 = 90
            tx(3, 104.00, (2025, 7, 1), None), // 40, ties with tx 1
        ];

        let ranked = engine.rank(&receipt, &pool).unwrap();
        let ids: Vec<i64> = ranked.iter().map(|c| c.transaction_id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[test]
    fn tie_breaker_reorders_equal_confidence() {
        let engine = MatchEngine::with_tie_breaker(newest_first);
        let receipt = receipt(Some(100.00), None, None);
        let pool = vec![
            tx(1, 104.00, (2025, 6, 1), None),
            tx(2, 104.00, (2025, 7, 1), None), // newer, same confidence
        ];

        let ranked = engine.rank(&receipt, &pool).unwrap();
        let ids: Vec<i64> = ranked.iter().map(|c| c.transaction_id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn rank_skips_transactions_claimed_by_other_receipts() {
        let engine = MatchEngine::new();
        let receipt = receipt(Some(100.00), None, None);
        let mut claimed = tx(1, 100.00, (2025, 1, 1), None);
        claimed.receipt_id = Some(99);
        let mut own = tx(2, 100.00, (2025, 1, 1), None);
        own.receipt_id = Some(receipt.id);
        let pool = vec![claimed, own, tx(3, 100.00, (2025, 1, 1), None)];

        let ranked = engine.rank(&receipt, &pool).unwrap();
        let ids: Vec<i64> = ranked.iter().map(|c| c.transaction_id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn candidate_snapshot_carries_transaction_fields() {
        let engine = MatchEngine::new();
        let receipt = receipt(Some(100.00), None, None);
        let pool = vec![tx(4, 100.00, (2025, 1, 1), Some("ElectroMart"))];

        let ranked = engine.rank(&receipt, &pool).unwrap();
        assert_eq!(ranked[0].transaction.reference, "TRX-0004");
        assert_eq!(ranked[0].transaction.merchant.as_deref(), Some("ElectroMart"));
    }
}
