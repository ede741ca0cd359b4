//! Receipt operations

use rusqlite::{params, OptionalExtension, Row};

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::matching::{MatchCandidate, MatchEngine, AUTO_MATCH_THRESHOLD};
use crate::models::{NewReceipt, Receipt, ReceiptStats, ReceiptStatus};

/// How many unmatched transactions to consider per candidates request
const CANDIDATE_POOL_LIMIT: i64 = 500;

impl Database {
    /// Create a receipt
    pub fn create_receipt(&self, receipt: &NewReceipt) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO receipts (filename, size_bytes, file_path, amount, currency, merchant,
             receipt_date, status, content_hash, notes)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                receipt.filename,
                receipt.size_bytes,
                receipt.file_path,
                receipt.amount,
                receipt.currency,
                receipt.merchant,
                receipt.receipt_date.map(|d| d.to_string()),
                receipt.status.as_str(),
                receipt.content_hash,
                receipt.notes,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Get receipt by ID
    pub fn get_receipt(&self, id: i64) -> Result<Option<Receipt>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM receipts WHERE id = ?",
            Self::RECEIPT_COLUMNS
        ))?;

        let receipt = stmt
            .query_row(params![id], |row| Self::row_to_receipt(row))
            .optional()?;

        Ok(receipt)
    }

    /// Get receipt by content hash (for duplicate-upload rejection)
    pub fn get_receipt_by_hash(&self, content_hash: &str) -> Result<Option<Receipt>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM receipts WHERE content_hash = ?",
            Self::RECEIPT_COLUMNS
        ))?;

        let receipt = stmt
            .query_row(params![content_hash], |row| Self::row_to_receipt(row))
            .optional()?;

        Ok(receipt)
    }

    /// List receipts, optionally filtered by status, newest first
    pub fn list_receipts(&self, status: Option<ReceiptStatus>) -> Result<Vec<Receipt>> {
        let conn = self.conn()?;

        let receipts = if let Some(status) = status {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM receipts WHERE status = ? ORDER BY created_at DESC, id DESC",
                Self::RECEIPT_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![status.as_str()], |row| Self::row_to_receipt(row))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        } else {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM receipts ORDER BY created_at DESC, id DESC",
                Self::RECEIPT_COLUMNS
            ))?;
            let rows = stmt
                .query_map([], |row| Self::row_to_receipt(row))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        };

        Ok(receipts)
    }

    /// Update the extracted/editable fields of a receipt
    pub fn update_receipt(
        &self,
        id: i64,
        amount: Option<f64>,
        currency: Option<&str>,
        merchant: Option<&str>,
        receipt_date: Option<chrono::NaiveDate>,
        notes: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE receipts SET amount = ?, currency = ?, merchant = ?, receipt_date = ?, notes = ?
             WHERE id = ?",
            params![
                amount,
                currency,
                merchant,
                receipt_date.map(|d| d.to_string()),
                notes,
                id
            ],
        )?;
        Ok(())
    }

    /// Update receipt status
    pub fn update_receipt_status(&self, id: i64, status: ReceiptStatus) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE receipts SET status = ? WHERE id = ?",
            params![status.as_str(), id],
        )?;
        Ok(())
    }

    /// Link a receipt to a transaction (both sides, atomically)
    pub fn link_receipt_to_transaction(&self, receipt_id: i64, transaction_id: i64) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "UPDATE receipts SET transaction_id = ?, status = 'matched' WHERE id = ?",
            params![transaction_id, receipt_id],
        )?;
        tx.execute(
            "UPDATE transactions SET receipt_id = ? WHERE id = ?",
            params![receipt_id, transaction_id],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Unlink a receipt from its transaction (both sides, atomically)
    pub fn unlink_receipt(&self, receipt_id: i64) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "UPDATE transactions SET receipt_id = NULL WHERE receipt_id = ?",
            params![receipt_id],
        )?;
        tx.execute(
            "UPDATE receipts SET transaction_id = NULL, status = 'unmatched' WHERE id = ?",
            params![receipt_id],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Delete a receipt, releasing the transaction it was matched to
    pub fn delete_receipt(&self, id: i64) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "UPDATE transactions SET receipt_id = NULL WHERE receipt_id = ?",
            params![id],
        )?;
        tx.execute("DELETE FROM receipts WHERE id = ?", params![id])?;

        tx.commit()?;
        Ok(())
    }

    /// Receipt reconciliation statistics
    pub fn receipt_stats(&self) -> Result<ReceiptStats> {
        let conn = self.conn()?;

        let total: i64 = conn.query_row("SELECT COUNT(*) FROM receipts", [], |row| row.get(0))?;
        let matched: i64 = conn.query_row(
            "SELECT COUNT(*) FROM receipts WHERE status = 'matched'",
            [],
            |row| row.get(0),
        )?;

        let match_rate = if total > 0 {
            (matched as f64 / total as f64 * 10_000.0).round() / 100.0
        } else {
            0.0
        };

        Ok(ReceiptStats {
            total,
            matched,
            unmatched: total - matched,
            match_rate,
        })
    }

    // ========== Matching ==========

    /// Match candidates for a receipt, best first
    ///
    /// Fetches the unmatched-transaction pool and hands it to the pure
    /// matching engine; this method owns the I/O, the engine owns the
    /// scoring. Recomputed on every call - the pool changes as users edit
    /// amounts and merchants, so rankings are never cached.
    pub fn find_match_candidates(&self, receipt_id: i64) -> Result<Vec<MatchCandidate>> {
        let receipt = self
            .get_receipt(receipt_id)?
            .ok_or_else(|| Error::NotFound(format!("Receipt {} not found", receipt_id)))?;

        let pool = self.list_unmatched_transactions(CANDIDATE_POOL_LIMIT)?;
        MatchEngine::new().rank(&receipt, &pool)
    }

    /// Auto-match unmatched receipts to transactions
    ///
    /// Links a receipt only when its best candidate clears
    /// AUTO_MATCH_THRESHOLD and no runner-up ties it - ambiguous receipts
    /// stay unmatched for manual review.
    ///
    /// Returns (matched_count, receipts_checked).
    pub fn auto_match_receipts(&self) -> Result<(usize, usize)> {
        let unmatched = self.list_receipts(Some(ReceiptStatus::Unmatched))?;
        let engine = MatchEngine::new();
        let mut matched = 0;

        for receipt in &unmatched {
            // Re-fetch per receipt: each link shrinks the pool.
            let pool = self.list_unmatched_transactions(CANDIDATE_POOL_LIMIT)?;
            let candidates = engine.rank(receipt, &pool)?;

            if let Some(best) = candidates.first() {
                let ambiguous = candidates
                    .get(1)
                    .is_some_and(|second| second.confidence == best.confidence);
                if best.confidence >= AUTO_MATCH_THRESHOLD && !ambiguous {
                    self.link_receipt_to_transaction(receipt.id, best.transaction_id)?;
                    matched += 1;
                }
            }
        }

        Ok((matched, unmatched.len()))
    }

    pub(crate) const RECEIPT_COLUMNS: &'static str =
        "id, filename, size_bytes, file_path, amount, currency, merchant, receipt_date,
         status, transaction_id, content_hash, notes, created_at";

    /// Helper to convert a row to Receipt (column order per RECEIPT_COLUMNS)
    fn row_to_receipt(row: &Row) -> rusqlite::Result<Receipt> {
        let receipt_date_str: Option<String> = row.get(7)?;
        let status_str: String = row.get(8)?;
        let created_at_str: String = row.get(12)?;

        Ok(Receipt {
            id: row.get(0)?,
            filename: row.get(1)?,
            size_bytes: row.get(2)?,
            file_path: row.get(3)?,
            amount: row.get(4)?,
            currency: row.get(5)?,
            merchant: row.get(6)?,
            receipt_date: receipt_date_str
                .and_then(|s| chrono::NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
            status: status_str.parse().unwrap_or_default(),
            transaction_id: row.get(9)?,
            content_hash: row.get(10)?,
            notes: row.get(11)?,
            created_at: parse_datetime(&created_at_str),
        })
    }
}
