//! Transaction operations

use rusqlite::{params, OptionalExtension, Row};

use super::transaction_filter::TransactionFilter;
use super::{format_datetime, parse_datetime, Database};
use crate::error::Result;
use crate::models::{
    NewTransaction, StatusBreakdown, Transaction, TransactionStats, TransactionStatus,
};

/// Result of inserting a transaction
#[derive(Debug, Clone)]
pub enum TransactionInsertResult {
    /// Transaction was inserted successfully, contains new transaction ID
    Inserted(i64),
    /// Transaction was a duplicate, contains existing transaction ID
    Duplicate(i64),
}

impl Database {
    /// Insert a transaction, skipping duplicates based on import_hash
    pub fn insert_transaction(&self, tx: &NewTransaction) -> Result<TransactionInsertResult> {
        let conn = self.conn()?;

        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM transactions WHERE import_hash = ?",
                params![tx.import_hash],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(existing_id) = existing {
            return Ok(TransactionInsertResult::Duplicate(existing_id));
        }

        conn.execute(
            r#"
            INSERT INTO transactions (reference, created_at, status, source, amount, currency,
                customer_name, customer_email, merchant, notes, import_hash)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                tx.reference,
                format_datetime(tx.created_at),
                tx.status.as_str(),
                tx.source.as_str(),
                tx.amount,
                tx.currency,
                tx.customer_name,
                tx.customer_email,
                tx.merchant,
                tx.notes,
                tx.import_hash,
            ],
        )?;

        Ok(TransactionInsertResult::Inserted(conn.last_insert_rowid()))
    }

    /// Get transaction by ID
    pub fn get_transaction(&self, id: i64) -> Result<Option<Transaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM transactions t WHERE t.id = ?",
            Self::TRANSACTION_COLUMNS
        ))?;

        let transaction = stmt
            .query_row(params![id], |row| Self::row_to_transaction(row))
            .optional()?;

        Ok(transaction)
    }

    /// Search transactions with a filter, paginated
    pub fn search_transactions(
        &self,
        filter: TransactionFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let result = filter.build();

        let sql = format!(
            "SELECT {} FROM transactions t {} {} LIMIT ? OFFSET ?",
            Self::TRANSACTION_COLUMNS,
            result.where_clause,
            result.order_clause
        );

        let mut bound = result.into_params();
        bound.push(Box::new(limit));
        bound.push(Box::new(offset));
        let refs: Vec<&dyn rusqlite::ToSql> = bound.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let transactions = stmt
            .query_map(refs.as_slice(), |row| Self::row_to_transaction(row))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(transactions)
    }

    /// Count transactions matching a filter
    pub fn count_transactions(&self, filter: TransactionFilter) -> Result<i64> {
        let conn = self.conn()?;
        let result = filter.build();

        let count = conn.query_row(
            &result.build_count_query(),
            result.params_refs().as_slice(),
            |row| row.get(0),
        )?;

        Ok(count)
    }

    /// Transactions with no receipt attached, newest first
    ///
    /// This is the candidate pool for the matching engine. Capped so a huge
    /// ledger does not turn every candidates request into a full scan.
    pub fn list_unmatched_transactions(&self, limit: i64) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM transactions t
             WHERE t.receipt_id IS NULL
             ORDER BY t.created_at DESC, t.id DESC
             LIMIT ?",
            Self::TRANSACTION_COLUMNS
        ))?;

        let transactions = stmt
            .query_map(params![limit], |row| Self::row_to_transaction(row))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(transactions)
    }

    /// Update the editable fields of a transaction
    pub fn update_transaction(
        &self,
        id: i64,
        merchant: Option<&str>,
        customer_name: Option<&str>,
        customer_email: Option<&str>,
        notes: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE transactions SET merchant = ?, customer_name = ?, customer_email = ?, notes = ?
             WHERE id = ?",
            params![merchant, customer_name, customer_email, notes, id],
        )?;
        Ok(())
    }

    /// Update transaction status
    pub fn update_transaction_status(&self, id: i64, status: TransactionStatus) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE transactions SET status = ? WHERE id = ?",
            params![status.as_str(), id],
        )?;
        Ok(())
    }

    /// Delete a transaction and release any attached receipt
    pub fn delete_transaction(&self, id: i64) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "UPDATE receipts SET transaction_id = NULL, status = 'unmatched' WHERE transaction_id = ?",
            params![id],
        )?;
        tx.execute(
            "UPDATE shipments SET transaction_id = NULL WHERE transaction_id = ?",
            params![id],
        )?;
        tx.execute("DELETE FROM transactions WHERE id = ?", params![id])?;

        tx.commit()?;
        Ok(())
    }

    /// Aggregate transaction statistics
    pub fn transaction_stats(&self) -> Result<TransactionStats> {
        let conn = self.conn()?;

        let mut stmt =
            conn.prepare("SELECT status, COUNT(*), COALESCE(SUM(amount), 0) FROM transactions GROUP BY status")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, f64>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut stats = TransactionStats {
            total: StatusBreakdown::default(),
            completed: StatusBreakdown::default(),
            pending: StatusBreakdown::default(),
            processing: StatusBreakdown::default(),
            failed: StatusBreakdown::default(),
            avg_amount: 0.0,
            receipt_match_rate: 0.0,
        };

        for (status, count, amount) in rows {
            stats.total.count += count;
            stats.total.amount += amount;
            match status.parse::<TransactionStatus>() {
                Ok(TransactionStatus::Completed) => {
                    stats.completed = StatusBreakdown { count, amount }
                }
                Ok(TransactionStatus::Pending) => stats.pending = StatusBreakdown { count, amount },
                Ok(TransactionStatus::Processing) => {
                    stats.processing = StatusBreakdown { count, amount }
                }
                Ok(TransactionStatus::Failed) => stats.failed = StatusBreakdown { count, amount },
                _ => {}
            }
        }

        if stats.total.count > 0 {
            stats.avg_amount = stats.total.amount / stats.total.count as f64;

            let with_receipt: i64 = conn.query_row(
                "SELECT COUNT(*) FROM transactions WHERE receipt_id IS NOT NULL",
                [],
                |row| row.get(0),
            )?;
            stats.receipt_match_rate =
                (with_receipt as f64 / stats.total.count as f64 * 10_000.0).round() / 100.0;
        }

        Ok(stats)
    }

    pub(crate) const TRANSACTION_COLUMNS: &'static str =
        "t.id, t.reference, t.created_at, t.status, t.source, t.amount, t.currency,
         t.customer_name, t.customer_email, t.merchant, t.receipt_id, t.shipment_id,
         t.notes, t.import_hash";

    /// Helper to convert a row to Transaction (column order per TRANSACTION_COLUMNS)
    pub(crate) fn row_to_transaction(row: &Row) -> rusqlite::Result<Transaction> {
        let created_at_str: String = row.get(2)?;
        let status_str: String = row.get(3)?;
        let source_str: String = row.get(4)?;

        Ok(Transaction {
            id: row.get(0)?,
            reference: row.get(1)?,
            created_at: parse_datetime(&created_at_str),
            status: status_str.parse().unwrap_or_default(),
            source: source_str.parse().unwrap_or_default(),
            amount: row.get(5)?,
            currency: row.get(6)?,
            customer_name: row.get(7)?,
            customer_email: row.get(8)?,
            merchant: row.get(9)?,
            receipt_id: row.get(10)?,
            shipment_id: row.get(11)?,
            notes: row.get(12)?,
            import_hash: row.get::<_, Option<String>>(13)?.unwrap_or_default(),
        })
    }
}
