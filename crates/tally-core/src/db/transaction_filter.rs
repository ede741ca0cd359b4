//! Transaction filter builder for constructing dynamic SQL queries
//!
//! This module provides a builder pattern for constructing WHERE clauses
//! and related SQL components for transaction queries, shared between the
//! search and count paths so the two never drift apart.

use chrono::NaiveDate;

use crate::models::{TransactionSource, TransactionStatus};

/// Builder for constructing transaction query filters
///
/// The lifetime `'query` represents how long the filter parameters
/// (search terms, etc.) must remain valid.
#[derive(Default)]
pub struct TransactionFilter<'query> {
    pub status: Option<TransactionStatus>,
    pub source: Option<TransactionSource>,
    pub search: Option<&'query str>,
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
    pub has_receipt: Option<bool>,
    pub sort_field: Option<&'query str>,
    pub sort_order: Option<&'query str>,
}

/// Result of building a filter - contains SQL components and parameters
pub struct FilterResult {
    /// WHERE clause including "WHERE" keyword (empty if no conditions)
    pub where_clause: String,
    /// ORDER BY clause including "ORDER BY" keyword
    pub order_clause: String,
    /// Parameters for the query (boxed for rusqlite compatibility)
    pub params: Vec<Box<dyn rusqlite::ToSql>>,
}

impl<'query> TransactionFilter<'query> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: Option<TransactionStatus>) -> Self {
        self.status = status;
        self
    }

    pub fn source(mut self, source: Option<TransactionSource>) -> Self {
        self.source = source;
        self
    }

    /// Set search query (searches reference, merchant and customer fields)
    pub fn search(mut self, query: Option<&'query str>) -> Self {
        self.search = query;
        self
    }

    pub fn date_range(mut self, range: Option<(NaiveDate, NaiveDate)>) -> Self {
        self.date_range = range;
        self
    }

    pub fn amount_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_amount = min;
        self.max_amount = max;
        self
    }

    /// Filter by whether a receipt is attached
    pub fn has_receipt(mut self, value: Option<bool>) -> Self {
        self.has_receipt = value;
        self
    }

    /// Set sort field (created_at or amount)
    pub fn sort_field(mut self, field: Option<&'query str>) -> Self {
        self.sort_field = field;
        self
    }

    /// Set sort order (asc or desc)
    pub fn sort_order(mut self, order: Option<&'query str>) -> Self {
        self.sort_order = order;
        self
    }

    /// Build the filter components
    pub fn build(self) -> FilterResult {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = self.status {
            conditions.push("t.status = ?".to_string());
            params.push(Box::new(status.as_str()));
        }

        if let Some(source) = self.source {
            conditions.push("t.source = ?".to_string());
            params.push(Box::new(source.as_str()));
        }

        if let Some(q) = self.search {
            if !q.trim().is_empty() {
                conditions.push(
                    "(t.reference LIKE ? COLLATE NOCASE \
                     OR t.merchant LIKE ? COLLATE NOCASE \
                     OR t.customer_name LIKE ? COLLATE NOCASE \
                     OR t.customer_email LIKE ? COLLATE NOCASE)"
                        .to_string(),
                );
                let pattern = format!("%{}%", q.trim());
                for _ in 0..4 {
                    params.push(Box::new(pattern.clone()));
                }
            }
        }

        if let Some((from_date, to_date)) = self.date_range {
            // created_at is stored as "YYYY-MM-DD HH:MM:SS", so compare on the
            // date prefix to keep the range inclusive of the final day.
            conditions.push("date(t.created_at) >= ? AND date(t.created_at) <= ?".to_string());
            params.push(Box::new(from_date.to_string()));
            params.push(Box::new(to_date.to_string()));
        }

        if let Some(min) = self.min_amount {
            conditions.push("t.amount >= ?".to_string());
            params.push(Box::new(min));
        }

        if let Some(max) = self.max_amount {
            conditions.push("t.amount <= ?".to_string());
            params.push(Box::new(max));
        }

        match self.has_receipt {
            Some(true) => conditions.push("t.receipt_id IS NOT NULL".to_string()),
            Some(false) => conditions.push("t.receipt_id IS NULL".to_string()),
            None => {}
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let order_column = match self.sort_field {
            Some("amount") => "t.amount",
            _ => "t.created_at",
        };
        let order_dir = match self.sort_order {
            Some("asc") => "ASC",
            _ => "DESC",
        };
        let order_clause = format!("ORDER BY {} {}, t.id DESC", order_column, order_dir);

        FilterResult {
            where_clause,
            order_clause,
            params,
        }
    }
}

impl FilterResult {
    /// Build a COUNT query
    pub fn build_count_query(&self) -> String {
        format!("SELECT COUNT(*) FROM transactions t {}", self.where_clause)
    }

    /// Get parameter references for query execution
    pub fn params_refs(&self) -> Vec<&dyn rusqlite::ToSql> {
        self.params.iter().map(|p| p.as_ref()).collect()
    }

    /// Get the parameter vector to append pagination params
    pub fn into_params(self) -> Vec<Box<dyn rusqlite::ToSql>> {
        self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_has_no_where_clause() {
        let result = TransactionFilter::new().build();
        assert!(result.where_clause.is_empty());
        assert!(result.params.is_empty());
        assert!(result.order_clause.contains("t.created_at DESC"));
    }

    #[test]
    fn combined_filters_join_with_and() {
        let result = TransactionFilter::new()
            .status(Some(TransactionStatus::Completed))
            .search(Some("electro"))
            .has_receipt(Some(false))
            .build();

        assert!(result.where_clause.starts_with("WHERE "));
        assert!(result.where_clause.contains("t.status = ?"));
        assert!(result.where_clause.contains("t.receipt_id IS NULL"));
        // status + 4 search placeholders
        assert_eq!(result.params.len(), 5);
    }

    #[test]
    fn blank_search_is_ignored() {
        let result = TransactionFilter::new().search(Some("   ")).build();
        assert!(result.where_clause.is_empty());
    }

    #[test]
    fn sort_by_amount_ascending() {
        let result = TransactionFilter::new()
            .sort_field(Some("amount"))
            .sort_order(Some("asc"))
            .build();
        assert!(result.order_clause.contains("t.amount ASC"));
    }
}
