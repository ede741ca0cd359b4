//! Transaction handlers

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{user_identity, AppError, AppState, SuccessResponse, MAX_PAGE_LIMIT};
use tally_core::db::{TransactionFilter, TransactionInsertResult};
use tally_core::import::generate_hash;
use tally_core::models::{
    NewTransaction, Transaction, TransactionSource, TransactionStats, TransactionStatus,
};

/// Query parameters for listing transactions
#[derive(Debug, Deserialize)]
pub struct TransactionQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    /// Filter by status (pending, processing, completed, failed, refunded, cancelled)
    pub status: Option<String>,
    /// Filter by source (credit_card, payment_gateway, overseas, manual, other)
    pub source: Option<String>,
    /// Search query (filters reference, merchant, customer name/email)
    pub search: Option<String>,
    /// Custom start date (YYYY-MM-DD)
    pub from: Option<String>,
    /// Custom end date (YYYY-MM-DD)
    pub to: Option<String>,
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
    /// Filter by whether a receipt is attached
    pub has_receipt: Option<bool>,
    /// Sort field (created_at or amount)
    pub sort: Option<String>,
    /// Sort direction (asc or desc)
    pub order: Option<String>,
}

fn default_limit() -> i64 {
    50
}

#[derive(Serialize)]
pub struct TransactionResponse {
    pub transactions: Vec<Transaction>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

fn parse_date_param(value: &str, name: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| AppError::bad_request(&format!("Invalid {} date (use YYYY-MM-DD)", name)))
}

fn build_filter<'q>(params: &'q TransactionQuery) -> Result<TransactionFilter<'q>, AppError> {
    let status = params
        .status
        .as_deref()
        .map(TransactionStatus::from_str)
        .transpose()
        .map_err(|_| {
            AppError::bad_request(
                "Invalid status. Use: pending, processing, completed, failed, refunded, cancelled",
            )
        })?;

    let source = params
        .source
        .as_deref()
        .map(TransactionSource::from_str)
        .transpose()
        .map_err(|_| {
            AppError::bad_request(
                "Invalid source. Use: credit_card, payment_gateway, overseas, manual, other",
            )
        })?;

    let date_range = match (params.from.as_deref(), params.to.as_deref()) {
        (Some(from), Some(to)) => Some((
            parse_date_param(from, "from")?,
            parse_date_param(to, "to")?,
        )),
        (None, None) => None,
        _ => {
            return Err(AppError::bad_request(
                "Provide both from and to dates, or neither",
            ))
        }
    };

    Ok(TransactionFilter::new()
        .status(status)
        .source(source)
        .search(params.search.as_deref())
        .date_range(date_range)
        .amount_range(params.min_amount, params.max_amount)
        .has_receipt(params.has_receipt)
        .sort_field(params.sort.as_deref())
        .sort_order(params.order.as_deref()))
}

/// GET /api/transactions - List transactions
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TransactionQuery>,
    request: Request,
) -> Result<Json<TransactionResponse>, AppError> {
    let user_email = user_identity(&request);

    // Input validation: clamp pagination parameters
    let limit = params.limit.clamp(1, MAX_PAGE_LIMIT);
    let offset = params.offset.max(0);

    let transactions = state.db.search_transactions(build_filter(&params)?, limit, offset)?;
    let total = state.db.count_transactions(build_filter(&params)?)?;

    state.db.log_audit(
        &user_email,
        "list",
        Some("transaction"),
        None,
        Some(&format!(
            "limit={}, offset={}, status={:?}, search={:?}, returned={}",
            limit,
            offset,
            params.status,
            params.search,
            transactions.len()
        )),
    )?;

    Ok(Json(TransactionResponse {
        transactions,
        total,
        limit,
        offset,
    }))
}

/// Request body for creating a transaction manually
#[derive(Debug, Deserialize)]
pub struct CreateTransactionRequest {
    pub reference: String,
    pub amount: f64,
    #[serde(default)]
    pub currency: Option<String>,
    /// Defaults to now when omitted
    #[serde(default)]
    pub created_at: Option<chrono::DateTime<Utc>>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub merchant: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// POST /api/transactions - Create a transaction manually
pub async fn create_transaction(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<Transaction>, AppError> {
    let user_email = user_identity(&request);

    let bytes = axum::body::to_bytes(request.into_body(), 64 * 1024)
        .await
        .map_err(|_| AppError::bad_request("Invalid request body"))?;
    let body: CreateTransactionRequest =
        serde_json::from_slice(&bytes).map_err(|_| AppError::bad_request("Invalid JSON"))?;

    if body.reference.trim().is_empty() {
        return Err(AppError::bad_request("Reference must not be empty"));
    }
    if !body.amount.is_finite() {
        return Err(AppError::bad_request("Amount must be a finite number"));
    }

    let status = body
        .status
        .as_deref()
        .map(TransactionStatus::from_str)
        .transpose()
        .map_err(|e| AppError::bad_request(&e))?
        .unwrap_or(TransactionStatus::Completed);
    let source = body
        .source
        .as_deref()
        .map(TransactionSource::from_str)
        .transpose()
        .map_err(|e| AppError::bad_request(&e))?
        .unwrap_or(TransactionSource::Manual);

    let created_at = body.created_at.unwrap_or_else(Utc::now);
    let import_hash = generate_hash(
        &created_at,
        &body.reference,
        body.amount,
        body.merchant.as_deref(),
    );

    let new_tx = NewTransaction {
        reference: body.reference,
        created_at,
        status,
        source,
        amount: body.amount,
        currency: body.currency.unwrap_or_else(|| "USD".to_string()),
        customer_name: body.customer_name,
        customer_email: body.customer_email,
        merchant: body.merchant,
        notes: body.notes,
        import_hash,
    };

    let id = match state.db.insert_transaction(&new_tx)? {
        TransactionInsertResult::Inserted(id) => id,
        TransactionInsertResult::Duplicate(id) => {
            return Err(AppError::conflict(&format!(
                "Transaction already exists with ID {}",
                id
            )))
        }
    };

    state
        .db
        .log_audit(&user_email, "create", Some("transaction"), Some(id), None)?;

    let transaction = state
        .db
        .get_transaction(id)?
        .ok_or_else(|| AppError::internal("Transaction not found after creation"))?;

    Ok(Json(transaction))
}

/// GET /api/transactions/:id - Get a specific transaction
pub async fn get_transaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<Transaction>, AppError> {
    let user_email = user_identity(&request);

    let transaction = state
        .db
        .get_transaction(id)?
        .ok_or_else(|| AppError::not_found("Transaction not found"))?;

    state
        .db
        .log_audit(&user_email, "view", Some("transaction"), Some(id), None)?;

    Ok(Json(transaction))
}

/// Request body for updating a transaction
#[derive(Debug, Deserialize)]
pub struct UpdateTransactionRequest {
    #[serde(default)]
    pub merchant: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// PUT /api/transactions/:id - Update the editable fields
pub async fn update_transaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<Transaction>, AppError> {
    let user_email = user_identity(&request);

    let bytes = axum::body::to_bytes(request.into_body(), 64 * 1024)
        .await
        .map_err(|_| AppError::bad_request("Invalid request body"))?;
    let body: UpdateTransactionRequest =
        serde_json::from_slice(&bytes).map_err(|_| AppError::bad_request("Invalid JSON"))?;

    // Verify it exists first so missing IDs are a 404, not a silent no-op
    let existing = state
        .db
        .get_transaction(id)?
        .ok_or_else(|| AppError::not_found("Transaction not found"))?;

    state.db.update_transaction(
        id,
        body.merchant.as_deref().or(existing.merchant.as_deref()),
        body.customer_name
            .as_deref()
            .or(existing.customer_name.as_deref()),
        body.customer_email
            .as_deref()
            .or(existing.customer_email.as_deref()),
        body.notes.as_deref().or(existing.notes.as_deref()),
    )?;

    state
        .db
        .log_audit(&user_email, "update", Some("transaction"), Some(id), None)?;

    let updated = state
        .db
        .get_transaction(id)?
        .ok_or_else(|| AppError::internal("Transaction not found after update"))?;

    Ok(Json(updated))
}

/// Request body for updating transaction status
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

/// POST /api/transactions/:id/status - Update transaction status
pub async fn update_transaction_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<Transaction>, AppError> {
    let user_email = user_identity(&request);

    let bytes = axum::body::to_bytes(request.into_body(), 1024)
        .await
        .map_err(|_| AppError::bad_request("Invalid request body"))?;
    let body: UpdateStatusRequest =
        serde_json::from_slice(&bytes).map_err(|_| AppError::bad_request("Invalid JSON"))?;

    state
        .db
        .get_transaction(id)?
        .ok_or_else(|| AppError::not_found("Transaction not found"))?;

    let status: TransactionStatus = body.status.parse().map_err(|_| {
        AppError::bad_request(
            "Invalid status. Use: pending, processing, completed, failed, refunded, cancelled",
        )
    })?;

    state.db.update_transaction_status(id, status)?;

    state.db.log_audit(
        &user_email,
        "update_status",
        Some("transaction"),
        Some(id),
        Some(&format!("status={}", body.status)),
    )?;

    let updated = state
        .db
        .get_transaction(id)?
        .ok_or_else(|| AppError::internal("Transaction not found after update"))?;

    Ok(Json(updated))
}

/// DELETE /api/transactions/:id - Delete a transaction
pub async fn delete_transaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<SuccessResponse>, AppError> {
    let user_email = user_identity(&request);

    state
        .db
        .get_transaction(id)?
        .ok_or_else(|| AppError::not_found("Transaction not found"))?;

    state.db.delete_transaction(id)?;

    state
        .db
        .log_audit(&user_email, "delete", Some("transaction"), Some(id), None)?;

    Ok(Json(SuccessResponse { success: true }))
}

/// GET /api/transactions/stats - Aggregate statistics
pub async fn transaction_stats(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<TransactionStats>, AppError> {
    let user_email = user_identity(&request);

    let stats = state.db.transaction_stats()?;

    state
        .db
        .log_audit(&user_email, "view", Some("transaction_stats"), None, None)?;

    Ok(Json(stats))
}
