//! Receipt handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    Json,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::{user_identity, AppError, AppState, SuccessResponse, MAX_UPLOAD_SIZE};
use tally_core::matching::MatchCandidate;
use tally_core::models::{NewReceipt, Receipt, ReceiptStats, ReceiptStatus};

/// Metadata accompanying a receipt upload, passed as query parameters since
/// the body carries the raw file bytes
#[derive(Debug, Deserialize)]
pub struct UploadReceiptQuery {
    pub filename: Option<String>,
    /// Extracted total, if the client already knows it
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub merchant: Option<String>,
    /// Extracted purchase date (YYYY-MM-DD)
    pub date: Option<String>,
    pub notes: Option<String>,
}

/// POST /api/receipts - Upload a receipt file
pub async fn upload_receipt(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UploadReceiptQuery>,
    request: Request,
) -> Result<Json<Receipt>, AppError> {
    let user_email = user_identity(&request);

    let receipt_date = query
        .date
        .as_deref()
        .map(|d| chrono::NaiveDate::parse_from_str(d, "%Y-%m-%d"))
        .transpose()
        .map_err(|_| AppError::bad_request("Invalid date (use YYYY-MM-DD)"))?;

    if query.amount.is_some_and(|a| !a.is_finite()) {
        return Err(AppError::bad_request("Amount must be a finite number"));
    }

    // Read the file data
    let bytes = axum::body::to_bytes(request.into_body(), MAX_UPLOAD_SIZE)
        .await
        .map_err(|_| AppError::bad_request("Invalid request body or file too large (max 10MB)"))?;

    if bytes.is_empty() {
        return Err(AppError::bad_request("No file data provided"));
    }

    // Compute content hash for duplicate-upload rejection
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let content_hash = format!("{:x}", hasher.finalize());

    if let Some(existing) = state.db.get_receipt_by_hash(&content_hash)? {
        return Err(AppError::conflict(&format!(
            "Receipt already exists with ID {}",
            existing.id
        )));
    }

    // Create uploads directory if it doesn't exist
    let uploads_dir = &state.uploads_dir;
    if !uploads_dir.exists() {
        std::fs::create_dir_all(uploads_dir).map_err(|e| {
            AppError::internal(&format!("Failed to create uploads directory: {}", e))
        })?;
    }

    // Store under a unique name; keep the original name only as metadata
    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S_%3f");
    let stored_name = format!("receipt_{}_{}", timestamp, &content_hash[..8]);
    let file_path = uploads_dir.join(&stored_name);

    std::fs::write(&file_path, &bytes)
        .map_err(|e| AppError::internal(&format!("Failed to save receipt file: {}", e)))?;

    let path_str = file_path.to_string_lossy().to_string();
    let filename = query
        .filename
        .unwrap_or_else(|| stored_name.clone());

    let new_receipt = NewReceipt {
        filename,
        size_bytes: bytes.len() as i64,
        file_path: Some(path_str.clone()),
        amount: query.amount,
        currency: query.currency,
        merchant: query.merchant,
        receipt_date,
        status: ReceiptStatus::Unmatched,
        content_hash: Some(content_hash),
        notes: query.notes,
    };

    let receipt_id = state.db.create_receipt(&new_receipt)?;

    state.db.log_audit(
        &user_email,
        "upload",
        Some("receipt"),
        Some(receipt_id),
        Some(&format!("path={}, size={}", path_str, bytes.len())),
    )?;

    let receipt = state
        .db
        .get_receipt(receipt_id)?
        .ok_or_else(|| AppError::internal("Receipt not found after creation"))?;

    Ok(Json(receipt))
}

/// Query params for listing receipts
#[derive(Debug, Deserialize)]
pub struct ListReceiptsQuery {
    /// Filter by status (unmatched, matched, processing, error)
    pub status: Option<String>,
}

/// GET /api/receipts - List receipts, optionally filtered by status
pub async fn list_receipts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListReceiptsQuery>,
    request: Request,
) -> Result<Json<Vec<Receipt>>, AppError> {
    let user_email = user_identity(&request);

    let status = query
        .status
        .as_deref()
        .map(str::parse::<ReceiptStatus>)
        .transpose()
        .map_err(|_| {
            AppError::bad_request("Invalid status. Use: unmatched, matched, processing, error")
        })?;

    let receipts = state.db.list_receipts(status)?;

    state.db.log_audit(
        &user_email,
        "list",
        Some("receipts"),
        None,
        Some(&format!(
            "status={:?}, count={}",
            query.status,
            receipts.len()
        )),
    )?;

    Ok(Json(receipts))
}

/// GET /api/receipts/:id - Get a specific receipt
pub async fn get_receipt(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<Receipt>, AppError> {
    let user_email = user_identity(&request);

    let receipt = state
        .db
        .get_receipt(id)?
        .ok_or_else(|| AppError::not_found("Receipt not found"))?;

    state
        .db
        .log_audit(&user_email, "view", Some("receipt"), Some(id), None)?;

    Ok(Json(receipt))
}

/// Request body for updating a receipt's extracted fields
#[derive(Debug, Deserialize)]
pub struct UpdateReceiptRequest {
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub merchant: Option<String>,
    /// YYYY-MM-DD
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Workflow status override (unmatched, matched, processing, error)
    #[serde(default)]
    pub status: Option<String>,
}

/// PUT /api/receipts/:id - Update extracted/editable fields
pub async fn update_receipt(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<Receipt>, AppError> {
    let user_email = user_identity(&request);

    let bytes = axum::body::to_bytes(request.into_body(), 64 * 1024)
        .await
        .map_err(|_| AppError::bad_request("Invalid request body"))?;
    let body: UpdateReceiptRequest =
        serde_json::from_slice(&bytes).map_err(|_| AppError::bad_request("Invalid JSON"))?;

    let existing = state
        .db
        .get_receipt(id)?
        .ok_or_else(|| AppError::not_found("Receipt not found"))?;

    if body.amount.is_some_and(|a| !a.is_finite()) {
        return Err(AppError::bad_request("Amount must be a finite number"));
    }

    let receipt_date = match body.date.as_deref() {
        Some(d) => Some(
            chrono::NaiveDate::parse_from_str(d, "%Y-%m-%d")
                .map_err(|_| AppError::bad_request("Invalid date (use YYYY-MM-DD)"))?,
        ),
        None => existing.receipt_date,
    };

    state.db.update_receipt(
        id,
        body.amount.or(existing.amount),
        body.currency.as_deref().or(existing.currency.as_deref()),
        body.merchant.as_deref().or(existing.merchant.as_deref()),
        receipt_date,
        body.notes.as_deref().or(existing.notes.as_deref()),
    )?;

    if let Some(status_str) = &body.status {
        let status: ReceiptStatus = status_str.parse().map_err(|_| {
            AppError::bad_request("Invalid status. Use: unmatched, matched, processing, error")
        })?;
        state.db.update_receipt_status(id, status)?;
    }

    state
        .db
        .log_audit(&user_email, "update", Some("receipt"), Some(id), None)?;

    let updated = state
        .db
        .get_receipt(id)?
        .ok_or_else(|| AppError::internal("Receipt not found after update"))?;

    Ok(Json(updated))
}

/// DELETE /api/receipts/:id - Delete a receipt
pub async fn delete_receipt(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<SuccessResponse>, AppError> {
    let user_email = user_identity(&request);

    // Get receipt to find the stored file
    let receipt = state
        .db
        .get_receipt(id)?
        .ok_or_else(|| AppError::not_found("Receipt not found"))?;

    // Delete the file if it exists and is within uploads_dir (path traversal protection)
    if let Some(path) = &receipt.file_path {
        let file_path = std::path::Path::new(path);
        if let (Ok(canonical_file), Ok(canonical_dir)) = (
            std::fs::canonicalize(file_path),
            std::fs::canonicalize(&state.uploads_dir),
        ) {
            if canonical_file.starts_with(&canonical_dir) {
                let _ = std::fs::remove_file(path);
            } else {
                warn!(
                    "Receipt file path outside uploads directory, skipping delete: {}",
                    path
                );
            }
        }
    }

    state.db.delete_receipt(id)?;

    state
        .db
        .log_audit(&user_email, "delete", Some("receipt"), Some(id), None)?;

    Ok(Json(SuccessResponse { success: true }))
}

/// Response for the receipt image endpoint
#[derive(Debug, Serialize)]
pub struct ReceiptImageResponse {
    pub receipt_id: i64,
    pub filename: String,
    /// File content, base64-encoded
    pub content_base64: String,
}

/// GET /api/receipts/:id/image - Fetch the stored file, base64-encoded
pub async fn get_receipt_image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<ReceiptImageResponse>, AppError> {
    let user_email = user_identity(&request);

    let receipt = state
        .db
        .get_receipt(id)?
        .ok_or_else(|| AppError::not_found("Receipt not found"))?;

    let path = receipt
        .file_path
        .as_ref()
        .ok_or_else(|| AppError::not_found("Receipt has no stored file"))?;

    let bytes = std::fs::read(path)
        .map_err(|e| AppError::internal(&format!("Failed to read receipt file: {}", e)))?;

    state
        .db
        .log_audit(&user_email, "view", Some("receipt_image"), Some(id), None)?;

    Ok(Json(ReceiptImageResponse {
        receipt_id: id,
        filename: receipt.filename,
        content_base64: base64::engine::general_purpose::STANDARD.encode(bytes),
    }))
}

/// Response for the match candidates endpoint
#[derive(Debug, Serialize)]
pub struct MatchCandidatesResponse {
    pub receipt: Receipt,
    pub matches: Vec<MatchCandidate>,
    pub total_matches: usize,
}

/// GET /api/receipts/:id/candidates - Ranked transaction match candidates
///
/// An empty `matches` array can mean either "no transaction scored above
/// zero" or "the receipt has no extracted amount"; the receipt is returned
/// alongside so clients can tell the two apart.
pub async fn get_receipt_match_candidates(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<MatchCandidatesResponse>, AppError> {
    let user_email = user_identity(&request);

    let receipt = state
        .db
        .get_receipt(id)?
        .ok_or_else(|| AppError::not_found("Receipt not found"))?;

    let matches = state.db.find_match_candidates(id)?;

    state.db.log_audit(
        &user_email,
        "view",
        Some("receipt_candidates"),
        Some(id),
        Some(&format!("count={}", matches.len())),
    )?;

    Ok(Json(MatchCandidatesResponse {
        receipt,
        total_matches: matches.len(),
        matches,
    }))
}

/// Request body for linking a receipt to a transaction
#[derive(Debug, Deserialize)]
pub struct LinkReceiptRequest {
    pub transaction_id: i64,
}

/// POST /api/receipts/:id/link - Link a receipt to a transaction
pub async fn link_receipt_to_transaction(
    State(state): State<Arc<AppState>>,
    Path(receipt_id): Path<i64>,
    request: Request,
) -> Result<Json<Receipt>, AppError> {
    let user_email = user_identity(&request);

    let bytes = axum::body::to_bytes(request.into_body(), 1024)
        .await
        .map_err(|_| AppError::bad_request("Invalid request body"))?;
    let body: LinkReceiptRequest =
        serde_json::from_slice(&bytes).map_err(|_| AppError::bad_request("Invalid JSON"))?;

    let receipt = state
        .db
        .get_receipt(receipt_id)?
        .ok_or_else(|| AppError::not_found("Receipt not found"))?;

    if receipt.status == ReceiptStatus::Matched {
        return Err(AppError::bad_request("Receipt is already matched"));
    }

    let transaction = state
        .db
        .get_transaction(body.transaction_id)?
        .ok_or_else(|| AppError::not_found("Transaction not found"))?;

    if transaction
        .receipt_id
        .is_some_and(|existing| existing != receipt_id)
    {
        return Err(AppError::conflict(
            "Transaction already has a receipt attached",
        ));
    }

    state
        .db
        .link_receipt_to_transaction(receipt_id, body.transaction_id)?;

    state.db.log_audit(
        &user_email,
        "link",
        Some("receipt"),
        Some(receipt_id),
        Some(&format!("tx_id={}", body.transaction_id)),
    )?;

    let updated = state
        .db
        .get_receipt(receipt_id)?
        .ok_or_else(|| AppError::internal("Receipt not found after linking"))?;

    Ok(Json(updated))
}

/// POST /api/receipts/:id/unlink - Unlink a receipt from its transaction
pub async fn unlink_receipt(
    State(state): State<Arc<AppState>>,
    Path(receipt_id): Path<i64>,
    request: Request,
) -> Result<Json<Receipt>, AppError> {
    let user_email = user_identity(&request);

    let receipt = state
        .db
        .get_receipt(receipt_id)?
        .ok_or_else(|| AppError::not_found("Receipt not found"))?;

    if receipt.transaction_id.is_none() {
        return Err(AppError::bad_request(
            "Receipt is not linked to a transaction",
        ));
    }

    state.db.unlink_receipt(receipt_id)?;

    state.db.log_audit(
        &user_email,
        "unlink",
        Some("receipt"),
        Some(receipt_id),
        Some(&format!("transaction_id={:?}", receipt.transaction_id)),
    )?;

    let updated = state
        .db
        .get_receipt(receipt_id)?
        .ok_or_else(|| AppError::internal("Receipt not found after unlink"))?;

    Ok(Json(updated))
}

/// Response for the auto-match endpoint
#[derive(Debug, Serialize)]
pub struct AutoMatchResponse {
    pub matched: usize,
    pub checked: usize,
}

/// POST /api/receipts/auto-match - Link unambiguous high-confidence matches
pub async fn auto_match_receipts(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<AutoMatchResponse>, AppError> {
    let user_email = user_identity(&request);

    let (matched, checked) = state.db.auto_match_receipts()?;

    state.db.log_audit(
        &user_email,
        "auto_match",
        Some("receipts"),
        None,
        Some(&format!("matched={}, checked={}", matched, checked)),
    )?;

    Ok(Json(AutoMatchResponse { matched, checked }))
}

/// GET /api/receipts/stats - Reconciliation statistics
pub async fn receipt_stats(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<ReceiptStats>, AppError> {
    let user_email = user_identity(&request);

    let stats = state.db.receipt_stats()?;

    state
        .db
        .log_audit(&user_email, "view", Some("receipt_stats"), None, None)?;

    Ok(Json(stats))
}
