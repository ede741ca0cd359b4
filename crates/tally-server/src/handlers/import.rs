//! Import and provider-sync handlers

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{user_identity, AppError, AppState, MAX_UPLOAD_SIZE};
use tally_core::db::TransactionInsertResult;
use tally_core::import::{run_import, ImportProfile, ImportReport};
use tally_core::models::TransactionSource;
use tally_core::sources::to_new_transaction;

/// Query params for CSV import
#[derive(Debug, Deserialize)]
pub struct ImportQuery {
    /// Profile name ("generic") or path to a TOML profile
    #[serde(default = "default_profile")]
    pub profile: String,
}

fn default_profile() -> String {
    "generic".to_string()
}

/// POST /api/import - Import transactions from a CSV body
pub async fn import_csv(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ImportQuery>,
    request: Request,
) -> Result<Json<ImportReport>, AppError> {
    let user_email = user_identity(&request);

    let profile = ImportProfile::resolve(&query.profile)?;

    let bytes = axum::body::to_bytes(request.into_body(), MAX_UPLOAD_SIZE)
        .await
        .map_err(|_| AppError::bad_request("Invalid request body or file too large (max 10MB)"))?;

    if bytes.is_empty() {
        return Err(AppError::bad_request("No CSV data provided"));
    }

    let report = run_import(&state.db, bytes.as_ref(), &profile)?;

    info!(
        imported = report.imported,
        skipped = report.skipped_duplicates,
        failed = report.failed.len(),
        profile = %profile.name,
        "CSV import complete"
    );

    state.db.log_audit(
        &user_email,
        "import",
        Some("transactions"),
        None,
        Some(&format!(
            "profile={}, imported={}, skipped={}, failed={}",
            profile.name,
            report.imported,
            report.skipped_duplicates,
            report.failed.len()
        )),
    )?;

    Ok(Json(report))
}

/// Response for provider sync
#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub source: String,
    pub pulled: usize,
    pub imported: usize,
    pub skipped_duplicates: usize,
}

/// POST /api/sources/:source/sync - Pull a provider feed into the ledger
pub async fn sync_source(
    State(state): State<Arc<AppState>>,
    Path(source): Path<String>,
    request: Request,
) -> Result<Json<SyncResponse>, AppError> {
    let user_email = user_identity(&request);

    let source = TransactionSource::from_str(&source).map_err(|_| {
        AppError::bad_request("Invalid source. Use: credit_card, payment_gateway, overseas, other")
    })?;
    if source == TransactionSource::Manual {
        return Err(AppError::bad_request(
            "Manual transactions have no provider feed",
        ));
    }

    let provider = state.provider.as_ref().ok_or_else(|| {
        AppError::bad_request(
            "Provider feed not configured. Set TALLY_PROVIDER_URL environment variable.",
        )
    })?;

    let records = provider.pull(source).await?;
    let pulled = records.len();

    let mut imported = 0;
    let mut skipped_duplicates = 0;
    for record in records {
        let tx = to_new_transaction(source, record);
        match state.db.insert_transaction(&tx)? {
            TransactionInsertResult::Inserted(_) => imported += 1,
            TransactionInsertResult::Duplicate(_) => skipped_duplicates += 1,
        }
    }

    info!(
        source = %source,
        pulled,
        imported,
        skipped = skipped_duplicates,
        "Provider sync complete"
    );

    state.db.log_audit(
        &user_email,
        "sync",
        Some("source"),
        None,
        Some(&format!(
            "source={}, pulled={}, imported={}, skipped={}",
            source, pulled, imported, skipped_duplicates
        )),
    )?;

    Ok(Json(SyncResponse {
        source: source.to_string(),
        pulled,
        imported,
        skipped_duplicates,
    }))
}
