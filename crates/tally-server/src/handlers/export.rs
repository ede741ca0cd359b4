//! Export handlers

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header,
    response::IntoResponse,
};

use crate::{user_identity, AppError, AppState};
use tally_core::export::{export_full_gz, export_transactions_csv};

/// GET /api/export/transactions - All transactions as CSV
pub async fn export_transactions(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<impl IntoResponse, AppError> {
    let user_email = user_identity(&request);

    let csv = export_transactions_csv(&state.db)?;

    state
        .db
        .log_audit(&user_email, "export", Some("transactions"), None, None)?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"transactions.csv\"",
            ),
        ],
        csv,
    ))
}

/// GET /api/export/full - Full snapshot as gzipped JSON
pub async fn export_full(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<impl IntoResponse, AppError> {
    let user_email = user_identity(&request);

    let bytes = export_full_gz(&state.db)?;

    state
        .db
        .log_audit(&user_email, "export", Some("full"), None, None)?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/gzip"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"tally-export.json.gz\"",
            ),
        ],
        bytes,
    ))
}
