//! Audit log handlers

use std::sync::Arc;

use axum::{
    extract::{Query, Request, State},
    Json,
};
use serde::Deserialize;

use crate::{user_identity, AppError, AppState, MAX_PAGE_LIMIT};
use tally_core::AuditEntry;

/// Query params for the audit log
#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    100
}

/// GET /api/audit - List audit log entries, newest first
pub async fn list_audit_log(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuditQuery>,
    request: Request,
) -> Result<Json<Vec<AuditEntry>>, AppError> {
    let user_email = user_identity(&request);

    let limit = params.limit.clamp(1, MAX_PAGE_LIMIT);
    let offset = params.offset.max(0);

    let entries = state.db.list_audit_log(limit, offset)?;

    state.db.log_audit(
        &user_email,
        "view",
        Some("audit_log"),
        None,
        Some(&format!("limit={}, offset={}", limit, offset)),
    )?;

    Ok(Json(entries))
}
