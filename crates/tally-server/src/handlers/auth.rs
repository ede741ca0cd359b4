//! Auth handlers

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    Json,
};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use crate::{issue_session_token, user_identity, AppError, AppState};

/// Request body for login
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Response for a successful login
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub email: String,
}

/// POST /api/auth/login - Exchange credentials for a session token
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    if state.config.jwt_secret.is_empty() || state.config.users.is_empty() {
        return Err(AppError::bad_request(
            "Login is not configured. Set TALLY_JWT_SECRET and TALLY_USERS.",
        ));
    }

    // Constant-time password comparison; do not reveal which field was wrong
    let valid = state.config.users.iter().any(|user| {
        user.email == body.email
            && user.password.len() == body.password.len()
            && bool::from(user.password.as_bytes().ct_eq(body.password.as_bytes()))
    });

    if !valid {
        warn!(email = %body.email, "Failed login attempt");
        return Err(AppError::unauthorized("Invalid credentials"));
    }

    let token = issue_session_token(&body.email, &state.config.jwt_secret)
        .map_err(|e| AppError::internal(&e))?;

    info!(email = %body.email, "Login succeeded");

    state
        .db
        .log_audit(&body.email, "login", None, None, None)?;

    Ok(Json(LoginResponse {
        token,
        email: body.email,
    }))
}

/// Response for the current identity
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub email: String,
    pub authenticated: bool,
}

/// GET /api/auth/me - Who the server thinks the caller is
pub async fn get_me(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<MeResponse>, AppError> {
    let email = user_identity(&request);

    Ok(Json(MeResponse {
        authenticated: state.config.require_auth,
        email,
    }))
}
