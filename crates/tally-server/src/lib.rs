//! Tally Web Server
//!
//! Axum-based REST API for the Tally reconciliation application.
//!
//! Security features:
//! - Authentication required by default (session tokens, API keys, or
//!   trusted networks; use --no-auth for local dev)
//! - Restrictive CORS policy
//! - Input validation (pagination limits, file size limits)
//! - Full audit logging for all API access (reads and writes)
//! - Sanitized error responses

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::{
    cors::CorsLayer, services::ServeDir, set_header::SetResponseHeaderLayer, trace::TraceLayer,
};
use tracing::{error, info, warn};

use tally_core::db::Database;
use tally_core::sources::ProviderClient;

mod handlers;

/// Maximum file upload size (10 MB)
pub const MAX_UPLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Maximum pagination limit
pub const MAX_PAGE_LIMIT: i64 = 1000;

/// Authorization header for bearer auth (API keys and session tokens)
const AUTHORIZATION_HEADER: &str = "authorization";

/// Session token lifetime in seconds (12 hours)
const SESSION_TOKEN_TTL_SECS: i64 = 12 * 60 * 60;

/// A configured login credential
#[derive(Clone)]
pub struct UserCredential {
    pub email: String,
    pub password: String,
}

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Whether authentication is required (secure by default)
    pub require_auth: bool,
    /// Allowed CORS origins (empty = same-origin only in production)
    pub allowed_origins: Vec<String>,
    /// API keys for internal service authentication
    /// Format: "Bearer <key>" in Authorization header
    pub api_keys: Vec<String>,
    /// HS256 secret for session tokens; login is disabled when empty
    pub jwt_secret: String,
    /// Login credentials accepted by POST /api/auth/login
    pub users: Vec<UserCredential>,
    /// Trusted networks that bypass authentication (e.g., "192.168.1.0/24", "10.0.0.5")
    /// Requests from these IPs are allowed without any authentication
    pub trusted_networks: Vec<ipnet::IpNet>,
    /// Trusted proxies whose X-Forwarded-For headers are trusted (e.g., "10.42.0.0/16")
    /// When a request comes from a trusted proxy, the client IP is extracted from X-Forwarded-For
    pub trusted_proxies: Vec<ipnet::IpNet>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            require_auth: true,
            allowed_origins: vec![],
            api_keys: vec![],
            jwt_secret: String::new(),
            users: vec![],
            trusted_networks: vec![],
            trusted_proxies: vec![],
        }
    }
}

/// Identity of the authenticated caller, inserted as a request extension by
/// the auth middleware and recorded in the audit log.
#[derive(Clone, Debug)]
pub struct AuthUser(pub String);

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub config: ServerConfig,
    /// Directory for storing uploaded receipt files (defaults to ./uploads)
    pub uploads_dir: std::path::PathBuf,
    /// Client for provider feed sync, if configured
    pub provider: Option<ProviderClient>,
}

/// Session token claims
#[derive(Debug, Serialize, serde::Deserialize)]
struct Claims {
    /// Authenticated email
    sub: String,
    /// Expiry (unix seconds)
    exp: i64,
    /// Issued at (unix seconds)
    iat: i64,
}

/// Issue a session token for an authenticated user
pub(crate) fn issue_session_token(email: &str, secret: &str) -> Result<String, String> {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: email.to_string(),
        exp: now + SESSION_TOKEN_TTL_SECS,
        iat: now,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| format!("Failed to issue token: {}", e))
}

/// Validate a session token, returning the authenticated email
fn validate_session_token(token: &str, secret: &str) -> Result<String, String> {
    use jsonwebtoken::{decode, DecodingKey, Validation};

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| format!("Token validation failed: {}", e))?;

    Ok(data.claims.sub)
}

/// Authentication middleware - validates session tokens, API keys, or trusted networks
///
/// # Security Notes
///
/// **Trusted networks**: Requests from IPs in `trusted_networks` bypass all
/// authentication. The client IP is determined from the TCP connection peer
/// address; X-Forwarded-For is honored only when the peer is a configured
/// trusted proxy (to prevent header spoofing).
///
/// **API keys**: Compared using constant-time comparison to prevent timing
/// attacks.
///
/// **Session tokens**: HS256 tokens issued by POST /api/auth/login, validated
/// against the configured secret with standard expiry checking.
///
/// On success, the resolved identity is inserted as an `AuthUser` request
/// extension for handlers and audit logging.
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    connect_info: Option<axum::extract::ConnectInfo<std::net::SocketAddr>>,
    mut request: Request,
    next: Next,
) -> Response {
    if !state.config.require_auth {
        request.extensions_mut().insert(AuthUser("local-dev".to_string()));
        return next.run(request).await;
    }

    // Login must stay reachable to bootstrap a session; it checks credentials itself
    if request.uri().path() == "/api/auth/login" {
        request.extensions_mut().insert(AuthUser("anonymous".to_string()));
        return next.run(request).await;
    }

    // Check if request is from a trusted network
    if !state.config.trusted_networks.is_empty() {
        let client_ip = get_client_ip(
            &request,
            connect_info.as_ref(),
            &state.config.trusted_proxies,
        );

        if let Some(ip) = client_ip {
            if is_ip_trusted(&ip, &state.config.trusted_networks) {
                info!(ip = %ip, path = %request.uri().path(), "Authenticated via trusted network");
                request
                    .extensions_mut()
                    .insert(AuthUser(format!("trusted:{}", ip)));
                return next.run(request).await;
            }
        }
    }

    // Bearer token: API key first (constant-time), then session token
    let bearer = request
        .headers()
        .get(AUTHORIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "));

    if let Some(token) = bearer {
        if validate_api_key(token, &state.config.api_keys) {
            info!(user = "api-key", path = %request.uri().path(), "Authenticated via API key");
            request.extensions_mut().insert(AuthUser("api-key".to_string()));
            return next.run(request).await;
        }

        if !state.config.jwt_secret.is_empty() {
            match validate_session_token(token, &state.config.jwt_secret) {
                Ok(email) => {
                    info!(user = %email, path = %request.uri().path(), "Authenticated via session token");
                    request.extensions_mut().insert(AuthUser(email));
                    return next.run(request).await;
                }
                Err(e) => {
                    warn!(error = %e, path = %request.uri().path(), "Invalid session token");
                }
            }
        }
    }

    warn!(path = %request.uri().path(), "Unauthorized request - no valid auth");
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": "Authentication required"
        })),
    )
        .into_response()
}

/// Validate an API key against the configured keys using constant-time comparison
/// to prevent timing attacks.
fn validate_api_key(provided: &str, valid_keys: &[String]) -> bool {
    use subtle::ConstantTimeEq;

    let provided_bytes = provided.as_bytes();

    for key in valid_keys {
        let key_bytes = key.as_bytes();
        // Only compare if lengths match (constant-time for same-length keys)
        if provided_bytes.len() == key_bytes.len() && bool::from(provided_bytes.ct_eq(key_bytes)) {
            return true;
        }
    }
    false
}

/// Extract client IP address, respecting trusted proxies
///
/// SECURITY: X-Forwarded-For headers are ONLY trusted when the TCP connection
/// comes from a configured trusted proxy. Otherwise, only the actual TCP
/// peer address is used (to prevent header spoofing attacks).
pub(crate) fn get_client_ip(
    request: &Request,
    connect_info: Option<&axum::extract::ConnectInfo<std::net::SocketAddr>>,
    trusted_proxies: &[ipnet::IpNet],
) -> Option<std::net::IpAddr> {
    let peer_ip = connect_info.map(|ci| ci.0.ip())?;

    // If no trusted proxies configured, only use peer address
    if trusted_proxies.is_empty() {
        return Some(peer_ip);
    }

    let peer_is_trusted_proxy = trusted_proxies.iter().any(|net| net.contains(&peer_ip));

    if peer_is_trusted_proxy {
        // X-Forwarded-For format: "client, proxy1, proxy2" - take the first (original client)
        if let Some(forwarded_for) = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
        {
            if let Some(client_ip_str) = forwarded_for.split(',').next() {
                if let Ok(client_ip) = client_ip_str.trim().parse::<std::net::IpAddr>() {
                    return Some(client_ip);
                }
            }
        }

        // Fallback: try X-Real-IP header
        if let Some(real_ip) = request
            .headers()
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
        {
            if let Ok(client_ip) = real_ip.trim().parse::<std::net::IpAddr>() {
                return Some(client_ip);
            }
        }
    }

    Some(peer_ip)
}

/// Check if an IP address is within any of the trusted networks
fn is_ip_trusted(ip: &std::net::IpAddr, trusted_networks: &[ipnet::IpNet]) -> bool {
    trusted_networks.iter().any(|network| network.contains(ip))
}

/// Parse a comma-separated list of IP addresses and CIDR networks
///
/// Examples:
/// - "192.168.1.0/24" - entire subnet
/// - "10.0.0.5" - single IP (parsed as /32 for IPv4 or /128 for IPv6)
/// - "192.168.1.0/24,10.0.0.0/8" - multiple networks
pub fn parse_trusted_networks(input: &str) -> Vec<ipnet::IpNet> {
    input
        .split(',')
        .filter_map(|s| {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            if let Ok(net) = s.parse::<ipnet::IpNet>() {
                return Some(net);
            }
            if let Ok(ip) = s.parse::<std::net::IpAddr>() {
                return Some(ipnet::IpNet::from(ip));
            }
            warn!(input = s, "Failed to parse trusted network entry");
            None
        })
        .collect()
}

/// Parse "email:password" pairs separated by commas
pub fn parse_users(input: &str) -> Vec<UserCredential> {
    input
        .split(',')
        .filter_map(|pair| {
            let pair = pair.trim();
            let (email, password) = pair.split_once(':')?;
            if email.is_empty() || password.is_empty() {
                warn!("Ignoring malformed user credential entry");
                return None;
            }
            Some(UserCredential {
                email: email.to_string(),
                password: password.to_string(),
            })
        })
        .collect()
}

/// Identity of the caller for audit logging
pub(crate) fn user_identity(request: &Request) -> String {
    request
        .extensions()
        .get::<AuthUser>()
        .map(|user| user.0.clone())
        .unwrap_or_else(|| "local-dev".to_string())
}

/// Success response
#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Create the application router
pub fn create_router(db: Database, static_dir: Option<&str>, config: ServerConfig) -> Router {
    create_router_with_options(db, static_dir, config, None, None)
}

/// Create the application router with additional options (for testing)
pub fn create_router_with_options(
    db: Database,
    static_dir: Option<&str>,
    config: ServerConfig,
    uploads_dir: Option<std::path::PathBuf>,
    provider: Option<ProviderClient>,
) -> Router {
    let provider = provider.or_else(ProviderClient::from_env);
    match &provider {
        Some(client) => info!("Provider feed configured: {}", client.base_url()),
        None => info!(
            "ℹ️  Provider feed not configured (set {} to enable source sync)",
            tally_core::sources::PROVIDER_URL_ENV
        ),
    }

    let uploads_dir = uploads_dir.unwrap_or_else(|| std::path::PathBuf::from("uploads"));

    let state = Arc::new(AppState {
        db,
        config: config.clone(),
        uploads_dir,
        provider,
    });

    let api_routes = Router::new()
        // Auth
        .route("/auth/login", post(handlers::login))
        .route("/auth/me", get(handlers::get_me))
        // Transactions
        .route(
            "/transactions",
            get(handlers::list_transactions).post(handlers::create_transaction),
        )
        .route("/transactions/stats", get(handlers::transaction_stats))
        .route(
            "/transactions/:id",
            get(handlers::get_transaction)
                .put(handlers::update_transaction)
                .delete(handlers::delete_transaction),
        )
        .route(
            "/transactions/:id/status",
            post(handlers::update_transaction_status),
        )
        // Receipts
        .route(
            "/receipts",
            get(handlers::list_receipts).post(handlers::upload_receipt),
        )
        .route("/receipts/stats", get(handlers::receipt_stats))
        .route("/receipts/auto-match", post(handlers::auto_match_receipts))
        .route(
            "/receipts/:id",
            get(handlers::get_receipt)
                .put(handlers::update_receipt)
                .delete(handlers::delete_receipt),
        )
        .route("/receipts/:id/image", get(handlers::get_receipt_image))
        .route(
            "/receipts/:id/candidates",
            get(handlers::get_receipt_match_candidates),
        )
        .route(
            "/receipts/:id/link",
            post(handlers::link_receipt_to_transaction),
        )
        .route("/receipts/:id/unlink", post(handlers::unlink_receipt))
        // Shipments
        .route(
            "/shipments",
            get(handlers::list_shipments).post(handlers::create_shipment),
        )
        .route("/shipments/stats", get(handlers::shipment_stats))
        .route(
            "/shipments/:id",
            get(handlers::get_shipment)
                .put(handlers::update_shipment)
                .delete(handlers::delete_shipment),
        )
        .route(
            "/shipments/:id/status",
            post(handlers::update_shipment_status),
        )
        .route("/shipments/:id/events", get(handlers::list_tracking_events))
        // Import
        .route("/import", post(handlers::import_csv))
        // Provider sync
        .route("/sources/:source/sync", post(handlers::sync_source))
        // Export
        .route("/export/transactions", get(handlers::export_transactions))
        .route("/export/full", get(handlers::export_full))
        // Audit log
        .route("/audit", get(handlers::list_audit_log));

    // Build CORS layer
    let cors = if config.allowed_origins.is_empty() {
        // Restrictive default: only allow same-origin
        CorsLayer::new()
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    } else {
        // Allow specified origins
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    };

    // Security headers
    // CSP: restrict scripts to same-origin, allow inline styles, allow blob: for receipt previews
    let csp_value = HeaderValue::from_static(
        "default-src 'self'; script-src 'self'; style-src 'self' 'unsafe-inline'; img-src 'self' blob: data:; font-src 'self'; connect-src 'self'; frame-ancestors 'none'"
    );

    let mut app = Router::new()
        .nest("/api", api_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Security headers
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_XSS_PROTECTION,
            HeaderValue::from_static("1; mode=block"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_SECURITY_POLICY,
            csp_value,
        ));

    // Serve static files if directory provided
    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app
}

/// Start the server
pub async fn serve(
    db: Database,
    host: &str,
    port: u16,
    static_dir: Option<&str>,
) -> anyhow::Result<()> {
    serve_with_config(db, host, port, static_dir, ServerConfig::default()).await
}

/// Start the server with custom configuration
pub async fn serve_with_config(
    db: Database,
    host: &str,
    port: u16,
    static_dir: Option<&str>,
    config: ServerConfig,
) -> anyhow::Result<()> {
    if !config.require_auth {
        warn!("⚠️  Authentication disabled - do not expose to network!");
    }
    if config.require_auth && config.jwt_secret.is_empty() && config.api_keys.is_empty() {
        warn!(
            "⚠️  Auth is required but neither TALLY_JWT_SECRET nor API keys are configured; \
             only trusted networks will be able to connect"
        );
    }

    let app = create_router(db, static_dir, config)
        .into_make_service_with_connect_info::<std::net::SocketAddr>();
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn unauthorized(msg: &str) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn not_found(msg: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn internal(msg: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn conflict(msg: &str) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: msg.to_string(),
            internal: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let body = Json(serde_json::json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl From<tally_core::Error> for AppError {
    fn from(err: tally_core::Error) -> Self {
        use tally_core::Error;
        match &err {
            // Malformed input is the client's problem, not a server fault
            Error::InvalidData(msg) | Error::Import(msg) => Self::bad_request(msg),
            Error::UnknownProfile(name) => {
                Self::bad_request(&format!("Unknown import profile: {}", name))
            }
            Error::NotFound(msg) => Self::not_found(msg),
            _ => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "An internal error occurred".to_string(),
                internal: Some(err.into()),
            },
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            // Return generic message to client
            message: "An internal error occurred".to_string(),
            // Keep full error for logging
            internal: Some(err),
        }
    }
}

#[cfg(test)]
mod tests;
