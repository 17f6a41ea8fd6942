//! Tally Web Server
//!
//! Axum-based REST API for the Tally transaction import pipeline.
//!
//! Security features:
//! - Cloudflare Access authentication (secure by default, use --no-auth for local dev)
//! - Restrictive CORS policy
//! - Upload size limits
//! - Sanitized error responses

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use tally_core::{Database, ErrorKind, ImportConfig, InMemorySubmissionRemarks};

mod handlers;

/// Cloudflare Access header for authenticated user email
const CF_ACCESS_USER_HEADER: &str = "cf-access-authenticated-user-email";

/// Authorization header for API key auth
const AUTHORIZATION_HEADER: &str = "authorization";

/// Client timezone, in minutes east of UTC
pub const TIMEZONE_OFFSET_HEADER: &str = "x-timezone-offset";

/// Room for the non-file multipart fields on top of the file size limit
const FORM_FIELDS_ALLOWANCE: usize = 64 * 1024;

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Whether authentication is required (secure by default)
    pub require_auth: bool,
    /// Allowed CORS origins (empty = same-origin only in production)
    pub allowed_origins: Vec<String>,
    /// API keys for internal service authentication (alternative to Cloudflare Access)
    /// Format: "Bearer <key>" in Authorization header
    pub api_keys: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            require_auth: true,
            allowed_origins: vec![],
            api_keys: vec![],
        }
    }
}

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub config: ServerConfig,
    pub import: ImportConfig,
    /// Submission markers for the duplicate guard; `None` when the guard is disabled
    pub remarks: Option<InMemorySubmissionRemarks>,
}

/// Authentication middleware - accepts Cloudflare Access headers or API keys
///
/// The `CF-Access-Authenticated-User-Email` header is only trustworthy behind
/// Cloudflare Tunnel, which strips and rewrites CF headers.
/// API keys are compared in constant time.
async fn auth_middleware(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    if !state.config.require_auth {
        return next.run(request).await;
    }

    let cf_user = request
        .headers()
        .get(CF_ACCESS_USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty());

    if let Some(email) = cf_user {
        info!(user = %email, path = %request.uri().path(), "Authenticated via Cloudflare Access header");
        return next.run(request).await;
    }

    let api_key_valid = request
        .headers()
        .get(AUTHORIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(|key| validate_api_key(key, &state.config.api_keys))
        .unwrap_or(false);

    if api_key_valid {
        info!(user = "api-key", path = %request.uri().path(), "Authenticated via API key");
        return next.run(request).await;
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
fn validate_api_key(provided: &str, valid_keys: &[String]) -> bool {
    use subtle::ConstantTimeEq;

    let provided_bytes = provided.as_bytes();

    valid_keys.iter().any(|key| {
        let key_bytes = key.as_bytes();
        // Only compare if lengths match (constant-time for same-length keys)
        provided_bytes.len() == key_bytes.len() && bool::from(provided_bytes.ct_eq(key_bytes))
    })
}

/// Extract the user identity from request headers
/// Returns CF Access email, "api-key" for API key auth, or "local-dev" for unauthenticated
pub fn get_user_email(headers: &HeaderMap) -> String {
    if let Some(email) = headers
        .get(CF_ACCESS_USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
    {
        return email.to_string();
    }

    if headers
        .get(AUTHORIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .is_some()
    {
        return "api-key".to_string();
    }

    "local-dev".to_string()
}

/// Client timezone offset in minutes east of UTC (0 when absent)
pub fn get_utc_offset(headers: &HeaderMap) -> Result<i32, AppError> {
    match headers
        .get(TIMEZONE_OFFSET_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
    {
        None => Ok(0),
        Some(value) => value
            .parse::<i32>()
            .ok()
            .filter(|m| m.abs() <= 18 * 60)
            .ok_or_else(|| {
                AppError::bad_request(&format!("Invalid {} header: {}", TIMEZONE_OFFSET_HEADER, value))
            }),
    }
}

/// Create the application router
pub fn create_router(db: Database, config: ServerConfig, import: ImportConfig) -> Router {
    let db = db.with_batch_limits(import.batch_limits());
    let remarks = import
        .duplicate_check_enabled
        .then(|| InMemorySubmissionRemarks::new(import.duplicate_check_expiry));
    let body_limit = import.max_import_file_size + FORM_FIELDS_ALLOWANCE;

    let state = Arc::new(AppState {
        db,
        config: config.clone(),
        import,
        remarks,
    });

    let api_routes = Router::new()
        .route(
            "/transactions/parse_dsv_file",
            post(handlers::parse_dsv_file),
        )
        .route("/transactions/parse_import", post(handlers::parse_import))
        .route("/transactions/import", post(handlers::import_transactions))
        .route(
            "/transactions/import/process",
            get(handlers::import_process),
        )
        .route("/accounts", get(handlers::list_accounts))
        .route("/categories", get(handlers::list_categories))
        .route("/counterparties", get(handlers::list_counterparties))
        .route("/tags", get(handlers::list_tags))
        .layer(DefaultBodyLimit::max(body_limit));

    let cors = if config.allowed_origins.is_empty() {
        // Restrictive default: only allow same-origin
        CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    };

    Router::new()
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
}

/// Start the server with the default import configuration
pub async fn serve(db: Database, host: &str, port: u16, config: ServerConfig) -> anyhow::Result<()> {
    serve_with_config(db, host, port, config, ImportConfig::default()).await
}

/// Start the server with custom configuration
pub async fn serve_with_config(
    db: Database,
    host: &str,
    port: u16,
    config: ServerConfig,
    import: ImportConfig,
) -> anyhow::Result<()> {
    if !config.require_auth {
        warn!("⚠️  Authentication disabled - do not expose to network!");
    }
    if !import.duplicate_check_enabled {
        info!("Duplicate submission check disabled");
    }

    let app = create_router(db, config, import);
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
#[derive(Debug)]
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

    /// Map a pipeline error to a response by its user-visible class
    ///
    /// Client-caused failures carry their message; everything else is logged
    /// and answered with a generic 500.
    pub fn from_core(err: tally_core::Error) -> Self {
        match err.kind() {
            ErrorKind::UnsupportedFormat | ErrorKind::MissingData | ErrorKind::InvalidRequest => {
                Self::bad_request(&err.to_string())
            }
            ErrorKind::RepeatedRequest => Self::conflict(&err.to_string()),
            ErrorKind::OperationFailed => Self::from(err),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
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

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            // Return generic message to client
            message: "An internal error occurred".to_string(),
            // Keep full error for logging
            internal: Some(err),
        }
    }
}
