//! HTTP server bootstrap for the trust engine.
//!
//! This module wires together:
//! - configuration
//! - database connection pool
//! - core services (verification router, login guard, token issuer,
//!   trial lifecycle, access policy)
//! - the Axum router

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tower_http::cors::AllowOrigin;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use crate::auth::{LoginGuard, TokenIssuer};
use crate::config::TrustConfig;
use crate::domain::RequirementCatalog;
use crate::infra::{
    ComplianceStore, PgChallengeStore, PgComplianceStore, PgLicenseSnapshotStore,
    PgLoginActivityStore, PgRefreshTokenStore, PgSubmissionStore, PgSubscriptionStore,
};
use crate::metrics::MetricsRegistry;
use crate::policy::{AccessPolicy, TrialLifecycle};
use crate::verify::{
    AfipPadronClient, ActivityMatcher, LicenseMatcher, LogOnlyTransport, OtpChallenges, OtpConfig,
    VerificationRouter, WebhookTransport,
};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Server listen address.
    pub listen_addr: SocketAddr,
    /// Maximum database connections.
    pub max_connections: u32,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/laburen_trust".to_string());

        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let listen_addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .expect("Invalid listen address");

        let max_connections: u32 = std::env::var("MAX_DB_CONNECTIONS")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(10);

        Self {
            database_url,
            listen_addr,
            max_connections,
        }
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub verifications: Arc<VerificationRouter>,
    pub login_guard: Arc<LoginGuard>,
    pub tokens: Arc<TokenIssuer>,
    pub trials: Arc<TrialLifecycle>,
    pub access: Arc<AccessPolicy>,
    pub catalog: RequirementCatalog,
    pub compliance: Arc<dyn ComplianceStore>,
    pub metrics: Arc<MetricsRegistry>,
    /// Shared secret callers present in `x-internal-token`; `None`
    /// disables the gate (local dev only).
    pub internal_token: Option<String>,
    pub pool: PgPool,
}

/// Start the HTTP server.
pub async fn run() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting trust engine v{}", env!("CARGO_PKG_VERSION"));

    let jwt_secret = std::env::var("JWT_SECRET")
        .map_err(|_| anyhow::anyhow!("JWT_SECRET must be set"))?;
    let jwt_issuer = std::env::var("JWT_ISSUER").unwrap_or_else(|_| "laburen-trust".to_string());

    let internal_token = std::env::var("INTERNAL_SERVICE_TOKEN").ok();
    if internal_token.is_some() {
        info!("Internal service token is configured");
    } else {
        info!("Internal service token NOT configured; the API is unauthenticated (local dev only)");
    }

    let mut trust_config = TrustConfig::default();
    if let Ok(v) = std::env::var("LOGIN_FAIL_OPEN") {
        trust_config.login_fail_open =
            !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "off");
    }

    // Load configuration
    let config = Config::from_env();
    info!("Configuration loaded");
    info!("  Listen address: {}", config.listen_addr);
    info!("  Max connections: {}", config.max_connections);

    // Connect to PostgreSQL
    info!("Connecting to PostgreSQL...");
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;
    info!("Connected to PostgreSQL");

    let migrate_on_startup = std::env::var("DB_MIGRATE_ON_STARTUP")
        .ok()
        .map(|v| {
            !matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "0" | "false" | "off"
            )
        })
        .unwrap_or(true);
    if migrate_on_startup {
        info!("Running database migrations...");
        crate::migrations::run_postgres(&pool).await?;
        info!("Database migrations applied");
    } else {
        info!("DB migrations skipped (DB_MIGRATE_ON_STARTUP=0)");
    }

    // Stores
    let submissions = Arc::new(PgSubmissionStore::new(pool.clone()));
    let challenges = Arc::new(PgChallengeStore::new(pool.clone()));
    let login_activity = Arc::new(PgLoginActivityStore::new(pool.clone()));
    let refresh_tokens = Arc::new(PgRefreshTokenStore::new(pool.clone()));
    let subscriptions = Arc::new(PgSubscriptionStore::new(pool.clone()));
    let license_snapshot = Arc::new(PgLicenseSnapshotStore::new(pool.clone()));
    let compliance: Arc<dyn ComplianceStore> = Arc::new(PgComplianceStore::new(pool.clone()));

    // Tax registry client
    let afip_base_url = std::env::var("AFIP_BASE_URL")
        .unwrap_or_else(|_| "https://soa.afip.gob.ar/sr-padron/v2".to_string());
    info!("Tax registry base URL: {}", afip_base_url);
    let registry = Arc::new(AfipPadronClient::new(
        afip_base_url,
        trust_config.registry_timeout,
    ));

    // One-time code delivery (optional webhook to the messaging service)
    let transport: Arc<dyn crate::verify::CodeTransport> =
        match std::env::var("OTP_DELIVERY_URL") {
            Ok(url) => {
                info!("One-time code delivery webhook: {}", url);
                Arc::new(WebhookTransport::new(url, trust_config.registry_timeout))
            }
            Err(_) => {
                info!("OTP_DELIVERY_URL not set; one-time codes are logged truncated and NOT delivered");
                Arc::new(LogOnlyTransport)
            }
        };

    let catalog = RequirementCatalog::standard();
    let verifications = Arc::new(VerificationRouter::new(
        catalog.clone(),
        submissions,
        registry,
        ActivityMatcher::default(),
        LicenseMatcher::new(license_snapshot),
        OtpChallenges::new(
            challenges,
            transport,
            OtpConfig {
                ttl: trust_config.otp_ttl,
                max_attempts: trust_config.otp_max_attempts,
            },
        ),
    ));

    let login_guard = Arc::new(LoginGuard::new(login_activity, trust_config.clone()));
    let tokens = Arc::new(TokenIssuer::new(
        jwt_secret.as_bytes(),
        jwt_issuer,
        refresh_tokens,
        trust_config.clone(),
    ));
    let trials = Arc::new(TrialLifecycle::new(subscriptions, trust_config.clone()));
    let access = Arc::new(AccessPolicy::new(trust_config));

    // Create application state
    let state = AppState {
        verifications,
        login_guard,
        tokens,
        trials,
        access,
        catalog,
        compliance,
        metrics: Arc::new(MetricsRegistry::new()),
        internal_token,
        pool,
    };

    // Build router
    let app = build_router(state.clone())?.with_state(state);

    // Start server
    info!("Starting HTTP server on {}", config.listen_addr);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;

    info!("Trust engine is ready to accept connections");
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

fn build_router(state: AppState) -> anyhow::Result<Router<AppState>> {
    let api = crate::api::router(state);

    let mut router = Router::new()
        .nest("/api", api)
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .layer(TraceLayer::new_for_http());

    if let Some(cors_layer) = cors_layer_from_env()? {
        router = router.layer(cors_layer);
    }

    Ok(router)
}

fn cors_layer_from_env() -> anyhow::Result<Option<CorsLayer>> {
    let origins = match std::env::var("CORS_ALLOW_ORIGINS") {
        Ok(v) => v,
        Err(_) => return Ok(None),
    };

    let origins = origins.trim();
    if origins.is_empty() {
        return Ok(None);
    }

    let allow_origin = if origins == "*" {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = origins
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<HeaderValue>()
                    .map_err(|e| anyhow::anyhow!("Invalid CORS origin {s:?}: {e}"))
            })
            .collect::<anyhow::Result<_>>()?;
        AllowOrigin::list(origins)
    };

    Ok(Some(
        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([
                axum::http::header::AUTHORIZATION,
                axum::http::header::CONTENT_TYPE,
            ]),
    ))
}

/// Health check endpoint.
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "healthy",
        "service": "laburen-trust",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Readiness check endpoint.
async fn readiness_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<axum::Json<serde_json::Value>, (axum::http::StatusCode, String)> {
    match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => Ok(axum::Json(serde_json::json!({
            "status": "ready",
            "database": "connected",
        }))),
        Err(e) => Err((
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            format!("Database unavailable: {}", e),
        )),
    }
}
