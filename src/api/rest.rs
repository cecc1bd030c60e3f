//! REST API endpoints for the trust engine.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    AccessDecision, AccessInputs, IdentifierKind, OrgId, PlanTier, PrincipalId, RequirementCode,
    RequirementState, SessionMeta, SubmissionStatus, SubscriptionSnapshot, VerificationSubmission,
};
use crate::metrics::metric_names;
use crate::server::AppState;
use crate::verify::OtpOutcome;

use super::error::{ApiError, ErrorCode};

/// Build the `/api` router.
pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/v1/verifications", post(submit_verification))
        .route("/v1/verifications/:id", get(get_verification))
        .route("/v1/verifications/:id/confirm", post(confirm_verification))
        .route("/v1/orgs/:org_id/verifications", get(list_verifications))
        // Login throttling
        .route("/v1/login/check", post(check_login))
        .route("/v1/login/report", post(report_login))
        // Tokens
        .route("/v1/tokens", post(issue_tokens))
        .route("/v1/tokens/rotate", post(rotate_tokens))
        .route("/v1/tokens/revoke", post(revoke_tokens))
        // Trials and access
        .route("/v1/orgs/:org_id/trial", post(start_trial))
        .route("/v1/orgs/:org_id/trial/convert", post(convert_trial))
        .route("/v1/trials/sweep", post(sweep_trials))
        .route("/v1/orgs/:org_id/access", get(get_access))
        // Observability
        .route("/v1/metrics", get(get_metrics))
        .layer(middleware::from_fn_with_state(state, require_service_token))
}

/// Service-to-service gate: every caller is an internal backend, so a
/// single shared token (when configured) guards the whole surface.
async fn require_service_token(
    State(state): State<AppState>,
    request: axum::extract::Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(expected) = &state.internal_token {
        let presented = request
            .headers()
            .get("x-internal-token")
            .and_then(|v| v.to_str().ok());
        if presented != Some(expected.as_str()) {
            return Err(ApiError::new(
                ErrorCode::AuthRequired,
                "Missing or invalid service token",
            ));
        }
    }
    Ok(next.run(request).await)
}

// ============================================================================
// Verification
// ============================================================================

#[derive(Debug, Deserialize)]
struct SubmitVerificationRequest {
    org_id: Uuid,
    /// Requirement code ("cuit", "license_gas", "phone", ...).
    requirement: String,
    value: String,
}

#[derive(Debug, Serialize)]
struct VerificationResponse {
    submission: VerificationSubmission,
    /// Human-readable explanation of the current status.
    reason: Option<String>,
}

fn parse_requirement(raw: &str) -> Result<RequirementCode, ApiError> {
    raw.parse().map_err(|_| {
        ApiError::new(
            ErrorCode::InvalidFieldValue,
            format!("unknown requirement code: {raw}"),
        )
    })
}

async fn submit_verification(
    State(state): State<AppState>,
    Json(request): Json<SubmitVerificationRequest>,
) -> Result<(StatusCode, Json<VerificationResponse>), ApiError> {
    let code = parse_requirement(&request.requirement)?;
    let (submission, _result) = state
        .verifications
        .submit_at(OrgId::from_uuid(request.org_id), code, &request.value, Utc::now())
        .await?;

    state.metrics.inc_counter(metric_names::SUBMISSIONS_RECEIVED).await;
    let status_metric = match submission.status {
        SubmissionStatus::Approved => Some(metric_names::SUBMISSIONS_APPROVED),
        SubmissionStatus::Rejected => Some(metric_names::SUBMISSIONS_REJECTED),
        SubmissionStatus::NeedsReview => Some(metric_names::SUBMISSIONS_REVIEW),
        SubmissionStatus::Pending => None,
    };
    if let Some(name) = status_metric {
        state.metrics.inc_counter(name).await;
    }

    let reason = submission.reason.clone();
    Ok((
        StatusCode::CREATED,
        Json(VerificationResponse { submission, reason }),
    ))
}

async fn get_verification(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<VerificationResponse>, ApiError> {
    let submission = state
        .verifications
        .get(id)
        .await?
        .ok_or_else(|| {
            ApiError::new(ErrorCode::SubmissionNotFound, "submission not found")
                .with_resource_id(id.to_string())
        })?;
    let reason = submission.reason.clone();
    Ok(Json(VerificationResponse { submission, reason }))
}

async fn list_verifications(
    State(state): State<AppState>,
    Path(org_id): Path<Uuid>,
) -> Result<Json<Vec<VerificationSubmission>>, ApiError> {
    let submissions = state
        .verifications
        .list_for_org(OrgId::from_uuid(org_id))
        .await?;
    Ok(Json(submissions))
}

#[derive(Debug, Deserialize)]
struct ConfirmCodeRequest {
    code: String,
}

#[derive(Debug, Serialize)]
struct ConfirmCodeResponse {
    outcome: &'static str,
    status: SubmissionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    remaining_attempts: Option<u32>,
}

async fn confirm_verification(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ConfirmCodeRequest>,
) -> Result<Json<ConfirmCodeResponse>, ApiError> {
    let (submission, outcome) = state
        .verifications
        .confirm_code_at(id, &request.code, Utc::now())
        .await?;

    let (name, remaining) = match outcome {
        OtpOutcome::Match => ("match", None),
        OtpOutcome::Mismatch { remaining } => ("mismatch", Some(remaining)),
        OtpOutcome::Expired => ("expired", None),
        OtpOutcome::TooManyAttempts => ("too_many_attempts", None),
        OtpOutcome::NotFound => ("not_found", None),
    };
    if outcome == OtpOutcome::Match {
        state.metrics.inc_counter(metric_names::OTP_MATCHED).await;
    }
    if outcome == OtpOutcome::TooManyAttempts {
        state.metrics.inc_counter(metric_names::OTP_EXHAUSTED).await;
    }

    Ok(Json(ConfirmCodeResponse {
        outcome: name,
        status: submission.status,
        remaining_attempts: remaining,
    }))
}

// ============================================================================
// Login throttling
// ============================================================================

#[derive(Debug, Deserialize)]
struct LoginCheckRequest {
    identifier: String,
}

#[derive(Debug, Serialize)]
struct LoginGateResponse {
    allowed: bool,
    locked: bool,
    remaining_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    lockout_ends_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_minutes: Option<i64>,
}

fn gate_response(gate: crate::auth::LoginGate, now: DateTime<Utc>) -> LoginGateResponse {
    LoginGateResponse {
        allowed: gate.allowed,
        locked: gate.locked,
        remaining_attempts: gate.remaining_attempts,
        lockout_ends_at: gate.lockout_ends_at,
        retry_after_minutes: gate.retry_after_minutes(now),
    }
}

async fn check_login(
    State(state): State<AppState>,
    Json(request): Json<LoginCheckRequest>,
) -> Result<Json<LoginGateResponse>, ApiError> {
    let now = Utc::now();
    let gate = state.login_guard.check_at(&request.identifier, now).await?;
    Ok(Json(gate_response(gate, now)))
}

#[derive(Debug, Deserialize)]
struct LoginReportRequest {
    identifier: String,
    kind: IdentifierKind,
    success: bool,
}

async fn report_login(
    State(state): State<AppState>,
    Json(request): Json<LoginReportRequest>,
) -> Result<Json<LoginGateResponse>, ApiError> {
    let now = Utc::now();
    let gate = if request.success {
        state
            .login_guard
            .record_success_at(&request.identifier, request.kind, now)
            .await?;
        state.login_guard.check_at(&request.identifier, now).await?
    } else {
        state.metrics.inc_counter(metric_names::LOGIN_FAILURES).await;
        let gate = state
            .login_guard
            .record_failure_at(&request.identifier, request.kind, now)
            .await?;
        if gate.locked {
            state.metrics.inc_counter(metric_names::LOGIN_LOCKOUTS).await;
        }
        gate
    };
    Ok(Json(gate_response(gate, now)))
}

// ============================================================================
// Tokens
// ============================================================================

#[derive(Debug, Deserialize)]
struct IssueTokensRequest {
    principal_id: Uuid,
    org_id: Uuid,
    #[serde(default)]
    user_agent: Option<String>,
    #[serde(default)]
    ip: Option<String>,
}

#[derive(Debug, Serialize)]
struct TokenPairResponse {
    access_token: String,
    refresh_token: String,
    access_expires_at: DateTime<Utc>,
    refresh_expires_at: DateTime<Utc>,
}

async fn issue_tokens(
    State(state): State<AppState>,
    Json(request): Json<IssueTokensRequest>,
) -> Result<(StatusCode, Json<TokenPairResponse>), ApiError> {
    let pair = state
        .tokens
        .issue_pair_at(
            PrincipalId::from_uuid(request.principal_id),
            OrgId::from_uuid(request.org_id),
            SessionMeta {
                user_agent: request.user_agent,
                ip: request.ip,
            },
            Utc::now(),
        )
        .await?;
    state.metrics.inc_counter(metric_names::TOKENS_ISSUED).await;

    Ok((
        StatusCode::CREATED,
        Json(TokenPairResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            access_expires_at: pair.access_expires_at,
            refresh_expires_at: pair.refresh_expires_at,
        }),
    ))
}

#[derive(Debug, Deserialize)]
struct RotateTokensRequest {
    refresh_token: String,
    #[serde(default)]
    user_agent: Option<String>,
    #[serde(default)]
    ip: Option<String>,
}

async fn rotate_tokens(
    State(state): State<AppState>,
    Json(request): Json<RotateTokensRequest>,
) -> Result<Json<TokenPairResponse>, ApiError> {
    let result = state
        .tokens
        .rotate_at(
            &request.refresh_token,
            SessionMeta {
                user_agent: request.user_agent,
                ip: request.ip,
            },
            Utc::now(),
        )
        .await;

    if matches!(result, Err(crate::infra::TrustError::Revoked(_))) {
        state.metrics.inc_counter(metric_names::TOKEN_REPLAYS).await;
    }
    let pair = result?;
    state.metrics.inc_counter(metric_names::TOKENS_ROTATED).await;

    Ok(Json(TokenPairResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        access_expires_at: pair.access_expires_at,
        refresh_expires_at: pair.refresh_expires_at,
    }))
}

/// Revoke one session (by its refresh token) or every session for a
/// principal.
#[derive(Debug, Deserialize)]
struct RevokeTokensRequest {
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    principal_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
struct RevokeTokensResponse {
    revoked: u64,
}

async fn revoke_tokens(
    State(state): State<AppState>,
    Json(request): Json<RevokeTokensRequest>,
) -> Result<Json<RevokeTokensResponse>, ApiError> {
    let now = Utc::now();
    match (request.refresh_token, request.principal_id) {
        (Some(token), None) => {
            state.tokens.revoke_at(&token, now).await?;
            Ok(Json(RevokeTokensResponse { revoked: 1 }))
        }
        (None, Some(principal)) => {
            let revoked = state
                .tokens
                .revoke_all_at(PrincipalId::from_uuid(principal), now)
                .await?;
            Ok(Json(RevokeTokensResponse { revoked }))
        }
        _ => Err(ApiError::new(
            ErrorCode::InvalidRequestBody,
            "provide exactly one of refresh_token or principal_id",
        )),
    }
}

// ============================================================================
// Trials and access
// ============================================================================

async fn start_trial(
    State(state): State<AppState>,
    Path(org_id): Path<Uuid>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let subscription = state
        .trials
        .start_trial_at(OrgId::from_uuid(org_id), Utc::now())
        .await?;
    state.metrics.inc_counter(metric_names::TRIALS_STARTED).await;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "subscription": subscription }))))
}

#[derive(Debug, Deserialize)]
struct ConvertTrialRequest {
    tier: PlanTier,
}

async fn convert_trial(
    State(state): State<AppState>,
    Path(org_id): Path<Uuid>,
    Json(request): Json<ConvertTrialRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let subscription = state
        .trials
        .convert_at(OrgId::from_uuid(org_id), request.tier, Utc::now())
        .await?;
    state.metrics.inc_counter(metric_names::TRIALS_CONVERTED).await;
    Ok(Json(serde_json::json!({ "subscription": subscription })))
}

#[derive(Debug, Serialize)]
struct SweepResponse {
    expired: Vec<OrgId>,
}

async fn sweep_trials(
    State(state): State<AppState>,
) -> Result<Json<SweepResponse>, ApiError> {
    let expired = state.trials.expire_due_at(Utc::now()).await?;
    state
        .metrics
        .add_counter(metric_names::TRIALS_EXPIRED, expired.len() as u64)
        .await;
    Ok(Json(SweepResponse { expired }))
}

async fn get_access(
    State(state): State<AppState>,
    Path(org_id): Path<Uuid>,
) -> Result<Json<AccessDecision>, ApiError> {
    let org = OrgId::from_uuid(org_id);
    let now = Utc::now();

    let subscription = state.trials.get(org).await?.ok_or_else(|| {
        ApiError::new(ErrorCode::SubscriptionNotFound, "organization has no subscription")
            .with_resource_id(org_id.to_string())
            .with_remediation("/billing")
    })?;

    // One row per configured requirement; approved iff an approved
    // submission exists for its code.
    let submissions = state.verifications.list_for_org(org).await?;
    let requirements: Vec<RequirementState> = state
        .catalog
        .iter()
        .map(|requirement| RequirementState {
            code: requirement.code,
            required: requirement.required,
            approved: submissions.iter().any(|s| {
                s.requirement == requirement.code && s.status == SubmissionStatus::Approved
            }),
            expires_at: None,
        })
        .collect();

    let compliance = state.compliance.active_flags(org).await?;

    let decision = state.access.evaluate(
        &AccessInputs {
            subscription: SubscriptionSnapshot::from(&subscription),
            requirements,
            compliance,
        },
        now,
    );

    state.metrics.inc_counter(metric_names::ACCESS_EVALUATIONS).await;
    if !decision.can_access_dashboard {
        state.metrics.inc_counter(metric_names::ACCESS_HARD_BLOCKS).await;
    }
    Ok(Json(decision))
}

// ============================================================================
// Observability
// ============================================================================

async fn get_metrics(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(state.metrics.to_json().await)
}
