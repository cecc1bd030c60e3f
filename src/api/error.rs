//! Structured API error responses with error codes
//!
//! Consistent error handling across all endpoints with machine-readable
//! error codes and human-readable messages.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

// ============================================================================
// Error Codes
// ============================================================================

/// Error codes for API responses
///
/// These codes are stable and can be used by clients for programmatic
/// error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Authentication errors (1xxx)
    /// No authentication credentials provided
    AuthRequired,
    /// Invalid or expired access token
    InvalidToken,
    /// Token has expired
    TokenExpired,
    /// Refresh token was revoked (or already rotated)
    TokenRevoked,
    /// Identifier is locked out
    LoginLocked,

    // Rate limiting errors (2xxx)
    /// Too many requests, rate limit exceeded
    RateLimitExceeded,
    /// One-time code attempt budget exhausted
    TooManyAttempts,

    // Validation errors (3xxx)
    /// Request body is malformed
    InvalidRequestBody,
    /// Field value is invalid (bad CUIT, unknown requirement code, ...)
    InvalidFieldValue,

    // Resource errors (4xxx)
    /// Requested resource not found
    ResourceNotFound,
    /// Verification submission not found
    SubmissionNotFound,
    /// Subscription not found
    SubscriptionNotFound,

    // State errors (5xxx)
    /// Invalid subscription state transition
    InvalidStateTransition,
    /// One-time code has expired
    CodeExpired,

    // Infrastructure errors (8xxx)
    /// Database operation failed
    DatabaseError,
    /// Upstream registry unavailable
    ServiceUnavailable,
    /// Internal server error
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn numeric_code(&self) -> u32 {
        match self {
            // Auth (1xxx)
            ErrorCode::AuthRequired => 1001,
            ErrorCode::InvalidToken => 1002,
            ErrorCode::TokenExpired => 1003,
            ErrorCode::TokenRevoked => 1004,
            ErrorCode::LoginLocked => 1005,

            // Rate limiting (2xxx)
            ErrorCode::RateLimitExceeded => 2001,
            ErrorCode::TooManyAttempts => 2002,

            // Validation (3xxx)
            ErrorCode::InvalidRequestBody => 3001,
            ErrorCode::InvalidFieldValue => 3002,

            // Resource (4xxx)
            ErrorCode::ResourceNotFound => 4001,
            ErrorCode::SubmissionNotFound => 4002,
            ErrorCode::SubscriptionNotFound => 4003,

            // State (5xxx)
            ErrorCode::InvalidStateTransition => 5001,
            ErrorCode::CodeExpired => 5002,

            // Infrastructure (8xxx)
            ErrorCode::DatabaseError => 8001,
            ErrorCode::ServiceUnavailable => 8002,
            ErrorCode::InternalError => 8999,
        }
    }

    /// Get the HTTP status code for this error
    pub fn http_status(&self) -> StatusCode {
        match self {
            // Auth errors -> 401/423
            ErrorCode::AuthRequired => StatusCode::UNAUTHORIZED,
            ErrorCode::InvalidToken => StatusCode::UNAUTHORIZED,
            ErrorCode::TokenExpired => StatusCode::UNAUTHORIZED,
            ErrorCode::TokenRevoked => StatusCode::UNAUTHORIZED,
            ErrorCode::LoginLocked => StatusCode::LOCKED,

            // Rate limiting -> 429
            ErrorCode::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::TooManyAttempts => StatusCode::TOO_MANY_REQUESTS,

            // Validation -> 400/422
            ErrorCode::InvalidRequestBody => StatusCode::BAD_REQUEST,
            ErrorCode::InvalidFieldValue => StatusCode::UNPROCESSABLE_ENTITY,

            // Resource -> 404
            ErrorCode::ResourceNotFound => StatusCode::NOT_FOUND,
            ErrorCode::SubmissionNotFound => StatusCode::NOT_FOUND,
            ErrorCode::SubscriptionNotFound => StatusCode::NOT_FOUND,

            // State -> 409/410
            ErrorCode::InvalidStateTransition => StatusCode::CONFLICT,
            ErrorCode::CodeExpired => StatusCode::GONE,

            // Infrastructure -> 500/503
            ErrorCode::DatabaseError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code_str = match self {
            ErrorCode::AuthRequired => "AUTH_REQUIRED",
            ErrorCode::InvalidToken => "INVALID_TOKEN",
            ErrorCode::TokenExpired => "TOKEN_EXPIRED",
            ErrorCode::TokenRevoked => "TOKEN_REVOKED",
            ErrorCode::LoginLocked => "LOGIN_LOCKED",
            ErrorCode::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ErrorCode::TooManyAttempts => "TOO_MANY_ATTEMPTS",
            ErrorCode::InvalidRequestBody => "INVALID_REQUEST_BODY",
            ErrorCode::InvalidFieldValue => "INVALID_FIELD_VALUE",
            ErrorCode::ResourceNotFound => "RESOURCE_NOT_FOUND",
            ErrorCode::SubmissionNotFound => "SUBMISSION_NOT_FOUND",
            ErrorCode::SubscriptionNotFound => "SUBSCRIPTION_NOT_FOUND",
            ErrorCode::InvalidStateTransition => "INVALID_STATE_TRANSITION",
            ErrorCode::CodeExpired => "CODE_EXPIRED",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        };
        write!(f, "{}", code_str)
    }
}

// ============================================================================
// Structured Error Response
// ============================================================================

/// Structured error response for API endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Error details
    pub error: ErrorDetails,
}

/// Detailed error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Machine-readable error code
    pub code: ErrorCode,

    /// Numeric error code for easy categorization
    pub numeric_code: u32,

    /// Human-readable error message
    pub message: String,

    /// Additional error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// Retry information for lockouts and rate limiting
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,

    /// Related resource ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,

    /// Where the caller can fix the underlying condition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl ApiError {
    /// Create a new API error
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetails {
                code,
                numeric_code: code.numeric_code(),
                message: message.into(),
                details: None,
                retry_after: None,
                resource_id: None,
                remediation: None,
            },
        }
    }

    /// Set additional details
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.error.details = Some(details);
        self
    }

    /// Set retry-after seconds (for lockouts and rate limiting)
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.error.retry_after = Some(seconds);
        self
    }

    /// Set related resource ID
    pub fn with_resource_id(mut self, id: impl Into<String>) -> Self {
        self.error.resource_id = Some(id.into());
        self
    }

    /// Set the remediation hint
    pub fn with_remediation(mut self, hint: impl Into<String>) -> Self {
        self.error.remediation = Some(hint.into());
        self
    }

    /// Get the HTTP status code
    pub fn status(&self) -> StatusCode {
        self.error.code.http_status()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code_str = self.error.code.to_string();
        let mut response = (status, Json(self)).into_response();

        // Add error code header for easier debugging
        if let Ok(code_value) = axum::http::HeaderValue::from_str(&code_str) {
            response.headers_mut().insert(
                axum::http::header::HeaderName::from_static("x-error-code"),
                code_value,
            );
        }

        response
    }
}

// ============================================================================
// Conversion from TrustError
// ============================================================================

impl From<crate::infra::TrustError> for ApiError {
    fn from(err: crate::infra::TrustError) -> Self {
        use crate::infra::TrustError;

        match err {
            TrustError::Database(e) => {
                ApiError::new(ErrorCode::DatabaseError, format!("Database error: {}", e))
            }
            TrustError::FormatInvalid(msg) => ApiError::new(ErrorCode::InvalidFieldValue, msg),
            TrustError::NotFound { what, id } => {
                let code = match what {
                    "submission" => ErrorCode::SubmissionNotFound,
                    "subscription" => ErrorCode::SubscriptionNotFound,
                    _ => ErrorCode::ResourceNotFound,
                };
                ApiError::new(code, format!("{what} not found")).with_resource_id(id)
            }
            TrustError::ProviderUnavailable(msg) => {
                ApiError::new(ErrorCode::ServiceUnavailable, msg)
            }
            TrustError::Expired(what) => {
                if what.starts_with("access token") {
                    ApiError::new(ErrorCode::TokenExpired, format!("{what} expired"))
                } else {
                    ApiError::new(ErrorCode::CodeExpired, format!("{what} expired"))
                }
            }
            TrustError::TooManyAttempts(msg) => ApiError::new(ErrorCode::TooManyAttempts, msg),
            TrustError::RateLimited => {
                ApiError::new(ErrorCode::RateLimitExceeded, "Rate limit exceeded")
            }
            TrustError::Revoked(what) => {
                ApiError::new(ErrorCode::TokenRevoked, format!("{what} was revoked"))
            }
            TrustError::InvalidStateTransition { org_id, from, to } => ApiError::new(
                ErrorCode::InvalidStateTransition,
                format!("invalid transition {from} -> {to}"),
            )
            .with_resource_id(org_id.to_string()),
            TrustError::Configuration(msg) => ApiError::new(ErrorCode::InternalError, msg),
            TrustError::Internal(msg) => ApiError::new(ErrorCode::InternalError, msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::TrustError;

    #[test]
    fn error_codes_have_unique_numeric_codes() {
        let codes = [
            ErrorCode::AuthRequired,
            ErrorCode::InvalidToken,
            ErrorCode::TokenExpired,
            ErrorCode::TokenRevoked,
            ErrorCode::LoginLocked,
            ErrorCode::RateLimitExceeded,
            ErrorCode::TooManyAttempts,
            ErrorCode::InvalidRequestBody,
            ErrorCode::InvalidFieldValue,
            ErrorCode::ResourceNotFound,
            ErrorCode::SubmissionNotFound,
            ErrorCode::SubscriptionNotFound,
            ErrorCode::InvalidStateTransition,
            ErrorCode::CodeExpired,
            ErrorCode::DatabaseError,
            ErrorCode::ServiceUnavailable,
            ErrorCode::InternalError,
        ];
        let mut numeric: Vec<u32> = codes.iter().map(|c| c.numeric_code()).collect();
        numeric.sort_unstable();
        numeric.dedup();
        assert_eq!(numeric.len(), codes.len());
    }

    #[test]
    fn trust_errors_map_to_stable_codes() {
        let e: ApiError = TrustError::Revoked("refresh token abc".to_string()).into();
        assert_eq!(e.error.code, ErrorCode::TokenRevoked);
        assert_eq!(e.status(), StatusCode::UNAUTHORIZED);

        let e: ApiError = TrustError::NotFound {
            what: "submission",
            id: "x".to_string(),
        }
        .into();
        assert_eq!(e.error.code, ErrorCode::SubmissionNotFound);

        let e: ApiError = TrustError::FormatInvalid("bad cuit".to_string()).into();
        assert_eq!(e.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
