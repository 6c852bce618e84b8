//! Maps domain errors to structured HTTP responses.
//!
//! Every error body has the shape `{"error": {"code", "message", "details"?}}`.
//! Internal faults are logged and answered with a generic message.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use attesta_assertions::{AssertionError, ConsentRemediation};
use attesta_consent::ConsentError;
use attesta_core::CoreError;
use attesta_credentials::{CredentialError, ProviderError};

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g. "CONSENT_REQUIRED").
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("incomplete dual-rail request: {0}")]
    IncompleteDualRail(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("consent required")]
    ConsentRequired(Box<ConsentRemediation>),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("signing unavailable: {0}")]
    Signing(String),

    #[error("provider timed out: {0}")]
    ProviderTimeout(String),

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::IncompleteDualRail(_) => (StatusCode::BAD_REQUEST, "INCOMPLETE_DUAL_RAIL"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::ConsentRequired(_) => (StatusCode::FORBIDDEN, "CONSENT_REQUIRED"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Signing(_) => (StatusCode::INTERNAL_SERVER_ERROR, "SIGNING_ERROR"),
            Self::ProviderTimeout(_) => (StatusCode::GATEWAY_TIMEOUT, "PROVIDER_TIMEOUT"),
            Self::ProviderUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "PROVIDER_UNAVAILABLE")
            }
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let (message, details) = match &self {
            Self::ConsentRequired(remediation) => (
                format!(
                    "subject has not granted {} to {}",
                    remediation.required_scope, remediation.requester
                ),
                serde_json::to_value(remediation.as_ref()).ok(),
            ),
            Self::Signing(detail) | Self::ProviderUnavailable(detail) | Self::Internal(detail) => {
                tracing::error!(code, error = %detail, "request failed");
                (generic_message(status).to_string(), None)
            }
            other => (other.to_string(), None),
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details,
            },
        };
        (status, Json(body)).into_response()
    }
}

fn generic_message(status: StatusCode) -> &'static str {
    match status {
        StatusCode::SERVICE_UNAVAILABLE => "an upstream provider is unavailable",
        _ => "internal server error",
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        Self::BadRequest(e.to_string())
    }
}

impl From<ProviderError> for ApiError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Timeout { .. } => Self::ProviderTimeout(e.to_string()),
            ProviderError::Unavailable(detail) => Self::ProviderUnavailable(detail),
        }
    }
}

impl From<CredentialError> for ApiError {
    fn from(e: CredentialError) -> Self {
        match e {
            CredentialError::Signing(detail) => Self::Signing(detail),
            CredentialError::NotFound(what) => Self::NotFound(what),
            CredentialError::IncompleteDualRail(detail) => Self::IncompleteDualRail(detail),
            CredentialError::InvalidInput(detail) => Self::BadRequest(detail),
            CredentialError::Core(e) => e.into(),
            CredentialError::Provider(e) => e.into(),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<ConsentError> for ApiError {
    fn from(e: ConsentError) -> Self {
        match e {
            ConsentError::InvalidRequest(detail) => Self::BadRequest(detail),
            ConsentError::Storage(detail) => Self::Internal(detail),
        }
    }
}

impl From<AssertionError> for ApiError {
    fn from(e: AssertionError) -> Self {
        match e {
            AssertionError::ConsentRequired(remediation) => Self::ConsentRequired(remediation),
            AssertionError::InvalidParameters(detail) => Self::BadRequest(detail),
            AssertionError::Consent(e) => e.into(),
            AssertionError::Credential(e) => e.into(),
            AssertionError::Signing(e) => Self::Signing(e.to_string()),
        }
    }
}
