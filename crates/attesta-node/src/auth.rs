//! API-key authentication for issuance and assertion endpoints.
//!
//! Each key is bound to a requester identity. The middleware injects the
//! matching [`Requester`] into request extensions; assertion handlers use it
//! for the consent check, so a caller can never ask on someone else's behalf.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::fmt;
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::config::ApiKeyEntry;
use crate::error::ApiError;

pub const API_KEY_HEADER: &str = "x-api-key";

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester(pub String);

/// Configured API keys. `Debug` never prints key material.
#[derive(Clone, Default)]
pub struct ApiKeys {
    entries: Vec<ApiKeyEntry>,
}

impl fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeys")
            .field("count", &self.entries.len())
            .finish()
    }
}

impl ApiKeys {
    pub fn new(entries: Vec<ApiKeyEntry>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the requester bound to `provided`.
    ///
    /// Every configured key is compared in constant time, and the scan does
    /// not stop at the first match.
    pub fn authenticate(&self, provided: &str) -> Option<Requester> {
        let mut found = None;
        for entry in &self.entries {
            if constant_time_eq(provided.as_bytes(), entry.key.as_bytes()) && found.is_none() {
                found = Some(Requester(entry.requester.clone()));
            }
        }
        found
    }
}

fn constant_time_eq(provided: &[u8], expected: &[u8]) -> bool {
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

/// Reject requests without a valid `x-api-key` header.
pub async fn require_api_key(
    State(keys): State<Arc<ApiKeys>>,
    mut request: Request,
    next: Next,
) -> Response {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match provided {
        Some(key) => match keys.authenticate(key) {
            Some(requester) => {
                tracing::debug!(requester = %requester.0, path = %request.uri().path(), "authenticated");
                request.extensions_mut().insert(requester);
                next.run(request).await
            }
            None => {
                tracing::warn!(path = %request.uri().path(), "authentication failed: unknown api key");
                ApiError::Unauthorized("invalid api key".into()).into_response()
            }
        },
        None => {
            tracing::warn!(path = %request.uri().path(), "authentication failed: missing api key");
            ApiError::Unauthorized(format!("missing {API_KEY_HEADER} header")).into_response()
        }
    }
}
