//! Interfaces to the external collaborators: credential storage, the
//! revocation registry, the token ledger and KYC providers.
//!
//! Every call into one of these goes through [`call_provider`], which bounds
//! each attempt with a timeout and retries with exponential backoff.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use attesta_core::TokenRecord;

use crate::credential::Credential;

/// Failure talking to an external provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },

    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// Opaque store of signed credential documents, addressed by URI.
#[async_trait]
pub trait CredentialRepository: Send + Sync {
    /// Persist a signed credential and return its URI.
    async fn store(&self, credential: &Credential) -> Result<String, ProviderError>;

    async fn fetch(&self, uri: &str) -> Result<Option<Credential>, ProviderError>;

    /// All stored credentials whose subject is `subject_id`, as `(uri, credential)`.
    async fn scan_subject(&self, subject_id: &str)
        -> Result<Vec<(String, Credential)>, ProviderError>;
}

/// Yes/no revocation status keyed by a credential's status pointer.
#[async_trait]
pub trait RevocationRegistry: Send + Sync {
    async fn is_revoked(&self, status_id: &str) -> Result<bool, ProviderError>;

    /// Mark a status pointer revoked. Returns `false` if it already was.
    async fn revoke(&self, status_id: &str) -> Result<bool, ProviderError>;
}

/// Authoritative source of ledger token records.
#[async_trait]
pub trait LedgerRegistry: Send + Sync {
    async fn token(&self, token_id: &str) -> Result<Option<TokenRecord>, ProviderError>;

    async fn tokens_held_by(&self, holder: &str) -> Result<Vec<TokenRecord>, ProviderError>;
}

/// KYC / AML / sanctions screening verdict for a subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KycVerdict {
    pub verified: bool,
    pub sanctions_cleared: bool,
    pub level: String,
    #[serde(default)]
    pub jurisdiction: Option<String>,
    /// Provider-side reference for this check.
    pub reference: String,
    pub checked_at: DateTime<Utc>,
}

#[async_trait]
pub trait KycProvider: Send + Sync {
    fn provider_id(&self) -> &str;

    /// `None` when the provider has no record of the subject.
    async fn verdict(&self, subject_id: &str) -> Result<Option<KycVerdict>, ProviderError>;
}

/// Timeout and retry budget for provider calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderPolicy {
    /// Per-attempt timeout.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

fn default_timeout_ms() -> u64 {
    2_000
}
fn default_max_retries() -> u32 {
    2
}
fn default_initial_backoff_ms() -> u64 {
    100
}
fn default_max_backoff_ms() -> u64 {
    2_000
}
fn default_backoff_factor() -> f64 {
    2.0
}

impl Default for ProviderPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

impl ProviderPolicy {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.timeout_ms == 0 {
            return Err("provider timeout must be greater than zero");
        }
        if !(1.0..=10.0).contains(&self.backoff_factor) {
            return Err("backoff factor must be between 1.0 and 10.0");
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Delay before retry number `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = (self.initial_backoff_ms as f64) * self.backoff_factor.powi(attempt as i32);
        let capped = base.min(self.max_backoff_ms as f64);
        Duration::from_millis(capped as u64)
    }
}

/// Run a provider call under `policy`.
///
/// Each attempt is bounded by the policy timeout. Timeouts and
/// unavailability are retried up to `max_retries` times; the last failure
/// is returned.
pub async fn call_provider<T, F, Fut>(
    policy: &ProviderPolicy,
    operation: &str,
    mut call: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0u32;
    loop {
        let outcome = match tokio::time::timeout(policy.timeout(), call()).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                operation: operation.to_string(),
                after_ms: policy.timeout_ms,
            }),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_retries => {
                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(
                    operation,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "provider call failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                tracing::error!(operation, attempts = attempt + 1, error = %e, "provider call failed");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_retries: u32) -> ProviderPolicy {
        ProviderPolicy {
            timeout_ms: 20,
            max_retries,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
            backoff_factor: 2.0,
        }
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let policy = ProviderPolicy {
            initial_backoff_ms: 100,
            max_backoff_ms: 1_000,
            backoff_factor: 2.0,
            ..Default::default()
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_millis(1_000));
    }

    #[test]
    fn test_policy_validation() {
        assert!(ProviderPolicy::default().validate().is_ok());
        let bad = ProviderPolicy {
            backoff_factor: 0.5,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let zero = ProviderPolicy {
            timeout_ms: 0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());
    }

    #[tokio::test]
    async fn test_success_first_try() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result = call_provider(&fast_policy(3), "lookup", || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ProviderError>(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result = call_provider(&fast_policy(3), "lookup", || {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ProviderError::Unavailable("flaky".into()))
                } else {
                    Ok("ok")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_timeout_after_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<(), _> = call_provider(&fast_policy(1), "ledger.token", || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            }
        })
        .await;
        assert!(matches!(
            result,
            Err(ProviderError::Timeout { ref operation, after_ms: 20 }) if operation == "ledger.token"
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unavailable_is_returned_after_budget() {
        let result: Result<(), _> = call_provider(&fast_policy(0), "kyc.verdict", || async {
            Err(ProviderError::Unavailable("connection refused".into()))
        })
        .await;
        assert_eq!(
            result.unwrap_err(),
            ProviderError::Unavailable("connection refused".into())
        );
    }
}
