use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::amount::Amount;
use crate::types::Rail;

/// Why a verification or assertion did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureReason {
    InvalidSignature,
    UntrustedIssuer,
    Expired,
    Revoked,
    RequirementMismatch,
    IncompleteDualRail,
    ConsentRequired,
    ProviderTimeout,
    ProviderUnavailable,
    SigningError,
    NotFound,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InvalidSignature => "InvalidSignature",
            Self::UntrustedIssuer => "UntrustedIssuer",
            Self::Expired => "Expired",
            Self::Revoked => "Revoked",
            Self::RequirementMismatch => "RequirementMismatch",
            Self::IncompleteDualRail => "IncompleteDualRail",
            Self::ConsentRequired => "ConsentRequired",
            Self::ProviderTimeout => "ProviderTimeout",
            Self::ProviderUnavailable => "ProviderUnavailable",
            Self::SigningError => "SigningError",
            Self::NotFound => "NotFound",
        };
        f.write_str(name)
    }
}

/// Structured values extracted from the verified rail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMetadata {
    pub rail: Rail,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Amount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    /// Raw structured claim values.
    #[serde(default)]
    pub details: serde_json::Value,
}

impl VerificationMetadata {
    pub fn new(rail: Rail) -> Self {
        Self {
            rail,
            subject: None,
            amount: None,
            currency: None,
            details: serde_json::Value::Null,
        }
    }
}

/// Outcome of a single-rail verification.
///
/// Produced fresh on every call and never persisted. A failed verification
/// is a normal value with `valid == false` and the first failed step in
/// `reason`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
    /// Human-readable explanation of `reason`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub claims: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub verified_at: DateTime<Utc>,
    pub metadata: VerificationMetadata,
}

impl VerificationResult {
    /// A successful result carrying the extracted claims.
    pub fn success(
        claims: Vec<String>,
        issued_by: Option<String>,
        expires_at: Option<DateTime<Utc>>,
        verified_at: DateTime<Utc>,
        metadata: VerificationMetadata,
    ) -> Self {
        Self {
            valid: true,
            reason: None,
            detail: None,
            claims,
            issued_by,
            expires_at,
            verified_at,
            metadata,
        }
    }

    /// A failed result; metadata is kept so callers can still inspect what was seen.
    pub fn failure(
        reason: FailureReason,
        detail: impl Into<String>,
        verified_at: DateTime<Utc>,
        metadata: VerificationMetadata,
    ) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
            detail: Some(detail.into()),
            claims: Vec::new(),
            issued_by: None,
            expires_at: None,
            verified_at,
            metadata,
        }
    }

    pub fn with_issuer(mut self, issued_by: Option<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        self.issued_by = issued_by;
        self.expires_at = expires_at;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_serializes_reason_name() {
        let result = VerificationResult::failure(
            FailureReason::Expired,
            "credential expired",
            Utc::now(),
            VerificationMetadata::new(Rail::Credential),
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["valid"], false);
        assert_eq!(json["reason"], "Expired");
        assert_eq!(json["metadata"]["rail"], "credential");
        assert!(json["claims"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_success_omits_reason() {
        let mut meta = VerificationMetadata::new(Rail::Token);
        meta.amount = Some(Amount::parse("1.5").unwrap());
        meta.currency = Some("USDC".into());
        let result = VerificationResult::success(
            vec!["holds 1.5 USDC".into()],
            None,
            None,
            Utc::now(),
            meta,
        );
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("reason").is_none());
        assert_eq!(json["metadata"]["amount"], "1.5");
        assert!(json["verifiedAt"].is_string());
    }

    #[test]
    fn test_display_matches_serde_name() {
        for reason in [
            FailureReason::InvalidSignature,
            FailureReason::RequirementMismatch,
            FailureReason::ProviderTimeout,
        ] {
            let serde_name = serde_json::to_value(reason).unwrap();
            assert_eq!(serde_name, reason.to_string());
        }
    }
}
