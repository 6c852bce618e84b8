use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::consent::ConsentScope;
use crate::error::CoreError;

/// The predefined yes/no questions the assertion engine answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssertionKind {
    #[serde(rename = "hasKYC")]
    HasKyc,
    #[serde(rename = "hasBalance")]
    HasBalance,
    #[serde(rename = "isDeviceCompliant")]
    IsDeviceCompliant,
}

impl AssertionKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::HasKyc => "hasKYC",
            Self::HasBalance => "hasBalance",
            Self::IsDeviceCompliant => "isDeviceCompliant",
        }
    }

    /// The consent scope a requester must hold to ask this question.
    pub fn required_scope(&self) -> ConsentScope {
        match self {
            Self::HasKyc => ConsentScope::KycStatus,
            Self::HasBalance => ConsentScope::BalanceVerification,
            Self::IsDeviceCompliant => ConsentScope::DeviceAttestation,
        }
    }
}

impl fmt::Display for AssertionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AssertionKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hasKYC" => Ok(Self::HasKyc),
            "hasBalance" => Ok(Self::HasBalance),
            "isDeviceCompliant" => Ok(Self::IsDeviceCompliant),
            other => Err(CoreError::UnknownAssertion(other.to_string())),
        }
    }
}

/// Pointer to the existing source of truth behind an assertion.
///
/// Each variant can be re-checked independently: a credential URI through the
/// credential verifier, a token id through the ledger, a provider reference
/// with the provider that issued it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProofReference {
    #[serde(rename_all = "camelCase")]
    Credential { uri: String, credential_id: String },
    #[serde(rename_all = "camelCase")]
    Token { token_id: String },
    #[serde(rename_all = "camelCase")]
    Provider { provider: String, reference: String },
}

impl fmt::Display for ProofReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Credential { uri, .. } => write!(f, "{uri}"),
            Self::Token { token_id } => write!(f, "token:{token_id}"),
            Self::Provider {
                provider,
                reference,
            } => write!(f, "provider:{provider}:{reference}"),
        }
    }
}

/// A consent-gated, time-bounded answer to an [`AssertionKind`] question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assertion {
    pub id: String,
    pub assertion_name: AssertionKind,
    pub subject_id: String,
    pub requester: String,
    pub result: bool,
    /// Absent when no source substantiated the fact.
    pub proof: Option<ProofReference>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub issued_at: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Assertion {
    pub fn is_current_at(&self, now: DateTime<Utc>) -> bool {
        now < self.valid_until
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_roundtrip() {
        for kind in [
            AssertionKind::HasKyc,
            AssertionKind::HasBalance,
            AssertionKind::IsDeviceCompliant,
        ] {
            assert_eq!(kind.name().parse::<AssertionKind>().unwrap(), kind);
            assert_eq!(serde_json::to_value(kind).unwrap(), kind.name());
        }
        assert!("hasPet".parse::<AssertionKind>().is_err());
    }

    #[test]
    fn test_required_scopes() {
        assert_eq!(AssertionKind::HasKyc.required_scope(), ConsentScope::KycStatus);
        assert_eq!(
            AssertionKind::HasBalance.required_scope(),
            ConsentScope::BalanceVerification
        );
        assert_eq!(
            AssertionKind::IsDeviceCompliant.required_scope(),
            ConsentScope::DeviceAttestation
        );
    }

    #[test]
    fn test_proof_reference_tagging() {
        let proof = ProofReference::Token {
            token_id: "tok-9".into(),
        };
        let json = serde_json::to_value(&proof).unwrap();
        assert_eq!(json["type"], "token");
        assert_eq!(json["tokenId"], "tok-9");
        assert_eq!(proof.to_string(), "token:tok-9");
    }
}
