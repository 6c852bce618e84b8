use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use attesta_core::{RequirementSpec, TokenRecord, VerificationResult};

use crate::credential::Credential;
use crate::error::CredentialError;
use crate::token::TokenVerifier;
use crate::verifier::CredentialVerifier;

/// Agreement between the two rails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossValidation {
    pub both_valid: bool,
    pub amount_match: bool,
    pub currency_match: bool,
}

impl CrossValidation {
    /// Compare the structured metadata of both rails. Values missing on
    /// either side never match.
    pub fn compare(credential: &VerificationResult, token: &VerificationResult) -> Self {
        let amount_match = matches!(
            (&credential.metadata.amount, &token.metadata.amount),
            (Some(a), Some(b)) if a == b
        );
        let currency_match = matches!(
            (&credential.metadata.currency, &token.metadata.currency),
            (Some(a), Some(b)) if a == b
        );
        Self {
            both_valid: credential.valid && token.valid,
            amount_match,
            currency_match,
        }
    }

    pub fn passed(&self) -> bool {
        self.both_valid && self.amount_match && self.currency_match
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DualRailResult {
    pub valid: bool,
    pub credential: VerificationResult,
    pub token: VerificationResult,
    pub cross_validation: CrossValidation,
    pub verified_at: DateTime<Utc>,
}

impl DualRailResult {
    fn from_rails(credential: VerificationResult, token: VerificationResult) -> Self {
        let cross_validation = CrossValidation::compare(&credential, &token);
        let verified_at = credential.verified_at.max(token.verified_at);
        Self {
            valid: cross_validation.passed(),
            credential,
            token,
            cross_validation,
            verified_at,
        }
    }
}

/// Verifies a credential and a token for the same fact and requires them to agree.
///
/// A forged or coerced single rail cannot pass: both rails must verify on
/// their own and report the same amount and currency. A missing rail is an
/// error, never a silent downgrade to single-rail verification.
pub struct DualRailValidator {
    credentials: Arc<CredentialVerifier>,
    tokens: Arc<TokenVerifier>,
}

impl DualRailValidator {
    pub fn new(credentials: Arc<CredentialVerifier>, tokens: Arc<TokenVerifier>) -> Self {
        Self {
            credentials,
            tokens,
        }
    }

    /// Verify documents already in hand.
    pub async fn verify_dual(
        &self,
        credential: Option<&Credential>,
        token: Option<&TokenRecord>,
        requirements: &RequirementSpec,
    ) -> Result<DualRailResult, CredentialError> {
        let (credential, token) = match (credential, token) {
            (Some(c), Some(t)) => (c, t),
            (c, t) => return Err(incomplete(c.is_none(), t.is_none())),
        };

        let (credential_result, token_result) = tokio::join!(
            self.credentials.verify(credential, requirements),
            async { Ok::<_, CredentialError>(self.tokens.verify(token, requirements)) },
        );
        Ok(self.finish(credential_result?, token_result?))
    }

    /// Resolve both rails by reference and verify them concurrently.
    pub async fn verify_dual_refs(
        &self,
        credential_uri: Option<&str>,
        token_id: Option<&str>,
        requirements: &RequirementSpec,
    ) -> Result<DualRailResult, CredentialError> {
        let (uri, token_id) = match (credential_uri, token_id) {
            (Some(u), Some(t)) => (u, t),
            (u, t) => return Err(incomplete(u.is_none(), t.is_none())),
        };

        let (credential_result, token_result) = tokio::join!(
            self.credentials.verify_uri(uri, requirements),
            self.tokens.verify_id(token_id, requirements),
        );
        Ok(self.finish(credential_result?, token_result?))
    }

    fn finish(&self, credential: VerificationResult, token: VerificationResult) -> DualRailResult {
        let result = DualRailResult::from_rails(credential, token);
        if result.valid {
            tracing::info!("dual-rail verification passed");
        } else {
            tracing::warn!(
                both_valid = result.cross_validation.both_valid,
                amount_match = result.cross_validation.amount_match,
                currency_match = result.cross_validation.currency_match,
                "dual-rail verification failed"
            );
        }
        result
    }
}

fn incomplete(credential_missing: bool, token_missing: bool) -> CredentialError {
    let missing = match (credential_missing, token_missing) {
        (true, true) => "credential and token are missing",
        (true, false) => "credential is missing",
        _ => "token is missing",
    };
    CredentialError::IncompleteDualRail(missing.to_string())
}
