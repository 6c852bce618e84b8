use std::sync::Arc;

use attesta_core::{
    FailureReason, Rail, RequirementSpec, SharedClock, TokenRecord, VerificationMetadata,
    VerificationResult,
};

use crate::error::CredentialError;
use crate::providers::{call_provider, LedgerRegistry, ProviderError, ProviderPolicy};

/// Verifies ledger-rail token records.
///
/// Trust is delegated to the ledger registry, so there is no signature step,
/// and the registry's `valid` flag stands in for revocation.
pub struct TokenVerifier {
    ledger: Arc<dyn LedgerRegistry>,
    policy: ProviderPolicy,
    clock: SharedClock,
}

impl TokenVerifier {
    pub fn new(ledger: Arc<dyn LedgerRegistry>, policy: ProviderPolicy, clock: SharedClock) -> Self {
        Self {
            ledger,
            policy,
            clock,
        }
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerRegistry> {
        &self.ledger
    }

    /// Look a token up in the ledger.
    pub async fn fetch(&self, token_id: &str) -> Result<Option<TokenRecord>, CredentialError> {
        let ledger = self.ledger.clone();
        let found = call_provider(&self.policy, "ledger.token", || {
            let ledger = ledger.clone();
            let token_id = token_id.to_string();
            async move { ledger.token(&token_id).await }
        })
        .await?;
        Ok(found)
    }

    /// All tokens the ledger attributes to `holder`.
    pub async fn held_by(&self, holder: &str) -> Result<Vec<TokenRecord>, CredentialError> {
        let ledger = self.ledger.clone();
        let held = call_provider(&self.policy, "ledger.tokens_held_by", || {
            let ledger = ledger.clone();
            let holder = holder.to_string();
            async move { ledger.tokens_held_by(&holder).await }
        })
        .await?;
        Ok(held)
    }

    /// Resolve `token_id` in the ledger and verify it.
    pub async fn verify_id(
        &self,
        token_id: &str,
        requirements: &RequirementSpec,
    ) -> Result<VerificationResult, CredentialError> {
        match self.fetch(token_id).await {
            Ok(Some(token)) => Ok(self.verify(&token, requirements)),
            Ok(None) => Ok(self.fail(
                FailureReason::NotFound,
                format!("ledger has no token {token_id}"),
                VerificationMetadata::new(Rail::Token),
            )),
            Err(CredentialError::Provider(e @ ProviderError::Timeout { .. })) => Ok(self.fail(
                FailureReason::ProviderTimeout,
                e.to_string(),
                VerificationMetadata::new(Rail::Token),
            )),
            Err(e) => Err(e),
        }
    }

    /// Verify a token record already in hand.
    ///
    /// Valid requires the registry flag, an unexpired record, both
    /// compliance flags, and the requirement check.
    pub fn verify(&self, token: &TokenRecord, requirements: &RequirementSpec) -> VerificationResult {
        let now = self.clock.now();
        let mut metadata = VerificationMetadata::new(Rail::Token);
        metadata.subject = Some(token.holder_address.clone());
        metadata.amount = Some(token.amount);
        metadata.currency = Some(token.asset_type.clone());
        metadata.details = serde_json::to_value(token).unwrap_or_default();

        if !token.valid {
            return self.fail(
                FailureReason::Revoked,
                format!("ledger marks token {} invalid", token.id),
                metadata,
            );
        }

        if token.is_expired_at(now) {
            return self.fail(
                FailureReason::Expired,
                format!("token {} expired at unix time {}", token.id, token.expiry),
                metadata,
            );
        }

        if !token.compliance_flags.all_clear() {
            return self.fail(
                FailureReason::RequirementMismatch,
                format!(
                    "compliance not clear: kyc={}, sanctions={}",
                    token.compliance_flags.kyc, token.compliance_flags.sanctions
                ),
                metadata,
            );
        }

        if let Err(mismatch) =
            requirements.check(Some(token.asset_type.as_str()), Some(&token.amount))
        {
            return self.fail(
                FailureReason::RequirementMismatch,
                mismatch.to_string(),
                metadata,
            );
        }

        let mut claims = vec![
            format!("holds {} {}", token.amount, token.asset_type),
            "KYC compliant: yes".to_string(),
            "sanctions cleared: yes".to_string(),
            format!("ledger token {}", token.id),
        ];
        if let Some(custodian) = &token.custodian {
            claims.push(format!("custodied by {custodian}"));
        }

        tracing::info!(token_id = %token.id, holder = %token.holder_address, "token verified");

        VerificationResult::success(claims, None, token.expires_at(), now, metadata)
    }

    fn fail(
        &self,
        reason: FailureReason,
        detail: impl Into<String>,
        metadata: VerificationMetadata,
    ) -> VerificationResult {
        let detail = detail.into();
        tracing::warn!(rail = %metadata.rail, reason = %reason, detail = %detail, "verification failed");
        VerificationResult::failure(reason, detail, self.clock.now(), metadata)
    }
}
