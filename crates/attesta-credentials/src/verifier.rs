use dashmap::DashSet;
use std::sync::Arc;

use attesta_core::{
    Did, FailureReason, Rail, RequirementSpec, SharedClock, VerificationMetadata,
    VerificationResult,
};
use attesta_crypto::{recover_signer, SigningDomain};

use crate::credential::{credential_schema, Credential};
use crate::error::CredentialError;
use crate::providers::{
    call_provider, CredentialRepository, ProviderError, ProviderPolicy, RevocationRegistry,
};

/// Verifies credentials: signature, issuer trust, expiry, revocation, then
/// caller requirements. The first failed step decides the result.
pub struct CredentialVerifier {
    domain: SigningDomain,
    /// Accepted issuer DIDs. Empty accepts any correctly signed issuer.
    trusted_issuers: DashSet<String>,
    revocations: Arc<dyn RevocationRegistry>,
    repository: Arc<dyn CredentialRepository>,
    policy: ProviderPolicy,
    clock: SharedClock,
}

impl CredentialVerifier {
    /// Create a new credential verifier.
    pub fn new(
        domain: SigningDomain,
        revocations: Arc<dyn RevocationRegistry>,
        repository: Arc<dyn CredentialRepository>,
        policy: ProviderPolicy,
        clock: SharedClock,
    ) -> Self {
        Self {
            domain,
            trusted_issuers: DashSet::new(),
            revocations,
            repository,
            policy,
            clock,
        }
    }

    /// Add a trusted issuer.
    pub fn add_trusted_issuer(&self, did: &Did) {
        self.trusted_issuers.insert(did.to_string());
    }

    /// Remove a trusted issuer.
    pub fn remove_trusted_issuer(&self, did: &Did) -> bool {
        self.trusted_issuers.remove(did.uri()).is_some()
    }

    /// Check if an issuer passes the allowlist.
    pub fn is_trusted_issuer(&self, did: &str) -> bool {
        self.trusted_issuers.is_empty() || self.trusted_issuers.contains(did)
    }

    pub fn repository(&self) -> &Arc<dyn CredentialRepository> {
        &self.repository
    }

    /// Fetch a stored credential by URI.
    pub async fn fetch(&self, uri: &str) -> Result<Option<Credential>, CredentialError> {
        let repository = self.repository.clone();
        let found = call_provider(&self.policy, "credentials.fetch", || {
            let repository = repository.clone();
            let uri = uri.to_string();
            async move { repository.fetch(&uri).await }
        })
        .await?;
        Ok(found)
    }

    /// Stored credentials about `subject_id` carrying `credential_type`,
    /// newest issuance first.
    pub async fn scan_subject(
        &self,
        subject_id: &str,
        credential_type: &str,
    ) -> Result<Vec<(String, Credential)>, CredentialError> {
        let repository = self.repository.clone();
        let mut found = call_provider(&self.policy, "credentials.scan_subject", || {
            let repository = repository.clone();
            let subject_id = subject_id.to_string();
            async move { repository.scan_subject(&subject_id).await }
        })
        .await?;
        found.retain(|(_, c)| c.has_type(credential_type));
        found.sort_by(|(_, a), (_, b)| b.issuance_date.cmp(&a.issuance_date));
        Ok(found)
    }

    /// Resolve `uri` through the repository and verify what it points at.
    pub async fn verify_uri(
        &self,
        uri: &str,
        requirements: &RequirementSpec,
    ) -> Result<VerificationResult, CredentialError> {
        match self.fetch(uri).await {
            Ok(Some(credential)) => self.verify(&credential, requirements).await,
            Ok(None) => Ok(self.fail(
                FailureReason::NotFound,
                format!("no credential stored at {uri}"),
                VerificationMetadata::new(Rail::Credential),
            )),
            Err(CredentialError::Provider(ProviderError::Timeout { operation, after_ms })) => {
                Ok(self.fail(
                    FailureReason::ProviderTimeout,
                    format!("{operation} timed out after {after_ms}ms"),
                    VerificationMetadata::new(Rail::Credential),
                ))
            }
            Err(e) => Err(e),
        }
    }

    /// Verify a credential document against `requirements`.
    ///
    /// Failed checks come back as `Ok` with `valid == false`. `Err` is
    /// reserved for an unreachable revocation registry.
    pub async fn verify(
        &self,
        credential: &Credential,
        requirements: &RequirementSpec,
    ) -> Result<VerificationResult, CredentialError> {
        let (asset, amount) = credential.asserted_funds();
        let mut metadata = VerificationMetadata::new(Rail::Credential);
        metadata.subject = Some(credential.subject_id().to_string());
        metadata.amount = amount.copied();
        metadata.currency = asset.map(str::to_string);
        metadata.details = serde_json::to_value(&credential.credential_subject)?;

        // 1. Signature
        if let Err(detail) = self.check_signature(credential) {
            return Ok(self.fail(FailureReason::InvalidSignature, detail, metadata));
        }

        // 2. Issuer allowlist
        if !self.is_trusted_issuer(&credential.issuer.id) {
            return Ok(self.fail(
                FailureReason::UntrustedIssuer,
                format!("issuer {} is not trusted", credential.issuer.id),
                metadata,
            ));
        }

        // 3. Expiry
        let now = self.clock.now();
        if credential.is_expired_at(now) {
            let expired_at = credential.expiration_date.unwrap_or(now);
            return Ok(self.fail(
                FailureReason::Expired,
                format!("credential expired at {}", expired_at.to_rfc3339()),
                metadata,
            ));
        }

        // 4. Revocation
        if let Some(status_id) = credential.status_id() {
            let revocations = self.revocations.clone();
            let lookup = call_provider(&self.policy, "revocation.is_revoked", || {
                let revocations = revocations.clone();
                let status_id = status_id.to_string();
                async move { revocations.is_revoked(&status_id).await }
            })
            .await;
            match lookup {
                Ok(true) => {
                    return Ok(self.fail(
                        FailureReason::Revoked,
                        format!("credential {} has been revoked", credential.id),
                        metadata,
                    ))
                }
                Ok(false) => {}
                Err(e @ ProviderError::Timeout { .. }) => {
                    return Ok(self.fail(FailureReason::ProviderTimeout, e.to_string(), metadata))
                }
                Err(e) => return Err(e.into()),
            }
        }

        // 5. Requirements
        if let Err(mismatch) = requirements.check(asset, amount) {
            return Ok(self.fail(
                FailureReason::RequirementMismatch,
                mismatch.to_string(),
                metadata,
            ));
        }

        tracing::info!(
            credential_id = %credential.id,
            issuer = %credential.issuer.id,
            subject = %credential.subject_id(),
            "credential verified"
        );

        Ok(VerificationResult::success(
            credential.claim_summaries(),
            Some(credential.issuer.id.clone()),
            credential.expiration_date,
            now,
            metadata,
        ))
    }

    fn check_signature(&self, credential: &Credential) -> Result<(), String> {
        let proof = credential
            .proof
            .as_ref()
            .ok_or_else(|| "credential carries no proof".to_string())?;
        let value = credential.signing_value().map_err(|e| e.to_string())?;
        let signer = recover_signer(&self.domain, &credential_schema(), &value, &proof.proof_value)
            .map_err(|e| e.to_string())?;
        let signer_did = Did::for_address(&signer);
        if signer_did.uri() != credential.issuer.id {
            return Err(format!(
                "signer {} does not match claimed issuer {}",
                signer_did, credential.issuer.id
            ));
        }
        Ok(())
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
