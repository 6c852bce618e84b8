use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use attesta_consent::ConsentStore;
use attesta_core::{
    Assertion, AssertionKind, FailureReason, ProofReference, RequirementSpec, SharedClock,
    ValidityWindows, VerificationResult,
};
use attesta_credentials::credential::{DEVICE_ATTESTATION_TYPE, KYC_TYPE, PROOF_OF_FUNDS_TYPE};
use attesta_credentials::{
    call_provider, Credential, CredentialError, CredentialVerifier, KycProvider, ProviderError,
    ProviderPolicy, TokenVerifier,
};
use attesta_crypto::TypedDataSigner;

use crate::error::{AssertionError, ConsentRemediation};
use crate::query::AssertionQuery;
use crate::signing::{assertion_schema, signing_value};

/// Where a subject goes to grant consent.
const DEFAULT_CONSENT_URL: &str = "/consent/grant";

/// What a fact source said, before it is wrapped into an [`Assertion`].
struct Finding {
    result: bool,
    proof: Option<ProofReference>,
    metadata: Value,
    /// False when a provider could not answer in time. Such answers are
    /// valid for no time at all.
    conclusive: bool,
    /// When the backing credential or token stops being valid.
    expires_at: Option<DateTime<Utc>>,
}

impl Finding {
    fn unsubstantiated(last_failure: Option<&VerificationResult>) -> Self {
        Self {
            result: false,
            proof: None,
            metadata: json!({
                "source": Value::Null,
                "lastFailure": last_failure.and_then(|r| r.reason),
            }),
            conclusive: true,
            expires_at: None,
        }
    }

    fn timed_out(detail: String) -> Self {
        Self {
            result: false,
            proof: None,
            metadata: json!({
                "failure": FailureReason::ProviderTimeout,
                "detail": detail,
            }),
            conclusive: false,
            expires_at: None,
        }
    }

    fn from_credential(result: bool, uri: String, credential: &Credential, metadata: Value) -> Self {
        Self {
            result,
            proof: Some(ProofReference::Credential {
                uri,
                credential_id: credential.id.clone(),
            }),
            metadata,
            conclusive: true,
            expires_at: credential.expiration_date,
        }
    }
}

/// Splits provider timeouts off into a finding; every other error propagates.
fn settle<T>(outcome: Result<T, CredentialError>) -> Result<Result<T, Finding>, AssertionError> {
    match outcome {
        Ok(value) => Ok(Ok(value)),
        Err(CredentialError::Provider(e @ ProviderError::Timeout { .. })) => {
            Ok(Err(Finding::timed_out(e.to_string())))
        }
        Err(e) => Err(e.into()),
    }
}

/// Answers consent-gated questions about a subject.
///
/// Every answer is checked against the consent store first, then resolved
/// against the credential repository, the ledger or a KYC provider, and
/// finally stamped with a validity window sized to the fact's volatility.
/// The engine holds no per-request state and is safe to share.
pub struct AssertionEngine {
    consent: Arc<ConsentStore>,
    credentials: Arc<CredentialVerifier>,
    tokens: Arc<TokenVerifier>,
    kyc: Option<Arc<dyn KycProvider>>,
    policy: ProviderPolicy,
    windows: ValidityWindows,
    signer: Option<TypedDataSigner>,
    consent_url: String,
    clock: SharedClock,
}

impl AssertionEngine {
    pub fn new(
        consent: Arc<ConsentStore>,
        credentials: Arc<CredentialVerifier>,
        tokens: Arc<TokenVerifier>,
        windows: ValidityWindows,
        clock: SharedClock,
    ) -> Self {
        Self {
            consent,
            credentials,
            tokens,
            kyc: None,
            policy: ProviderPolicy::default(),
            windows,
            signer: None,
            consent_url: DEFAULT_CONSENT_URL.to_string(),
            clock,
        }
    }

    /// Fall back to `provider` when no KYC credential verifies.
    pub fn with_kyc_provider(mut self, provider: Arc<dyn KycProvider>, policy: ProviderPolicy) -> Self {
        self.kyc = Some(provider);
        self.policy = policy;
        self
    }

    /// Sign every assertion with `signer`.
    pub fn with_signer(mut self, signer: TypedDataSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_consent_url(mut self, url: impl Into<String>) -> Self {
        self.consent_url = url.into();
        self
    }

    pub fn window_for(&self, kind: AssertionKind) -> Duration {
        match kind {
            AssertionKind::HasKyc => self.windows.has_kyc(),
            AssertionKind::HasBalance => self.windows.has_balance(),
            AssertionKind::IsDeviceCompliant => self.windows.is_device_compliant(),
        }
    }

    /// Answer `query` about `subject_id` on behalf of `requester`.
    pub async fn assert(
        &self,
        subject_id: &str,
        requester: &str,
        query: &AssertionQuery,
    ) -> Result<Assertion, AssertionError> {
        if subject_id.is_empty() || requester.is_empty() {
            return Err(AssertionError::InvalidParameters(
                "subject and requester must be non-empty".into(),
            ));
        }

        let kind = query.kind();
        let scope = kind.required_scope();
        if !self.consent.has_consent(subject_id, requester, scope).await? {
            tracing::warn!(
                assertion = %kind,
                subject = %subject_id,
                requester = %requester,
                scope = %scope,
                "assertion refused: consent required"
            );
            return Err(AssertionError::ConsentRequired(Box::new(ConsentRemediation {
                consent_url: format!(
                    "{}?userId={subject_id}&grantedTo={requester}&scope={scope}",
                    self.consent_url
                ),
                required_scope: scope,
                subject_id: subject_id.to_string(),
                requester: requester.to_string(),
            })));
        }

        let finding = match query {
            AssertionQuery::HasKyc => self.kyc_finding(subject_id).await?,
            AssertionQuery::HasBalance { .. } => {
                self.balance_finding(subject_id, &query.balance_requirements())
                    .await?
            }
            AssertionQuery::IsDeviceCompliant { required_level } => {
                self.device_finding(subject_id, *required_level).await?
            }
        };

        let issued_at = self.clock.now();
        let valid_until = if finding.conclusive {
            let window_end = issued_at + self.window_for(kind);
            finding
                .expires_at
                .map_or(window_end, |expiry| window_end.min(expiry))
        } else {
            issued_at
        };

        let mut metadata = finding.metadata;
        if let Value::Object(map) = &mut metadata {
            map.insert("parameters".into(), query.parameters());
        }

        let mut assertion = Assertion {
            id: Uuid::now_v7().to_string(),
            assertion_name: kind,
            subject_id: subject_id.to_string(),
            requester: requester.to_string(),
            result: finding.result,
            proof: finding.proof,
            metadata,
            issued_at,
            valid_until,
            signature: None,
        };
        if let Some(signer) = &self.signer {
            assertion.signature = Some(signer.sign(&assertion_schema(), &signing_value(&assertion)?)?);
        }

        tracing::info!(
            assertion_id = %assertion.id,
            assertion = %kind,
            subject = %subject_id,
            requester = %requester,
            result = assertion.result,
            proof = ?assertion.proof.as_ref().map(ToString::to_string),
            "assertion issued"
        );
        Ok(assertion)
    }

    async fn kyc_finding(&self, subject_id: &str) -> Result<Finding, AssertionError> {
        let candidates = match settle(self.credentials.scan_subject(subject_id, KYC_TYPE).await)? {
            Ok(found) => found,
            Err(finding) => return Ok(finding),
        };

        let mut last_failure = None;
        for (uri, credential) in candidates {
            let verification = self
                .credentials
                .verify(&credential, &RequirementSpec::default())
                .await?;
            if !verification.valid {
                last_failure = Some(verification);
                continue;
            }
            let Some(claim) = &credential.credential_subject.kyc else {
                continue;
            };
            let metadata = json!({
                "source": "credential",
                "level": claim.level,
                "provider": claim.provider,
                "jurisdiction": claim.jurisdiction,
                "checkedAt": claim.checked_at,
            });
            return Ok(Finding::from_credential(
                claim.verified && claim.sanctions_cleared,
                uri,
                &credential,
                metadata,
            ));
        }

        let Some(provider) = &self.kyc else {
            return Ok(Finding::unsubstantiated(last_failure.as_ref()));
        };
        let lookup = call_provider(&self.policy, "kyc.verdict", || {
            let provider = provider.clone();
            let subject_id = subject_id.to_string();
            async move { provider.verdict(&subject_id).await }
        })
        .await;

        match lookup {
            Ok(Some(verdict)) => Ok(Finding {
                result: verdict.verified && verdict.sanctions_cleared,
                proof: Some(ProofReference::Provider {
                    provider: provider.provider_id().to_string(),
                    reference: verdict.reference.clone(),
                }),
                metadata: json!({
                    "source": "provider",
                    "level": verdict.level,
                    "jurisdiction": verdict.jurisdiction,
                    "checkedAt": verdict.checked_at,
                }),
                conclusive: true,
                expires_at: None,
            }),
            Ok(None) => Ok(Finding::unsubstantiated(last_failure.as_ref())),
            Err(e @ ProviderError::Timeout { .. }) => Ok(Finding::timed_out(e.to_string())),
            Err(e) => Err(CredentialError::from(e).into()),
        }
    }

    /// Ledger tokens first, proof-of-funds credentials second.
    async fn balance_finding(
        &self,
        subject_id: &str,
        requirements: &RequirementSpec,
    ) -> Result<Finding, AssertionError> {
        let tokens = match settle(self.tokens.held_by(subject_id).await)? {
            Ok(tokens) => tokens,
            Err(finding) => return Ok(finding),
        };

        let mut last_failure = None;
        for token in tokens {
            let verification = self.tokens.verify(&token, requirements);
            if verification.valid {
                return Ok(Finding {
                    result: true,
                    expires_at: DateTime::from_timestamp(token.expiry, 0),
                    proof: Some(ProofReference::Token { token_id: token.id }),
                    metadata: json!({ "source": "token" }),
                    conclusive: true,
                });
            }
            last_failure = Some(verification);
        }

        let candidates =
            match settle(self.credentials.scan_subject(subject_id, PROOF_OF_FUNDS_TYPE).await)? {
                Ok(found) => found,
                Err(finding) => return Ok(finding),
            };
        for (uri, credential) in candidates {
            let verification = self.credentials.verify(&credential, requirements).await?;
            if verification.valid {
                return Ok(Finding::from_credential(
                    true,
                    uri,
                    &credential,
                    json!({ "source": "credential" }),
                ));
            }
            last_failure = Some(verification);
        }

        Ok(Finding::unsubstantiated(last_failure.as_ref()))
    }

    /// The newest verifiable device attestation decides.
    async fn device_finding(
        &self,
        subject_id: &str,
        required_level: u8,
    ) -> Result<Finding, AssertionError> {
        let candidates = match settle(
            self.credentials
                .scan_subject(subject_id, DEVICE_ATTESTATION_TYPE)
                .await,
        )? {
            Ok(found) => found,
            Err(finding) => return Ok(finding),
        };

        let mut last_failure = None;
        for (uri, credential) in candidates {
            let verification = self
                .credentials
                .verify(&credential, &RequirementSpec::default())
                .await?;
            if !verification.valid {
                last_failure = Some(verification);
                continue;
            }
            let Some(claim) = &credential.credential_subject.device_attestation else {
                continue;
            };
            let metadata = json!({
                "source": "credential",
                "platform": claim.platform,
                "integrityLevel": claim.integrity_level,
                "secureBoot": claim.secure_boot,
                "attestedAt": claim.attested_at,
            });
            return Ok(Finding::from_credential(
                claim.integrity_level >= required_level,
                uri,
                &credential,
                metadata,
            ));
        }

        Ok(Finding::unsubstantiated(last_failure.as_ref()))
    }
}
