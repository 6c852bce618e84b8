//! Shared state handed to every HTTP handler.

use std::sync::Arc;

use attesta_assertions::AssertionEngine;
use attesta_consent::{ConsentStore, GrantRepository, InMemoryGrantRepository};
use attesta_core::{SharedClock, ValidityWindows};
use attesta_credentials::{
    CredentialIssuer, CredentialRepository, CredentialVerifier, DualRailValidator,
    InMemoryCredentialRepository, InMemoryLedger, InMemoryRevocationRegistry, KycProvider,
    LedgerRegistry, RevocationRegistry, TokenVerifier,
};
use attesta_crypto::{KeyPair, TypedDataSigner};

use crate::auth::ApiKeys;
use crate::config::AttestaConfig;

/// The repositories and external registries the services run against.
#[derive(Clone)]
pub struct Backends {
    pub credentials: Arc<dyn CredentialRepository>,
    pub revocations: Arc<dyn RevocationRegistry>,
    pub grants: Arc<dyn GrantRepository>,
    pub ledger: Arc<dyn LedgerRegistry>,
    pub kyc: Option<Arc<dyn KycProvider>>,
}

impl Backends {
    /// Empty in-memory backends with no KYC provider.
    pub fn in_memory() -> Self {
        Self {
            credentials: Arc::new(InMemoryCredentialRepository::new()),
            revocations: Arc::new(InMemoryRevocationRegistry::new()),
            grants: Arc::new(InMemoryGrantRepository::new()),
            ledger: Arc::new(InMemoryLedger::new()),
            kyc: None,
        }
    }
}

/// Services wired from one configuration.
pub struct AppState {
    pub issuer: CredentialIssuer,
    pub verifier: Arc<CredentialVerifier>,
    pub tokens: Arc<TokenVerifier>,
    pub dual_rail: DualRailValidator,
    pub consent: Arc<ConsentStore>,
    pub assertions: AssertionEngine,
    pub revocations: Arc<dyn RevocationRegistry>,
    pub api_keys: Arc<ApiKeys>,
    pub validity: ValidityWindows,
    pub clock: SharedClock,
}

impl AppState {
    /// Wire every service. Without `signing_key` the node still verifies and
    /// answers unsigned assertions, but refuses to issue credentials.
    pub fn build(
        config: &AttestaConfig,
        backends: Backends,
        signing_key: Option<KeyPair>,
        clock: SharedClock,
    ) -> anyhow::Result<Self> {
        let domain = config.signing_domain();
        let policy = config.providers.policy.clone();

        let verifier = Arc::new(CredentialVerifier::new(
            domain.clone(),
            backends.revocations.clone(),
            backends.credentials.clone(),
            policy.clone(),
            clock.clone(),
        ));
        for did in config.trusted_issuers()? {
            verifier.add_trusted_issuer(&did);
        }

        let tokens = Arc::new(TokenVerifier::new(
            backends.ledger.clone(),
            policy.clone(),
            clock.clone(),
        ));
        let dual_rail = DualRailValidator::new(verifier.clone(), tokens.clone());
        let consent = Arc::new(ConsentStore::new(backends.grants.clone(), clock.clone()));

        let (issuer_signer, assertion_signer) = match &signing_key {
            Some(key) => {
                let seed = key.secret_bytes();
                (
                    Some(TypedDataSigner::new(domain.clone(), KeyPair::from_seed(&seed))),
                    Some(TypedDataSigner::new(domain.clone(), KeyPair::from_seed(&seed))),
                )
            }
            None => (None, None),
        };

        let issuer = CredentialIssuer::new(
            config.signing.issuer_name.clone(),
            issuer_signer,
            config.validity.clone(),
            clock.clone(),
        );
        match issuer.did() {
            Ok(did) => tracing::info!(issuer = %did, "credential issuance enabled"),
            Err(_) => tracing::warn!("no signing key configured, credential issuance disabled"),
        }

        let mut assertions = AssertionEngine::new(
            consent.clone(),
            verifier.clone(),
            tokens.clone(),
            config.validity.clone(),
            clock.clone(),
        );
        if let Some(kyc) = backends.kyc.clone() {
            assertions = assertions.with_kyc_provider(kyc, policy);
        }
        if let Some(signer) = assertion_signer {
            assertions = assertions.with_signer(signer);
        }

        Ok(Self {
            issuer,
            verifier,
            tokens,
            dual_rail,
            consent,
            assertions,
            revocations: backends.revocations,
            api_keys: Arc::new(ApiKeys::new(config.auth.api_keys.clone())),
            validity: config.validity.clone(),
            clock,
        })
    }
}
