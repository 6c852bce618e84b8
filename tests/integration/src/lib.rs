//! Shared fixtures for the cross-crate scenario tests.
//!
//! A [`Harness`] wires every service against in-memory adapters and one
//! [`ManualClock`], so scenarios can move time forward explicitly.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use attesta_assertions::AssertionEngine;
use attesta_consent::{ConsentStore, InMemoryGrantRepository};
use attesta_core::{
    Amount, Clock, ComplianceFlags, Did, ManualClock, SharedClock, TokenRecord, ValidityWindows,
};
use attesta_credentials::{
    Credential, CredentialIssuer, CredentialRepository, CredentialVerifier, CredentialError,
    DualRailValidator, InMemoryCredentialRepository, InMemoryLedger, InMemoryRevocationRegistry,
    ProofOfFundsFacts, ProviderPolicy, TokenVerifier,
};
use attesta_crypto::{KeyPair, SigningDomain, TypedDataSigner};

pub const ISSUER_SEED: [u8; 32] = [42u8; 32];
pub const ALICE: &str = "did:key:alice";

/// The deployment every harness signs and verifies under.
pub fn domain() -> SigningDomain {
    SigningDomain::new(
        "Attesta",
        "1",
        1,
        "0x00000000000000000000000000000000000000aa",
    )
}

pub fn signer(domain: SigningDomain) -> TypedDataSigner {
    TypedDataSigner::new(domain, KeyPair::from_seed(&ISSUER_SEED))
}

pub fn did(uri: &str) -> Did {
    Did::new(uri).expect("fixture DIDs are well formed")
}

/// Every service wired against in-memory adapters.
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub issuer: CredentialIssuer,
    pub repository: Arc<InMemoryCredentialRepository>,
    pub revocations: Arc<InMemoryRevocationRegistry>,
    pub ledger: Arc<InMemoryLedger>,
    pub verifier: Arc<CredentialVerifier>,
    pub tokens: Arc<TokenVerifier>,
    pub dual_rail: DualRailValidator,
    pub consent: Arc<ConsentStore>,
    pub assertions: AssertionEngine,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    pub fn new() -> Self {
        let clock = ManualClock::starting_now();
        let shared: SharedClock = clock.clone();
        let policy = ProviderPolicy::default();
        let windows = ValidityWindows::default();

        let repository = Arc::new(InMemoryCredentialRepository::new());
        let revocations = Arc::new(InMemoryRevocationRegistry::new());
        let ledger = Arc::new(InMemoryLedger::new());

        let issuer = CredentialIssuer::new(
            "Acme Custody",
            Some(signer(domain())),
            windows.clone(),
            shared.clone(),
        );
        let verifier = Arc::new(CredentialVerifier::new(
            domain(),
            revocations.clone(),
            repository.clone(),
            policy.clone(),
            shared.clone(),
        ));
        let tokens = Arc::new(TokenVerifier::new(ledger.clone(), policy, shared.clone()));
        let dual_rail = DualRailValidator::new(verifier.clone(), tokens.clone());
        let consent = Arc::new(ConsentStore::new(
            Arc::new(InMemoryGrantRepository::new()),
            shared.clone(),
        ));
        let assertions = AssertionEngine::new(
            consent.clone(),
            verifier.clone(),
            tokens.clone(),
            windows,
            shared,
        )
        .with_signer(signer(domain()));

        Self {
            clock,
            issuer,
            repository,
            revocations,
            ledger,
            verifier,
            tokens,
            dual_rail,
            consent,
            assertions,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// USDC proof-of-funds facts expiring in 30 days, fully compliant.
    pub fn usdc_facts(&self, amount: &str) -> ProofOfFundsFacts {
        ProofOfFundsFacts {
            asset_type: "USDC".into(),
            amount: Amount::parse(amount).expect("fixture amounts parse"),
            expiry: self.clock.now() + Duration::days(30),
            kyc_compliant: true,
            sanctions_cleared: true,
            token_id: None,
            custodian: Some("Acme Custody".into()),
            audit_hash: Some("blake3:00ff".into()),
        }
    }

    /// A compliant USDC ledger token expiring in 30 days.
    pub fn usdc_token(&self, id: &str, amount: &str, holder: &str) -> TokenRecord {
        TokenRecord {
            id: id.into(),
            asset_type: "USDC".into(),
            amount: Amount::parse(amount).expect("fixture amounts parse"),
            holder_address: holder.into(),
            expiry: (self.clock.now() + Duration::days(30)).timestamp(),
            compliance_flags: ComplianceFlags {
                kyc: true,
                sanctions: true,
            },
            custodian: Some("Acme Custody".into()),
            audit_hash: None,
            valid: true,
        }
    }

    /// Issue a proof-of-funds credential and store it, returning its URI.
    pub async fn issue_pof(
        &self,
        holder: &str,
        facts: &ProofOfFundsFacts,
    ) -> Result<(String, Credential), CredentialError> {
        let credential = self.issuer.issue_proof_of_funds(&did(holder), facts)?;
        let uri = self.repository.store(&credential).await?;
        Ok((uri, credential))
    }
}
