//! Integration test: consent lifecycle and consent-gated assertions.

use chrono::Duration;
use std::collections::BTreeSet;

use attesta_assertions::{verify_assertion_signature, AssertionError, AssertionQuery};
use attesta_core::{Amount, AssertionKind, ConsentScope, ProofReference};
use attesta_credentials::{CredentialRepository, DeviceFacts, KycFacts};
use attesta_integration_tests::{did, domain, signer, Harness, ALICE};

const BANK: &str = "acme-bank";

fn scopes(list: &[ConsentScope]) -> BTreeSet<ConsentScope> {
    list.iter().copied().collect()
}

// =========================================================================
// Consent
// =========================================================================

#[tokio::test]
async fn test_grant_lapses_after_ttl_without_revoke() {
    let h = Harness::new();
    h.consent
        .grant(ALICE, BANK, scopes(&[ConsentScope::KycStatus]), Duration::hours(1))
        .await
        .unwrap();
    assert!(h
        .consent
        .has_consent(ALICE, BANK, ConsentScope::KycStatus)
        .await
        .unwrap());

    h.clock.advance(Duration::hours(1));
    assert!(!h
        .consent
        .has_consent(ALICE, BANK, ConsentScope::KycStatus)
        .await
        .unwrap());
    assert!(h.consent.effective_grants(ALICE).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_revoke_all_clears_every_scope_for_that_requester() {
    let h = Harness::new();
    h.consent
        .grant(
            ALICE,
            BANK,
            scopes(&[ConsentScope::KycStatus, ConsentScope::BalanceVerification]),
            Duration::days(30),
        )
        .await
        .unwrap();
    h.consent
        .grant(ALICE, BANK, scopes(&[ConsentScope::DeviceAttestation]), Duration::days(1))
        .await
        .unwrap();
    h.consent
        .grant(ALICE, "acme-exchange", scopes(&[ConsentScope::KycStatus]), Duration::days(1))
        .await
        .unwrap();

    let outcome = h.consent.revoke(ALICE, BANK, None).await.unwrap();
    assert_eq!(outcome.affected_grants, 2);

    for scope in ConsentScope::ALL {
        assert!(!h.consent.has_consent(ALICE, BANK, scope).await.unwrap());
    }
    assert!(h
        .consent
        .has_consent(ALICE, "acme-exchange", ConsentScope::KycStatus)
        .await
        .unwrap());
}

// =========================================================================
// Assertions
// =========================================================================

#[tokio::test]
async fn test_kyc_assertion_end_to_end() {
    let h = Harness::new();
    let credential = h
        .issuer
        .issue_kyc(
            &did(ALICE),
            &KycFacts {
                verified: true,
                sanctions_cleared: true,
                level: "enhanced".into(),
                provider: "acme-kyc".into(),
                jurisdiction: Some("PT".into()),
                checked_at: None,
            },
        )
        .unwrap();
    let uri = h.repository.store(&credential).await.unwrap();

    let refused = h.assertions.assert(ALICE, BANK, &AssertionQuery::HasKyc).await;
    match refused {
        Err(AssertionError::ConsentRequired(remediation)) => {
            assert_eq!(remediation.required_scope, ConsentScope::KycStatus);
            assert!(remediation.consent_url.contains("scope=kyc_status"));
        }
        other => panic!("expected a consent refusal, got {other:?}"),
    }

    h.consent
        .grant(ALICE, BANK, scopes(&[ConsentScope::KycStatus]), Duration::days(1))
        .await
        .unwrap();
    let assertion = h
        .assertions
        .assert(ALICE, BANK, &AssertionQuery::HasKyc)
        .await
        .unwrap();

    assert_eq!(assertion.assertion_name, AssertionKind::HasKyc);
    assert!(assertion.result);
    assert_eq!(assertion.valid_until - assertion.issued_at, Duration::hours(24));
    match &assertion.proof {
        Some(ProofReference::Credential { uri: proof_uri, .. }) => assert_eq!(proof_uri, &uri),
        other => panic!("expected a credential proof, got {other:?}"),
    }

    let signer_address = verify_assertion_signature(&domain(), &assertion).unwrap();
    assert_eq!(signer_address, signer(domain()).address());

    let mut flipped = assertion.clone();
    flipped.result = false;
    let recovered = verify_assertion_signature(&domain(), &flipped);
    assert!(recovered.map_or(true, |address| address != signer_address));
}

#[tokio::test]
async fn test_balance_assertion_prefers_ledger_and_respects_threshold() {
    let h = Harness::new();
    h.ledger.upsert(h.usdc_token("tok-1", "50000.00", ALICE));
    h.consent
        .grant(
            ALICE,
            BANK,
            scopes(&[ConsentScope::BalanceVerification]),
            Duration::days(1),
        )
        .await
        .unwrap();

    let enough = h
        .assertions
        .assert(
            ALICE,
            BANK,
            &AssertionQuery::HasBalance {
                min_amount: Some(Amount::whole(10_000)),
                asset: Some("USDC".into()),
            },
        )
        .await
        .unwrap();
    assert!(enough.result);
    assert_eq!(
        enough.proof,
        Some(ProofReference::Token {
            token_id: "tok-1".into()
        })
    );
    assert_eq!(enough.valid_until - enough.issued_at, Duration::minutes(5));

    let too_much = h
        .assertions
        .assert(
            ALICE,
            BANK,
            &AssertionQuery::HasBalance {
                min_amount: Some(Amount::whole(60_000)),
                asset: Some("USDC".into()),
            },
        )
        .await
        .unwrap();
    assert!(!too_much.result);
    assert!(too_much.proof.is_none());
}

#[tokio::test]
async fn test_device_assertion_tracks_credential_lifetime() {
    let h = Harness::new();
    let credential = h
        .issuer
        .issue_device_attestation(
            &did(ALICE),
            &DeviceFacts {
                device_id: "pixel-9".into(),
                platform: "android".into(),
                integrity_level: 3,
                secure_boot: true,
                os_version: Some("15".into()),
                attested_at: None,
            },
        )
        .unwrap();
    h.repository.store(&credential).await.unwrap();
    h.consent
        .grant(
            ALICE,
            BANK,
            scopes(&[ConsentScope::DeviceAttestation]),
            Duration::days(30),
        )
        .await
        .unwrap();

    let query = AssertionQuery::IsDeviceCompliant { required_level: 2 };
    assert!(h.assertions.assert(ALICE, BANK, &query).await.unwrap().result);

    let strict = AssertionQuery::IsDeviceCompliant { required_level: 4 };
    assert!(!h.assertions.assert(ALICE, BANK, &strict).await.unwrap().result);

    // Device credentials last a week.
    h.clock.advance(Duration::days(8));
    assert!(!h.assertions.assert(ALICE, BANK, &query).await.unwrap().result);
}
