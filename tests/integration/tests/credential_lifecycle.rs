//! Integration test: credential issuance and single-rail verification.
//!
//! Covers issue → store → resolve → verify, tamper detection, expiry,
//! revocation and re-issuance, using attesta-credentials together with
//! attesta-crypto and attesta-core.

use chrono::Duration;

use attesta_core::{Amount, FailureReason, RequirementSpec};
use attesta_credentials::{CredentialVerifier, RevocationRegistry};
use attesta_crypto::SigningDomain;
use attesta_integration_tests::{Harness, ALICE};

fn usdc_at_least(amount: u64) -> RequirementSpec {
    RequirementSpec::new(Some("USDC".into()), Some(Amount::whole(amount)))
}

/// Change one hex digit of a `0x…` string at `index` from the end.
fn flip_hex_digit(value: &str, index_from_end: usize) -> String {
    let mut chars: Vec<char> = value.chars().collect();
    let i = chars.len() - 1 - index_from_end;
    chars[i] = if chars[i] == '0' { '1' } else { '0' };
    chars.into_iter().collect()
}

// =========================================================================
// End-to-end proof of funds
// =========================================================================

#[tokio::test]
async fn test_proof_of_funds_end_to_end() {
    let h = Harness::new();
    let (uri, credential) = h
        .issue_pof(ALICE, &h.usdc_facts("50000.00"))
        .await
        .expect("issuance should succeed");

    assert!(uri.starts_with("attesta://vc/"));
    assert_eq!(credential.subject_id(), ALICE);
    assert_eq!(
        credential.expiration_date,
        Some(h.now() + Duration::days(30))
    );

    let result = h
        .verifier
        .verify_uri(&uri, &usdc_at_least(10_000))
        .await
        .unwrap();
    assert!(result.valid, "{:?}", result.detail);
    assert_eq!(result.metadata.amount, Some(Amount::parse("50000.00").unwrap()));
    assert_eq!(result.metadata.currency.as_deref(), Some("USDC"));
    assert_eq!(result.issued_by, Some(h.issuer.did().unwrap().to_string()));
    assert!(!result.claims.is_empty());

    let short = h
        .verifier
        .verify_uri(&uri, &RequirementSpec::new(None, Some(Amount::whole(60_000))))
        .await
        .unwrap();
    assert!(!short.valid);
    assert_eq!(short.reason, Some(FailureReason::RequirementMismatch));
    assert!(short.detail.unwrap().contains("shortfall"));
}

#[tokio::test]
async fn test_asset_codes_are_case_sensitive() {
    let h = Harness::new();
    let (uri, _) = h.issue_pof(ALICE, &h.usdc_facts("100")).await.unwrap();

    let lower = RequirementSpec::new(Some("usdc".into()), None);
    let result = h.verifier.verify_uri(&uri, &lower).await.unwrap();
    assert_eq!(result.reason, Some(FailureReason::RequirementMismatch));
}

#[tokio::test]
async fn test_unknown_uri_is_not_found() {
    let h = Harness::new();
    let result = h
        .verifier
        .verify_uri("attesta://vc/deadbeef", &RequirementSpec::default())
        .await
        .unwrap();
    assert!(!result.valid);
    assert_eq!(result.reason, Some(FailureReason::NotFound));
}

// =========================================================================
// Tampering
// =========================================================================

#[tokio::test]
async fn test_any_signature_digit_flip_is_rejected() {
    let h = Harness::new();
    let (_, credential) = h.issue_pof(ALICE, &h.usdc_facts("50000.00")).await.unwrap();
    let proof_value = credential.proof.as_ref().unwrap().proof_value.clone();

    // Digits inside the Ed25519 signature and inside the embedded key.
    for index in [0, 17, 63, 127, 150, 191] {
        let mut tampered = credential.clone();
        tampered.proof.as_mut().unwrap().proof_value = flip_hex_digit(&proof_value, index);
        let result = h
            .verifier
            .verify(&tampered, &RequirementSpec::default())
            .await
            .unwrap();
        assert_eq!(
            result.reason,
            Some(FailureReason::InvalidSignature),
            "flip at {index} was accepted"
        );
    }
}

#[tokio::test]
async fn test_signed_field_mutations_are_rejected() {
    let h = Harness::new();
    let (_, credential) = h.issue_pof(ALICE, &h.usdc_facts("50000.00")).await.unwrap();

    let mut inflated = credential.clone();
    inflated
        .credential_subject
        .proof_of_funds
        .as_mut()
        .unwrap()
        .amount = Amount::parse("500000.00").unwrap();

    let mut reassigned = credential.clone();
    reassigned.credential_subject.id = "did:key:mallory".into();

    let mut extended = credential.clone();
    extended.expiration_date = Some(h.now() + Duration::days(3650));

    let mut renamed = credential.clone();
    renamed.issuer.name = "Someone Else".into();

    for tampered in [inflated, reassigned, extended, renamed] {
        let result = h
            .verifier
            .verify(&tampered, &RequirementSpec::default())
            .await
            .unwrap();
        assert!(!result.valid);
        assert_eq!(result.reason, Some(FailureReason::InvalidSignature));
    }
}

#[tokio::test]
async fn test_signatures_do_not_replay_across_deployments() {
    let h = Harness::new();
    let (_, credential) = h.issue_pof(ALICE, &h.usdc_facts("50000.00")).await.unwrap();

    let other_chain = CredentialVerifier::new(
        SigningDomain::new(
            "Attesta",
            "1",
            137,
            "0x00000000000000000000000000000000000000aa",
        ),
        h.revocations.clone(),
        h.repository.clone(),
        Default::default(),
        h.clock.clone(),
    );
    let result = other_chain
        .verify(&credential, &RequirementSpec::default())
        .await
        .unwrap();
    assert_eq!(result.reason, Some(FailureReason::InvalidSignature));
}

// =========================================================================
// Expiry, revocation, re-issuance
// =========================================================================

#[tokio::test]
async fn test_expired_credential_fails_with_valid_signature() {
    let h = Harness::new();
    let (uri, _) = h.issue_pof(ALICE, &h.usdc_facts("50000.00")).await.unwrap();

    h.clock.advance(Duration::days(30) - Duration::seconds(1));
    assert!(h
        .verifier
        .verify_uri(&uri, &RequirementSpec::default())
        .await
        .unwrap()
        .valid);

    h.clock.advance(Duration::seconds(1));
    let result = h
        .verifier
        .verify_uri(&uri, &RequirementSpec::default())
        .await
        .unwrap();
    assert!(!result.valid);
    assert_eq!(result.reason, Some(FailureReason::Expired));
}

#[tokio::test]
async fn test_revoked_credential_fails_even_if_otherwise_valid() {
    let h = Harness::new();
    let (uri, credential) = h.issue_pof(ALICE, &h.usdc_facts("50000.00")).await.unwrap();

    let status = credential.status_id().expect("issued credentials carry a status");
    assert!(h.revocations.revoke(status).await.unwrap());

    let result = h
        .verifier
        .verify_uri(&uri, &usdc_at_least(10_000))
        .await
        .unwrap();
    assert!(!result.valid);
    assert_eq!(result.reason, Some(FailureReason::Revoked));
}

#[tokio::test]
async fn test_reissuance_is_independent() {
    let h = Harness::new();
    let facts = h.usdc_facts("50000.00");
    let (first_uri, first) = h.issue_pof(ALICE, &facts).await.unwrap();
    h.clock.advance(Duration::seconds(1));
    let (second_uri, second) = h.issue_pof(ALICE, &facts).await.unwrap();

    assert_eq!(first.credential_subject, second.credential_subject);
    assert_ne!(first.id, second.id);
    assert_ne!(first.issuance_date, second.issuance_date);
    assert_ne!(
        first.proof.as_ref().unwrap().proof_value,
        second.proof.as_ref().unwrap().proof_value
    );
    assert_ne!(first_uri, second_uri);

    // Re-issuing does not revoke the earlier document.
    for uri in [&first_uri, &second_uri] {
        let result = h
            .verifier
            .verify_uri(uri, &usdc_at_least(10_000))
            .await
            .unwrap();
        assert!(result.valid);
    }
}
