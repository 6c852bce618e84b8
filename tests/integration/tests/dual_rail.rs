//! Integration test: dual-rail cross-validation of a credential and a ledger token.

use chrono::Duration;

use attesta_core::{Amount, FailureReason, RequirementSpec};
use attesta_credentials::CredentialError;
use attesta_integration_tests::{Harness, ALICE};

fn usdc_at_least(amount: u64) -> RequirementSpec {
    RequirementSpec::new(Some("USDC".into()), Some(Amount::whole(amount)))
}

#[tokio::test]
async fn test_agreeing_rails_pass() {
    let h = Harness::new();
    h.ledger.upsert(h.usdc_token("tok-1", "50000.00", ALICE));
    let (uri, _) = h.issue_pof(ALICE, &h.usdc_facts("50000.00")).await.unwrap();

    let result = h
        .dual_rail
        .verify_dual_refs(Some(&uri), Some("tok-1"), &usdc_at_least(10_000))
        .await
        .unwrap();
    assert!(result.valid);
    assert!(result.cross_validation.both_valid);
    assert!(result.cross_validation.amount_match);
    assert!(result.cross_validation.currency_match);
}

#[tokio::test]
async fn test_amounts_compare_by_value_not_scale() {
    let h = Harness::new();
    h.ledger.upsert(h.usdc_token("tok-1", "50000", ALICE));
    let (uri, _) = h.issue_pof(ALICE, &h.usdc_facts("50000.00")).await.unwrap();

    let result = h
        .dual_rail
        .verify_dual_refs(Some(&uri), Some("tok-1"), &RequirementSpec::default())
        .await
        .unwrap();
    assert!(result.cross_validation.amount_match);
    assert!(result.valid);
}

#[tokio::test]
async fn test_mutated_token_amount_breaks_agreement() {
    let h = Harness::new();
    h.ledger.upsert(h.usdc_token("tok-1", "50000.00", ALICE));
    let (uri, credential) = h.issue_pof(ALICE, &h.usdc_facts("50000.00")).await.unwrap();

    // The ledger now reports a different balance; the credential is untouched.
    h.ledger.upsert(h.usdc_token("tok-1", "49999.99", ALICE));

    let result = h
        .dual_rail
        .verify_dual(
            Some(&credential),
            h.tokens.fetch("tok-1").await.unwrap().as_ref(),
            &usdc_at_least(10_000),
        )
        .await
        .unwrap();
    assert!(result.cross_validation.both_valid);
    assert!(!result.cross_validation.amount_match);
    assert!(!result.valid);

    // Resolving by reference gives the same verdict.
    let by_ref = h
        .dual_rail
        .verify_dual_refs(Some(&uri), Some("tok-1"), &usdc_at_least(10_000))
        .await
        .unwrap();
    assert!(!by_ref.valid);
}

#[tokio::test]
async fn test_currency_disagreement_fails() {
    let h = Harness::new();
    let mut token = h.usdc_token("tok-1", "50000.00", ALICE);
    token.asset_type = "USDT".into();
    h.ledger.upsert(token);
    let (uri, _) = h.issue_pof(ALICE, &h.usdc_facts("50000.00")).await.unwrap();

    let result = h
        .dual_rail
        .verify_dual_refs(Some(&uri), Some("tok-1"), &RequirementSpec::default())
        .await
        .unwrap();
    assert!(result.cross_validation.amount_match);
    assert!(!result.cross_validation.currency_match);
    assert!(!result.valid);
}

#[tokio::test]
async fn test_one_failing_rail_fails_the_pair() {
    let h = Harness::new();
    let mut token = h.usdc_token("tok-1", "50000.00", ALICE);
    token.valid = false;
    h.ledger.upsert(token);
    let (uri, _) = h.issue_pof(ALICE, &h.usdc_facts("50000.00")).await.unwrap();

    let result = h
        .dual_rail
        .verify_dual_refs(Some(&uri), Some("tok-1"), &RequirementSpec::default())
        .await
        .unwrap();
    assert!(result.credential.valid);
    assert!(!result.token.valid);
    assert_eq!(result.token.reason, Some(FailureReason::Revoked));
    assert!(!result.cross_validation.both_valid);
    assert!(!result.valid);
}

#[tokio::test]
async fn test_expired_credential_fails_the_pair() {
    let h = Harness::new();
    let (uri, _) = h.issue_pof(ALICE, &h.usdc_facts("50000.00")).await.unwrap();
    h.clock.advance(Duration::days(31));
    // Token issued after the jump so only the credential is stale.
    h.ledger.upsert(h.usdc_token("tok-1", "50000.00", ALICE));

    let result = h
        .dual_rail
        .verify_dual_refs(Some(&uri), Some("tok-1"), &RequirementSpec::default())
        .await
        .unwrap();
    assert_eq!(result.credential.reason, Some(FailureReason::Expired));
    assert!(result.token.valid);
    assert!(!result.valid);
}

#[tokio::test]
async fn test_missing_rail_is_incomplete_not_single_rail() {
    let h = Harness::new();
    h.ledger.upsert(h.usdc_token("tok-1", "50000.00", ALICE));
    let (uri, _) = h.issue_pof(ALICE, &h.usdc_facts("50000.00")).await.unwrap();

    let no_token = h
        .dual_rail
        .verify_dual_refs(Some(&uri), None, &RequirementSpec::default())
        .await;
    assert!(matches!(no_token, Err(CredentialError::IncompleteDualRail(_))));

    let no_credential = h
        .dual_rail
        .verify_dual_refs(None, Some("tok-1"), &RequirementSpec::default())
        .await;
    assert!(matches!(no_credential, Err(CredentialError::IncompleteDualRail(_))));
}
