use serde_json::{json, Value};

use attesta_core::Assertion;
use attesta_crypto::{recover_signer, CryptoError, FieldKind, SigningDomain, TypeSchema};

pub const ASSERTION_PRIMARY_TYPE: &str = "Assertion";

/// Typed-data layout of a signed assertion. Metadata is informational and
/// not covered.
pub fn assertion_schema() -> TypeSchema {
    TypeSchema::new(ASSERTION_PRIMARY_TYPE)
        .field("id", FieldKind::String)
        .field("assertionName", FieldKind::String)
        .field("subjectId", FieldKind::String)
        .field("requester", FieldKind::String)
        .field("result", FieldKind::Bool)
        .optional_field("proof", FieldKind::Object)
        .field("issuedAt", FieldKind::Timestamp)
        .field("validUntil", FieldKind::Timestamp)
}

pub(crate) fn signing_value(assertion: &Assertion) -> Result<Value, CryptoError> {
    let proof = serde_json::to_value(&assertion.proof)
        .map_err(|e| CryptoError::InvalidInput(e.to_string()))?;
    Ok(json!({
        "id": assertion.id,
        "assertionName": assertion.assertion_name.name(),
        "subjectId": assertion.subject_id,
        "requester": assertion.requester,
        "result": assertion.result,
        "proof": proof,
        "issuedAt": assertion.issued_at.to_rfc3339(),
        "validUntil": assertion.valid_until.to_rfc3339(),
    }))
}

/// Re-check an assertion's signature and return the signer address.
pub fn verify_assertion_signature(
    domain: &SigningDomain,
    assertion: &Assertion,
) -> Result<String, CryptoError> {
    let signature = assertion
        .signature
        .as_deref()
        .ok_or_else(|| CryptoError::MissingField("signature".into()))?;
    recover_signer(domain, &assertion_schema(), &signing_value(assertion)?, signature)
}
