use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use attesta_core::Amount;
use attesta_crypto::{canonical_json, hash_hex, FieldKind, SigningDomain, TypeSchema};

use crate::error::CredentialError;

pub const W3C_CREDENTIALS_CONTEXT: &str = "https://www.w3.org/2018/credentials/v1";
pub const ATTESTA_CONTEXT: &str = "https://attesta.network/credentials/v1";
pub const BASE_CREDENTIAL_TYPE: &str = "VerifiableCredential";
pub const STATUS_TYPE: &str = "AttestaRevocationList2024";
pub const PROOF_TYPE: &str = "Eip712Ed25519Signature2024";
pub const PROOF_PURPOSE: &str = "assertionMethod";
pub const URI_PREFIX: &str = "attesta://vc/";
pub const STATUS_PREFIX: &str = "attesta://status/";

pub const PROOF_OF_FUNDS_TYPE: &str = "ProofOfFundsCredential";
pub const KYC_TYPE: &str = "KycCredential";
pub const DEVICE_ATTESTATION_TYPE: &str = "DeviceAttestationCredential";

/// Primary type name under which credentials are signed.
pub const SIGNED_PRIMARY_TYPE: &str = "VerifiableCredential";

/// A signed, portable document asserting claims about a subject.
///
/// Immutable once signed. Changing a claim means issuing a new document;
/// the old one stays valid until it is explicitly revoked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    pub id: String,
    #[serde(rename = "type")]
    pub types: Vec<String>,
    pub issuer: IssuerRef,
    pub issuance_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<DateTime<Utc>>,
    pub credential_subject: CredentialSubject,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_status: Option<CredentialStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<CredentialProof>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerRef {
    pub id: String,
    pub name: String,
}

/// Claim payload keyed by claim category. Issued credentials carry exactly one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSubject {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_of_funds: Option<ProofOfFundsClaim>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kyc: Option<KycClaim>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_attestation: Option<DeviceAttestationClaim>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofOfFundsClaim {
    pub asset_type: String,
    pub amount: Amount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,
    pub kyc_compliant: bool,
    pub sanctions_cleared: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custodian: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KycClaim {
    pub verified: bool,
    pub sanctions_cleared: bool,
    pub level: String,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jurisdiction: Option<String>,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceAttestationClaim {
    pub device_id: String,
    pub platform: String,
    /// Higher is stronger. Compared against a requester's required level.
    pub integrity_level: u8,
    pub secure_boot: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    pub attested_at: DateTime<Utc>,
}

/// Pointer into the revocation registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialStatus {
    pub id: String,
    #[serde(rename = "type")]
    pub status_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialProof {
    #[serde(rename = "type")]
    pub proof_type: String,
    pub created: DateTime<Utc>,
    pub proof_purpose: String,
    pub verification_method: String,
    pub proof_value: String,
    pub eip712: Eip712Binding,
}

/// The domain and primary type the proof was produced under. Informational:
/// verifiers check against their own configured domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eip712Binding {
    pub domain: SigningDomain,
    pub primary_type: String,
}

/// Field layout every credential is signed under.
pub fn credential_schema() -> TypeSchema {
    TypeSchema::new(SIGNED_PRIMARY_TYPE)
        .field("@context", FieldKind::StringList)
        .field("id", FieldKind::String)
        .field("type", FieldKind::StringList)
        .field("issuer", FieldKind::Object)
        .field("issuanceDate", FieldKind::Timestamp)
        .optional_field("expirationDate", FieldKind::Timestamp)
        .field("credentialSubject", FieldKind::Object)
        .optional_field("credentialStatus", FieldKind::Object)
}

impl Credential {
    /// The document as signed: everything except `proof`.
    pub fn signing_value(&self) -> Result<serde_json::Value, CredentialError> {
        let mut value = serde_json::to_value(self)?;
        if let Some(object) = value.as_object_mut() {
            object.remove("proof");
        }
        Ok(value)
    }

    /// Content-addressed URI of the signed document.
    pub fn content_uri(&self) -> Result<String, CredentialError> {
        let canonical = canonical_json(self)?;
        Ok(format!("{URI_PREFIX}{}", hash_hex(canonical.as_bytes())))
    }

    pub fn subject_id(&self) -> &str {
        &self.credential_subject.id
    }

    pub fn status_id(&self) -> Option<&str> {
        self.credential_status.as_ref().map(|s| s.id.as_str())
    }

    pub fn has_type(&self, credential_type: &str) -> bool {
        self.types.iter().any(|t| t == credential_type)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date.is_some_and(|exp| exp <= now)
    }

    /// Asset code and amount asserted by the subject, if it is a proof of funds.
    pub fn asserted_funds(&self) -> (Option<&str>, Option<&Amount>) {
        match &self.credential_subject.proof_of_funds {
            Some(pof) => (Some(pof.asset_type.as_str()), Some(&pof.amount)),
            None => (None, None),
        }
    }

    /// Human-readable claims extracted from the subject payload.
    pub fn claim_summaries(&self) -> Vec<String> {
        let subject = &self.credential_subject;
        let mut claims = Vec::new();

        if let Some(pof) = &subject.proof_of_funds {
            claims.push(format!("holds {} {}", pof.amount, pof.asset_type));
            claims.push(format!("KYC compliant: {}", yes_no(pof.kyc_compliant)));
            claims.push(format!("sanctions cleared: {}", yes_no(pof.sanctions_cleared)));
            if let Some(custodian) = &pof.custodian {
                claims.push(format!("custodied by {custodian}"));
            }
            if let Some(token_id) = &pof.token_id {
                claims.push(format!("backed by ledger token {token_id}"));
            }
        }

        if let Some(kyc) = &subject.kyc {
            claims.push(format!(
                "KYC {} at level {} by {}",
                if kyc.verified { "verified" } else { "not verified" },
                kyc.level,
                kyc.provider
            ));
            claims.push(format!("sanctions cleared: {}", yes_no(kyc.sanctions_cleared)));
            if let Some(jurisdiction) = &kyc.jurisdiction {
                claims.push(format!("jurisdiction {jurisdiction}"));
            }
        }

        if let Some(device) = &subject.device_attestation {
            claims.push(format!(
                "device {} ({}) at integrity level {}",
                device.device_id, device.platform, device.integrity_level
            ));
            claims.push(format!("secure boot: {}", yes_no(device.secure_boot)));
        }

        claims
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}
