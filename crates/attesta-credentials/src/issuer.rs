use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use attesta_core::{Amount, Did, SharedClock, TokenRecord, ValidityWindows};
use attesta_crypto::TypedDataSigner;

use crate::credential::{
    credential_schema, Credential, CredentialProof, CredentialStatus, CredentialSubject,
    DeviceAttestationClaim, Eip712Binding, IssuerRef, KycClaim, ProofOfFundsClaim,
    ATTESTA_CONTEXT, BASE_CREDENTIAL_TYPE, DEVICE_ATTESTATION_TYPE, KYC_TYPE,
    PROOF_OF_FUNDS_TYPE, PROOF_PURPOSE, PROOF_TYPE, SIGNED_PRIMARY_TYPE, STATUS_PREFIX,
    STATUS_TYPE, W3C_CREDENTIALS_CONTEXT,
};
use crate::error::CredentialError;

/// Verified source facts for a proof-of-funds credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofOfFundsFacts {
    pub asset_type: String,
    pub amount: Amount,
    pub expiry: DateTime<Utc>,
    pub kyc_compliant: bool,
    pub sanctions_cleared: bool,
    #[serde(default)]
    pub token_id: Option<String>,
    #[serde(default)]
    pub custodian: Option<String>,
    #[serde(default)]
    pub audit_hash: Option<String>,
}

impl ProofOfFundsFacts {
    /// Facts as reported by the ledger for one token.
    pub fn from_token(token: &TokenRecord) -> Result<Self, CredentialError> {
        let expiry = token.expires_at().ok_or_else(|| {
            CredentialError::InvalidInput(format!(
                "token {} has out-of-range expiry {}",
                token.id, token.expiry
            ))
        })?;
        Ok(Self {
            asset_type: token.asset_type.clone(),
            amount: token.amount,
            expiry,
            kyc_compliant: token.compliance_flags.kyc,
            sanctions_cleared: token.compliance_flags.sanctions,
            token_id: Some(token.id.clone()),
            custodian: token.custodian.clone(),
            audit_hash: token.audit_hash.clone(),
        })
    }
}

/// Verified KYC verdict to be attested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KycFacts {
    pub verified: bool,
    pub sanctions_cleared: bool,
    pub level: String,
    pub provider: String,
    #[serde(default)]
    pub jurisdiction: Option<String>,
    /// Defaults to issuance time.
    #[serde(default)]
    pub checked_at: Option<DateTime<Utc>>,
}

/// Device integrity report to be attested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceFacts {
    pub device_id: String,
    pub platform: String,
    pub integrity_level: u8,
    pub secure_boot: bool,
    #[serde(default)]
    pub os_version: Option<String>,
    /// Defaults to issuance time.
    #[serde(default)]
    pub attested_at: Option<DateTime<Utc>>,
}

/// Issues credentials signed with the issuer's typed-data signer.
///
/// Issuing has no side effects: persisting the document is the caller's job.
pub struct CredentialIssuer {
    name: String,
    signer: Option<TypedDataSigner>,
    configured_did: Option<Did>,
    windows: ValidityWindows,
    clock: SharedClock,
}

impl CredentialIssuer {
    /// Create a new credential issuer. `signer` may be absent, in which case
    /// every issuance fails with a signing error.
    pub fn new(
        name: impl Into<String>,
        signer: Option<TypedDataSigner>,
        windows: ValidityWindows,
        clock: SharedClock,
    ) -> Self {
        Self {
            name: name.into(),
            signer,
            configured_did: None,
            windows,
            clock,
        }
    }

    /// Pin the issuer DID. Issuance fails unless it names the signing key's address.
    pub fn with_issuer_did(mut self, did: Did) -> Self {
        self.configured_did = Some(did);
        self
    }

    /// The issuer DID credentials are issued under.
    pub fn did(&self) -> Result<Did, CredentialError> {
        let signer = self.signer()?;
        let derived = Did::for_address(&signer.address());
        match &self.configured_did {
            Some(configured) if configured != &derived => Err(CredentialError::Signing(format!(
                "issuer DID {} does not match signing key address {}",
                configured,
                signer.address()
            ))),
            _ => Ok(derived),
        }
    }

    fn signer(&self) -> Result<&TypedDataSigner, CredentialError> {
        self.signer
            .as_ref()
            .ok_or_else(|| CredentialError::Signing("no signing key configured".into()))
    }

    /// Issue a proof-of-funds credential that expires with the underlying facts.
    pub fn issue_proof_of_funds(
        &self,
        holder: &Did,
        facts: &ProofOfFundsFacts,
    ) -> Result<Credential, CredentialError> {
        let subject = CredentialSubject {
            id: holder.to_string(),
            proof_of_funds: Some(ProofOfFundsClaim {
                asset_type: facts.asset_type.clone(),
                amount: facts.amount,
                token_id: facts.token_id.clone(),
                kyc_compliant: facts.kyc_compliant,
                sanctions_cleared: facts.sanctions_cleared,
                custodian: facts.custodian.clone(),
                audit_hash: facts.audit_hash.clone(),
            }),
            kyc: None,
            device_attestation: None,
        };
        self.issue(PROOF_OF_FUNDS_TYPE, subject, Some(facts.expiry))
    }

    /// Issue a long-lived KYC credential.
    pub fn issue_kyc(&self, holder: &Did, facts: &KycFacts) -> Result<Credential, CredentialError> {
        let now = self.clock.now();
        let subject = CredentialSubject {
            id: holder.to_string(),
            proof_of_funds: None,
            kyc: Some(KycClaim {
                verified: facts.verified,
                sanctions_cleared: facts.sanctions_cleared,
                level: facts.level.clone(),
                provider: facts.provider.clone(),
                jurisdiction: facts.jurisdiction.clone(),
                checked_at: facts.checked_at.unwrap_or(now),
            }),
            device_attestation: None,
        };
        self.issue(KYC_TYPE, subject, Some(now + self.windows.kyc_credential()))
    }

    /// Issue a short-lived device attestation.
    pub fn issue_device_attestation(
        &self,
        holder: &Did,
        facts: &DeviceFacts,
    ) -> Result<Credential, CredentialError> {
        let now = self.clock.now();
        let subject = CredentialSubject {
            id: holder.to_string(),
            proof_of_funds: None,
            kyc: None,
            device_attestation: Some(DeviceAttestationClaim {
                device_id: facts.device_id.clone(),
                platform: facts.platform.clone(),
                integrity_level: facts.integrity_level,
                secure_boot: facts.secure_boot,
                os_version: facts.os_version.clone(),
                attested_at: facts.attested_at.unwrap_or(now),
            }),
        };
        self.issue(
            DEVICE_ATTESTATION_TYPE,
            subject,
            Some(now + self.windows.device_credential()),
        )
    }

    fn issue(
        &self,
        credential_type: &str,
        subject: CredentialSubject,
        expiration: Option<DateTime<Utc>>,
    ) -> Result<Credential, CredentialError> {
        let signer = self.signer()?;
        let issuer_did = self.did()?;
        let now = self.clock.now();
        let serial = Uuid::now_v7();

        let mut credential = Credential {
            context: vec![W3C_CREDENTIALS_CONTEXT.into(), ATTESTA_CONTEXT.into()],
            id: format!("urn:uuid:{serial}"),
            types: vec![BASE_CREDENTIAL_TYPE.into(), credential_type.into()],
            issuer: IssuerRef {
                id: issuer_did.to_string(),
                name: self.name.clone(),
            },
            issuance_date: now,
            expiration_date: expiration,
            credential_subject: subject,
            credential_status: Some(CredentialStatus {
                id: format!("{STATUS_PREFIX}{serial}"),
                status_type: STATUS_TYPE.into(),
            }),
            proof: None,
        };

        let proof_value = signer
            .sign(&credential_schema(), &credential.signing_value()?)
            .map_err(|e| CredentialError::Signing(e.to_string()))?;

        credential.proof = Some(CredentialProof {
            proof_type: PROOF_TYPE.into(),
            created: now,
            proof_purpose: PROOF_PURPOSE.into(),
            verification_method: format!("{issuer_did}#eip712"),
            proof_value,
            eip712: Eip712Binding {
                domain: signer.domain().clone(),
                primary_type: SIGNED_PRIMARY_TYPE.into(),
            },
        });

        tracing::info!(
            issuer = %issuer_did,
            subject = %credential.credential_subject.id,
            credential_id = %credential.id,
            credential_type,
            expires = ?credential.expiration_date,
            "credential issued"
        );

        Ok(credential)
    }
}
