//! In-memory adapters for every external collaborator. Used by tests and by
//! the node's `memory` storage backend.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};

use attesta_core::TokenRecord;

use crate::credential::Credential;
use crate::providers::{
    CredentialRepository, KycProvider, KycVerdict, LedgerRegistry, ProviderError,
    RevocationRegistry,
};

/// Credential store keyed by content URI, with a subject index.
#[derive(Default)]
pub struct InMemoryCredentialRepository {
    documents: DashMap<String, Credential>,
    by_subject: DashMap<String, Vec<String>>,
}

impl InMemoryCredentialRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[async_trait]
impl CredentialRepository for InMemoryCredentialRepository {
    async fn store(&self, credential: &Credential) -> Result<String, ProviderError> {
        let uri = credential
            .content_uri()
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;
        if self
            .documents
            .insert(uri.clone(), credential.clone())
            .is_none()
        {
            self.by_subject
                .entry(credential.subject_id().to_string())
                .or_default()
                .push(uri.clone());
        }
        Ok(uri)
    }

    async fn fetch(&self, uri: &str) -> Result<Option<Credential>, ProviderError> {
        Ok(self.documents.get(uri).map(|e| e.value().clone()))
    }

    async fn scan_subject(
        &self,
        subject_id: &str,
    ) -> Result<Vec<(String, Credential)>, ProviderError> {
        let uris = self
            .by_subject
            .get(subject_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        Ok(uris
            .into_iter()
            .filter_map(|uri| {
                let credential = self.documents.get(&uri)?.value().clone();
                Some((uri, credential))
            })
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryRevocationRegistry {
    revoked: DashSet<String>,
}

impl InMemoryRevocationRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RevocationRegistry for InMemoryRevocationRegistry {
    async fn is_revoked(&self, status_id: &str) -> Result<bool, ProviderError> {
        Ok(self.revoked.contains(status_id))
    }

    async fn revoke(&self, status_id: &str) -> Result<bool, ProviderError> {
        Ok(self.revoked.insert(status_id.to_string()))
    }
}

/// Token ledger backed by a map. Records are replaced wholesale by `upsert`.
#[derive(Default)]
pub struct InMemoryLedger {
    tokens: DashMap<String, TokenRecord>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = TokenRecord>) -> Self {
        let ledger = Self::new();
        for record in records {
            ledger.upsert(record);
        }
        ledger
    }

    pub fn upsert(&self, record: TokenRecord) {
        self.tokens.insert(record.id.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl LedgerRegistry for InMemoryLedger {
    async fn token(&self, token_id: &str) -> Result<Option<TokenRecord>, ProviderError> {
        Ok(self.tokens.get(token_id).map(|e| e.value().clone()))
    }

    async fn tokens_held_by(&self, holder: &str) -> Result<Vec<TokenRecord>, ProviderError> {
        let mut held: Vec<TokenRecord> = self
            .tokens
            .iter()
            .filter(|e| e.holder_address == holder)
            .map(|e| e.value().clone())
            .collect();
        held.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(held)
    }
}

/// KYC provider answering from a fixed verdict table.
pub struct InMemoryKycProvider {
    provider_id: String,
    verdicts: DashMap<String, KycVerdict>,
}

impl InMemoryKycProvider {
    pub fn new(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            verdicts: DashMap::new(),
        }
    }

    pub fn set_verdict(&self, subject_id: impl Into<String>, verdict: KycVerdict) {
        self.verdicts.insert(subject_id.into(), verdict);
    }

    pub fn len(&self) -> usize {
        self.verdicts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verdicts.is_empty()
    }
}

#[async_trait]
impl KycProvider for InMemoryKycProvider {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    async fn verdict(&self, subject_id: &str) -> Result<Option<KycVerdict>, ProviderError> {
        Ok(self.verdicts.get(subject_id).map(|e| e.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attesta_core::{Amount, ComplianceFlags};
    use chrono::Utc;

    fn token(id: &str, holder: &str) -> TokenRecord {
        TokenRecord {
            id: id.into(),
            asset_type: "USDC".into(),
            amount: Amount::whole(100),
            holder_address: holder.into(),
            expiry: Utc::now().timestamp() + 3600,
            compliance_flags: ComplianceFlags {
                kyc: true,
                sanctions: true,
            },
            custodian: None,
            audit_hash: None,
            valid: true,
        }
    }

    #[tokio::test]
    async fn test_revocation_registry() {
        let registry = InMemoryRevocationRegistry::new();
        assert!(!registry.is_revoked("s1").await.unwrap());
        assert!(registry.revoke("s1").await.unwrap());
        assert!(!registry.revoke("s1").await.unwrap());
        assert!(registry.is_revoked("s1").await.unwrap());
    }

    #[tokio::test]
    async fn test_ledger_lookup_by_holder() {
        let ledger = InMemoryLedger::from_records([
            token("t2", "0xaaa"),
            token("t1", "0xaaa"),
            token("t3", "0xbbb"),
        ]);
        assert_eq!(ledger.len(), 3);
        let held = ledger.tokens_held_by("0xaaa").await.unwrap();
        let ids: Vec<&str> = held.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t2"]);
        assert!(ledger.token("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_kyc_provider() {
        let kyc = InMemoryKycProvider::new("acme-kyc");
        kyc.set_verdict(
            "user-1",
            KycVerdict {
                verified: true,
                sanctions_cleared: true,
                level: "basic".into(),
                jurisdiction: None,
                reference: "chk-1".into(),
                checked_at: Utc::now(),
            },
        );
        assert_eq!(kyc.provider_id(), "acme-kyc");
        assert!(kyc.verdict("user-1").await.unwrap().unwrap().verified);
        assert!(kyc.verdict("user-2").await.unwrap().is_none());
    }
}
