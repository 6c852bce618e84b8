//! RocksDB storage backend for the Attesta node.
//!
//! One database backs the credential repository, the revocation registry
//! and the consent grant repository, each in its own column family.

use anyhow::Result;
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, Direction, IteratorMode, Options, DB};
use std::path::Path;

use attesta_consent::{ConsentError, GrantRepository};
use attesta_core::ConsentGrant;
use attesta_credentials::{Credential, CredentialRepository, ProviderError, RevocationRegistry};

/// Column family names for different data types.
const CF_CREDENTIALS: &str = "credentials";
const CF_SUBJECT_INDEX: &str = "subject_index";
const CF_REVOCATIONS: &str = "revocations";
const CF_CONSENT: &str = "consent";

/// Composite keys are `len(head) as u32 BE ‖ head ‖ tail`. The length
/// prefix keeps any byte legal inside an identifier.
fn composite_key(head: &str, tail: &str) -> Vec<u8> {
    let mut key = prefix_of(head);
    key.extend_from_slice(tail.as_bytes());
    key
}

fn prefix_of(head: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(4 + head.len());
    prefix.extend_from_slice(&(head.len() as u32).to_be_bytes());
    prefix.extend_from_slice(head.as_bytes());
    prefix
}

/// RocksDB-backed storage for the Attesta node.
pub struct Storage {
    db: DB,
}

impl Storage {
    /// Open or create a RocksDB database at the given path with column families.
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_CREDENTIALS, Options::default()),
            ColumnFamilyDescriptor::new(CF_SUBJECT_INDEX, Options::default()),
            ColumnFamilyDescriptor::new(CF_REVOCATIONS, Options::default()),
            ColumnFamilyDescriptor::new(CF_CONSENT, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&opts, path, cf_descriptors)?;

        Ok(Self { db })
    }

    /// Put a value into a column family.
    pub fn put(&self, cf_name: &str, key: &[u8], value: &[u8]) -> Result<()> {
        let cf = self
            .db
            .cf_handle(cf_name)
            .ok_or_else(|| anyhow::anyhow!("column family '{}' not found", cf_name))?;
        self.db.put_cf(&cf, key, value)?;
        Ok(())
    }

    /// Get a value from a column family.
    pub fn get(&self, cf_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self
            .db
            .cf_handle(cf_name)
            .ok_or_else(|| anyhow::anyhow!("column family '{}' not found", cf_name))?;
        let value = self.db.get_cf(&cf, key)?;
        Ok(value)
    }

    /// Delete a key from a column family.
    pub fn delete(&self, cf_name: &str, key: &[u8]) -> Result<()> {
        let cf = self
            .db
            .cf_handle(cf_name)
            .ok_or_else(|| anyhow::anyhow!("column family '{}' not found", cf_name))?;
        self.db.delete_cf(&cf, key)?;
        Ok(())
    }

    /// Every `(key, value)` in a column family whose key starts with `prefix`.
    pub fn scan_prefix(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let cf = self
            .db
            .cf_handle(cf_name)
            .ok_or_else(|| anyhow::anyhow!("column family '{}' not found", cf_name))?;
        let mut entries = Vec::new();
        for item in self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, Direction::Forward))
        {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            entries.push((key.to_vec(), value.to_vec()));
        }
        Ok(entries)
    }

    /// Flush memtables to disk.
    pub fn flush(&self) -> Result<()> {
        for cf_name in [CF_CREDENTIALS, CF_SUBJECT_INDEX, CF_REVOCATIONS, CF_CONSENT] {
            if let Some(cf) = self.db.cf_handle(cf_name) {
                self.db.flush_cf(&cf)?;
            }
        }
        Ok(())
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        match self.get(cf_name, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

fn unavailable(e: anyhow::Error) -> ProviderError {
    ProviderError::Unavailable(format!("storage: {e:#}"))
}

fn consent_storage(e: anyhow::Error) -> ConsentError {
    ConsentError::Storage(format!("{e:#}"))
}

#[async_trait]
impl CredentialRepository for Storage {
    async fn store(&self, credential: &Credential) -> Result<String, ProviderError> {
        let uri = credential
            .content_uri()
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;
        let document =
            serde_json::to_vec(credential).map_err(|e| ProviderError::Unavailable(e.to_string()))?;
        self.put(CF_CREDENTIALS, uri.as_bytes(), &document)
            .map_err(unavailable)?;
        self.put(
            CF_SUBJECT_INDEX,
            &composite_key(credential.subject_id(), &uri),
            &[],
        )
        .map_err(unavailable)?;
        Ok(uri)
    }

    async fn fetch(&self, uri: &str) -> Result<Option<Credential>, ProviderError> {
        self.get_json(CF_CREDENTIALS, uri.as_bytes())
            .map_err(unavailable)
    }

    async fn scan_subject(
        &self,
        subject_id: &str,
    ) -> Result<Vec<(String, Credential)>, ProviderError> {
        let prefix = prefix_of(subject_id);
        let index = self
            .scan_prefix(CF_SUBJECT_INDEX, &prefix)
            .map_err(unavailable)?;

        let mut found = Vec::with_capacity(index.len());
        for (key, _) in index {
            let uri = String::from_utf8_lossy(&key[prefix.len()..]).into_owned();
            match self.get_json::<Credential>(CF_CREDENTIALS, uri.as_bytes()) {
                Ok(Some(credential)) => found.push((uri, credential)),
                Ok(None) => {
                    tracing::warn!(%uri, subject = %subject_id, "subject index points at a missing credential")
                }
                Err(e) => return Err(unavailable(e)),
            }
        }
        Ok(found)
    }
}

#[async_trait]
impl RevocationRegistry for Storage {
    async fn is_revoked(&self, status_id: &str) -> Result<bool, ProviderError> {
        Ok(self
            .get(CF_REVOCATIONS, status_id.as_bytes())
            .map_err(unavailable)?
            .is_some())
    }

    async fn revoke(&self, status_id: &str) -> Result<bool, ProviderError> {
        if self.is_revoked(status_id).await? {
            return Ok(false);
        }
        let revoked_at = chrono::Utc::now().to_rfc3339();
        self.put(CF_REVOCATIONS, status_id.as_bytes(), revoked_at.as_bytes())
            .map_err(unavailable)?;
        Ok(true)
    }
}

#[async_trait]
impl GrantRepository for Storage {
    async fn load(
        &self,
        subject_id: &str,
        requester: &str,
    ) -> Result<Vec<ConsentGrant>, ConsentError> {
        Ok(self
            .get_json(CF_CONSENT, &composite_key(subject_id, requester))
            .map_err(consent_storage)?
            .unwrap_or_default())
    }

    async fn save(
        &self,
        subject_id: &str,
        requester: &str,
        grants: Vec<ConsentGrant>,
    ) -> Result<(), ConsentError> {
        let key = composite_key(subject_id, requester);
        if grants.is_empty() {
            return self.delete(CF_CONSENT, &key).map_err(consent_storage);
        }
        let value = serde_json::to_vec(&grants).map_err(|e| ConsentError::Storage(e.to_string()))?;
        self.put(CF_CONSENT, &key, &value).map_err(consent_storage)
    }

    async fn scan_subject(&self, subject_id: &str) -> Result<Vec<ConsentGrant>, ConsentError> {
        let entries = self
            .scan_prefix(CF_CONSENT, &prefix_of(subject_id))
            .map_err(consent_storage)?;
        let mut grants = Vec::new();
        for (_, value) in entries {
            let batch: Vec<ConsentGrant> =
                serde_json::from_slice(&value).map_err(|e| ConsentError::Storage(e.to_string()))?;
            grants.extend(batch);
        }
        grants.sort_by(|a, b| a.granted_at.cmp(&b.granted_at));
        Ok(grants)
    }
}
