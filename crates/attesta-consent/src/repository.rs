use async_trait::async_trait;
use dashmap::DashMap;

use attesta_core::ConsentGrant;

use crate::error::ConsentError;

/// Backing store for consent grants, grouped by (subject, requester).
#[async_trait]
pub trait GrantRepository: Send + Sync {
    /// Every grant recorded for the pair, expired or not.
    async fn load(&self, subject_id: &str, requester: &str)
        -> Result<Vec<ConsentGrant>, ConsentError>;

    /// Replace the pair's grants. An empty list removes the pair.
    async fn save(
        &self,
        subject_id: &str,
        requester: &str,
        grants: Vec<ConsentGrant>,
    ) -> Result<(), ConsentError>;

    /// Every grant recorded for a subject, across requesters.
    async fn scan_subject(&self, subject_id: &str) -> Result<Vec<ConsentGrant>, ConsentError>;
}

#[derive(Default)]
pub struct InMemoryGrantRepository {
    grants: DashMap<(String, String), Vec<ConsentGrant>>,
}

impl InMemoryGrantRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GrantRepository for InMemoryGrantRepository {
    async fn load(
        &self,
        subject_id: &str,
        requester: &str,
    ) -> Result<Vec<ConsentGrant>, ConsentError> {
        let key = (subject_id.to_string(), requester.to_string());
        Ok(self
            .grants
            .get(&key)
            .map(|e| e.value().clone())
            .unwrap_or_default())
    }

    async fn save(
        &self,
        subject_id: &str,
        requester: &str,
        grants: Vec<ConsentGrant>,
    ) -> Result<(), ConsentError> {
        let key = (subject_id.to_string(), requester.to_string());
        if grants.is_empty() {
            self.grants.remove(&key);
        } else {
            self.grants.insert(key, grants);
        }
        Ok(())
    }

    async fn scan_subject(&self, subject_id: &str) -> Result<Vec<ConsentGrant>, ConsentError> {
        let mut grants: Vec<ConsentGrant> = self
            .grants
            .iter()
            .filter(|e| e.key().0 == subject_id)
            .flat_map(|e| e.value().clone())
            .collect();
        grants.sort_by(|a, b| a.granted_at.cmp(&b.granted_at));
        Ok(grants)
    }
}
