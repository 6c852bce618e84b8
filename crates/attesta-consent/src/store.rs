use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use attesta_core::{ConsentGrant, ConsentScope, SharedClock};

use crate::error::ConsentError;
use crate::repository::GrantRepository;

/// Result of a revocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevokeOutcome {
    /// Grants whose scope set changed or that were removed outright.
    pub affected_grants: usize,
    pub revoked_at: DateTime<Utc>,
}

/// Scoped, expiring consent between subjects and requesters.
///
/// Writes for the same (subject, requester) pair are serialized, so a
/// grant racing a revoke always resolves to one or the other. Reads never
/// block and see a consistent snapshot of the pair. Expired grants are
/// ignored on read and compacted away on the next write.
pub struct ConsentStore {
    repository: Arc<dyn GrantRepository>,
    locks: DashMap<(String, String), Arc<Mutex<()>>>,
    clock: SharedClock,
}

impl ConsentStore {
    pub fn new(repository: Arc<dyn GrantRepository>, clock: SharedClock) -> Self {
        Self {
            repository,
            locks: DashMap::new(),
            clock,
        }
    }

    fn lock_for(&self, pair: &(String, String)) -> Arc<Mutex<()>> {
        self.locks.entry(pair.clone()).or_default().clone()
    }

    /// Drop the pair's lock once no writer holds or awaits it.
    fn release(&self, pair: &(String, String), lock: Arc<Mutex<()>>) {
        drop(lock);
        self.locks
            .remove_if(pair, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// The pair's stored grants. Records filed under another pair are skipped.
    async fn load_pair(
        &self,
        subject_id: &str,
        requester: &str,
    ) -> Result<Vec<ConsentGrant>, ConsentError> {
        let mut grants = self.repository.load(subject_id, requester).await?;
        grants.retain(|g| g.subject_id == subject_id && g.granted_to == requester);
        Ok(grants)
    }

    /// Grant `requester` access to `scopes` of `subject_id` for `ttl`.
    ///
    /// A scope already covered by an older grant for the same requester moves
    /// to the new grant, so the latest TTL wins per scope.
    pub async fn grant(
        &self,
        subject_id: &str,
        requester: &str,
        scopes: BTreeSet<ConsentScope>,
        ttl: Duration,
    ) -> Result<ConsentGrant, ConsentError> {
        if subject_id.is_empty() || requester.is_empty() {
            return Err(ConsentError::InvalidRequest(
                "subject and requester must be non-empty".into(),
            ));
        }
        if scopes.is_empty() {
            return Err(ConsentError::InvalidRequest(
                "at least one scope is required".into(),
            ));
        }
        if ttl <= Duration::zero() {
            return Err(ConsentError::InvalidRequest(format!(
                "ttl must be positive, got {}s",
                ttl.num_seconds()
            )));
        }

        let pair = (subject_id.to_string(), requester.to_string());
        let lock = self.lock_for(&pair);
        let written = {
            let _guard = lock.lock().await;
            self.write_grant(subject_id, requester, scopes, ttl).await
        };
        self.release(&pair, lock);
        let grant = written?;

        tracing::info!(
            consent_id = %grant.id,
            subject = %subject_id,
            requester = %requester,
            scopes = ?grant.scopes,
            expires_at = %grant.expires_at,
            "consent granted"
        );
        Ok(grant)
    }

    async fn write_grant(
        &self,
        subject_id: &str,
        requester: &str,
        scopes: BTreeSet<ConsentScope>,
        ttl: Duration,
    ) -> Result<ConsentGrant, ConsentError> {
        let now = self.clock.now();
        let expires_at = now.checked_add_signed(ttl).ok_or_else(|| {
            ConsentError::InvalidRequest(format!("ttl of {}s is out of range", ttl.num_seconds()))
        })?;

        let mut grants: Vec<ConsentGrant> = self
            .load_pair(subject_id, requester)
            .await?
            .into_iter()
            .filter(|g| g.is_effective_at(now))
            .filter_map(|mut g| {
                g.scopes.retain(|s| !scopes.contains(s));
                (!g.scopes.is_empty()).then_some(g)
            })
            .collect();

        let grant = ConsentGrant::new(subject_id, requester, scopes, now, expires_at);
        grants.push(grant.clone());
        self.repository.save(subject_id, requester, grants).await?;
        Ok(grant)
    }

    /// Withdraw consent. `None` withdraws every scope for the pair.
    pub async fn revoke(
        &self,
        subject_id: &str,
        requester: &str,
        scopes: Option<&BTreeSet<ConsentScope>>,
    ) -> Result<RevokeOutcome, ConsentError> {
        let pair = (subject_id.to_string(), requester.to_string());
        let lock = self.lock_for(&pair);
        let written = {
            let _guard = lock.lock().await;
            self.write_revoke(subject_id, requester, scopes).await
        };
        self.release(&pair, lock);
        let outcome = written?;

        tracing::info!(
            subject = %subject_id,
            requester = %requester,
            scopes = ?scopes,
            affected_grants = outcome.affected_grants,
            "consent revoked"
        );
        Ok(outcome)
    }

    async fn write_revoke(
        &self,
        subject_id: &str,
        requester: &str,
        scopes: Option<&BTreeSet<ConsentScope>>,
    ) -> Result<RevokeOutcome, ConsentError> {
        let now = self.clock.now();
        let existing = self.load_pair(subject_id, requester).await?;
        let before = existing.len();

        let (kept, affected) = match scopes {
            None => (Vec::new(), before),
            Some(scopes) => {
                let mut affected = 0;
                let kept: Vec<ConsentGrant> = existing
                    .into_iter()
                    .filter_map(|mut g| {
                        let len = g.scopes.len();
                        g.scopes.retain(|s| !scopes.contains(s));
                        if g.scopes.len() != len {
                            affected += 1;
                        }
                        (!g.scopes.is_empty() && g.is_effective_at(now)).then_some(g)
                    })
                    .collect();
                (kept, affected)
            }
        };
        if before > 0 {
            self.repository.save(subject_id, requester, kept).await?;
        }
        Ok(RevokeOutcome {
            affected_grants: affected,
            revoked_at: now,
        })
    }

    /// Whether `requester` currently holds `scope` for `subject_id`.
    pub async fn has_consent(
        &self,
        subject_id: &str,
        requester: &str,
        scope: ConsentScope,
    ) -> Result<bool, ConsentError> {
        let now = self.clock.now();
        let grants = self.load_pair(subject_id, requester).await?;
        Ok(grants
            .iter()
            .any(|g| g.is_effective_at(now) && g.covers(scope)))
    }

    /// Every grant currently in force for `subject_id`.
    pub async fn effective_grants(
        &self,
        subject_id: &str,
    ) -> Result<Vec<ConsentGrant>, ConsentError> {
        let now = self.clock.now();
        let grants = self.repository.scan_subject(subject_id).await?;
        Ok(grants
            .into_iter()
            .filter(|g| g.subject_id == subject_id && g.is_effective_at(now))
            .collect())
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryGrantRepository;
    use attesta_core::{Clock, ManualClock};

    fn setup() -> (Arc<ConsentStore>, Arc<ManualClock>) {
        let clock = ManualClock::starting_now();
        let store = ConsentStore::new(Arc::new(InMemoryGrantRepository::new()), clock.clone());
        (Arc::new(store), clock)
    }

    fn scopes(list: &[ConsentScope]) -> BTreeSet<ConsentScope> {
        list.iter().copied().collect()
    }

    #[tokio::test]
    async fn test_grant_then_check() {
        let (store, _) = setup();
        let grant = store
            .grant("user-1", "bank", scopes(&[ConsentScope::KycStatus]), Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(grant.expires_at - grant.granted_at, Duration::hours(1));

        assert!(store.has_consent("user-1", "bank", ConsentScope::KycStatus).await.unwrap());
        assert!(!store
            .has_consent("user-1", "bank", ConsentScope::BalanceVerification)
            .await
            .unwrap());
        assert!(!store.has_consent("user-1", "exchange", ConsentScope::KycStatus).await.unwrap());
        assert!(!store.has_consent("user-2", "bank", ConsentScope::KycStatus).await.unwrap());
    }

    #[tokio::test]
    async fn test_ttl_expiry_is_lazy_and_exclusive() {
        let (store, clock) = setup();
        store
            .grant("user-1", "bank", scopes(&[ConsentScope::KycStatus]), Duration::seconds(60))
            .await
            .unwrap();

        clock.advance(Duration::seconds(59));
        assert!(store.has_consent("user-1", "bank", ConsentScope::KycStatus).await.unwrap());

        clock.advance(Duration::seconds(1));
        assert!(!store.has_consent("user-1", "bank", ConsentScope::KycStatus).await.unwrap());
        assert!(store.effective_grants("user-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_regrant_replaces_overlapping_scopes() {
        let (store, clock) = setup();
        store
            .grant(
                "user-1",
                "bank",
                scopes(&[ConsentScope::KycStatus, ConsentScope::BalanceVerification]),
                Duration::hours(1),
            )
            .await
            .unwrap();
        let newer = store
            .grant("user-1", "bank", scopes(&[ConsentScope::KycStatus]), Duration::hours(24))
            .await
            .unwrap();

        let grants = store.effective_grants("user-1").await.unwrap();
        assert_eq!(grants.len(), 2);
        let kyc_holders: Vec<_> = grants
            .iter()
            .filter(|g| g.covers(ConsentScope::KycStatus))
            .collect();
        assert_eq!(kyc_holders.len(), 1);
        assert_eq!(kyc_holders[0].id, newer.id);

        // The older grant lapses but the KYC scope lives on in the newer one.
        clock.advance(Duration::hours(2));
        assert!(store.has_consent("user-1", "bank", ConsentScope::KycStatus).await.unwrap());
        assert!(!store
            .has_consent("user-1", "bank", ConsentScope::BalanceVerification)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_regrant_can_shorten() {
        let (store, clock) = setup();
        store
            .grant("user-1", "bank", scopes(&[ConsentScope::KycStatus]), Duration::days(30))
            .await
            .unwrap();
        store
            .grant("user-1", "bank", scopes(&[ConsentScope::KycStatus]), Duration::minutes(5))
            .await
            .unwrap();
        clock.advance(Duration::minutes(10));
        assert!(!store.has_consent("user-1", "bank", ConsentScope::KycStatus).await.unwrap());
    }

    #[tokio::test]
    async fn test_revoke_single_scope() {
        let (store, _) = setup();
        store
            .grant(
                "user-1",
                "bank",
                scopes(&[ConsentScope::KycStatus, ConsentScope::DeviceAttestation]),
                Duration::hours(1),
            )
            .await
            .unwrap();

        let outcome = store
            .revoke("user-1", "bank", Some(&scopes(&[ConsentScope::KycStatus])))
            .await
            .unwrap();
        assert_eq!(outcome.affected_grants, 1);
        assert!(!store.has_consent("user-1", "bank", ConsentScope::KycStatus).await.unwrap());
        assert!(store
            .has_consent("user-1", "bank", ConsentScope::DeviceAttestation)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_revoke_all_only_touches_that_requester() {
        let (store, _) = setup();
        let all: BTreeSet<_> = ConsentScope::ALL.into_iter().collect();
        store.grant("user-1", "bank", all.clone(), Duration::hours(1)).await.unwrap();
        store.grant("user-1", "exchange", all, Duration::hours(1)).await.unwrap();

        let outcome = store.revoke("user-1", "bank", None).await.unwrap();
        assert_eq!(outcome.affected_grants, 1);
        for scope in ConsentScope::ALL {
            assert!(!store.has_consent("user-1", "bank", scope).await.unwrap());
            assert!(store.has_consent("user-1", "exchange", scope).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_revoke_without_grants_is_noop() {
        let (store, _) = setup();
        let outcome = store.revoke("user-1", "bank", None).await.unwrap();
        assert_eq!(outcome.affected_grants, 0);
    }

    #[tokio::test]
    async fn test_rejects_bad_requests() {
        let (store, _) = setup();
        assert!(matches!(
            store.grant("user-1", "bank", BTreeSet::new(), Duration::hours(1)).await,
            Err(ConsentError::InvalidRequest(_))
        ));
        assert!(matches!(
            store
                .grant("user-1", "bank", scopes(&[ConsentScope::KycStatus]), Duration::zero())
                .await,
            Err(ConsentError::InvalidRequest(_))
        ));
        assert!(matches!(
            store
                .grant("", "bank", scopes(&[ConsentScope::KycStatus]), Duration::hours(1))
                .await,
            Err(ConsentError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_grant_and_revoke_serialize() {
        let (store, _) = setup();
        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    store
                        .grant(
                            "user-1",
                            "bank",
                            scopes(&[ConsentScope::KycStatus]),
                            Duration::hours(1),
                        )
                        .await
                        .map(|_| ())
                } else {
                    store.revoke("user-1", "bank", None).await.map(|_| ())
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        // Whatever the interleaving, at most one grant covers the scope.
        let grants = store.effective_grants("user-1").await.unwrap();
        assert!(grants.len() <= 1);
        assert!(store.locks.is_empty());
    }

    #[tokio::test]
    async fn test_out_of_range_ttl_is_rejected() {
        let (store, _) = setup();
        let result = store
            .grant(
                "user-1",
                "bank",
                scopes(&[ConsentScope::KycStatus]),
                Duration::seconds(10_000_000_000_000),
            )
            .await;
        assert!(matches!(result, Err(ConsentError::InvalidRequest(_))));
        assert!(!store.has_consent("user-1", "bank", ConsentScope::KycStatus).await.unwrap());
        assert!(store.locks.is_empty());
    }

    #[tokio::test]
    async fn test_pair_locks_do_not_accumulate() {
        let (store, _) = setup();
        for i in 0..10_000 {
            store.revoke(&format!("user-{i}"), "anyone", None).await.unwrap();
        }
        assert!(store.locks.is_empty());

        store
            .grant("user-1", "bank", scopes(&[ConsentScope::KycStatus]), Duration::hours(1))
            .await
            .unwrap();
        store.revoke("user-1", "bank", None).await.unwrap();
        assert!(store.locks.is_empty());
    }

    #[tokio::test]
    async fn test_grants_filed_under_another_pair_are_ignored() {
        let clock = ManualClock::starting_now();
        let repository = Arc::new(InMemoryGrantRepository::new());
        let store = ConsentStore::new(repository.clone(), clock.clone());

        let now = clock.now();
        let foreign = ConsentGrant::new(
            "user-2",
            "exchange",
            scopes(&[ConsentScope::KycStatus]),
            now,
            now + Duration::hours(1),
        );
        repository.save("user-1", "bank", vec![foreign]).await.unwrap();

        assert!(!store.has_consent("user-1", "bank", ConsentScope::KycStatus).await.unwrap());
        assert!(store.effective_grants("user-1").await.unwrap().is_empty());
    }
}
