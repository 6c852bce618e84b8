use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::CoreError;

/// A fact category a subject can let a requester query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentScope {
    KycStatus,
    BalanceVerification,
    DeviceAttestation,
}

impl ConsentScope {
    pub const ALL: [ConsentScope; 3] = [
        ConsentScope::KycStatus,
        ConsentScope::BalanceVerification,
        ConsentScope::DeviceAttestation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KycStatus => "kyc_status",
            Self::BalanceVerification => "balance_verification",
            Self::DeviceAttestation => "device_attestation",
        }
    }
}

impl fmt::Display for ConsentScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsentScope {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|scope| scope.as_str() == s)
            .ok_or_else(|| CoreError::InvalidScope(s.to_string()))
    }
}

/// A scoped, time-limited authorization for one requester to query
/// facts about one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentGrant {
    pub id: String,
    pub subject_id: String,
    pub granted_to: String,
    pub scopes: BTreeSet<ConsentScope>,
    pub granted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ConsentGrant {
    pub fn new(
        subject_id: impl Into<String>,
        granted_to: impl Into<String>,
        scopes: BTreeSet<ConsentScope>,
        granted_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            subject_id: subject_id.into(),
            granted_to: granted_to.into(),
            scopes,
            granted_at,
            expires_at,
        }
    }

    /// Whether the grant is still in force at `now`. Expiry is exclusive.
    pub fn is_effective_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    pub fn covers(&self, scope: ConsentScope) -> bool {
        self.scopes.contains(&scope)
    }
}
