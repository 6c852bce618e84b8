use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::amount::Amount;

/// Compliance status the ledger registry attaches to a token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceFlags {
    pub kyc: bool,
    pub sanctions: bool,
}

impl ComplianceFlags {
    /// Both KYC passed and sanctions screening cleared.
    pub fn all_clear(&self) -> bool {
        self.kyc && self.sanctions
    }
}

/// A token record as reported by the ledger registry.
///
/// The registry owns these records; this service only reads them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    pub id: String,
    pub asset_type: String,
    pub amount: Amount,
    pub holder_address: String,
    /// Unix time in seconds.
    pub expiry: i64,
    pub compliance_flags: ComplianceFlags,
    #[serde(default)]
    pub custodian: Option<String>,
    #[serde(default)]
    pub audit_hash: Option<String>,
    /// The registry's own validity flag. Clearing it is how the ledger revokes a token.
    pub valid: bool,
}

impl TokenRecord {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.expiry, 0).single()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry <= now.timestamp()
    }
}
