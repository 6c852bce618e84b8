use chrono::Duration;
use serde::{Deserialize, Serialize};

/// How long issued credentials, assertions and consents stay valid.
///
/// Windows track the volatility of the underlying fact: balances move
/// quickly, device posture drifts, KYC status is long-lived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityWindows {
    /// KYC credential lifetime, in days.
    #[serde(default = "default_kyc_credential_days")]
    pub kyc_credential_days: i64,
    /// Device-attestation credential lifetime, in days.
    #[serde(default = "default_device_credential_days")]
    pub device_credential_days: i64,
    #[serde(default = "default_has_kyc_secs")]
    pub has_kyc_secs: i64,
    #[serde(default = "default_has_balance_secs")]
    pub has_balance_secs: i64,
    #[serde(default = "default_is_device_compliant_secs")]
    pub is_device_compliant_secs: i64,
    /// Consent TTL used when a grant request does not name one.
    #[serde(default = "default_consent_ttl_secs")]
    pub default_consent_ttl_secs: i64,
}

fn default_kyc_credential_days() -> i64 {
    365
}
fn default_device_credential_days() -> i64 {
    7
}
fn default_has_kyc_secs() -> i64 {
    24 * 60 * 60
}
fn default_has_balance_secs() -> i64 {
    5 * 60
}
fn default_is_device_compliant_secs() -> i64 {
    60 * 60
}
fn default_consent_ttl_secs() -> i64 {
    30 * 24 * 60 * 60
}

impl Default for ValidityWindows {
    fn default() -> Self {
        Self {
            kyc_credential_days: default_kyc_credential_days(),
            device_credential_days: default_device_credential_days(),
            has_kyc_secs: default_has_kyc_secs(),
            has_balance_secs: default_has_balance_secs(),
            is_device_compliant_secs: default_is_device_compliant_secs(),
            default_consent_ttl_secs: default_consent_ttl_secs(),
        }
    }
}

impl ValidityWindows {
    pub fn kyc_credential(&self) -> Duration {
        Duration::days(self.kyc_credential_days)
    }

    pub fn device_credential(&self) -> Duration {
        Duration::days(self.device_credential_days)
    }

    pub fn has_kyc(&self) -> Duration {
        Duration::seconds(self.has_kyc_secs)
    }

    pub fn has_balance(&self) -> Duration {
        Duration::seconds(self.has_balance_secs)
    }

    pub fn is_device_compliant(&self) -> Duration {
        Duration::seconds(self.is_device_compliant_secs)
    }

    pub fn default_consent_ttl(&self) -> Duration {
        Duration::seconds(self.default_consent_ttl_secs)
    }
}
