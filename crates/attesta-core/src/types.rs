use serde::{Deserialize, Serialize};
use std::fmt;

use crate::amount::Amount;
use crate::error::CoreError;

/// Method name used for issuer DIDs derived from a signing address.
pub const ATTESTA_DID_METHOD: &str = "attesta";

/// Decentralized Identifier.
/// Format: `did:<method>:<identifier>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Did(String);

impl Did {
    /// Create a new DID from a full URI string.
    pub fn new(uri: impl Into<String>) -> Result<Self, CoreError> {
        let uri = uri.into();
        let mut parts = uri.splitn(3, ':');
        let scheme = parts.next().unwrap_or_default();
        let method = parts.next().unwrap_or_default();
        let identifier = parts.next().unwrap_or_default();

        if scheme != "did" {
            return Err(CoreError::InvalidDid(format!(
                "DID must start with 'did:', got: {uri}"
            )));
        }
        if method.is_empty()
            || !method
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        {
            return Err(CoreError::InvalidDid(format!(
                "DID method must be lowercase alphanumeric, got: {uri}"
            )));
        }
        if identifier.is_empty() || identifier.chars().any(char::is_whitespace) {
            return Err(CoreError::InvalidDid(format!(
                "DID must have format 'did:<method>:<identifier>', got: {uri}"
            )));
        }
        Ok(Self(uri))
    }

    /// The issuer DID bound to a signing address (`did:attesta:0x…`).
    pub fn for_address(address: &str) -> Self {
        Self(format!("did:{ATTESTA_DID_METHOD}:{address}"))
    }

    /// Get the full DID URI.
    pub fn uri(&self) -> &str {
        &self.0
    }

    /// Extract the method (attesta, key, web, ...).
    pub fn method(&self) -> &str {
        self.0.split(':').nth(1).unwrap_or_default()
    }

    /// Extract the method-specific identifier.
    pub fn identifier(&self) -> &str {
        self.0.splitn(3, ':').nth(2).unwrap_or_default()
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Did {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Did> for String {
    fn from(did: Did) -> Self {
        did.0
    }
}

/// The proof mechanism a verification ran against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rail {
    /// Signed, portable credential document.
    Credential,
    /// Ledger token record.
    Token,
}

impl fmt::Display for Rail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Credential => write!(f, "credential"),
            Self::Token => write!(f, "token"),
        }
    }
}

/// Caller-supplied filter applied identically to both rails.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_asset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_amount: Option<Amount>,
}

/// Why a subject's holdings did not satisfy a [`RequirementSpec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequirementMismatch {
    AssetMismatch { required: String, actual: String },
    AssetMissing { required: String },
    AmountShortfall { required: Amount, actual: Amount },
    AmountMissing { required: Amount },
}

impl fmt::Display for RequirementMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AssetMismatch { required, actual } => {
                write!(f, "asset mismatch: required {required}, found {actual}")
            }
            Self::AssetMissing { required } => {
                write!(f, "asset mismatch: required {required}, none asserted")
            }
            Self::AmountShortfall { required, actual } => write!(
                f,
                "amount shortfall: holds {actual}, requires at least {required}"
            ),
            Self::AmountMissing { required } => write!(
                f,
                "amount shortfall: no amount asserted, requires at least {required}"
            ),
        }
    }
}

impl RequirementSpec {
    pub fn new(required_asset: Option<String>, min_amount: Option<Amount>) -> Self {
        Self {
            required_asset,
            min_amount,
        }
    }

    /// No constraints at all.
    pub fn is_empty(&self) -> bool {
        self.required_asset.is_none() && self.min_amount.is_none()
    }

    /// Check an asserted asset and amount against this spec.
    ///
    /// Asset codes compare with exact, case-sensitive string equality.
    /// Amounts compare as exact decimals.
    pub fn check(
        &self,
        asset: Option<&str>,
        amount: Option<&Amount>,
    ) -> Result<(), RequirementMismatch> {
        if let Some(required) = &self.required_asset {
            match asset {
                Some(actual) if actual == required => {}
                Some(actual) => {
                    return Err(RequirementMismatch::AssetMismatch {
                        required: required.clone(),
                        actual: actual.to_string(),
                    })
                }
                None => {
                    return Err(RequirementMismatch::AssetMissing {
                        required: required.clone(),
                    })
                }
            }
        }

        if let Some(required) = &self.min_amount {
            match amount {
                Some(actual) if actual >= required => {}
                Some(actual) => {
                    return Err(RequirementMismatch::AmountShortfall {
                        required: *required,
                        actual: *actual,
                    })
                }
                None => {
                    return Err(RequirementMismatch::AmountMissing {
                        required: *required,
                    })
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_did_creation() {
        let did = Did::new("did:key:z6MkhaXgBZDvotDkL5257faiztiGiC2QtKLGpbnnEGta2doK").unwrap();
        assert_eq!(did.method(), "key");
        assert_eq!(
            did.identifier(),
            "z6MkhaXgBZDvotDkL5257faiztiGiC2QtKLGpbnnEGta2doK"
        );
    }

    #[test]
    fn test_did_identifier_may_contain_colons() {
        let did = Did::new("did:web:example.com:users:alice").unwrap();
        assert_eq!(did.method(), "web");
        assert_eq!(did.identifier(), "example.com:users:alice");
    }

    #[test]
    fn test_did_invalid() {
        assert!(Did::new("invalid").is_err());
        assert!(Did::new("did:").is_err());
        assert!(Did::new("did:key").is_err());
        assert!(Did::new("did:KEY:abc").is_err());
        assert!(Did::new("did:key:has space").is_err());
    }

    #[test]
    fn test_did_for_address() {
        let did = Did::for_address("0x00112233445566778899aabbccddeeff00112233");
        assert_eq!(did.method(), ATTESTA_DID_METHOD);
        assert_eq!(did.to_string(), "did:attesta:0x00112233445566778899aabbccddeeff00112233");
    }

    #[test]
    fn test_did_serde_validates() {
        let ok: Did = serde_json::from_str("\"did:key:abc\"").unwrap();
        assert_eq!(ok.uri(), "did:key:abc");
        assert!(serde_json::from_str::<Did>("\"not-a-did\"").is_err());
    }

    #[test]
    fn test_requirement_empty_spec_accepts_anything() {
        let spec = RequirementSpec::default();
        assert!(spec.is_empty());
        assert!(spec.check(None, None).is_ok());
    }

    #[test]
    fn test_requirement_asset_is_case_sensitive() {
        let spec = RequirementSpec::new(Some("USDC".into()), None);
        assert!(spec.check(Some("USDC"), None).is_ok());
        assert!(matches!(
            spec.check(Some("usdc"), None),
            Err(RequirementMismatch::AssetMismatch { .. })
        ));
        assert!(matches!(
            spec.check(None, None),
            Err(RequirementMismatch::AssetMissing { .. })
        ));
    }

    #[test]
    fn test_requirement_min_amount() {
        let held = Amount::parse("50000.00").unwrap();
        let ok = RequirementSpec::new(None, Some(Amount::whole(10000)));
        assert!(ok.check(None, Some(&held)).is_ok());

        let exact = RequirementSpec::new(None, Some(Amount::parse("50000").unwrap()));
        assert!(exact.check(None, Some(&held)).is_ok());

        let short = RequirementSpec::new(None, Some(Amount::whole(60000)));
        let err = short.check(None, Some(&held)).unwrap_err();
        assert!(err.to_string().contains("shortfall"));
        assert!(err.to_string().contains("50000.00"));
    }

    #[test]
    fn test_requirement_spec_deserializes_number_or_string() {
        let a: RequirementSpec =
            serde_json::from_str(r#"{"requiredAsset":"USDC","minAmount":10000}"#).unwrap();
        let b: RequirementSpec = serde_json::from_str(r#"{"minAmount":"10000.00"}"#).unwrap();
        assert_eq!(a.min_amount, b.min_amount);
        assert_eq!(a.required_asset.as_deref(), Some("USDC"));
    }
}
