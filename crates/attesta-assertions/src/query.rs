use attesta_core::{Amount, AssertionKind, RequirementSpec};

/// Integrity level demanded when the requester names none.
pub const DEFAULT_REQUIRED_INTEGRITY_LEVEL: u8 = 1;

/// A question about a subject, with its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssertionQuery {
    /// KYC verified and sanctions clear.
    HasKyc,
    /// Holds at least `min_amount` of `asset`. Either bound may be left open.
    HasBalance {
        min_amount: Option<Amount>,
        asset: Option<String>,
    },
    /// Latest device attestation meets `required_level`.
    IsDeviceCompliant { required_level: u8 },
}

impl AssertionQuery {
    pub fn kind(&self) -> AssertionKind {
        match self {
            Self::HasKyc => AssertionKind::HasKyc,
            Self::HasBalance { .. } => AssertionKind::HasBalance,
            Self::IsDeviceCompliant { .. } => AssertionKind::IsDeviceCompliant,
        }
    }

    pub(crate) fn balance_requirements(&self) -> RequirementSpec {
        match self {
            Self::HasBalance { min_amount, asset } => {
                RequirementSpec::new(asset.clone(), *min_amount)
            }
            _ => RequirementSpec::default(),
        }
    }

    /// Parameters echoed into the assertion metadata.
    pub(crate) fn parameters(&self) -> serde_json::Value {
        match self {
            Self::HasKyc => serde_json::json!({}),
            Self::HasBalance { min_amount, asset } => serde_json::json!({
                "minAmount": min_amount.map(|a| a.to_string()),
                "asset": asset,
            }),
            Self::IsDeviceCompliant { required_level } => serde_json::json!({
                "requiredLevel": required_level,
            }),
        }
    }
}
