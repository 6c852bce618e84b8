use serde::{Deserialize, Serialize};

use attesta_consent::ConsentError;
use attesta_core::ConsentScope;
use attesta_credentials::CredentialError;

/// What the subject would need to grant for the query to go through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentRemediation {
    pub consent_url: String,
    pub required_scope: ConsentScope,
    pub subject_id: String,
    pub requester: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AssertionError {
    #[error("consent required: {} must grant {} to {}", .0.subject_id, .0.required_scope, .0.requester)]
    ConsentRequired(Box<ConsentRemediation>),

    #[error("invalid assertion parameters: {0}")]
    InvalidParameters(String),

    #[error("consent store error: {0}")]
    Consent(#[from] ConsentError),

    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("signing error: {0}")]
    Signing(#[from] attesta_crypto::CryptoError),
}
