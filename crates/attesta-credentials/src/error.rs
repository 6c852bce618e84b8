use crate::providers::ProviderError;

/// Credential system errors.
///
/// Verification failures are not errors; they come back as a
/// `VerificationResult` with `valid == false`. These variants cover
/// infrastructure faults and malformed requests.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("signing error: {0}")]
    Signing(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("incomplete dual-rail request: {0}")]
    IncompleteDualRail(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("crypto error: {0}")]
    Crypto(#[from] attesta_crypto::CryptoError),

    #[error("core error: {0}")]
    Core(#[from] attesta_core::CoreError),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CredentialError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
