/// Core protocol errors.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid DID format: {0}")]
    InvalidDid(String),

    #[error("unknown consent scope: {0}")]
    InvalidScope(String),

    #[error("unknown assertion: {0}")]
    UnknownAssertion(String),

    #[error("validation error: {0}")]
    ValidationError(String),
}
