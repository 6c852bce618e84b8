/// Consent store errors.
#[derive(Debug, thiserror::Error)]
pub enum ConsentError {
    #[error("invalid consent request: {0}")]
    InvalidRequest(String),

    #[error("consent storage error: {0}")]
    Storage(String),
}
