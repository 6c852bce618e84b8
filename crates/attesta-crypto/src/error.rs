/// Cryptographic operation errors.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("signature verification failed")]
    SignatureVerificationFailed,

    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("typed data is missing required field `{0}`")]
    MissingField(String),

    #[error("typed data carries field `{0}` that is not part of the schema")]
    UnexpectedField(String),

    #[error("field `{field}` is not a valid {expected}")]
    FieldType { field: String, expected: &'static str },
}
