//! Attesta Crypto: Ed25519 keys, BLAKE3 hashing, canonical JSON and
//! EIP-712-style typed-data signing with signer recovery.

pub mod canonical;
pub mod error;
pub mod hashing;
pub mod keys;
pub mod signing;
pub mod typed_data;

pub use canonical::{canonical_json, canonicalize};
pub use error::CryptoError;
pub use hashing::{hash, hash_hex, hash_parts, Hash};
pub use keys::{KeyPair, PublicKey};
pub use signing::{sign_digest, verify_digest, Signature, SignatureEnvelope};
pub use typed_data::{
    recover_signer, sign_typed_data, typed_data_digest, FieldKind, FieldSpec, SigningDomain,
    TypeSchema, TypedDataSigner,
};
