//! Ed25519 signatures over 32-byte digests.
//!
//! A [`SignatureEnvelope`] carries the signer's public key next to the
//! signature, so a verifier learns *who* signed without a key lookup. The
//! wire form is `0x` + hex(`pubkey ‖ sig`).

use ed25519_dalek::Signer;

use crate::error::CryptoError;
use crate::hashing::Hash;
use crate::keys::{KeyPair, PublicKey};

/// Encoded envelope length in bytes: 32-byte key plus 64-byte signature.
pub const ENVELOPE_LEN: usize = 32 + 64;

/// Ed25519 signature (64 bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    inner: ed25519_dalek::Signature,
}

impl Signature {
    pub fn to_bytes(&self) -> [u8; 64] {
        self.inner.to_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes_arr: [u8; 64] = bytes.try_into().map_err(|_| {
            CryptoError::MalformedSignature(format!(
                "signature must be 64 bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self {
            inner: ed25519_dalek::Signature::from_bytes(&bytes_arr),
        })
    }
}

/// Sign a digest.
pub fn sign_digest(digest: &Hash, keypair: &KeyPair) -> Signature {
    Signature {
        inner: keypair.signing_key().sign(digest),
    }
}

/// Verify a digest signature. Uses strict verification, so malleable and
/// small-order encodings are refused.
pub fn verify_digest(
    digest: &Hash,
    signature: &Signature,
    public_key: &PublicKey,
) -> Result<(), CryptoError> {
    public_key
        .verifying_key()
        .verify_strict(digest, &signature.inner)
        .map_err(|_| CryptoError::SignatureVerificationFailed)
}

/// A signature together with the key that made it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureEnvelope {
    pub public_key: PublicKey,
    pub signature: Signature,
}

impl SignatureEnvelope {
    /// Sign `digest` and wrap the result with the signer's key.
    pub fn seal(digest: &Hash, keypair: &KeyPair) -> Self {
        Self {
            public_key: keypair.public_key(),
            signature: sign_digest(digest, keypair),
        }
    }

    /// Check the signature over `digest` and return the signer's address.
    pub fn open(&self, digest: &Hash) -> Result<String, CryptoError> {
        verify_digest(digest, &self.signature, &self.public_key)?;
        Ok(self.public_key.address())
    }

    pub fn encode(&self) -> String {
        let mut bytes = Vec::with_capacity(ENVELOPE_LEN);
        bytes.extend_from_slice(self.public_key.as_bytes());
        bytes.extend_from_slice(&self.signature.to_bytes());
        format!("0x{}", hex::encode(bytes))
    }

    pub fn decode(encoded: &str) -> Result<Self, CryptoError> {
        let hex_part = encoded
            .strip_prefix("0x")
            .ok_or_else(|| CryptoError::MalformedSignature("missing 0x prefix".into()))?;
        let bytes = hex::decode(hex_part)
            .map_err(|e| CryptoError::MalformedSignature(format!("invalid hex: {e}")))?;
        if bytes.len() != ENVELOPE_LEN {
            return Err(CryptoError::MalformedSignature(format!(
                "expected {ENVELOPE_LEN} bytes, got {}",
                bytes.len()
            )));
        }

        let (key_bytes, sig_bytes) = bytes.split_at(32);
        let public_key = PublicKey::from_bytes(key_bytes)
            .map_err(|e| CryptoError::MalformedSignature(e.to_string()))?;
        Ok(Self {
            public_key,
            signature: Signature::from_bytes(sig_bytes)?,
        })
    }
}
