//! EIP-712-style structured data signing over Ed25519.
//!
//! A value is hashed field by field in the order its [`TypeSchema`] declares,
//! never in the order the caller's JSON happens to list keys:
//!
//! ```text
//! typeHash   = BLAKE3(encodeType(schema))
//! hashStruct = BLAKE3(typeHash ‖ enc(field₁) ‖ … ‖ enc(fieldₙ))
//! digest     = BLAKE3(0x19 0x01 ‖ domainSeparator ‖ hashStruct)
//! ```
//!
//! The domain separator binds name, version, chain id and verifying registry
//! into every signature, so a signature from one deployment never verifies
//! in another. Signatures embed the signer's public key (`0x` + hex of
//! `pubkey ‖ sig`, 96 bytes), which lets [`recover_signer`] return the signing
//! address the way ECDSA recovery does.

use attesta_core::Amount;
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::canonical::canonical_json;
use crate::error::CryptoError;
use crate::hashing::{hash, hash_parts, Hash};
use crate::keys::KeyPair;
use crate::signing::SignatureEnvelope;

const EIP191_PREFIX: [u8; 2] = [0x19, 0x01];

/// Word used for an optional field that is absent or null.
const NULL_TAG: u8 = 0x00;

/// Signing namespace bound into every digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningDomain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_registry: String,
}

impl SigningDomain {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        chain_id: u64,
        verifying_registry: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            chain_id,
            verifying_registry: verifying_registry.into(),
        }
    }

    fn schema() -> TypeSchema {
        TypeSchema::new("EIP712Domain")
            .field("name", FieldKind::String)
            .field("version", FieldKind::String)
            .field("chainId", FieldKind::Uint)
            .field("verifyingRegistry", FieldKind::String)
    }

    /// hashStruct of the domain itself.
    pub fn separator(&self) -> Result<Hash, CryptoError> {
        let value = serde_json::to_value(self)
            .map_err(|e| CryptoError::InvalidInput(format!("domain: {e}")))?;
        Self::schema().hash_struct(&value)
    }
}

/// Encoding applied to a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldKind {
    String,
    /// Unsigned integer, as a JSON number or a decimal-digit string.
    Uint,
    Bool,
    /// `0x` + 40 hex digits.
    Address,
    /// Exact decimal amount. Scale is part of the encoding.
    Decimal,
    /// RFC 3339 instant, encoded by value.
    Timestamp,
    StringList,
    /// Arbitrary nested JSON, encoded as canonical JSON.
    Object,
}

impl FieldKind {
    fn type_name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Uint => "uint256",
            Self::Bool => "bool",
            Self::Address => "address",
            Self::Decimal => "decimal",
            Self::Timestamp => "timestamp",
            Self::StringList => "string[]",
            Self::Object => "object",
        }
    }

    fn tag(&self) -> u8 {
        match self {
            Self::String => 0x01,
            Self::Uint => 0x02,
            Self::Bool => 0x03,
            Self::Address => 0x04,
            Self::Decimal => 0x05,
            Self::Timestamp => 0x06,
            Self::StringList => 0x07,
            Self::Object => 0x08,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub optional: bool,
}

/// Ordered field list for one primary type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeSchema {
    pub primary_type: String,
    pub fields: Vec<FieldSpec>,
}

impl TypeSchema {
    pub fn new(primary_type: impl Into<String>) -> Self {
        Self {
            primary_type: primary_type.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind,
            optional: false,
        });
        self
    }

    pub fn optional_field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind,
            optional: true,
        });
        self
    }

    /// `Primary(string name,uint256 chainId,string? memo)`
    pub fn encode_type(&self) -> String {
        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|f| {
                let marker = if f.optional { "?" } else { "" };
                format!("{}{} {}", f.kind.type_name(), marker, f.name)
            })
            .collect();
        format!("{}({})", self.primary_type, fields.join(","))
    }

    pub fn type_hash(&self) -> Hash {
        hash(self.encode_type().as_bytes())
    }

    /// Hash a JSON object under this schema.
    pub fn hash_struct(&self, value: &Value) -> Result<Hash, CryptoError> {
        let object = value.as_object().ok_or_else(|| {
            CryptoError::InvalidInput(format!("{} must be a JSON object", self.primary_type))
        })?;

        if let Some(extra) = object
            .keys()
            .find(|key| !self.fields.iter().any(|f| &f.name == *key))
        {
            return Err(CryptoError::UnexpectedField(extra.clone()));
        }

        let mut encoded = Vec::with_capacity(32 * (self.fields.len() + 1));
        encoded.extend_from_slice(&self.type_hash());
        for spec in &self.fields {
            encoded.extend_from_slice(&encode_field(spec, object)?);
        }
        Ok(hash(&encoded))
    }
}

fn encode_field(spec: &FieldSpec, object: &Map<String, Value>) -> Result<Hash, CryptoError> {
    let value = match object.get(&spec.name) {
        None | Some(Value::Null) if spec.optional => return Ok(hash(&[NULL_TAG])),
        None | Some(Value::Null) => return Err(CryptoError::MissingField(spec.name.clone())),
        Some(v) => v,
    };

    let wrong_type = || CryptoError::FieldType {
        field: spec.name.clone(),
        expected: spec.kind.type_name(),
    };

    let body: Vec<u8> = match spec.kind {
        FieldKind::String => value.as_str().ok_or_else(wrong_type)?.as_bytes().to_vec(),
        FieldKind::Uint => {
            let n: u128 = match value {
                Value::Number(n) => n.as_u64().map(u128::from).ok_or_else(wrong_type)?,
                Value::String(s)
                    if !s.is_empty()
                        && s.bytes().all(|b| b.is_ascii_digit())
                        && (s == "0" || !s.starts_with('0')) =>
                {
                    s.parse().map_err(|_| wrong_type())?
                }
                _ => return Err(wrong_type()),
            };
            n.to_be_bytes().to_vec()
        }
        FieldKind::Bool => vec![u8::from(value.as_bool().ok_or_else(wrong_type)?)],
        FieldKind::Address => {
            let s = value.as_str().ok_or_else(wrong_type)?;
            let hex_part = s.strip_prefix("0x").ok_or_else(wrong_type)?;
            let bytes = hex::decode(hex_part).map_err(|_| wrong_type())?;
            if bytes.len() != 20 {
                return Err(wrong_type());
            }
            bytes
        }
        FieldKind::Decimal => {
            let amount = match value {
                Value::String(s) => Amount::parse(s).map_err(|_| wrong_type())?,
                Value::Number(n) => Amount::whole(n.as_u64().ok_or_else(wrong_type)?),
                _ => return Err(wrong_type()),
            };
            let mut bytes = amount.units().to_be_bytes().to_vec();
            bytes.extend_from_slice(&amount.scale().to_be_bytes());
            bytes
        }
        FieldKind::Timestamp => {
            let s = value.as_str().ok_or_else(wrong_type)?;
            let instant = DateTime::parse_from_rfc3339(s).map_err(|_| wrong_type())?;
            let mut bytes = instant.timestamp().to_be_bytes().to_vec();
            bytes.extend_from_slice(&instant.timestamp_subsec_nanos().to_be_bytes());
            bytes
        }
        FieldKind::StringList => {
            let items = value.as_array().ok_or_else(wrong_type)?;
            let mut bytes = Vec::with_capacity(32 * items.len());
            for item in items {
                let s = item.as_str().ok_or_else(wrong_type)?;
                bytes.extend_from_slice(&hash(s.as_bytes()));
            }
            bytes
        }
        FieldKind::Object => canonical_json(value)?.into_bytes(),
    };

    Ok(hash_parts(&[&[spec.kind.tag()][..], body.as_slice()]))
}

/// Final 32-byte digest that gets signed.
pub fn typed_data_digest(
    domain: &SigningDomain,
    schema: &TypeSchema,
    value: &Value,
) -> Result<Hash, CryptoError> {
    let separator = domain.separator()?;
    let struct_hash = schema.hash_struct(value)?;
    Ok(hash_parts(&[&EIP191_PREFIX[..], &separator[..], &struct_hash[..]]))
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<Value, CryptoError> {
    serde_json::to_value(value)
        .map_err(|e| CryptoError::InvalidInput(format!("not representable as JSON: {e}")))
}

/// Sign `value` under `schema` within `domain`.
pub fn sign_typed_data<T: Serialize + ?Sized>(
    domain: &SigningDomain,
    schema: &TypeSchema,
    value: &T,
    keypair: &KeyPair,
) -> Result<String, CryptoError> {
    let digest = typed_data_digest(domain, schema, &to_json(value)?)?;
    Ok(SignatureEnvelope::seal(&digest, keypair).encode())
}

/// Recover the address that signed `value`.
///
/// Fails when the signature is malformed or does not verify against the
/// embedded key. A successful return is the signer's address; callers still
/// compare it against whoever they expected.
pub fn recover_signer<T: Serialize + ?Sized>(
    domain: &SigningDomain,
    schema: &TypeSchema,
    value: &T,
    signature: &str,
) -> Result<String, CryptoError> {
    let envelope = SignatureEnvelope::decode(signature)?;
    let digest = typed_data_digest(domain, schema, &to_json(value)?)?;
    envelope.open(&digest)
}

/// A signing key bound to one domain.
#[derive(Debug)]
pub struct TypedDataSigner {
    domain: SigningDomain,
    keypair: KeyPair,
}

impl TypedDataSigner {
    pub fn new(domain: SigningDomain, keypair: KeyPair) -> Self {
        Self { domain, keypair }
    }

    pub fn domain(&self) -> &SigningDomain {
        &self.domain
    }

    pub fn address(&self) -> String {
        self.keypair.address()
    }

    pub fn sign<T: Serialize + ?Sized>(
        &self,
        schema: &TypeSchema,
        value: &T,
    ) -> Result<String, CryptoError> {
        sign_typed_data(&self.domain, schema, value, &self.keypair)
    }
}
