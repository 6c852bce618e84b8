//! Canonical JSON: object keys sorted by byte order at every depth,
//! compact separators, no floating-point numbers.
//!
//! Two values that differ only in key order produce identical bytes, which
//! is what makes nested objects safe to hash into a signature.

use serde::Serialize;
use serde_json::Value;

use crate::error::CryptoError;

/// Validate a JSON tree for canonical encoding. Rejects non-integer numbers,
/// since their textual form is not stable across serializers.
pub fn canonicalize(value: &Value) -> Result<(), CryptoError> {
    match value {
        Value::Null | Value::Bool(_) | Value::String(_) => Ok(()),
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                Ok(())
            } else {
                Err(CryptoError::InvalidInput(format!(
                    "floating-point number {n} cannot be canonicalized; use a decimal string"
                )))
            }
        }
        Value::Array(items) => items.iter().try_for_each(canonicalize),
        Value::Object(map) => map.values().try_for_each(canonicalize),
    }
}

/// Serialize any value to its canonical JSON string.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String, CryptoError> {
    let value = serde_json::to_value(value)
        .map_err(|e| CryptoError::InvalidInput(format!("not representable as JSON: {e}")))?;
    canonicalize(&value)?;
    let mut out = String::new();
    write_value(&value, &mut out);
    Ok(out)
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_value(item, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        Value::String(s) => write_string(s, out),
        // Scalars other than strings have a single compact form.
        other => out.push_str(&other.to_string()),
    }
}

fn write_string(s: &str, out: &mut String) {
    // serde_json's string escaping is deterministic.
    out.push_str(&Value::String(s.to_owned()).to_string());
}
