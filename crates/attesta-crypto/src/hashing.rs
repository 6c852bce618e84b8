/// BLAKE3 hash (32 bytes).
pub type Hash = [u8; 32];

/// Hash arbitrary data using BLAKE3.
pub fn hash(data: &[u8]) -> Hash {
    *blake3::hash(data).as_bytes()
}

/// Hash the concatenation of several byte slices without allocating.
pub fn hash_parts(parts: &[&[u8]]) -> Hash {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

/// Hex-encoded BLAKE3 hash.
pub fn hash_hex(data: &[u8]) -> String {
    hex::encode(hash(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        let data = b"Attesta test data";
        assert_eq!(hash(data), hash(data));
    }

    #[test]
    fn test_hash_different_inputs() {
        assert_ne!(hash(b"data A"), hash(b"data B"));
    }

    #[test]
    fn test_hash_empty() {
        let h = hash(b"");
        assert_ne!(h, [0u8; 32]);
    }

    #[test]
    fn test_hash_parts_matches_concatenation() {
        assert_eq!(hash_parts(&[&b"ab"[..], &b"cd"[..]]), hash(b"abcd"));
        assert_eq!(hash_parts(&[]), hash(b""));
    }

    #[test]
    fn test_hash_hex() {
        let h = hash_hex(b"test");
        assert_eq!(h.len(), 64);
        assert_eq!(h, hex::encode(hash(b"test")));
    }
}
