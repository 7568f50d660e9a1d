//! BLAKE3 hashing helpers.

/// Width of an entry-reachability hash in bytes.
pub const ENTRY_HASH_LEN: usize = 16;

/// Commutative digest of the set of entry points that reach a module.
pub type EntryHash = [u8; ENTRY_HASH_LEN];

/// Compute the BLAKE3 hash of a byte slice, returning the hex-encoded digest.
#[must_use]
pub fn blake3_bytes(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

/// Derive the 16-byte coloring seed for an entry point id.
///
/// The seed is the truncated BLAKE3 digest of the id, so two runs over the
/// same entry set always produce the same seeds.
#[must_use]
pub fn entry_hash_seed(id: &str) -> EntryHash {
    let digest = blake3::hash(id.as_bytes());
    let mut seed = [0u8; ENTRY_HASH_LEN];
    seed.copy_from_slice(&digest.as_bytes()[..ENTRY_HASH_LEN]);
    seed
}

/// Fold `seed` into `hash` with XOR.
///
/// XOR is commutative and self-inverse, so the combined value depends only on
/// the *set* of seeds folded in, never on their order.
pub fn xor_hash(hash: &mut EntryHash, seed: &EntryHash) {
    for (byte, s) in hash.iter_mut().zip(seed.iter()) {
        *byte ^= s;
    }
}

/// Hex-encode an entry hash for use as a grouping key.
#[must_use]
pub fn hash_hex(hash: &EntryHash) -> String {
    let mut out = String::with_capacity(ENTRY_HASH_LEN * 2);
    for byte in hash {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blake3_bytes() {
        let hash = blake3_bytes(b"hello world");
        assert_eq!(
            hash,
            "d74981efa70a0c880b8d8c1985d075dbcbf679b99a5f9914e5aaf96b831a9e24"
        );
    }

    #[test]
    fn test_entry_hash_seed_deterministic() {
        assert_eq!(entry_hash_seed("/src/main.js"), entry_hash_seed("/src/main.js"));
        assert_ne!(entry_hash_seed("/src/main.js"), entry_hash_seed("/src/other.js"));
    }

    #[test]
    fn test_xor_hash_order_independent() {
        let a = entry_hash_seed("a");
        let b = entry_hash_seed("b");

        let mut ab = [0u8; ENTRY_HASH_LEN];
        xor_hash(&mut ab, &a);
        xor_hash(&mut ab, &b);

        let mut ba = [0u8; ENTRY_HASH_LEN];
        xor_hash(&mut ba, &b);
        xor_hash(&mut ba, &a);

        assert_eq!(ab, ba);
    }

    #[test]
    fn test_xor_hash_self_inverse() {
        let a = entry_hash_seed("a");
        let mut hash = [0u8; ENTRY_HASH_LEN];
        xor_hash(&mut hash, &a);
        xor_hash(&mut hash, &a);
        assert_eq!(hash, [0u8; ENTRY_HASH_LEN]);
    }

    #[test]
    fn test_hash_hex() {
        let mut hash = [0u8; ENTRY_HASH_LEN];
        hash[0] = 0xab;
        hash[15] = 0x01;
        let hex = hash_hex(&hash);
        assert_eq!(hex.len(), 32);
        assert!(hex.starts_with("ab"));
        assert!(hex.ends_with("01"));
    }
}
