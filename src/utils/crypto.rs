use sha1::{Digest, Sha1};

use crate::utils::types::NodeId;

/// `hash(s) = SHA1(lower(trim(s))) mod 2^64`.
///
/// The SHA-1 digest is interpreted as a big-endian 160-bit integer; reducing
/// modulo 2^64 keeps its low-order 64 bits, i.e. the last 8 bytes of the
/// digest. Case and surrounding whitespace are normalized first so the same
/// normalization applies to node descriptors (`ip:port`) and data keys alike.
pub fn hash(s: &str) -> NodeId {
    let normalized = s.trim().to_lowercase();
    let digest = Sha1::digest(normalized.as_bytes());
    let mut low_bytes = [0u8; 8];
    low_bytes.copy_from_slice(&digest[12..20]);
    u64::from_be_bytes(low_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(hash("127.0.0.1:5000"), hash("127.0.0.1:5000"));
    }

    #[test]
    fn hash_normalizes_case_and_whitespace() {
        assert_eq!(hash("  Alpha  "), hash("alpha"));
        assert_eq!(hash("127.0.0.1:5000"), hash("  127.0.0.1:5000  "));
        assert_eq!(hash("ABC"), hash("abc"));
    }

    #[test]
    fn hash_distinguishes_different_inputs() {
        assert_ne!(hash("alpha"), hash("beta"));
        assert_ne!(hash("127.0.0.1:5000"), hash("127.0.0.1:5001"));
    }
}
