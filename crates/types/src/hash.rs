//! Blake3 digests.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-byte Blake3 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hash([u8; 32]);

impl Hash {
    /// Digest of `parts` under the domain tag `domain`.
    ///
    /// The tag is length-prefixed so that no choice of parts can collide with
    /// a digest taken under another tag.
    pub fn tagged(domain: &str, parts: &[&[u8]]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(domain.len() as u64).to_le_bytes());
        hasher.update(domain.as_bytes());
        for part in parts {
            hasher.update(part);
        }
        Self(*hasher.finalize().as_bytes())
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Malformed hex input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HexError {
    /// Wrong number of hex characters.
    #[error("expected {expected} hex characters, got {actual}")]
    InvalidLength {
        /// Required length.
        expected: usize,
        /// Length supplied.
        actual: usize,
    },

    /// A character outside `[0-9a-fA-F]`.
    #[error("not a hex string")]
    InvalidHex,
}

/// Decode exactly 32 bytes of hex.
pub(crate) fn decode_hex32(input: &str) -> Result<[u8; 32], HexError> {
    if input.len() != 64 {
        return Err(HexError::InvalidLength {
            expected: 64,
            actual: input.len(),
        });
    }
    let mut out = [0u8; 32];
    hex::decode_to_slice(input, &mut out).map_err(|_| HexError::InvalidHex)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_separates_digests() {
        let a = Hash::tagged("lottery-randomness", &[b"payload"]);
        assert_eq!(a, Hash::tagged("lottery-randomness", &[b"pay", b"load"]));
        assert_ne!(a, Hash::tagged("lottery-receipt", &[b"payload"]));
        // Moving bytes between tag and payload changes the digest.
        assert_ne!(
            Hash::tagged("ab", &[b"c"]),
            Hash::tagged("a", &[b"bc"])
        );
    }

    #[test]
    fn test_decode_hex32() {
        let bytes = [0xabu8; 32];
        assert_eq!(decode_hex32(&hex::encode(bytes)), Ok(bytes));
        assert_eq!(
            decode_hex32("abcd"),
            Err(HexError::InvalidLength {
                expected: 64,
                actual: 4
            })
        );
        assert_eq!(decode_hex32(&"zz".repeat(32)), Err(HexError::InvalidHex));
    }
}
