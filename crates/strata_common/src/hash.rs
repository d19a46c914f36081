//! Content hashing for store identifiers and content validity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 128-bit content hash computed using XXH3.
///
/// Used to turn a composite cache key's string form into a fixed-width
/// store identifier, and by content-based validity tokens to detect that a
/// stage's input has changed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 16]);

impl ContentHash {
    /// Computes a content hash from a byte slice using XXH3-128.
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = xxhash_rust::xxh3::xxh3_128(data);
        Self(hash.to_le_bytes())
    }

    /// Computes a content hash of a string's UTF-8 bytes.
    pub fn from_str_bytes(s: &str) -> Self {
        Self::from_bytes(s.as_bytes())
    }

    /// Returns the first eight hex digits, for log fields.
    pub fn short(&self) -> String {
        self.0[..4].iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({}..)", self.short())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let a = ContentHash::from_bytes(b"PK_G-file-index.xml");
        let b = ContentHash::from_bytes(b"PK_G-file-index.xml");
        assert_eq!(a, b);
    }

    #[test]
    fn str_matches_bytes() {
        assert_eq!(
            ContentHash::from_str_bytes("key"),
            ContentHash::from_bytes(b"key")
        );
    }

    #[test]
    fn different_inputs_differ() {
        let a = ContentHash::from_bytes(b"PK_G-file-a");
        let b = ContentHash::from_bytes(b"PK_G-file-b");
        assert_ne!(a, b);
    }

    #[test]
    fn display_is_32_hex_chars() {
        let s = ContentHash::from_bytes(b"test").to_string();
        assert_eq!(s.len(), 32);
        assert!(s.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn short_is_display_prefix() {
        let h = ContentHash::from_bytes(b"test");
        assert_eq!(h.short().len(), 8);
        assert!(h.to_string().starts_with(&h.short()));
        assert_eq!(format!("{h:?}"), format!("ContentHash({}..)", h.short()));
    }

    #[test]
    fn serde_roundtrip() {
        let h = ContentHash::from_bytes(b"serde test");
        let json = serde_json::to_string(&h).unwrap();
        let back: ContentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(h, back);
    }
}
