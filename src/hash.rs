/// Identifier hash normalization
///
/// Raw provider identifiers are digested once on arrival and discarded; only
/// the fixed-length hex digests are stored, matched, and logged. An empty or
/// whitespace-only identifier is treated as absent, never hashed.
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Length of a normalized identifier hash (SHA-256, lowercase hex).
pub const HASH_LEN: usize = 64;

/// Which identifier a hash was derived from.
///
/// Doubles as resolution provenance: the kind that produced the most recent
/// successful directory match is recorded on the crosswalk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashKind {
    Primary,
    Fallback,
}

impl HashKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashKind::Primary => "primary",
            HashKind::Fallback => "fallback",
        }
    }

    /// Single-letter code stored in the crosswalk `provenance` column.
    pub fn code(&self) -> &'static str {
        match self {
            HashKind::Primary => "P",
            HashKind::Fallback => "F",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "P" => Some(HashKind::Primary),
            "F" => Some(HashKind::Fallback),
            _ => None,
        }
    }
}

impl std::fmt::Display for HashKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Digest a raw identifier into a fixed-length hash.
///
/// Returns `None` for empty input so callers carry "absent" forward instead
/// of the digest of the empty string.
pub fn hash_identifier(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(hex::encode(Sha256::digest(trimmed.as_bytes())))
}

/// Normalize and digest the provider's primary identifier.
///
/// The provider reports the primary identifier in mixed case; it is
/// upper-cased before digesting so case drift cannot split a beneficiary
/// across two hashes.
pub fn normalize_primary(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    hash_identifier(&trimmed.to_uppercase())
}

/// Normalize and digest the provider's fallback identifier.
///
/// The fallback is mandatory; a `None` here must be rejected by the caller
/// as invalid identity input.
pub fn normalize_fallback(raw: &str) -> Option<String> {
    hash_identifier(raw)
}

/// Whether a string is a well-formed identifier hash.
pub fn is_valid_hash(hash: &str) -> bool {
    hash.len() == HASH_LEN && hash.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_identifier_fixed_length() {
        let hash = hash_identifier("1EG4-TE5-MK72").unwrap();
        assert_eq!(hash.len(), HASH_LEN);
        assert!(is_valid_hash(&hash));
    }

    #[test]
    fn test_hash_identifier_deterministic() {
        assert_eq!(hash_identifier("123456789A"), hash_identifier("123456789A"));
        assert_ne!(hash_identifier("123456789A"), hash_identifier("123456789B"));
    }

    #[test]
    fn test_empty_input_is_absent() {
        assert_eq!(hash_identifier(""), None);
        assert_eq!(hash_identifier("   "), None);
        assert_eq!(normalize_primary(""), None);
        assert_eq!(normalize_fallback("  "), None);
    }

    #[test]
    fn test_primary_is_case_folded() {
        assert_eq!(normalize_primary("1eg4-te5-mk72"), normalize_primary("1EG4-TE5-MK72"));
        assert_eq!(normalize_primary("1eg4-te5-mk72"), hash_identifier("1EG4-TE5-MK72"));
    }

    #[test]
    fn test_fallback_preserves_case() {
        assert_ne!(normalize_fallback("abc123"), normalize_fallback("ABC123"));
    }

    #[test]
    fn test_is_valid_hash() {
        assert!(is_valid_hash(&"a".repeat(64)));
        assert!(!is_valid_hash(&"a".repeat(63)));
        assert!(!is_valid_hash(&"g".repeat(64)));
        assert!(!is_valid_hash(""));
    }

    #[test]
    fn test_hash_kind_codes() {
        assert_eq!(HashKind::from_code("P"), Some(HashKind::Primary));
        assert_eq!(HashKind::from_code("F"), Some(HashKind::Fallback));
        assert_eq!(HashKind::from_code("X"), None);
        assert_eq!(HashKind::Primary.code(), "P");
    }
}
