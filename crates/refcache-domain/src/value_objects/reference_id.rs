//! Reference identifiers — opaque, content-addressed handles to cached values.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Hex-digest length minted by [`ReferenceId::mint`] — 128 bits of BLAKE3
/// output, well above the spec's 8-character floor, while keeping the whole
/// identifier comfortably under the 128-octet wire-form cap.
const MINTED_DIGEST_HEX_LEN: usize = 32;
/// Maximum total wire-form length, per §6.
const MAX_LEN: usize = 128;

static FORM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*:[a-f0-9]{8,}$").unwrap());

/// An opaque, content-addressed reference identifier with the wire shape
/// `<cache-name>:<hex-digest>`, e.g. `calc:a1b2c3d4e5f6a7b8`.
///
/// Identifiers are minted from a cache name, a namespace, and a
/// caller-supplied canonical key via BLAKE3 (selected over `sha2` for digest
/// speed on the hot cache-key path). Two mintings of the same
/// `(cache_name, namespace, canonical_key)` triple always produce the same
/// identifier — this is what makes idempotent cache hits possible without a
/// separate lookup table, and is globally unique per cache name per §3.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceId(String);

impl ReferenceId {
    /// Mint a new identifier from a cache name, a namespace, and a canonical
    /// key (typically the output of [`crate::canonical::canonical`]).
    #[must_use]
    pub fn mint(cache_name: &str, namespace: &str, canonical_key: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(namespace.as_bytes());
        hasher.update(b"\0");
        hasher.update(canonical_key.as_bytes());
        let digest = hasher.finalize();
        let hex = hex::encode(digest.as_bytes());
        Self(format!("{cache_name}:{}", &hex[..MINTED_DIGEST_HEX_LEN]))
    }

    /// Parse and validate an existing identifier string.
    ///
    /// # Errors
    /// Returns [`Error::InvalidReferenceId`] if `raw` does not match
    /// `^[A-Za-z][A-Za-z0-9_-]*:[a-f0-9]{8,}$`, or exceeds the 128-octet
    /// wire-form cap.
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.len() > MAX_LEN || !FORM_RE.is_match(&raw) {
            return Err(Error::InvalidReferenceId { raw });
        }
        Ok(Self(raw))
    }

    /// Borrow the identifier's raw string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The cache-name segment preceding the `:`.
    #[must_use]
    pub fn cache_name(&self) -> &str {
        self.0.split_once(':').map_or(self.0.as_str(), |(name, _)| name)
    }

    /// True iff `raw` looks like a reference identifier (used by the
    /// resolver to decide whether a leaf value is a candidate for
    /// substitution, per §4.9's regex match).
    #[must_use]
    pub fn looks_like_one(raw: &str) -> bool {
        raw.len() <= MAX_LEN && FORM_RE.is_match(raw)
    }
}

impl fmt::Display for ReferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ReferenceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minting_is_deterministic() {
        let a = ReferenceId::mint("calc", "user:alice", "[1,2,3]");
        let b = ReferenceId::mint("calc", "user:alice", "[1,2,3]");
        assert_eq!(a, b);
    }

    #[test]
    fn minting_is_namespace_sensitive() {
        let a = ReferenceId::mint("calc", "user:alice", "[1,2,3]");
        let b = ReferenceId::mint("calc", "user:bob", "[1,2,3]");
        assert_ne!(a, b);
    }

    #[test]
    fn minting_is_cache_name_sensitive() {
        let a = ReferenceId::mint("calc", "public", "[1,2,3]");
        let b = ReferenceId::mint("other", "public", "[1,2,3]");
        assert_ne!(a, b);
        assert_eq!(a.cache_name(), "calc");
        assert_eq!(b.cache_name(), "other");
    }

    #[test]
    fn minted_ids_parse_back() {
        let id = ReferenceId::mint("calc", "public", "anything");
        let parsed = ReferenceId::parse(id.as_str().to_owned()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn rejects_missing_colon() {
        assert!(ReferenceId::parse("a1b2c3d4e5f6a7b8").is_err());
    }

    #[test]
    fn rejects_short_digest() {
        assert!(ReferenceId::parse("calc:a1b2").is_err());
    }

    #[test]
    fn rejects_non_hex_digest() {
        assert!(ReferenceId::parse("calc:zzzzzzzz").is_err());
    }

    #[test]
    fn rejects_name_starting_with_digit() {
        assert!(ReferenceId::parse("1calc:a1b2c3d4").is_err());
    }

    #[test]
    fn accepts_spec_example_shapes() {
        assert!(ReferenceId::looks_like_one("calc:deadbeef"));
        assert!(ReferenceId::looks_like_one("s:0123456789ab"));
        assert!(!ReferenceId::looks_like_one("not-a-ref"));
    }
}
