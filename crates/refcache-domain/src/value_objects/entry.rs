//! Entry — the immutable record stored behind a reference identifier.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::access_policy::AccessPolicy;

/// An immutable stored record.
///
/// An entry's namespace never changes after creation (§3 invariant); a
/// `set`-with-same-key replaces the whole `Entry` in place rather than
/// mutating a field, which is what makes that invariant trivially true by
/// construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// The stored value, an arbitrary serializable structure.
    pub value: serde_json::Value,
    /// The namespace this entry was created in.
    pub namespace: String,
    /// The access policy governing this entry.
    pub policy: AccessPolicy,
    /// When the entry was created.
    pub created_at: DateTime<Utc>,
    /// When the entry expires, if it has a TTL.
    pub expires_at: Option<DateTime<Utc>>,
    /// Opaque string-to-string metadata attached at `set` time.
    pub metadata: HashMap<String, String>,
}

impl Entry {
    /// Construct a new entry with no expiry and empty metadata.
    #[must_use]
    pub fn new(value: serde_json::Value, namespace: impl Into<String>, policy: AccessPolicy) -> Self {
        Self {
            value,
            namespace: namespace.into(),
            policy,
            created_at: Utc::now(),
            expires_at: None,
            metadata: HashMap::new(),
        }
    }

    /// Attach a TTL, expiring `ttl_seconds` after `created_at`.
    #[must_use]
    pub fn with_ttl(mut self, ttl_seconds: i64) -> Self {
        self.expires_at = Some(self.created_at + chrono::Duration::seconds(ttl_seconds));
        self
    }

    /// Attach metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    /// True iff the entry is visible for lookup at `now` (§3: `now < expires_at`
    /// or no expiry at all).
    #[must_use]
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|expires_at| now < expires_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::permission::PermissionSet;

    fn policy() -> AccessPolicy {
        AccessPolicy::owner_only("user:alice", PermissionSet::FULL)
    }

    #[test]
    fn entry_with_no_ttl_is_always_live() {
        let entry = Entry::new(serde_json::json!({"a": 1}), "user:alice", policy());
        assert!(entry.is_live(Utc::now() + chrono::Duration::days(365)));
    }

    #[test]
    fn entry_with_ttl_expires() {
        let entry = Entry::new(serde_json::json!(1), "public", policy()).with_ttl(10);
        assert!(entry.is_live(entry.created_at));
        assert!(!entry.is_live(entry.created_at + chrono::Duration::seconds(11)));
    }

    #[test]
    fn expiry_is_exclusive_at_the_boundary() {
        let entry = Entry::new(serde_json::json!(1), "public", policy()).with_ttl(10);
        let expires_at = entry.expires_at.unwrap();
        assert!(!entry.is_live(expires_at));
        assert!(entry.is_live(expires_at - chrono::Duration::milliseconds(1)));
    }
}
