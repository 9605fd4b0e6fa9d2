//! Access policy — the ACL attached to a cache entry.

use serde::{Deserialize, Serialize};

use super::permission::PermissionSet;

/// The per-entry access-control policy.
///
/// All fields besides the three role defaults are optional; an absent field
/// means "no override" at that step of [`crate::access::permission_checker::check`]'s
/// resolution order. Value-equal, hashable, and JSON-serializable per §4.1.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessPolicy {
    /// Baseline permissions granted to `USER`-role actors with no other match.
    pub user_permissions: PermissionSet,
    /// Baseline permissions granted to `AGENT`-role actors with no other match.
    pub agent_permissions: PermissionSet,
    /// Baseline permissions granted to `SYSTEM`-role actors with no other match.
    pub system_permissions: PermissionSet,
    /// The entry's owner, in canonical `"role:principal"` form.
    pub owner: Option<String>,
    /// Permissions granted when the actor's canonical form matches `owner`.
    pub owner_permissions: Option<PermissionSet>,
    /// If present, only actors matching one of these patterns may access the entry.
    pub allow_list: Option<Vec<String>>,
    /// If present, any actor matching one of these patterns is denied outright.
    pub deny_list: Option<Vec<String>>,
    /// If present, only actors bound to this session id may access the entry.
    pub bound_session: Option<String>,
}

impl AccessPolicy {
    /// A policy granting only the owner access, via `owner_permissions`.
    #[must_use]
    pub fn owner_only(owner: impl Into<String>, owner_permissions: PermissionSet) -> Self {
        Self {
            user_permissions: PermissionSet::NONE,
            agent_permissions: PermissionSet::NONE,
            system_permissions: PermissionSet::FULL,
            owner: Some(owner.into()),
            owner_permissions: Some(owner_permissions),
            allow_list: None,
            deny_list: None,
            bound_session: None,
        }
    }

    /// A policy with role defaults only, no owner override.
    #[must_use]
    pub fn with_role_defaults(
        user_permissions: PermissionSet,
        agent_permissions: PermissionSet,
        system_permissions: PermissionSet,
    ) -> Self {
        Self {
            user_permissions,
            agent_permissions,
            system_permissions,
            owner: None,
            owner_permissions: None,
            allow_list: None,
            deny_list: None,
            bound_session: None,
        }
    }

    /// Attach an allow-list, restricting access to matching patterns only.
    #[must_use]
    pub fn with_allow_list(mut self, patterns: Vec<String>) -> Self {
        self.allow_list = Some(patterns);
        self
    }

    /// Attach a deny-list, absolutely rejecting matching patterns.
    #[must_use]
    pub fn with_deny_list(mut self, patterns: Vec<String>) -> Self {
        self.deny_list = Some(patterns);
        self
    }

    /// Bind this policy to a single session id.
    #[must_use]
    pub fn with_bound_session(mut self, session_id: impl Into<String>) -> Self {
        self.bound_session = Some(session_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_only_grants_system_full_by_default() {
        let policy = AccessPolicy::owner_only("user:alice", PermissionSet::FULL);
        assert_eq!(policy.system_permissions, PermissionSet::FULL);
        assert_eq!(policy.user_permissions, PermissionSet::NONE);
    }

    #[test]
    fn builder_methods_set_optional_fields() {
        let policy = AccessPolicy::with_role_defaults(
            PermissionSet::READ,
            PermissionSet::READ,
            PermissionSet::FULL,
        )
        .with_allow_list(vec!["agent:claude-*".to_owned()])
        .with_deny_list(vec!["user:banned".to_owned()])
        .with_bound_session("s1");

        assert_eq!(policy.allow_list.as_deref(), Some(&["agent:claude-*".to_owned()][..]));
        assert_eq!(policy.deny_list.as_deref(), Some(&["user:banned".to_owned()][..]));
        assert_eq!(policy.bound_session.as_deref(), Some("s1"));
    }

    #[test]
    fn policies_are_value_equal() {
        let a = AccessPolicy::owner_only("user:alice", PermissionSet::FULL);
        let b = AccessPolicy::owner_only("user:alice", PermissionSet::FULL);
        assert_eq!(a, b);
    }
}
