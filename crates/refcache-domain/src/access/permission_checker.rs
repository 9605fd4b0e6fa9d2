//! Permission checker — combines access policy and namespace ownership into
//! an effective permission set or a structured denial.

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::value_objects::access_policy::AccessPolicy;
use crate::value_objects::actor::{Actor, Role};
use crate::value_objects::namespace::{self, NamespaceInfo};
use crate::value_objects::permission::PermissionSet;

/// Why a permission check was denied. Used only for structured logging at
/// the point of denial; never surfaced past the public boundary (§7's
/// collapse rule still applies to the `Error::PermissionDenied` this tags).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionDenialReason {
    /// The actor matched an explicit deny-list pattern.
    DenyList,
    /// The policy is bound to a session the actor is not part of.
    BoundSession,
    /// The namespace resolver rejected this namespace for this actor.
    NamespaceOwnership,
    /// The policy has an allow-list and the actor matched none of it.
    AllowList,
    /// No grant covered the required permissions.
    NoGrant,
}

impl PermissionDenialReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::DenyList => "deny-list",
            Self::BoundSession => "bound-session",
            Self::NamespaceOwnership => "namespace-ownership",
            Self::AllowList => "allow-list",
            Self::NoGrant => "no-grant",
        }
    }
}

fn role_default(policy: &AccessPolicy, role: Role) -> PermissionSet {
    match role {
        Role::User => policy.user_permissions,
        Role::Agent => policy.agent_permissions,
        Role::System => policy.system_permissions,
    }
}

fn deny(
    actor: &Actor,
    required: PermissionSet,
    namespace: &str,
    reason: PermissionDenialReason,
) -> Error {
    tracing::debug!(
        actor = %actor.canonical(),
        required = %required,
        namespace,
        reason = reason.as_str(),
        "permission denied"
    );
    Error::PermissionDenied {
        actor: actor.canonical(),
        required: required.to_string(),
        reason: reason.as_str().to_owned(),
        namespace: namespace.to_owned(),
    }
}

/// Resolve the effective permission set `actor` holds under `policy` within
/// `namespace_info`, then verify it covers `required`.
///
/// Resolution order (first applicable step decides, except `System` actors
/// always pass the namespace-ownership step per [`namespace::validate_access`]):
/// deny-list, bound-session, namespace ownership, allow-list, owner, role
/// default. Exactly per §4.4.
///
/// # Errors
/// Returns [`Error::PermissionDenied`] if any gating step rejects the actor,
/// or if the resolved effective set does not cover `required`.
pub fn check(
    actor: &Actor,
    required: PermissionSet,
    policy: &AccessPolicy,
    namespace_info: &NamespaceInfo,
) -> Result<PermissionSet, Error> {
    if let Some(deny_list) = &policy.deny_list {
        if deny_list.iter().any(|pattern| actor.matches(pattern)) {
            return Err(deny(actor, required, &namespace_info.raw, PermissionDenialReason::DenyList));
        }
    }

    if let Some(bound_session) = &policy.bound_session {
        if actor.session_id.as_deref() != Some(bound_session.as_str()) {
            return Err(deny(actor, required, &namespace_info.raw, PermissionDenialReason::BoundSession));
        }
    }

    if !namespace::validate_access(namespace_info, actor) {
        return Err(deny(
            actor,
            required,
            &namespace_info.raw,
            PermissionDenialReason::NamespaceOwnership,
        ));
    }

    let effective = if let Some(allow_list) = &policy.allow_list {
        if !allow_list.iter().any(|pattern| actor.matches(pattern)) {
            return Err(deny(actor, required, &namespace_info.raw, PermissionDenialReason::AllowList));
        }
        role_default(policy, actor.role)
    } else if policy
        .owner
        .as_deref()
        .is_some_and(|owner| owner == actor.canonical())
    {
        policy.owner_permissions.unwrap_or(PermissionSet::NONE)
    } else {
        role_default(policy, actor.role)
    };

    if !effective.contains(required) {
        return Err(deny(actor, required, &namespace_info.raw, PermissionDenialReason::NoGrant));
    }

    Ok(effective)
}
