//! Namespace parsing and ownership resolution.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::actor::{Actor, Role};

/// The recognized shape of a parsed namespace string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NamespaceKind {
    /// `public` — shared, always accessible.
    Public,
    /// `session:<id>`.
    Session,
    /// `user:<id>`.
    User,
    /// `user:<uid>:session:<sid>`.
    UserSession,
    /// `agent:<id>`.
    Agent,
    /// `org:<id>` — no implicit ownership.
    Org,
    /// `custom:<name>` — no implicit ownership.
    Custom,
}

/// A parsed namespace, carrying enough structure for ownership validation
/// without re-parsing the raw string at every check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceInfo {
    /// The original, unparsed namespace string.
    pub raw: String,
    /// The recognized shape.
    pub kind: NamespaceKind,
    /// Owning user/agent/org id, if the shape carries one.
    pub owner_id: Option<String>,
    /// Session id, if the shape carries one.
    pub session_id: Option<String>,
    /// True for the `public` namespace.
    pub is_public: bool,
}

impl std::fmt::Display for NamespaceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

static USER_SESSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^user:([^:]+):session:([^:]+)$").unwrap());
static SIMPLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([a-z]+):(.+)$").unwrap());

/// Parse a raw namespace string into its structured form.
///
/// Recognizes: `public`, `session:<id>`, `user:<id>`, `agent:<id>`,
/// `user:<uid>:session:<sid>`, `org:<id>`, and falls back to `custom:<name>`
/// verbatim for anything matching `custom:` or any other unrecognized
/// `prefix:rest` shape (free-form namespaces carry no implicit ownership).
#[must_use]
pub fn parse(raw: &str) -> NamespaceInfo {
    if raw == "public" {
        return NamespaceInfo {
            raw: raw.to_owned(),
            kind: NamespaceKind::Public,
            owner_id: None,
            session_id: None,
            is_public: true,
        };
    }

    if let Some(caps) = USER_SESSION_RE.captures(raw) {
        return NamespaceInfo {
            raw: raw.to_owned(),
            kind: NamespaceKind::UserSession,
            owner_id: Some(caps[1].to_owned()),
            session_id: Some(caps[2].to_owned()),
            is_public: false,
        };
    }

    if let Some(caps) = SIMPLE_RE.captures(raw) {
        let prefix = &caps[1];
        let rest = caps[2].to_owned();
        let kind = match prefix {
            "session" => NamespaceKind::Session,
            "user" => NamespaceKind::User,
            "agent" => NamespaceKind::Agent,
            "org" => NamespaceKind::Org,
            _ => NamespaceKind::Custom,
        };
        let (owner_id, session_id) = match kind {
            NamespaceKind::Session => (None, Some(rest.clone())),
            NamespaceKind::User | NamespaceKind::Agent | NamespaceKind::Org => {
                (Some(rest.clone()), None)
            }
            NamespaceKind::Custom => (None, None),
            NamespaceKind::Public | NamespaceKind::UserSession => unreachable!(),
        };
        return NamespaceInfo {
            raw: raw.to_owned(),
            kind,
            owner_id,
            session_id,
            is_public: false,
        };
    }

    // Anything without a `prefix:` shape at all is treated as a free-form
    // custom namespace (e.g. a bare slug).
    NamespaceInfo {
        raw: raw.to_owned(),
        kind: NamespaceKind::Custom,
        owner_id: None,
        session_id: None,
        is_public: false,
    }
}

/// Validate whether `actor` is permitted to access a namespace by its
/// intrinsic ownership rules alone (no ACL/policy fields considered — this
/// is the "namespace ownership" step of §4.4's resolution order, step 3).
///
/// `org:*` and `custom:*` carry no implicit ownership and always return
/// `true` here; policy ACLs are the only gate for those namespaces.
#[must_use]
pub fn validate_access(info: &NamespaceInfo, actor: &Actor) -> bool {
    if actor.role == Role::System {
        return true;
    }
    match info.kind {
        NamespaceKind::Public | NamespaceKind::Org | NamespaceKind::Custom => true,
        NamespaceKind::User => {
            actor.role == Role::User && info.owner_id.as_deref() == actor.principal.as_deref()
        }
        NamespaceKind::Session => info.session_id.as_deref() == actor.session_id.as_deref(),
        NamespaceKind::UserSession => {
            let user_ok =
                actor.role == Role::User && info.owner_id.as_deref() == actor.principal.as_deref();
            let session_ok = info.session_id.as_deref() == actor.session_id.as_deref();
            user_ok && session_ok
        }
        NamespaceKind::Agent => {
            actor.role == Role::Agent && info.owner_id.as_deref() == actor.principal.as_deref()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_public() {
        let info = parse("public");
        assert_eq!(info.kind, NamespaceKind::Public);
        assert!(info.is_public);
    }

    #[test]
    fn parses_user_session_before_simple_user() {
        let info = parse("user:alice:session:s1");
        assert_eq!(info.kind, NamespaceKind::UserSession);
        assert_eq!(info.owner_id.as_deref(), Some("alice"));
        assert_eq!(info.session_id.as_deref(), Some("s1"));
    }

    #[test]
    fn parses_each_simple_form() {
        assert_eq!(parse("user:alice").kind, NamespaceKind::User);
        assert_eq!(parse("agent:bot1").kind, NamespaceKind::Agent);
        assert_eq!(parse("session:s1").kind, NamespaceKind::Session);
        assert_eq!(parse("org:acme").kind, NamespaceKind::Org);
        assert_eq!(parse("custom:whatever").kind, NamespaceKind::Custom);
    }

    #[test]
    fn user_namespace_requires_matching_actor() {
        let info = parse("user:alice");
        assert!(validate_access(&info, &Actor::user("alice")));
        assert!(!validate_access(&info, &Actor::user("bob")));
        assert!(validate_access(&info, &Actor::system()));
    }

    #[test]
    fn session_namespace_matches_any_role() {
        let info = parse("session:s1");
        let agent = Actor::agent("bot").with_session("s1");
        assert!(validate_access(&info, &agent));
        let wrong_session = Actor::agent("bot").with_session("s2");
        assert!(!validate_access(&info, &wrong_session));
    }

    #[test]
    fn user_session_requires_both() {
        let info = parse("user:alice:session:s1");
        let right = Actor::user("alice").with_session("s1");
        assert!(validate_access(&info, &right));
        let wrong_session = Actor::user("alice").with_session("s2");
        assert!(!validate_access(&info, &wrong_session));
        let wrong_user = Actor::user("bob").with_session("s1");
        assert!(!validate_access(&info, &wrong_user));
    }

    #[test]
    fn org_and_custom_have_no_implicit_ownership() {
        let org = parse("org:acme");
        assert!(validate_access(&org, &Actor::user("anyone")));
        let custom = parse("custom:scratch");
        assert!(validate_access(&custom, &Actor::agent("anyone")));
    }

    #[test]
    fn public_is_always_accessible() {
        let info = parse("public");
        assert!(validate_access(&info, &Actor::anonymous_user()));
    }
}
