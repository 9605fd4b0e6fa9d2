//! Actor model — identity-aware principals used by the access-control engine.

use serde::{Deserialize, Serialize};

/// The three identity roles an actor may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A human end-user.
    User,
    /// An AI agent acting on a user's behalf.
    Agent,
    /// Trusted server-side code, bypasses ownership checks.
    System,
}

impl Role {
    fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Agent => "agent",
            Self::System => "system",
        }
    }
}

/// A typed identity used throughout permission checks.
///
/// Actors expose [`Actor::matches`] for glob-style pattern matching against
/// allow/deny lists and owner records, e.g. `agent:claude-*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    /// The actor's role.
    pub role: Role,
    /// Principal identifier (user id, agent id); `None` for anonymous actors.
    pub principal: Option<String>,
    /// Bound session identifier, if any.
    pub session_id: Option<String>,
    /// Set only on the wrapper's internal invocation path; never reachable
    /// from the public `get`/poll surface. Gates `resolve`'s EXECUTE grant
    /// to trusted server-side code paths per §9 Open Question 1.
    #[serde(skip, default)]
    trusted_server_path: bool,
}

impl Actor {
    fn new(role: Role, principal: Option<String>) -> Self {
        Self {
            role,
            principal,
            session_id: None,
            trusted_server_path: false,
        }
    }

    /// An anonymous or identified user actor.
    #[must_use]
    pub fn user(principal: impl Into<String>) -> Self {
        Self::new(Role::User, Some(principal.into()))
    }

    /// An anonymous user actor with no principal.
    #[must_use]
    pub fn anonymous_user() -> Self {
        Self::new(Role::User, None)
    }

    /// An anonymous or identified agent actor.
    #[must_use]
    pub fn agent(principal: impl Into<String>) -> Self {
        Self::new(Role::Agent, Some(principal.into()))
    }

    /// An anonymous agent actor with no principal.
    #[must_use]
    pub fn anonymous_agent() -> Self {
        Self::new(Role::Agent, None)
    }

    /// The system actor. Bypasses ownership checks everywhere.
    #[must_use]
    pub fn system() -> Self {
        Self::new(Role::System, None)
    }

    /// Attach a session identifier.
    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Mark this actor as invoking from a trusted, internal server-side code
    /// path. Reserved for the cached-callable wrapper's internal resolution
    /// step; no tool argument or public `get`/poll call site should ever
    /// construct an actor this way.
    #[must_use]
    pub fn as_trusted_server_path(mut self) -> Self {
        self.trusted_server_path = true;
        self
    }

    /// True iff this actor was marked as invoking from a trusted server-side
    /// code path (see [`Actor::as_trusted_server_path`]).
    #[must_use]
    pub fn is_trusted_server_path(&self) -> bool {
        self.trusted_server_path
    }

    /// Canonical `"role:principal"` form used for pattern matching, e.g.
    /// `"agent:claude-instance-1"` or `"user:*"` for an anonymous user.
    #[must_use]
    pub fn canonical(&self) -> String {
        format!(
            "{}:{}",
            self.role.as_str(),
            self.principal.as_deref().unwrap_or("*")
        )
    }

    /// Glob-match this actor's canonical form against `pattern`.
    ///
    /// `*` matches any run of characters within the principal segment, e.g.
    /// `agent:claude-*` matches `agent:claude-instance-1`. The role segment
    /// must match exactly (or be `*`).
    #[must_use]
    pub fn matches(&self, pattern: &str) -> bool {
        let canonical = self.canonical();
        glob_match(pattern, &canonical)
    }
}

/// Accepts either a typed [`Actor`] or one of the literal strings
/// `"user"` / `"agent"` / `"system"`, canonicalizing the latter to an
/// anonymous actor of that role.
pub fn canonicalize_actor(actor: impl Into<ActorLike>) -> Actor {
    match actor.into() {
        ActorLike::Actor(actor) => actor,
        ActorLike::Role(role) => match role {
            Role::User => Actor::anonymous_user(),
            Role::Agent => Actor::anonymous_agent(),
            Role::System => Actor::system(),
        },
    }
}

/// Either a concrete [`Actor`] or a bare role literal, accepted at call
/// sites that want to write `"agent"` instead of constructing an `Actor`.
pub enum ActorLike {
    /// A fully typed actor.
    Actor(Actor),
    /// A bare role literal (`"user"`, `"agent"`, `"system"`).
    Role(Role),
}

impl From<Actor> for ActorLike {
    fn from(actor: Actor) -> Self {
        Self::Actor(actor)
    }
}

impl From<&str> for ActorLike {
    fn from(value: &str) -> Self {
        match value {
            "user" => Self::Role(Role::User),
            "agent" => Self::Role(Role::Agent),
            "system" => Self::Role(Role::System),
            other => {
                tracing::warn!(role = other, "unrecognized actor role literal, defaulting to agent");
                Self::Role(Role::Agent)
            }
        }
    }
}

fn glob_match(pattern: &str, value: &str) -> bool {
    match pattern.split_once(':') {
        Some((pat_role, pat_principal)) => match value.split_once(':') {
            Some((val_role, val_principal)) => {
                (pat_role == "*" || pat_role == val_role)
                    && glob_segment(pat_principal, val_principal)
            }
            None => false,
        },
        None => glob_segment(pattern, value),
    }
}

fn glob_segment(pattern: &str, value: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix('*') {
        value.starts_with(prefix)
    } else {
        pattern == value
    }
}
