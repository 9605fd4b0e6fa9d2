//! Error handling types.

use thiserror::Error;

/// Result type alias for operations that can fail.
pub type Result<T> = std::result::Result<T, Error>;

/// The single externally visible string for any reference-access failure.
///
/// Not-found, expired, and denied all collapse to this text so a client
/// cannot distinguish "doesn't exist" from "exists but you can't see it".
pub const OPAQUE_REFERENCE_MESSAGE: &str = "Invalid or inaccessible reference";

/// Main error type for the reference cache.
#[derive(Error, Debug)]
pub enum Error {
    /// A reference identifier failed its syntax or digest-length validation.
    #[error("Invalid reference identifier: {raw}")]
    InvalidReferenceId {
        /// The string that failed validation.
        raw: String,
    },

    /// A deep resolution walk found the same identifier twice on one branch.
    #[error("Circular reference detected: {}", chain.join(" -> "))]
    CircularReference {
        /// The cycle, in the order identifiers were encountered.
        chain: Vec<String>,
    },

    /// Permission was denied. Internal only — collapsed to [`Error::OpaqueReference`]
    /// (or simply dropped) at every public surface.
    #[error("Permission denied for {actor}: {reason}")]
    PermissionDenied {
        /// The actor that was denied.
        actor: String,
        /// The permissions that were required but not held.
        required: String,
        /// Human-readable reason, for internal logging only.
        reason: String,
        /// The namespace the denial occurred in.
        namespace: String,
    },

    /// An entry could not be found. Internal only — collapsed to
    /// [`Error::OpaqueReference`] at every public surface.
    #[error("Not found: {resource}")]
    NotFound {
        /// Description of the missing resource.
        resource: String,
    },

    /// The single externally visible kind for {not found, expired, denied}.
    #[error("{}", OPAQUE_REFERENCE_MESSAGE)]
    OpaqueReference {
        /// The reference identifier the caller already knew about.
        ref_id: String,
    },

    /// A background task exhausted its retry budget.
    #[error("Task failed after retries: {message}")]
    TaskFailed {
        /// The final error text from the last attempt.
        message: String,
    },

    /// An invocation or task was cancelled.
    #[error("Cancelled")]
    Cancelled,

    /// A malformed argument was supplied to a public operation.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    /// A storage backend failed to complete an operation.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the failure.
        message: String,
        /// Optional underlying error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A configuration value was missing or invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
        /// Optional underlying error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// JSON (de)serialization failed.
    #[error("JSON error: {source}")]
    Json {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },

    /// An internal invariant was violated.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl Error {
    /// Create a storage error with no source.
    pub fn storage<S: Into<String>>(message: S) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Create a storage error with an underlying source.
    pub fn storage_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a configuration error with no source.
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
            source: None,
        }
    }

    /// Create a configuration error with an underlying source.
    pub fn configuration_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Configuration {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an internal error.
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Collapse this error to the single opaque kind if it is one of
    /// {`NotFound`, `PermissionDenied`} — the public-surface rule from §7.
    /// Any other error kind is passed through unchanged.
    #[must_use]
    pub fn to_opaque(self, ref_id: impl Into<String>) -> Self {
        match self {
            Self::NotFound { .. } | Self::PermissionDenied { .. } | Self::OpaqueReference { .. } => {
                Self::OpaqueReference {
                    ref_id: ref_id.into(),
                }
            }
            other => other,
        }
    }

    /// True iff this error is already (or becomes, via collapse) the opaque kind.
    #[must_use]
    pub fn is_opaque(&self) -> bool {
        matches!(self, Self::OpaqueReference { .. })
    }
}
