// SPDX-License-Identifier: MIT

//! Typed error handling for kinetic-flow
//!
//! Every engine operation returns [`Result`]. Failed steps and actions keep
//! the `Display` form of these errors on their own records, and the owning
//! execution is failed with a single top-level error string.

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, KineticError>;

/// Top-level error type for kinetic-flow
#[derive(Debug, Error)]
pub enum KineticError {
    /// Malformed workflow definition, goal, or missing required field
    #[error("Validation error: {0}")]
    Validation(String),

    /// Cyclic or unresolved step dependency
    #[error("Dependency error: unable to schedule steps {pending:?} (cycle or missing dependency)")]
    Dependency { pending: Vec<String> },

    /// Remote capability call failed (non-2xx status or transport failure)
    #[error("Capability '{service}' call failed: {message}")]
    CapabilityCall {
        service: String,
        message: String,
        status: Option<u16>,
    },

    /// ReAct loop exhausted its iteration bound without reaching the goal
    #[error("Iteration limit of {limit} reached without achieving the goal")]
    IterationLimit { limit: u32 },

    /// Execution was cancelled while work was outstanding
    #[error("Execution cancelled")]
    Cancelled,

    /// A call or a whole run exceeded its deadline
    #[error("{what} timed out after {after_ms}ms")]
    Timeout { what: String, after_ms: u64 },

    /// Record lookup failed
    #[error("{kind} '{id}' not found")]
    NotFound { kind: String, id: String },

    /// Lifecycle guard rejected a state change
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Configuration errors (bad URLs, unreadable config files)
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP client errors that happen outside a capability call
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Generic error wrapper
    #[error("{0}")]
    Other(String),
}

impl KineticError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a capability call error
    pub fn capability(
        service: impl Into<String>,
        message: impl Into<String>,
        status: Option<u16>,
    ) -> Self {
        Self::CapabilityCall {
            service: service.into(),
            message: message.into(),
            status,
        }
    }

    /// Create a not-found error
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Create an invalid transition error
    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

impl From<&str> for KineticError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for KineticError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}
