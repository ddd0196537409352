//! Error types for Leadpipe.
//!
//! Library crates use [`LeadpipeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level error type for all Leadpipe operations.
#[derive(Debug, thiserror::Error)]
pub enum LeadpipeError {
    /// Configuration loading or validation error (including missing credentials).
    #[error("config error: {message}")]
    Config { message: String },

    /// The target identifier could not be interpreted as a URL.
    #[error("invalid target '{input}': {message}")]
    InvalidTarget { input: String, message: String },

    /// Transport-level failure talking to an external service.
    #[error("network error: {0}")]
    Network(String),

    /// An external service answered with a non-success status.
    #[error("HTTP {status} from {service}: {message}")]
    Http {
        service: String,
        status: u16,
        message: String,
    },

    /// An external service refused the call because of rate limiting.
    #[error("rate limited by {0}")]
    RateLimited(String),

    /// An external call did not finish within its budget.
    #[error("{operation} timed out after {after_ms} ms")]
    Timeout { operation: String, after_ms: u64 },

    /// Structured store error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Content classifier error (search or classification).
    #[error("classifier error: {0}")]
    Classifier(String),

    /// Source-control, hosting or notification provider error.
    #[error("{provider} error: {message}")]
    Provider { provider: String, message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A bug or unhandled condition inside our own logic.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LeadpipeError>;

/// Coarse classification of a failure, recorded on strategy attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureCategory {
    Timeout,
    RateLimited,
    Unauthorized,
    Rejected,
    Network,
    Unavailable,
    Internal,
}

impl std::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Timeout => "timeout",
            Self::RateLimited => "rate-limited",
            Self::Unauthorized => "unauthorized",
            Self::Rejected => "rejected",
            Self::Network => "network",
            Self::Unavailable => "unavailable",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

impl LeadpipeError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an input error for an unusable target identifier.
    pub fn invalid_target(input: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::InvalidTarget {
            input: input.into(),
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a provider error tagged with the provider name.
    pub fn provider(provider: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: msg.into(),
        }
    }

    /// Create a timeout error for the named operation.
    pub fn timeout(operation: impl Into<String>, after: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after_ms: u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Map an HTTP status from `service` to the matching variant.
    pub fn from_status(service: impl Into<String>, status: u16, body: &str) -> Self {
        let service = service.into();
        if status == 429 {
            return Self::RateLimited(service);
        }
        let message: String = body.chars().take(200).collect();
        Self::Http {
            service,
            status,
            message,
        }
    }

    /// Whether this error is an input error that must reach the caller.
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::InvalidTarget { .. })
    }

    /// Categorize this error for attempt reports.
    pub fn category(&self) -> FailureCategory {
        match self {
            Self::Timeout { .. } => FailureCategory::Timeout,
            Self::RateLimited(_) => FailureCategory::RateLimited,
            Self::Config { .. } => FailureCategory::Unauthorized,
            Self::Http { status, .. } if *status == 401 || *status == 403 => {
                FailureCategory::Unauthorized
            }
            Self::Http { status, .. } if *status >= 500 => FailureCategory::Unavailable,
            Self::Http { .. } | Self::Validation { .. } | Self::InvalidTarget { .. } => {
                FailureCategory::Rejected
            }
            Self::Network(_) => FailureCategory::Network,
            Self::Storage(_) | Self::Classifier(_) | Self::Provider { .. } | Self::Io { .. } => {
                FailureCategory::Unavailable
            }
            Self::Internal(_) => FailureCategory::Internal,
        }
    }
}
