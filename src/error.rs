//! Error types for the synchronizer.
//!
//! This module provides the error hierarchy for every stage of a sync:
//! input documents, provider calls, and per-kind reconciliation.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the synchronizer.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Resource provider errors.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Reconciliation errors.
    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required input file was not found.
    #[error("File not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// An input document could not be parsed.
    #[error("Failed to parse {}: {message}", location.as_deref().unwrap_or("input"))]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },

    /// Duplicate resource definition.
    #[error("Duplicate {resource_type} name: {name}")]
    DuplicateName {
        /// Type of resource (function, topic, ...).
        resource_type: String,
        /// The duplicated name.
        name: String,
    },

    /// The requested runtime cannot be mapped to a provider runtime.
    #[error(
        "Unsupported engine for function '{function}' ({requested}); please specify \"node\": \">=18\", \">=20\", or \">=22\""
    )]
    UnsupportedRuntime {
        /// Function name.
        function: String,
        /// The requested engine version, or `none`.
        requested: String,
    },

    /// None of the allowed CPU architectures is supported.
    #[error("Unsupported CPUs for function '{function}': {cpus}")]
    UnsupportedCpus {
        /// Function name.
        function: String,
        /// The declared CPU list.
        cpus: String,
    },

    /// A schedule is not a 5-field cron expression.
    #[error("Invalid cron expression for function '{function}': {schedule}")]
    InvalidSchedule {
        /// Function name.
        function: String,
        /// The offending schedule.
        schedule: String,
    },

    /// No packaged artifact exists for a declared function.
    #[error("No packaged code for function '{function}'")]
    MissingArtifact {
        /// Function name.
        function: String,
    },

    /// The build step reported warnings that make the artifacts suspect.
    #[error("Suspicious build warnings: {}", warnings.join("; "))]
    SuspiciousBuild {
        /// Warning lines reported by the build.
        warnings: Vec<String>,
    },

    /// Credentials could not be resolved.
    #[error("Missing credentials: {message}")]
    MissingCredentials {
        /// Description of what is missing.
        message: String,
    },
}

/// Resource provider errors.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The resource does not exist (404).
    #[error("{operation}: resource not found")]
    NotFound {
        /// Operator-facing description of the failed operation.
        operation: String,
    },

    /// A concurrent mutation collided with ours (409).
    #[error("{operation}: conflicting concurrent operation")]
    Conflict {
        /// Operator-facing description of the failed operation.
        operation: String,
    },

    /// Rate limited (429) after exhausting retries.
    #[error("Provider rate limited, retry after {retry_after_ms} ms")]
    Throttled {
        /// Milliseconds the provider asked us to wait.
        retry_after_ms: u64,
    },

    /// Any other non-2xx response.
    #[error("{message} ({status})")]
    ApiRequestFailed {
        /// HTTP status code.
        status: u16,
        /// Operator-facing message, including the response body.
        message: String,
    },

    /// Network error.
    #[error("Network error communicating with provider: {message}")]
    NetworkError {
        /// Description of the network error.
        message: String,
    },

    /// Invalid response from the provider.
    #[error("Invalid response from provider: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },
}

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Region and account could not be derived from any function identifier.
    #[error("Cannot derive region and account: no function exists in scope")]
    MissingRegionAccount,

    /// An HTTP function was declared but no gateway is available.
    #[error("Need an API gateway for HTTP trigger of function '{function}'")]
    MissingGateway {
        /// Function name.
        function: String,
    },

    /// No integration exists for an HTTP function when building its route.
    #[error("No integration ID for function '{function}'")]
    MissingIntegration {
        /// Function name.
        function: String,
    },

    /// No remote function exists for a declared function.
    #[error("No deployed function for '{function}'")]
    MissingFunction {
        /// Function name.
        function: String,
    },

    /// The provider accepted a request but answered unexpectedly.
    #[error("Unexpected {resource} response: {message}")]
    UnexpectedResponse {
        /// Resource kind.
        resource: String,
        /// Description of the anomaly.
        message: String,
    },
}

/// Result type alias for synchronizer operations.
pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this is a provider not-found error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Provider(ProviderError::NotFound { .. }))
    }

    /// Returns true if this is a provider conflict error.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Provider(ProviderError::Conflict { .. }))
    }

    /// Returns the HTTP status carried by a provider error, if any.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Provider(ProviderError::NotFound { .. }) => Some(404),
            Self::Provider(ProviderError::Conflict { .. }) => Some(409),
            Self::Provider(ProviderError::Throttled { .. }) => Some(429),
            Self::Provider(ProviderError::ApiRequestFailed { status, .. }) => Some(*status),
            _ => None,
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a parse error with an optional location.
    #[must_use]
    pub fn parse(message: impl Into<String>, location: Option<String>) -> Self {
        Self::ParseError {
            message: message.into(),
            location,
        }
    }
}

impl ProviderError {
    /// Creates an API request error.
    #[must_use]
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiRequestFailed {
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    /// Creates an invalid response error.
    #[must_use]
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }
}
