//! Error types for WeeklyPack.
//!
//! Library crates use [`WeeklyPackError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` and maps each variant's
//! [`ErrorCategory`] to a process exit code.

use std::path::PathBuf;

/// Top-level error type for all WeeklyPack operations.
#[derive(Debug, thiserror::Error)]
pub enum WeeklyPackError {
    /// Required configuration (credential, identifier, file path) is absent or invalid.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error talking to an external service.
    #[error("network error: {0}")]
    Network(String),

    /// Structured-text parsing error (JSON, TOML, YAML).
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad topic bank, malformed period key, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Nothing to operate on (e.g. no period directories exist yet).
    #[error("not found: {0}")]
    NotFound(String),

    /// An artifact an earlier stage should have written is missing.
    #[error("missing artifact {file} for {period}: has the earlier stage run?")]
    StateMissing { period: String, file: String },

    /// The remote text generator could not produce a completion.
    #[error("generation unavailable: {0}")]
    Generation(String),

    /// Remote object storage rejected a request.
    #[error("storage error: {0}")]
    Storage(String),

    /// Knowledge-base API rejected a request or returned an unusable schema.
    #[error("knowledge base error: {0}")]
    KnowledgeBase(String),

    /// Webhook delivery failed after all attempts.
    #[error("webhook failed after {attempts} attempts: {message}")]
    Webhook { attempts: u32, message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, WeeklyPackError>;

/// Coarse failure class, used for exit codes and for deciding whether a
/// pipeline run may skip a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    StateAbsent,
    External,
    Internal,
}

impl ErrorCategory {
    /// Process exit code for this category.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Configuration => 2,
            Self::StateAbsent => 3,
            Self::External => 4,
            Self::Internal => 1,
        }
    }
}

impl WeeklyPackError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// A required artifact file is absent for the given period token.
    pub fn state_missing(period: impl Into<String>, file: impl Into<String>) -> Self {
        Self::StateMissing {
            period: period.into(),
            file: file.into(),
        }
    }

    /// Classify this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config { .. } => ErrorCategory::Configuration,
            Self::NotFound(_) | Self::StateMissing { .. } => ErrorCategory::StateAbsent,
            Self::Network(_)
            | Self::Generation(_)
            | Self::Storage(_)
            | Self::KnowledgeBase(_)
            | Self::Webhook { .. } => ErrorCategory::External,
            Self::Parse { .. } | Self::Io { .. } | Self::Validation { .. } => {
                ErrorCategory::Internal
            }
        }
    }
}
