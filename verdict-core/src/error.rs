//! Error types for the Verdict evaluation core.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering configuration, target-model invocation, and storage domains.
//!
//! Note the deliberate asymmetry: a target-model invocation failure aborts
//! the run it belongs to, while a judge failure never surfaces here at all —
//! the judge degrades locally to a zero score (see [`crate::judge`]).

/// Top-level error type for the Verdict core library.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invocation error: {0}")]
    Invocation(#[from] InvocationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Errors from the configuration system.
///
/// A missing judge credential is fatal and raised at construction time, not
/// at call time, so a misconfigured deployment fails before any run starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Environment variable not set: {var}")]
    MissingCredential { var: String },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Failed to load configuration: {message}")]
    LoadFailed { message: String },
}

/// Errors from target-model invocation.
///
/// Single attempt, no retry. None of these are recovered by the orchestrator:
/// an invocation failure aborts the in-progress run.
#[derive(Debug, thiserror::Error)]
pub enum InvocationError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },
}

/// Errors from the SQLite storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Record not found: {what}")]
    NotFound { what: String },
}

impl EvalError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
