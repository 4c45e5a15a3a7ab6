//! Error taxonomy for the knowledge store.
//!
//! Default policy: every store transaction rolls back fully before an error
//! is surfaced; classification and extraction never raise at all.

use thiserror::Error;

/// Error category for structured logging and payload codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// A record id that does not exist
    NotFound,
    /// Operation attempted on a record not in the required status
    InvalidState,
    /// Write-intent lock not obtained before the busy timeout
    LockContention,
    /// Would create a second canonical-final row for a (key, layer)
    ConstraintViolation,
    /// Malformed similarity query (FTS MATCH failure)
    IndexQuery,
    /// Errors creating/connecting/querying the SQLite store
    Storage,
    /// Rule config missing or malformed
    ConfigError,
}

impl ErrorCategory {
    /// Machine-readable code for logging and error payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::InvalidState => "INVALID_STATE",
            Self::LockContention => "LOCK_CONTENTION",
            Self::ConstraintViolation => "CONSTRAINT_VIOLATION",
            Self::IndexQuery => "INDEX_QUERY_ERROR",
            Self::Storage => "STORAGE_ERROR",
            Self::ConfigError => "CONFIG_ERROR",
        }
    }

    /// Whether the caller may reasonably retry the same call unchanged
    pub fn retryable(&self) -> bool {
        matches!(self, Self::LockContention)
    }
}

/// Knowledge-store error with category and context
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("id={id} not found")]
    NotFound { id: i64 },

    #[error("invalid state: {message}")]
    InvalidState { message: String },

    #[error("lock contention: {message}")]
    LockContention { message: String },

    #[error("constraint violation: {message}")]
    ConstraintViolation { message: String },

    #[error("index query error: {message}")]
    IndexQuery { message: String },

    #[error("storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl MemoryError {
    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::InvalidState { .. } => ErrorCategory::InvalidState,
            Self::LockContention { .. } => ErrorCategory::LockContention,
            Self::ConstraintViolation { .. } => ErrorCategory::ConstraintViolation,
            Self::IndexQuery { .. } => ErrorCategory::IndexQuery,
            Self::Storage { .. } => ErrorCategory::Storage,
            Self::Config { .. } => ErrorCategory::ConfigError,
        }
    }

    /// Create a not-found error
    pub fn not_found(id: i64) -> Self {
        Self::NotFound { id }
    }

    /// Create an invalid-state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create a lock-contention error
    pub fn lock_contention(message: impl Into<String>) -> Self {
        Self::LockContention {
            message: message.into(),
        }
    }

    /// Create a constraint-violation error
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::ConstraintViolation {
            message: message.into(),
        }
    }

    /// Create an index-query error
    pub fn index_query(message: impl Into<String>) -> Self {
        Self::IndexQuery {
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Create a storage error with source
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config error with source
    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Wrap a rusqlite error, mapping busy-timeout expiry to LockContention
    /// and unique-constraint hits on the canonical index to ConstraintViolation.
    pub fn from_sql(context: &str, e: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;
        if let rusqlite::Error::SqliteFailure(inner, ref detail) = e {
            match inner.code {
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                    return Self::lock_contention(format!(
                        "{context}: write-intent lock not acquired before timeout"
                    ));
                }
                ErrorCode::ConstraintViolation => {
                    let detail = detail.clone().unwrap_or_default();
                    return Self::constraint(format!("{context}: {detail}"));
                }
                _ => {}
            }
        }
        Self::storage_with_source(context.to_string(), e)
    }
}

/// Result type for knowledge-store operations
pub type Result<T> = std::result::Result<T, MemoryError>;
