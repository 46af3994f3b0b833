//! Error types for Predio operations.
//!
//! Every fallible operation in the crate reports one of the variants below;
//! nothing partially mutates persisted state on failure.

use std::fmt;

/// Main error type for Predio operations.
///
/// # Examples
///
/// ```
/// use predio::error::PredioError;
///
/// let err = PredioError::schema("column 'precio' not found");
/// assert!(err.to_string().contains("precio"));
/// ```
#[derive(Debug)]
pub enum PredioError {
    /// Unsupported ingestion format, missing required attribute, or empty dataset.
    Schema {
        /// What did not conform
        message: String,
    },

    /// Operation invoked before a required prior step.
    State {
        /// Which prerequisite is missing
        message: String,
    },

    /// Out-of-range id, bad hyperparameter, or malformed criteria value.
    Validation {
        /// What was rejected
        message: String,
    },

    /// Corrupt or version-incompatible model artifact.
    Persistence {
        /// Why the blob was rejected
        message: String,
    },

    /// I/O error (file not found, permission denied, etc.).
    Io(std::io::Error),
}

impl fmt::Display for PredioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredioError::Schema { message } => write!(f, "schema error: {message}"),
            PredioError::State { message } => write!(f, "invalid state: {message}"),
            PredioError::Validation { message } => write!(f, "validation failed: {message}"),
            PredioError::Persistence { message } => write!(f, "persistence error: {message}"),
            PredioError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for PredioError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PredioError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PredioError {
    fn from(err: std::io::Error) -> Self {
        PredioError::Io(err)
    }
}

impl From<serde_json::Error> for PredioError {
    fn from(err: serde_json::Error) -> Self {
        PredioError::Persistence {
            message: err.to_string(),
        }
    }
}

impl PredioError {
    /// Creates a schema error with a descriptive message.
    #[must_use]
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Creates a state error with a descriptive message.
    #[must_use]
    pub fn state(message: impl Into<String>) -> Self {
        Self::State {
            message: message.into(),
        }
    }

    /// Creates a validation error with a descriptive message.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a persistence error with a descriptive message.
    #[must_use]
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }
}

/// Convenience type alias for Results.
pub type Result<T> = std::result::Result<T, PredioError>;
