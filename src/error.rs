//! Error types for options-monitor.

use std::fmt;

/// Result type alias for options-monitor operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur while loading, watching or publishing options.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration source could not be set up.
    ///
    /// Raised while building a manager: the watched directory is missing,
    /// the initial file cannot be read, or the watcher cannot be created.
    #[error("Failed to set up configuration source: {0}")]
    SetupError(String),

    /// The document is malformed or a section cannot be bound.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// The file stayed unreadable for every retry attempt.
    #[error("Configuration file unreadable after {attempts} attempts: {source}")]
    TransientIoError {
        /// Number of read attempts made before giving up
        attempts: u32,
        /// The last I/O error observed
        #[source]
        source: std::io::Error,
    },

    /// A change callback panicked while being notified.
    #[error("Change callback failed: {0}")]
    CallbackError(String),

    /// A freshly bound value was rejected by its validator.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    /// The file watcher failed after setup.
    #[error("File watching error: {0}")]
    WatchError(String),

    /// IO error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Generic error for other cases.
    #[error("Configuration error: {0}")]
    Other(String),
}

impl ConfigError {
    /// Whether the system stays serviceable after this error.
    ///
    /// Recoverable errors abort a single reload cycle and leave the last
    /// published values in place.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ParseError(_)
                | Self::TransientIoError { .. }
                | Self::CallbackError(_)
                | Self::ValidationError(_)
        )
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

/// Validation error returned by options validators.
#[derive(Debug)]
pub enum ValidationError {
    /// Custom validation error with a message.
    Custom(String),

    /// A specific field has an invalid value.
    InvalidField {
        /// The field name
        field: String,
        /// Why the value was rejected
        reason: String,
    },

    /// Multiple validation errors occurred.
    Multiple(Vec<ValidationError>),
}

impl ValidationError {
    /// Create a custom validation error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Create an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(msg) => write!(f, "{}", msg),
            Self::InvalidField { field, reason } => {
                write!(f, "Field '{}' is invalid: {}", field, reason)
            }
            Self::Multiple(errors) => {
                writeln!(f, "Multiple validation errors:")?;
                for (i, err) in errors.iter().enumerate() {
                    writeln!(f, "  {}. {}", i + 1, err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for ConfigError {
    fn from(err: ValidationError) -> Self {
        ConfigError::ValidationError(err.to_string())
    }
}
