//! Configuration validation support.

use crate::error::ValidationError;

/// Validation hook for options types.
///
/// Registrations made with [`Registration::validated`](crate::core::Registration::validated)
/// run it on every bound value. A value that fails is never published.
///
/// # Examples
///
/// ```rust
/// use options_monitor::core::Validate;
/// use options_monitor::error::ValidationError;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Default, Serialize, Deserialize)]
/// struct PoolOptions {
///     min_connections: usize,
///     max_connections: usize,
/// }
///
/// impl Validate for PoolOptions {
///     fn validate(&self) -> Result<(), ValidationError> {
///         if self.max_connections == 0 {
///             return Err(ValidationError::invalid_field(
///                 "max_connections",
///                 "must be greater than 0",
///             ));
///         }
///         if self.min_connections > self.max_connections {
///             return Err(ValidationError::custom("min_connections exceeds max_connections"));
///         }
///         Ok(())
///     }
/// }
///
/// assert!(PoolOptions::default().validate().is_err());
/// ```
pub trait Validate {
    /// Check the bound options.
    ///
    /// # Errors
    ///
    /// Should return a `ValidationError` describing what validation failed.
    fn validate(&self) -> Result<(), ValidationError>;
}
