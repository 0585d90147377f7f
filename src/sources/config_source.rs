//! Configuration source trait.

use crate::core::Format;
use crate::error::Result;
use serde_json::Value;
use std::path::Path;

/// Trait for configuration sources.
///
/// A source yields the raw bytes of one structured document. The manager
/// decodes them with [`ConfigSource::format`] and binds sections from the
/// resulting tree.
pub trait ConfigSource: Send + Sync {
    /// Read the current raw contents of the source.
    ///
    /// A single attempt. Retrying transient failures is the caller's job.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::IoError` when the contents are momentarily
    /// unavailable, or another variant when the source is unusable.
    fn read(&self) -> Result<Vec<u8>>;

    /// The format the raw contents are encoded in.
    fn format(&self) -> Format;

    /// Get a human-readable name for this source (for logging/debugging).
    fn name(&self) -> String;

    /// The file backing this source, if it can be watched for changes.
    fn watch_path(&self) -> Option<&Path> {
        None
    }

    /// Read and decode the current contents into a document tree.
    fn load(&self) -> Result<Value> {
        self.format().parse_document(&self.read()?)
    }
}
