//! File-based configuration source.

use super::ConfigSource;
use crate::core::Format;
use crate::error::{ConfigError, Result};
use std::io;
use std::path::{Path, PathBuf};

/// File-based configuration source.
///
/// Reads one structured document from disk. The format is detected from the
/// file extension unless overridden with [`FileSource::with_format`].
///
/// # Examples
///
/// ```rust,no_run
/// use options_monitor::sources::FileSource;
///
/// # fn example() -> options_monitor::error::Result<()> {
/// let source = FileSource::new("config/appsettings.json")?;
/// source.check()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    format: Format,
}

impl FileSource {
    /// Create a new file source with automatic format detection.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::SetupError` if the extension names no enabled format.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let format = Format::from_path(&path)?;
        Ok(Self { path, format })
    }

    /// Create a file source with an explicit format, ignoring the extension.
    pub fn with_format(path: impl Into<PathBuf>, format: Format) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }

    /// The path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The directory containing the backing file.
    pub fn directory(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    /// Verify the source can be used at all.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::SetupError` if the directory does not exist, is
    /// not listable, or the file itself cannot be opened for reading.
    pub fn check(&self) -> Result<()> {
        let directory = self.directory();
        if !directory.is_dir() {
            return Err(ConfigError::SetupError(format!(
                "Configuration directory does not exist: {}",
                directory.display()
            )));
        }

        std::fs::read_dir(directory).map_err(|e| {
            ConfigError::SetupError(format!(
                "Configuration directory {} is not readable: {}",
                directory.display(),
                e
            ))
        })?;

        std::fs::File::open(&self.path).map_err(|e| {
            ConfigError::SetupError(format!(
                "Configuration file {} is not readable: {}",
                self.path.display(),
                e
            ))
        })?;

        Ok(())
    }
}

impl ConfigSource for FileSource {
    fn read(&self) -> Result<Vec<u8>> {
        let bytes = std::fs::read(&self.path)?;

        // A zero-length file is what a reader sees between an editor's
        // truncate and its write.
        if bytes.is_empty() {
            return Err(ConfigError::IoError(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("{} is empty", self.path.display()),
            )));
        }

        Ok(bytes)
    }

    fn format(&self) -> Format {
        self.format
    }

    fn name(&self) -> String {
        format!("file:{}", self.path.display())
    }

    fn watch_path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}
