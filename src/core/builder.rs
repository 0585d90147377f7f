//! Builder for constructing OptionsManager instances.

use crate::core::manager::read_with_retry;
use crate::core::{Format, OptionsManager};
use crate::error::{ConfigError, Result};
use crate::sources::{ConfigSource, FileSource, RetryPolicy};
use std::path::PathBuf;

#[cfg(feature = "file-watch")]
use crate::notify::{DEFAULT_DEBOUNCE, FileWatcher};
#[cfg(feature = "file-watch")]
use std::time::Duration;

#[cfg(feature = "metrics")]
use crate::metrics::ConfigMetrics;

/// Builder for constructing an `OptionsManager`.
///
/// Exactly one source is used. A custom source given with
/// [`with_source`](Self::with_source) takes precedence over
/// [`with_file`](Self::with_file).
///
/// # Examples
///
/// ```rust,no_run
/// use options_monitor::prelude::*;
/// use std::time::Duration;
///
/// # async fn example() -> Result<()> {
/// let manager = OptionsManager::builder()
///     .with_file("config/appsettings.json")
///     .with_debounce(Duration::from_millis(250))
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct OptionsManagerBuilder {
    file_path: Option<PathBuf>,
    format: Option<Format>,
    custom_source: Option<Box<dyn ConfigSource>>,
    retry: RetryPolicy,
    #[cfg(feature = "file-watch")]
    debounce: Duration,
    #[cfg(feature = "file-watch")]
    watch: bool,
    #[cfg(feature = "metrics")]
    metrics: Option<ConfigMetrics>,
}

impl OptionsManagerBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            file_path: None,
            format: None,
            custom_source: None,
            retry: RetryPolicy::default(),
            #[cfg(feature = "file-watch")]
            debounce: DEFAULT_DEBOUNCE,
            #[cfg(feature = "file-watch")]
            watch: true,
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Read options from a file.
    ///
    /// The format is detected from the extension: JSON (.json), and with the
    /// matching features YAML (.yaml, .yml) and TOML (.toml).
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Override extension-based format detection for the file.
    ///
    /// Applies only to [`with_file`](Self::with_file). It is ignored when a
    /// custom source is set, since the source reports its own
    /// [`format`](ConfigSource::format).
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    /// Read options from a custom source.
    ///
    /// Only sources exposing a [`watch_path`](ConfigSource::watch_path) are
    /// watched; others reload through [`OptionsManager::reload`].
    pub fn with_source<S: ConfigSource + 'static>(mut self, source: S) -> Self {
        self.custom_source = Some(Box::new(source));
        self
    }

    /// Set the retry policy for momentarily unreadable sources.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the quiescence window applied to bursts of file events.
    #[cfg(feature = "file-watch")]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Enable or disable automatic reloads on file changes.
    #[cfg(feature = "file-watch")]
    pub fn with_file_watch(mut self, enabled: bool) -> Self {
        self.watch = enabled;
        self
    }

    /// Record reload metrics with the given OpenTelemetry meter.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use options_monitor::prelude::*;
    /// use opentelemetry::global;
    ///
    /// # async fn example() -> Result<()> {
    /// let manager = OptionsManager::builder()
    ///     .with_file("appsettings.json")
    ///     .with_metrics(global::meter("my-app"))
    ///     .build()
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, meter: opentelemetry::metrics::Meter) -> Self {
        self.metrics = Some(ConfigMetrics::new(meter));
        self
    }

    /// Build the manager.
    ///
    /// Performs the initial read and decode, then arms the file watcher.
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::SetupError` if no source was given, the file's
    /// directory is missing or unreadable, the file cannot be read, or the
    /// watcher cannot be created. Returns `ConfigError::ParseError` if the
    /// initial document is malformed.
    pub async fn build(self) -> Result<OptionsManager> {
        let source: Box<dyn ConfigSource> = match (self.custom_source, self.file_path) {
            (Some(source), _) => source,
            (None, Some(path)) => {
                let file = match self.format {
                    Some(format) => FileSource::with_format(path, format),
                    None => FileSource::new(path)?,
                };
                file.check()?;
                Box::new(file)
            }
            (None, None) => {
                return Err(ConfigError::SetupError(
                    "No configuration source specified".to_string(),
                ));
            }
        };

        let raw = read_with_retry(source.as_ref(), self.retry)
            .await
            .map_err(|e| match e {
                ConfigError::ParseError(_) => e,
                other => ConfigError::SetupError(format!(
                    "Failed to read initial configuration from {}: {}",
                    source.name(),
                    other
                )),
            })?;
        let document = source.format().parse_document(&raw)?;

        #[cfg(feature = "file-watch")]
        let watch_path = source.watch_path().map(PathBuf::from);

        tracing::info!(source = %source.name(), "options manager initialized");

        #[cfg(feature = "metrics")]
        let manager = OptionsManager::from_parts(source, self.retry, document, self.metrics);
        #[cfg(not(feature = "metrics"))]
        let manager = OptionsManager::from_parts(source, self.retry, document);

        #[cfg(feature = "file-watch")]
        let manager = match watch_path {
            Some(path) if self.watch => {
                let (watcher, signals) = FileWatcher::watch(&path, self.debounce)?;
                manager.with_watcher(watcher, signals)
            }
            _ => manager,
        };

        Ok(manager)
    }
}

impl Default for OptionsManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Binding, ReloadState};
    use serde::{Deserialize, Serialize};
    use std::fs;
    use tempfile::TempDir;

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct ServerOptions {
        port: u16,
        host: String,
    }

    #[tokio::test]
    async fn test_build_without_source_fails() {
        let result = OptionsManagerBuilder::new().build().await;
        assert!(matches!(result, Err(ConfigError::SetupError(_))));
    }

    #[tokio::test]
    async fn test_build_missing_directory_fails() {
        let result = OptionsManager::builder()
            .with_file("/nonexistent/dir/appsettings.json")
            .build()
            .await;
        assert!(matches!(result, Err(ConfigError::SetupError(_))));
    }

    #[tokio::test]
    async fn test_build_malformed_initial_document_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("appsettings.json");
        fs::write(&path, "{ not json").unwrap();

        let result = OptionsManager::builder().with_file(&path).build().await;
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    struct StaticSource;

    impl ConfigSource for StaticSource {
        fn read(&self) -> Result<Vec<u8>> {
            Ok(br#"{"Server": {"port": 7000}}"#.to_vec())
        }

        fn format(&self) -> Format {
            Format::Json
        }

        fn name(&self) -> String {
            "static".to_string()
        }
    }

    #[tokio::test]
    async fn test_custom_source_ignores_file_and_format() {
        let manager = OptionsManager::builder()
            .with_file("/nonexistent/dir/appsettings.ini")
            .with_format(Format::Json)
            .with_source(StaticSource)
            .build()
            .await
            .unwrap();
        let monitor = manager
            .configure::<ServerOptions>(Binding::section("Server"))
            .unwrap();

        assert_eq!(monitor.current_value().port, 7000);
        assert_eq!(manager.source_name(), "static");
    }

    #[cfg(feature = "file-watch")]
    #[tokio::test]
    async fn test_build_loads_document() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("appsettings.json");
        fs::write(&path, r#"{"Server": {"port": 8080, "host": "localhost"}}"#).unwrap();

        let manager = OptionsManager::builder()
            .with_file(&path)
            .with_file_watch(false)
            .build()
            .await
            .unwrap();
        let monitor = manager
            .configure::<ServerOptions>(Binding::section("Server"))
            .unwrap();

        assert_eq!(monitor.current_value().port, 8080);
        assert!(!manager.is_watching());
        assert_eq!(manager.state(), ReloadState::Idle);
    }

    #[cfg(feature = "file-watch")]
    #[tokio::test]
    async fn test_explicit_format_overrides_extension() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.conf");
        fs::write(&path, r#"{"Server": {"port": 9090}}"#).unwrap();

        let manager = OptionsManager::builder()
            .with_file(&path)
            .with_format(Format::Json)
            .build()
            .await
            .unwrap();
        let monitor = manager
            .configure::<ServerOptions>(Binding::section("Server"))
            .unwrap();

        assert_eq!(monitor.current_value().port, 9090);
        assert!(manager.is_watching());
    }
}
