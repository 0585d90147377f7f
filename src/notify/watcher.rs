//! File watching for automatic options reloads.

use crate::error::{ConfigError, Result};
use notify::event::{AccessKind, AccessMode, ModifyKind};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use parking_lot::Mutex;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

/// Default quiescence window applied to bursts of file events.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Watches one configuration file and signals when its content changed.
///
/// The containing directory is watched rather than the file itself, so a
/// delete-then-recreate save keeps being observed. Events for other entries
/// in the directory are ignored. Raw events are debounced: a signal is sent
/// only once no further event arrived for the debounce window.
///
/// The signal channel holds at most one pending signal. Signals raised while
/// one is already pending are merged into it.
///
/// # Examples
///
/// ```rust,no_run
/// use options_monitor::notify::FileWatcher;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (watcher, mut rx) = FileWatcher::watch("config/appsettings.json", Duration::from_millis(100))?;
///
/// while let Some(()) = rx.recv().await {
///     println!("{} changed", watcher.path().display());
/// }
/// # Ok(())
/// # }
/// ```
pub struct FileWatcher {
    _watcher: Mutex<RecommendedWatcher>,
    path: PathBuf,
    debounce_duration: Duration,
    debounce_task: JoinHandle<()>,
}

impl FileWatcher {
    /// Start watching `path`.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Returns
    ///
    /// The watcher and a receiver yielding one `()` per debounced change.
    /// Dropping the watcher closes the receiver.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::SetupError` if the containing directory does not
    /// exist, cannot be read, or cannot be watched.
    pub fn watch(
        path: impl AsRef<Path>,
        debounce_duration: Duration,
    ) -> Result<(Self, mpsc::Receiver<()>)> {
        let path = path.as_ref();
        let file_name = path.file_name().map(OsString::from).ok_or_else(|| {
            ConfigError::SetupError(format!("Not a file path: {}", path.display()))
        })?;

        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let directory = directory.canonicalize().map_err(|e| {
            ConfigError::SetupError(format!(
                "Cannot watch directory {}: {}",
                directory.display(),
                e
            ))
        })?;
        std::fs::read_dir(&directory).map_err(|e| {
            ConfigError::SetupError(format!(
                "Cannot read directory {}: {}",
                directory.display(),
                e
            ))
        })?;

        let (tx, rx) = mpsc::channel(1);
        let (event_tx, event_rx) = mpsc::unbounded_channel::<()>();

        let target = file_name.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if is_content_change(&event.kind)
                    && event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == Some(target.as_os_str()))
                {
                    tracing::trace!(kind = ?event.kind, "configuration file event");
                    let _ = event_tx.send(());
                }
            }
            Err(e) => {
                let err = ConfigError::WatchError(e.to_string());
                tracing::warn!(error = %err, "file watcher reported an error");
            }
        })
        .map_err(|e| ConfigError::SetupError(format!("Failed to create file watcher: {}", e)))?;

        watcher
            .watch(&directory, RecursiveMode::NonRecursive)
            .map_err(|e| {
                ConfigError::SetupError(format!(
                    "Failed to watch {}: {}",
                    directory.display(),
                    e
                ))
            })?;

        let path = directory.join(&file_name);
        tracing::debug!(path = %path.display(), debounce = ?debounce_duration, "watching configuration file");

        let debounce_task = tokio::spawn(debounce(event_rx, tx, debounce_duration));

        Ok((
            Self {
                _watcher: Mutex::new(watcher),
                path,
                debounce_duration,
                debounce_task,
            },
            rx,
        ))
    }

    /// The watched file, with its directory canonicalized.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the debounce duration for this watcher.
    pub fn debounce_duration(&self) -> Duration {
        self.debounce_duration
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.debounce_task.abort();
    }
}

fn is_content_change(kind: &EventKind) -> bool {
    match kind {
        EventKind::Create(_) | EventKind::Remove(_) => true,
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Modify(_) => true,
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => true,
        _ => false,
    }
}

/// Collapse each burst of raw events into a single signal.
async fn debounce(
    mut events: mpsc::UnboundedReceiver<()>,
    signals: mpsc::Sender<()>,
    window: Duration,
) {
    while events.recv().await.is_some() {
        loop {
            match tokio::time::timeout(window, events.recv()).await {
                Ok(Some(())) => continue,
                Ok(None) => return,
                Err(_quiet) => break,
            }
        }

        match signals.try_send(()) {
            Ok(()) => tracing::debug!("configuration file settled; reload requested"),
            Err(TrySendError::Full(())) => {
                tracing::debug!("reload already pending; change merged into it")
            }
            Err(TrySendError::Closed(())) => return,
        }
    }
}
