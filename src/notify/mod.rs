//! Configuration change notification system.
//!
//! Provides file watching and subscriber-based notifications when options are reloaded.

pub mod recorder;
pub mod subscriber;
#[cfg(feature = "file-watch")]
pub mod watcher;

pub use recorder::{ChangeEvent, ChangeRecorder};
pub use subscriber::{ChangeNotifier, NotifyReport, SubscriptionHandle};
#[cfg(feature = "file-watch")]
pub use watcher::{DEFAULT_DEBOUNCE, FileWatcher};
