//! A subscriber that records every change it is notified of.

use crate::core::{Options, OptionsMonitor};
use crate::notify::SubscriptionHandle;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;

/// One delivered change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Options name the new value was published under.
    pub name: String,
    /// When the notification was received.
    pub timestamp: DateTime<Utc>,
}

/// Consumer that subscribes on construction and records each change.
///
/// The subscription is released deterministically, either by
/// [`ChangeRecorder::close`] or when the recorder is dropped. No callback
/// reaches the recorder after either returns.
///
/// # Examples
///
/// ```rust,no_run
/// use options_monitor::prelude::*;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Default, Serialize, Deserialize)]
/// struct MyOptions {
///     name: String,
/// }
///
/// # async fn example() -> Result<()> {
/// let manager = OptionsManager::builder()
///     .with_file("appsettings.json")
///     .build()
///     .await?;
/// let monitor = manager.configure::<MyOptions>(Binding::section("MyOptions"))?;
///
/// let mut recorder = ChangeRecorder::new(monitor);
/// // ... file changes ...
/// println!("{} changes so far", recorder.change_count());
/// recorder.close();
/// # Ok(())
/// # }
/// ```
pub struct ChangeRecorder<T> {
    monitor: OptionsMonitor<T>,
    events: Arc<Mutex<Vec<ChangeEvent>>>,
    listener: Option<SubscriptionHandle>,
}

impl<T: Options> ChangeRecorder<T> {
    /// Subscribe to `monitor` and start recording.
    pub fn new(monitor: OptionsMonitor<T>) -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let listener = monitor.on_change(move |_options: &T, name: &str| {
            sink.lock().push(ChangeEvent {
                name: name.to_string(),
                timestamp: Utc::now(),
            });
        });

        Self {
            monitor,
            events,
            listener: Some(listener),
        }
    }

    /// All changes recorded so far, oldest first.
    pub fn events(&self) -> Vec<ChangeEvent> {
        self.events.lock().clone()
    }

    /// Timestamps of all changes recorded so far.
    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.events.lock().iter().map(|e| e.timestamp).collect()
    }

    /// Number of changes recorded so far.
    pub fn change_count(&self) -> usize {
        self.events.lock().len()
    }

    /// The monitor this recorder listens to.
    pub fn monitor(&self) -> &OptionsMonitor<T> {
        &self.monitor
    }

    /// Whether the recorder still receives notifications.
    pub fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    /// Release the subscription. Idempotent.
    pub fn close(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.dispose();
        }
    }
}
