//! Typed, read-mostly view over published options.

use crate::core::OptionsCache;
use crate::notify::{ChangeNotifier, SubscriptionHandle};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;

/// Name of the options instance registered without an explicit name.
pub const DEFAULT_NAME: &str = "";

/// Bounds every options type must satisfy.
///
/// `Default` supplies the value of every field the document omits and
/// `Serialize` lets the binder lay the document over that default.
pub trait Options: DeserializeOwned + Serialize + Default + Send + Sync + 'static {}

impl<T> Options for T where T: DeserializeOwned + Serialize + Default + Send + Sync + 'static {}

/// Read access and change subscription for options of type `T`.
///
/// Obtained from [`OptionsManager::configure`](crate::core::OptionsManager::configure).
/// Cloning is cheap; all clones observe the same values.
///
/// # Examples
///
/// ```rust,no_run
/// use options_monitor::prelude::*;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Default, Serialize, Deserialize)]
/// #[serde(rename_all = "PascalCase")]
/// struct MyOptions {
///     first_property: String,
/// }
///
/// # async fn example() -> Result<()> {
/// let manager = OptionsManager::builder()
///     .with_file("appsettings.json")
///     .build()
///     .await?;
/// let monitor = manager.configure::<MyOptions>(Binding::section("MyOptions"))?;
///
/// println!("first: {}", monitor.current_value().first_property);
///
/// let _handle = monitor.on_change(|options, name| {
///     println!("{name:?} changed: {}", options.first_property);
/// });
/// # Ok(())
/// # }
/// ```
pub struct OptionsMonitor<T> {
    cache: Arc<OptionsCache>,
    notifier: ChangeNotifier,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Options> OptionsMonitor<T> {
    pub(crate) fn new(cache: Arc<OptionsCache>, notifier: ChangeNotifier) -> Self {
        Self {
            cache,
            notifier,
            _marker: PhantomData,
        }
    }

    /// The current value of the default (unnamed) instance.
    ///
    /// Lock-free with respect to reloads: returns the last fully published value.
    pub fn current_value(&self) -> Arc<T> {
        self.get(DEFAULT_NAME)
    }

    /// The current value of the named instance.
    ///
    /// An unregistered name yields `T::default()`.
    pub fn get(&self, name: &str) -> Arc<T> {
        self.cache
            .get::<T>(name)
            .unwrap_or_else(|| Arc::new(T::default()))
    }

    /// Register a callback invoked after every publish of a `T` value.
    ///
    /// The callback receives the new value and its options name. Drop or
    /// dispose the returned handle to unsubscribe.
    pub fn on_change<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&T, &str) + Send + Sync + 'static,
    {
        self.notifier.subscribe::<T, F>(callback)
    }

    /// Number of active change callbacks for `T`.
    pub fn subscriber_count(&self) -> usize {
        self.notifier.subscriber_count::<T>()
    }
}

impl<T> Clone for OptionsMonitor<T> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            notifier: self.notifier.clone(),
            _marker: PhantomData,
        }
    }
}
