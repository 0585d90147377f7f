//! Options manager: owns the source, cache and notifier and runs reloads.

use crate::core::cache::Slot;
use crate::core::parser::{self, Binding};
use crate::core::{OptionsCache, OptionsManagerBuilder, Options, OptionsMonitor, DEFAULT_NAME};
use crate::error::{ConfigError, Result, ValidationError};
use crate::notify::{ChangeNotifier, NotifyReport};
use crate::sources::{ConfigSource, RetryPolicy};
use arc_swap::ArcSwap;
use parking_lot::{ReentrantMutex, RwLock};
use serde_json::Value;
use std::any::type_name;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

#[cfg(feature = "file-watch")]
use crate::notify::FileWatcher;
#[cfg(feature = "file-watch")]
use tokio::sync::mpsc;

#[cfg(feature = "validation")]
use crate::core::Validate;

#[cfg(feature = "metrics")]
use crate::metrics::ConfigMetrics;

/// Type alias for validator functions.
pub(crate) type Validator<T> =
    Arc<dyn Fn(&T) -> std::result::Result<(), ValidationError> + Send + Sync>;

/// Phase of the reload cycle.
///
/// `Idle -> ParsingPending -> (Published | ParseFailed) -> Idle`
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadState {
    /// Watcher armed; the cache holds the last-good values.
    Idle = 0,
    /// Reading and decoding the source.
    ParsingPending = 1,
    /// Swapping values and notifying subscribers.
    Published = 2,
    /// The document could not be read or decoded; nothing changed.
    ParseFailed = 3,
}

impl ReloadState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::ParsingPending,
            2 => Self::Published,
            3 => Self::ParseFailed,
            _ => Self::Idle,
        }
    }
}

/// Summary of one successful reload cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReloadOutcome {
    /// Registrations that received a new value.
    pub published: usize,
    /// Registrations whose new content failed to bind or validate.
    pub rejected: usize,
    /// Callbacks that completed.
    pub notified: usize,
    /// Callbacks that panicked.
    pub callback_failures: usize,
}

/// How an options type is bound into the manager.
///
/// # Examples
///
/// ```rust,no_run
/// use options_monitor::prelude::*;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Default, Serialize, Deserialize)]
/// struct ServerOptions {
///     port: u16,
/// }
///
/// # fn example(manager: &OptionsManager) -> Result<()> {
/// let monitor = manager.register(
///     Registration::<ServerOptions>::new(Binding::section("Server"))
///         .named("public")
///         .with_validation(|options: &ServerOptions| {
///             if options.port < 1024 {
///                 return Err(ValidationError::invalid_field("port", "must be >= 1024"));
///             }
///             Ok(())
///         }),
/// )?;
/// println!("port: {}", monitor.get("public").port);
/// # Ok(())
/// # }
/// ```
pub struct Registration<T> {
    name: String,
    binding: Binding,
    live: bool,
    validator: Option<Validator<T>>,
}

impl<T: Options> Registration<T> {
    /// A live registration of the default instance.
    pub fn new(binding: Binding) -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            binding,
            live: true,
            validator: None,
        }
    }

    /// Register under `name` instead of the default name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Bind once at registration and never refresh.
    pub fn snapshot(mut self) -> Self {
        self.live = false;
        self
    }

    /// Reject bound values the validator refuses.
    ///
    /// A rejected reload leaves the previous value published.
    pub fn with_validation<F>(mut self, validator: F) -> Self
    where
        F: Fn(&T) -> std::result::Result<(), ValidationError> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Validate bound values with their [`Validate`] implementation.
    #[cfg(feature = "validation")]
    pub fn validated(self) -> Self
    where
        T: Validate,
    {
        self.with_validation(|options: &T| options.validate())
    }
}

fn bind_validated<T: Options>(
    document: &Value,
    binding: &Binding,
    validator: Option<&Validator<T>>,
) -> Result<T> {
    let value: T = parser::bind(document, binding)?;
    if let Some(validator) = validator {
        validator(&value)?;
    }
    Ok(value)
}

/// A registration that is refreshed on every reload.
trait SectionBinding: Send + Sync {
    fn name(&self) -> &str;

    fn refresh(&self, document: &Value) -> Result<NotifyReport>;
}

struct LiveBinding<T> {
    name: String,
    binding: Binding,
    slot: Slot<T>,
    notifier: ChangeNotifier,
    validator: Option<Validator<T>>,
}

impl<T: Options> SectionBinding for LiveBinding<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn refresh(&self, document: &Value) -> Result<NotifyReport> {
        let value = Arc::new(bind_validated::<T>(
            document,
            &self.binding,
            self.validator.as_ref(),
        )?);
        self.slot.store(Arc::clone(&value));
        Ok(self.notifier.notify::<T>(&value, &self.name))
    }
}

pub(crate) struct ManagerInner {
    source: Box<dyn ConfigSource>,
    retry: RetryPolicy,
    cache: Arc<OptionsCache>,
    notifier: ChangeNotifier,
    document: ArcSwap<Value>,
    bindings: RwLock<Vec<Arc<dyn SectionBinding>>>,
    /// Serializes whole reload cycles, including the file read.
    cycle_lock: tokio::sync::Mutex<()>,
    /// Held while values are swapped and subscribers notified, and while a
    /// registration binds, so no registration misses a publish.
    publish_lock: ReentrantMutex<()>,
    state: AtomicU8,
    reload_count: AtomicU64,
    publish_count: AtomicU64,
    #[cfg(feature = "metrics")]
    metrics: Option<ConfigMetrics>,
}

impl ManagerInner {
    fn set_state(&self, state: ReloadState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    async fn read_document(&self) -> Result<Value> {
        let raw = read_with_retry(self.source.as_ref(), self.retry).await?;
        self.source.format().parse_document(&raw)
    }

    async fn reload(&self) -> Result<ReloadOutcome> {
        let _cycle = self.cycle_lock.lock().await;
        self.reload_count.fetch_add(1, Ordering::SeqCst);
        self.set_state(ReloadState::ParsingPending);

        #[cfg(feature = "metrics")]
        let timer = self.metrics.as_ref().map(ConfigMetrics::start_reload);

        let document = match self.read_document().await {
            Ok(document) => document,
            Err(err) => {
                self.set_state(ReloadState::ParseFailed);
                tracing::warn!(
                    source = %self.source.name(),
                    error = %err,
                    "reload failed; keeping last-good options"
                );
                #[cfg(feature = "metrics")]
                {
                    if let (Some(metrics), Some(timer)) = (&self.metrics, timer) {
                        metrics.record_reload_failure(timer);
                        metrics.update_options_age();
                    }
                }
                self.set_state(ReloadState::Idle);
                return Err(err);
            }
        };

        let outcome = self.publish(document);

        #[cfg(feature = "metrics")]
        {
            if let (Some(metrics), Some(timer)) = (&self.metrics, timer) {
                metrics.record_reload_success(timer);
                metrics.record_outcome(&outcome);
                metrics.update_subscriber_count(self.notifier.total_subscribers() as i64);
                metrics.update_options_age();
            }
        }

        self.set_state(ReloadState::Idle);
        Ok(outcome)
    }

    fn publish(&self, document: Value) -> ReloadOutcome {
        let _guard = self.publish_lock.lock();
        self.set_state(ReloadState::Published);

        let document = Arc::new(document);
        self.document.store(Arc::clone(&document));

        let bindings: Vec<Arc<dyn SectionBinding>> = self.bindings.read().clone();
        let mut outcome = ReloadOutcome::default();
        for binding in &bindings {
            match binding.refresh(&document) {
                Ok(report) => {
                    outcome.published += 1;
                    outcome.notified += report.delivered;
                    outcome.callback_failures += report.failed;
                }
                Err(err) => {
                    outcome.rejected += 1;
                    tracing::warn!(
                        name = binding.name(),
                        error = %err,
                        "reloaded content rejected; keeping last-good value"
                    );
                }
            }
        }

        self.publish_count
            .fetch_add(outcome.published as u64, Ordering::SeqCst);
        tracing::info!(
            source = %self.source.name(),
            published = outcome.published,
            rejected = outcome.rejected,
            notified = outcome.notified,
            "options reloaded"
        );
        outcome
    }
}

/// Read the source, retrying I/O failures per `retry`.
pub(crate) async fn read_with_retry(
    source: &dyn ConfigSource,
    retry: RetryPolicy,
) -> Result<Vec<u8>> {
    let mut attempt = 1;
    loop {
        match source.read() {
            Ok(raw) => return Ok(raw),
            Err(ConfigError::IoError(err)) if attempt < retry.max_attempts() => {
                let delay = retry.backoff(attempt);
                tracing::warn!(
                    source = %source.name(),
                    attempt,
                    error = %err,
                    ?delay,
                    "configuration unreadable; retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(ConfigError::IoError(err)) => {
                return Err(ConfigError::TransientIoError {
                    attempts: attempt,
                    source: err,
                });
            }
            Err(other) => return Err(other),
        }
    }
}

#[cfg(feature = "file-watch")]
pub(crate) fn spawn_reload_loop(inner: Arc<ManagerInner>, mut signals: mpsc::Receiver<()>) {
    tokio::spawn(async move {
        while signals.recv().await.is_some() {
            if let Err(err) = inner.reload().await {
                tracing::debug!(error = %err, "reload cycle aborted");
            }
        }
        tracing::debug!("file watcher closed; reload loop stopped");
    });
}

/// Composition root of the reload engine.
///
/// Holds the configuration source, the options cache, the change notifier
/// and (when enabled) the file watcher. Options types are bound into it with
/// [`configure`](Self::configure) and friends, each returning an
/// [`OptionsMonitor`].
///
/// Cloning is cheap. Watching stops when the last clone is dropped.
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
///     third_property: Option<String>,
/// }
///
/// # async fn example() -> Result<()> {
/// let manager = OptionsManager::builder()
///     .with_file("appsettings.json")
///     .build()
///     .await?;
///
/// let monitor = manager.configure::<MyOptions>(Binding::section("MyOptions"))?;
/// println!("{}", monitor.current_value().first_property);
/// # Ok(())
/// # }
/// ```
pub struct OptionsManager {
    inner: Arc<ManagerInner>,
    #[cfg(feature = "file-watch")]
    watcher: Option<Arc<FileWatcher>>,
}

impl OptionsManager {
    /// Create a new builder.
    pub fn builder() -> OptionsManagerBuilder {
        OptionsManagerBuilder::new()
    }

    pub(crate) fn from_parts(
        source: Box<dyn ConfigSource>,
        retry: RetryPolicy,
        document: Value,
        #[cfg(feature = "metrics")] metrics: Option<ConfigMetrics>,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                source,
                retry,
                cache: Arc::new(OptionsCache::new()),
                notifier: ChangeNotifier::new(),
                document: ArcSwap::from_pointee(document),
                bindings: RwLock::new(Vec::new()),
                cycle_lock: tokio::sync::Mutex::new(()),
                publish_lock: ReentrantMutex::new(()),
                state: AtomicU8::new(ReloadState::Idle as u8),
                reload_count: AtomicU64::new(0),
                publish_count: AtomicU64::new(0),
                #[cfg(feature = "metrics")]
                metrics,
            }),
            #[cfg(feature = "file-watch")]
            watcher: None,
        }
    }

    /// Start the reload loop driven by `watcher`.
    #[cfg(feature = "file-watch")]
    pub(crate) fn with_watcher(mut self, watcher: FileWatcher, signals: mpsc::Receiver<()>) -> Self {
        spawn_reload_loop(Arc::clone(&self.inner), signals);
        self.watcher = Some(Arc::new(watcher));
        self
    }

    /// Bind `T` to `binding` as the default instance, refreshed on every reload.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ParseError` if the current document cannot be
    /// bound onto `T`, or `ConfigError::SetupError` if `T` is already
    /// configured under the default name.
    pub fn configure<T: Options>(&self, binding: Binding) -> Result<OptionsMonitor<T>> {
        self.register(Registration::new(binding))
    }

    /// Bind `T` to `binding` under `name`, refreshed on every reload.
    ///
    /// # Errors
    ///
    /// See [`configure`](Self::configure).
    pub fn configure_named<T: Options>(
        &self,
        name: impl Into<String>,
        binding: Binding,
    ) -> Result<OptionsMonitor<T>> {
        self.register(Registration::new(binding).named(name))
    }

    /// Bind `T` once from the current document without tracking changes.
    ///
    /// The value stays frozen and no change notifications are raised for it,
    /// although the watcher keeps running reload cycles.
    ///
    /// # Errors
    ///
    /// See [`configure`](Self::configure).
    pub fn configure_snapshot<T: Options>(&self, binding: Binding) -> Result<OptionsMonitor<T>> {
        self.register(Registration::new(binding).snapshot())
    }

    /// Bind `T` as described by `registration`.
    ///
    /// # Errors
    ///
    /// See [`configure`](Self::configure). A validator rejecting the initial
    /// value yields `ConfigError::ValidationError`.
    pub fn register<T: Options>(&self, registration: Registration<T>) -> Result<OptionsMonitor<T>> {
        let Registration {
            name,
            binding,
            live,
            validator,
        } = registration;

        let _guard = self.inner.publish_lock.lock();
        if self.inner.cache.contains::<T>(&name) {
            return Err(ConfigError::SetupError(format!(
                "Options '{}' of type {} are already configured",
                name,
                type_name::<T>()
            )));
        }

        let document = self.inner.document.load_full();
        let value = bind_validated::<T>(&document, &binding, validator.as_ref())?;
        self.inner.cache.set(&name, value);

        tracing::debug!(
            options = type_name::<T>(),
            name = %name,
            %binding,
            live,
            "options registered"
        );

        if live {
            let slot = self.inner.cache.slot::<T>(&name).ok_or_else(|| {
                ConfigError::Other(format!("Cache slot for '{}' vanished during registration", name))
            })?;
            self.inner.bindings.write().push(Arc::new(LiveBinding {
                name,
                binding,
                slot,
                notifier: self.inner.notifier.clone(),
                validator,
            }));
        }

        Ok(self.monitor::<T>())
    }

    /// A monitor for `T`, whether or not it has been configured.
    pub fn monitor<T: Options>(&self) -> OptionsMonitor<T> {
        OptionsMonitor::new(Arc::clone(&self.inner.cache), self.inner.notifier.clone())
    }

    /// Run one reload cycle now.
    ///
    /// Serialized with watcher-driven cycles. On failure nothing is
    /// published and no subscriber is notified.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::TransientIoError` if the source stayed
    /// unreadable, or `ConfigError::ParseError` if it is malformed.
    pub async fn reload(&self) -> Result<ReloadOutcome> {
        self.inner.reload().await
    }

    /// Current phase of the reload cycle.
    pub fn state(&self) -> ReloadState {
        ReloadState::from_u8(self.inner.state.load(Ordering::SeqCst))
    }

    /// Reload cycles started so far, including failed ones.
    ///
    /// Counts watcher activity even when no live registration exists.
    pub fn reload_count(&self) -> u64 {
        self.inner.reload_count.load(Ordering::SeqCst)
    }

    /// Registration refreshes published so far.
    pub fn publish_count(&self) -> u64 {
        self.inner.publish_count.load(Ordering::SeqCst)
    }

    /// The last successfully decoded document.
    pub fn document(&self) -> Arc<Value> {
        self.inner.document.load_full()
    }

    /// The options cache backing every monitor of this manager.
    pub fn cache(&self) -> &Arc<OptionsCache> {
        &self.inner.cache
    }

    /// The change notifier backing every monitor of this manager.
    pub fn notifier(&self) -> &ChangeNotifier {
        &self.inner.notifier
    }

    /// Human-readable name of the configuration source.
    pub fn source_name(&self) -> String {
        self.inner.source.name()
    }

    /// Whether a file watcher drives reloads.
    pub fn is_watching(&self) -> bool {
        #[cfg(feature = "file-watch")]
        {
            self.watcher.is_some()
        }
        #[cfg(not(feature = "file-watch"))]
        {
            false
        }
    }
}

impl Clone for OptionsManager {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            #[cfg(feature = "file-watch")]
            watcher: self.watcher.clone(),
        }
    }
}
