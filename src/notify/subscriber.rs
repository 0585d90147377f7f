//! Change notification for published options values.

use crate::error::ConfigError;
use parking_lot::{ReentrantMutex, RwLock};
use std::any::{Any, TypeId};
use std::cell::Cell;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

type Callback = Box<dyn Fn(&dyn Any, &str) + Send + Sync>;

/// One registered callback.
///
/// The gate is held for the whole duration of a callback invocation and by
/// `dispose`, so disposal waits out an in-flight call from another thread
/// and no call starts once it returns. It is reentrant so a callback may
/// dispose its own handle.
struct Subscription {
    id: u64,
    type_id: TypeId,
    active: ReentrantMutex<Cell<bool>>,
    callback: Callback,
}

#[derive(Default)]
struct NotifierInner {
    subscribers: RwLock<HashMap<TypeId, Vec<Arc<Subscription>>>>,
    next_id: AtomicU64,
}

impl NotifierInner {
    fn remove(&self, type_id: TypeId, id: u64) {
        let mut subscribers = self.subscribers.write();
        if let Some(list) = subscribers.get_mut(&type_id) {
            list.retain(|subscription| subscription.id != id);
            if list.is_empty() {
                subscribers.remove(&type_id);
            }
        }
    }
}

/// Handle for a registered change callback.
///
/// Call [`SubscriptionHandle::dispose`] or drop the handle to unsubscribe.
/// Once either returns, the callback is never invoked again.
pub struct SubscriptionHandle {
    subscription: Arc<Subscription>,
    registry: Weak<NotifierInner>,
}

impl SubscriptionHandle {
    /// Unsubscribe. Idempotent.
    ///
    /// If the callback is running on another thread, this blocks until that
    /// call returns.
    pub fn dispose(&self) {
        {
            let gate = self.subscription.active.lock();
            if !gate.replace(false) {
                return;
            }
        }

        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.subscription.type_id, self.subscription.id);
        }
        tracing::debug!(subscription = self.subscription.id, "change subscription disposed");
    }

    /// Whether the callback can still be invoked.
    pub fn is_active(&self) -> bool {
        self.subscription.active.lock().get()
    }

    /// Identifier of this subscription, unique per notifier.
    pub fn id(&self) -> u64 {
        self.subscription.id
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.subscription.id)
            .finish_non_exhaustive()
    }
}

/// Outcome of delivering one change to the subscribers of a type.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NotifyReport {
    /// Callbacks that returned normally.
    pub delivered: usize,
    /// Callbacks that panicked.
    pub failed: usize,
}

/// Registry of change callbacks, keyed by options type.
///
/// Callbacks run synchronously on the notifying thread, in registration
/// order. A panicking callback is caught and logged and does not stop
/// delivery to the rest.
///
/// # Examples
///
/// ```rust
/// use options_monitor::notify::ChangeNotifier;
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// let notifier = ChangeNotifier::new();
/// let seen = Arc::new(AtomicUsize::new(0));
///
/// let counter = Arc::clone(&seen);
/// let handle = notifier.subscribe(move |value: &u32, _name: &str| {
///     counter.fetch_add(*value as usize, Ordering::SeqCst);
/// });
///
/// notifier.notify(&5u32, "");
/// handle.dispose();
/// notifier.notify(&5u32, "");
///
/// assert_eq!(seen.load(Ordering::SeqCst), 5);
/// ```
#[derive(Clone, Default)]
pub struct ChangeNotifier {
    inner: Arc<NotifierInner>,
}

impl ChangeNotifier {
    /// Create an empty notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for changes to values of type `T`.
    ///
    /// The callback receives the new value and the options name it was
    /// published under.
    pub fn subscribe<T, F>(&self, callback: F) -> SubscriptionHandle
    where
        T: Any + Send + Sync,
        F: Fn(&T, &str) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let type_id = TypeId::of::<T>();
        let subscription = Arc::new(Subscription {
            id,
            type_id,
            active: ReentrantMutex::new(Cell::new(true)),
            callback: Box::new(move |value: &dyn Any, name: &str| {
                if let Some(value) = value.downcast_ref::<T>() {
                    callback(value, name);
                }
            }),
        });

        self.inner
            .subscribers
            .write()
            .entry(type_id)
            .or_default()
            .push(Arc::clone(&subscription));

        SubscriptionHandle {
            subscription,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver a change to every active subscriber of type `T`.
    pub fn notify<T>(&self, value: &T, name: &str) -> NotifyReport
    where
        T: Any + Send + Sync,
    {
        let subscribers = self
            .inner
            .subscribers
            .read()
            .get(&TypeId::of::<T>())
            .cloned()
            .unwrap_or_default();

        let mut report = NotifyReport::default();
        for subscription in subscribers {
            let gate = subscription.active.lock();
            if !gate.get() {
                continue;
            }

            let call = panic::catch_unwind(AssertUnwindSafe(|| {
                (subscription.callback)(value as &dyn Any, name)
            }));
            drop(gate);

            match call {
                Ok(()) => report.delivered += 1,
                Err(payload) => {
                    let err = ConfigError::CallbackError(panic_message(payload.as_ref()));
                    tracing::error!(
                        subscription = subscription.id,
                        name,
                        error = %err,
                        "change callback panicked; continuing with remaining subscribers"
                    );
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Number of active subscribers for type `T`.
    pub fn subscriber_count<T: Any>(&self) -> usize {
        self.inner
            .subscribers
            .read()
            .get(&TypeId::of::<T>())
            .map_or(0, Vec::len)
    }

    /// Number of active subscribers across all types.
    pub fn total_subscribers(&self) -> usize {
        self.inner.subscribers.read().values().map(Vec::len).sum()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "callback panicked with a non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_subscribe_and_notify() {
        let notifier = ChangeNotifier::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let counter_clone = Arc::clone(&counter);
        let _handle = notifier.subscribe(move |_: &u32, _: &str| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });

        notifier.notify(&1u32, "");
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        notifier.notify(&2u32, "");
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_callback_receives_value_and_name() {
        let notifier = ChangeNotifier::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = Arc::clone(&seen);
        let _handle = notifier.subscribe(move |value: &String, name: &str| {
            seen_clone
                .lock()
                .unwrap()
                .push((value.clone(), name.to_string()));
        });

        notifier.notify(&"hello".to_string(), "MyOptions");
        assert_eq!(
            *seen.lock().unwrap(),
            vec![("hello".to_string(), "MyOptions".to_string())]
        );
    }

    #[test]
    fn test_only_matching_type_notified() {
        let notifier = ChangeNotifier::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let counter_clone = Arc::clone(&counter);
        let _handle = notifier.subscribe(move |_: &u32, _: &str| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });

        let report = notifier.notify(&"other".to_string(), "");
        assert_eq!(report, NotifyReport::default());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_registration_order() {
        let notifier = ChangeNotifier::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..3)
            .map(|i| {
                let order = Arc::clone(&order);
                notifier.subscribe(move |_: &u32, _: &str| order.lock().unwrap().push(i))
            })
            .collect();

        notifier.notify(&0u32, "");
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
        drop(handles);
    }

    #[test]
    fn test_unsubscribe_is_immediate() {
        let notifier = ChangeNotifier::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let counter_clone = Arc::clone(&counter);
        let handle = notifier.subscribe(move |_: &u32, _: &str| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });

        notifier.notify(&0u32, "");
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        drop(handle);
        notifier.notify(&0u32, "");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(notifier.subscriber_count::<u32>(), 0);
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let notifier = ChangeNotifier::new();
        let handle = notifier.subscribe(|_: &u32, _: &str| {});
        let _other = notifier.subscribe(|_: &u32, _: &str| {});
        assert_eq!(notifier.subscriber_count::<u32>(), 2);

        handle.dispose();
        handle.dispose();
        assert!(!handle.is_active());
        assert_eq!(notifier.subscriber_count::<u32>(), 1);
    }

    #[test]
    fn test_panicking_callback_isolated() {
        let notifier = ChangeNotifier::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let _bad = notifier.subscribe(|_: &u32, _: &str| panic!("subscriber bug"));
        let counter_clone = Arc::clone(&counter);
        let _good = notifier.subscribe(move |_: &u32, _: &str| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });

        let report = notifier.notify(&0u32, "");
        assert_eq!(report.failed, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        // The failing subscriber stays registered
        let report = notifier.notify(&0u32, "");
        assert_eq!(report.failed, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_callback_may_dispose_itself() {
        let notifier = ChangeNotifier::new();
        let slot: Arc<Mutex<Option<SubscriptionHandle>>> = Arc::new(Mutex::new(None));
        let counter = Arc::new(AtomicUsize::new(0));

        let slot_clone = Arc::clone(&slot);
        let counter_clone = Arc::clone(&counter);
        let handle = notifier.subscribe(move |_: &u32, _: &str| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            if let Some(handle) = slot_clone.lock().unwrap().as_ref() {
                handle.dispose();
            }
        });
        *slot.lock().unwrap() = Some(handle);

        notifier.notify(&0u32, "");
        notifier.notify(&0u32, "");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispose_waits_for_in_flight_callback() {
        let notifier = ChangeNotifier::new();
        let started = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));

        let started_clone = Arc::clone(&started);
        let finished_clone = Arc::clone(&finished);
        let handle = notifier.subscribe(move |_: &u32, _: &str| {
            started_clone.store(true, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(100));
            finished_clone.store(true, Ordering::SeqCst);
        });

        let notifier_clone = notifier.clone();
        let notifying = thread::spawn(move || notifier_clone.notify(&0u32, ""));

        while !started.load(Ordering::SeqCst) {
            thread::yield_now();
        }
        handle.dispose();

        // The in-flight call completed before dispose returned
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(notifying.join().unwrap().delivered, 1);

        finished.store(false, Ordering::SeqCst);
        notifier.notify(&0u32, "");
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[test]
    fn test_total_subscribers_and_clone() {
        let notifier = ChangeNotifier::new();
        let notifier2 = notifier.clone();

        let _a = notifier.subscribe(|_: &u32, _: &str| {});
        let _b = notifier2.subscribe(|_: &String, _: &str| {});

        assert_eq!(notifier.total_subscribers(), 2);
        assert_eq!(notifier2.subscriber_count::<String>(), 1);
    }

    #[test]
    fn test_handle_outlives_notifier() {
        let notifier = ChangeNotifier::new();
        let handle = notifier.subscribe(|_: &u32, _: &str| {});
        drop(notifier);
        handle.dispose();
        assert!(!handle.is_active());
    }
}
