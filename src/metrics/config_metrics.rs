//! Reload metrics tracking using OpenTelemetry.

use crate::core::ReloadOutcome;
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Metrics collector for reload cycles.
///
/// Tracks reload attempts, success/failure rates, latencies, rejected
/// bindings, callback outcomes and subscriber counts using OpenTelemetry
/// metrics.
///
/// # Examples
///
/// ```rust,no_run
/// use options_monitor::metrics::ConfigMetrics;
/// use opentelemetry::global;
///
/// let meter = global::meter("options-monitor");
/// let metrics = ConfigMetrics::new(meter);
///
/// let timer = metrics.start_reload();
/// // ... perform reload ...
/// metrics.record_reload_success(timer);
/// ```
#[derive(Clone)]
pub struct ConfigMetrics {
    reload_attempts: Counter<u64>,
    reload_success: Counter<u64>,
    reload_failures: Counter<u64>,
    reload_duration: Histogram<f64>,
    options_age_seconds: Gauge<i64>,
    active_subscribers: Gauge<i64>,
    rejected_bindings: Counter<u64>,
    notifications: Counter<u64>,
    callback_failures: Counter<u64>,
    last_publish: Arc<parking_lot::Mutex<Instant>>,
}

impl ConfigMetrics {
    /// Create a new metrics collector with the provided meter.
    pub fn new(meter: Meter) -> Self {
        let reload_attempts = meter
            .u64_counter("options_monitor.reload.attempts")
            .with_description("Total number of reload cycles started")
            .build();

        let reload_success = meter
            .u64_counter("options_monitor.reload.success")
            .with_description("Number of reload cycles that published")
            .build();

        let reload_failures = meter
            .u64_counter("options_monitor.reload.failures")
            .with_description("Number of reload cycles aborted by read or parse errors")
            .build();

        let reload_duration = meter
            .f64_histogram("options_monitor.reload.duration")
            .with_description("Duration of reload cycles in seconds")
            .with_unit("s")
            .build();

        let options_age_seconds = meter
            .i64_gauge("options_monitor.age")
            .with_description("Time since options were last published in seconds")
            .with_unit("s")
            .build();

        let active_subscribers = meter
            .i64_gauge("options_monitor.subscribers.active")
            .with_description("Number of active change callbacks")
            .build();

        let rejected_bindings = meter
            .u64_counter("options_monitor.bindings.rejected")
            .with_description("Number of reloaded values rejected by binding or validation")
            .build();

        let notifications = meter
            .u64_counter("options_monitor.callbacks.delivered")
            .with_description("Number of change callbacks completed")
            .build();

        let callback_failures = meter
            .u64_counter("options_monitor.callbacks.failures")
            .with_description("Number of change callbacks that panicked")
            .build();

        Self {
            reload_attempts,
            reload_success,
            reload_failures,
            reload_duration,
            options_age_seconds,
            active_subscribers,
            rejected_bindings,
            notifications,
            callback_failures,
            last_publish: Arc::new(parking_lot::Mutex::new(Instant::now())),
        }
    }

    /// Start a reload timer.
    ///
    /// Pass the returned `Instant` to `record_reload_success` or
    /// `record_reload_failure` when the cycle completes.
    pub fn start_reload(&self) -> Instant {
        self.reload_attempts.add(1, &[]);
        Instant::now()
    }

    /// Record a reload cycle that reached the publish step.
    pub fn record_reload_success(&self, start: Instant) {
        let duration = start.elapsed().as_secs_f64();
        self.reload_success.add(1, &[]);
        self.reload_duration.record(duration, &[]);

        *self.last_publish.lock() = Instant::now();
    }

    /// Record a reload cycle aborted before publishing.
    pub fn record_reload_failure(&self, start: Instant) {
        let duration = start.elapsed().as_secs_f64();
        self.reload_failures.add(1, &[]);
        self.reload_duration.record(duration, &[]);
    }

    /// Record per-registration results of a published cycle.
    pub fn record_outcome(&self, outcome: &ReloadOutcome) {
        self.rejected_bindings.add(outcome.rejected as u64, &[]);
        self.notifications.add(outcome.notified as u64, &[]);
        self.callback_failures
            .add(outcome.callback_failures as u64, &[]);
    }

    /// Update the number of active change callbacks.
    pub fn update_subscriber_count(&self, count: i64) {
        self.active_subscribers.record(count, &[]);
    }

    /// Time since the last cycle that reached the publish step.
    pub fn options_age(&self) -> Duration {
        self.last_publish.lock().elapsed()
    }

    /// Update the options age metric.
    ///
    /// Recorded after every reload cycle; call it periodically as well to
    /// track how stale the published options are between changes.
    pub fn update_options_age(&self) {
        self.options_age_seconds
            .record(self.options_age().as_secs() as i64, &[]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::global;

    #[test]
    fn test_metrics_creation() {
        let metrics = ConfigMetrics::new(global::meter("test"));

        let timer = metrics.start_reload();
        metrics.record_reload_success(timer);

        let timer = metrics.start_reload();
        metrics.record_reload_failure(timer);

        metrics.record_outcome(&ReloadOutcome {
            published: 2,
            rejected: 1,
            notified: 3,
            callback_failures: 1,
        });
        metrics.update_subscriber_count(5);
        metrics.update_options_age();
    }

    #[test]
    fn test_options_age_resets_on_publish() {
        let metrics = ConfigMetrics::new(global::meter("test"));
        std::thread::sleep(Duration::from_millis(200));

        let timer = metrics.start_reload();
        metrics.record_reload_failure(timer);
        assert!(metrics.options_age() >= Duration::from_millis(200));

        let timer = metrics.start_reload();
        metrics.record_reload_success(timer);
        assert!(metrics.options_age() < Duration::from_millis(200));
        metrics.update_options_age();
    }

    #[test]
    fn test_metrics_clone() {
        let metrics = ConfigMetrics::new(global::meter("test"));
        let metrics2 = metrics.clone();

        let timer1 = metrics.start_reload();
        let timer2 = metrics2.start_reload();

        metrics.record_reload_success(timer1);
        metrics2.record_reload_success(timer2);
    }
}
