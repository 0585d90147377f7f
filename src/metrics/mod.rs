//! Built-in metrics for reload cycles.
//!
//! Provides OpenTelemetry metrics tracking:
//! - Reload attempts/success/failures
//! - Reload duration
//! - Options age
//! - Rejected bindings
//! - Callback deliveries, failures and active subscribers
//!
//! # Examples
//!
//! ```rust,no_run
//! use options_monitor::prelude::*;
//! use opentelemetry::global;
//!
//! # async fn example() -> Result<()> {
//! let meter = global::meter("my-app");
//!
//! let manager = OptionsManager::builder()
//!     .with_file("appsettings.json")
//!     .with_metrics(meter)
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod config_metrics;

pub use config_metrics::ConfigMetrics;
