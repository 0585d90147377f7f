//! # options-monitor
//!
//! Live-reloading typed options bound from a watched configuration file.
//!
//! ## Overview
//!
//! `options-monitor` watches a structured configuration file and keeps typed
//! options values in sync with it:
//! - Sections of the document are bound onto `serde` types, matching keys
//!   case-insensitively and keeping defaults for missing keys
//! - Published values are swapped atomically with `arc-swap`, so readers
//!   never block and never observe a half-applied reload
//! - Subscribers are called after every publish and can unsubscribe at any
//!   time, including from inside their own callback
//! - Malformed or momentarily unreadable files leave the last-good values
//!   in place
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use options_monitor::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Default, Serialize, Deserialize)]
//! #[serde(rename_all = "PascalCase")]
//! struct MyOptions {
//!     first_property: String,
//!     second_property: String,
//! }
//!
//! # async fn example() -> options_monitor::error::Result<()> {
//! let manager = OptionsManager::builder()
//!     .with_file("appsettings.json")
//!     .build()
//!     .await?;
//!
//! let monitor = manager.configure::<MyOptions>(Binding::section("MyOptions"))?;
//! println!("first: {}", monitor.current_value().first_property);
//!
//! let _subscription = monitor.on_change(|options, _name| {
//!     println!("reloaded: {}", options.second_property);
//! });
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `file-watch` (default): reload automatically when the file changes
//! - `validation` (default): the [`Validate`](core::Validate) trait
//! - `yaml`, `toml`, `all-formats`: additional document formats
//! - `metrics`: OpenTelemetry reload metrics

#![warn(missing_docs, rust_2024_compatibility)]
#![deny(unsafe_code)]

pub mod core;
pub mod error;
pub mod notify;
pub mod sources;

#[cfg(feature = "metrics")]
pub mod metrics;

/// Convenient re-exports for common usage patterns.
pub mod prelude {
    pub use crate::core::{
        Binding, Format, Options, OptionsManager, OptionsManagerBuilder, OptionsMonitor,
        Registration, ReloadOutcome, ReloadState,
    };
    pub use crate::error::{ConfigError, Result, ValidationError};
    pub use crate::notify::{ChangeRecorder, SubscriptionHandle};

    #[cfg(feature = "validation")]
    pub use crate::core::Validate;
}
