//! Core options management types.

mod builder;
mod cache;
mod manager;
mod monitor;
pub mod parser;

#[cfg(feature = "validation")]
mod validation;

pub use builder::OptionsManagerBuilder;
pub use cache::OptionsCache;
pub use manager::{OptionsManager, Registration, ReloadOutcome, ReloadState};
pub use monitor::{DEFAULT_NAME, Options, OptionsMonitor};
pub use parser::{Binding, Format, SECTION_SEPARATOR};

#[cfg(feature = "validation")]
pub use validation::Validate;
