//! Configuration source implementations.

mod config_source;
mod file;
mod retry;

pub use config_source::ConfigSource;
pub use file::FileSource;
pub use retry::RetryPolicy;
