//! wed-core: error model, configuration and retry primitives shared by every
//! wedshare crate.

pub mod config;
pub mod errors;
pub mod retry;

pub use config::{load_env, WedConfig, WedConfigSnapshot};
pub use errors::{ErrorKind, WedError, WedResult};
pub use retry::{Backoff, RetryPolicy, Retryable};
