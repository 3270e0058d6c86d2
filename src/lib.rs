pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliArgs;

pub use adapters::{LocalStorage, RedashClient};
pub use config::RefreshConfig;
pub use crate::core::engine::{EngineOptions, ErrorPolicy, RefreshEngine, RunReport};
pub use crate::core::poller::PollPolicy;
pub use utils::error::{RefreshError, Result};
