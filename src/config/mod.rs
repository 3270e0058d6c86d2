#[cfg(feature = "cli")]
pub mod cli;
pub mod legacy_json;
pub mod refresh_config;

#[cfg(feature = "cli")]
pub use cli::CliArgs;
pub use refresh_config::RefreshConfig;
