use crate::utils::logger::LogFormat;
use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "redash-refresh")]
#[command(about = "Refresh parameterized Redash queries and export each result as CSV")]
pub struct CliArgs {
    /// Path to the TOML (or legacy JSON) configuration file
    #[arg(short, long, default_value = "redash-refresh.toml")]
    pub config: String,

    /// API key; overrides redash.api_key from the config file
    #[arg(long, env = "REDASH_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Log output format (compact or json)
    #[arg(long, default_value = "compact")]
    pub log_format: LogFormat,

    /// Show the planned refresh cycles without calling Redash
    #[arg(long)]
    pub dry_run: bool,

    /// Refresh only these query ids (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<String>,

    /// Skip these query ids (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub skip: Vec<String>,

    /// Log process CPU and memory after each query
    #[arg(long)]
    pub monitor: bool,

    /// Write a JSON run summary to this path
    #[arg(long)]
    pub summary_file: Option<String>,
}

impl CliArgs {
    pub fn selects(&self, query_id: &str) -> bool {
        (self.only.is_empty() || self.only.iter().any(|id| id == query_id))
            && !self.skip.iter().any(|id| id == query_id)
    }
}
