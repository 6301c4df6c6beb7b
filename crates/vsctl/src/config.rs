//! Global configuration
//!
//! Every setting can come from a flag or from the environment.

use clap::Args;
use virtual_server_client::RetryConfig;

/// Settings shared by all subcommands
#[derive(Args, Debug, Clone)]
pub struct Config {
    /// Namespace of the VirtualServer
    #[arg(long, short = 'n', global = true, env = "VS_NAMESPACE", default_value = "default")]
    pub namespace: String,

    /// Attempts before giving up on conflicting updates
    #[arg(long, global = true, env = "VS_MAX_RETRIES", default_value_t = 5)]
    pub max_retries: u32,
}

impl Config {
    /// Backoff settings for read-modify-write updates
    pub fn retry(&self) -> RetryConfig {
        RetryConfig::with_max_attempts(self.max_retries)
    }
}
