use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Set engine service configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "setset")]
#[command(about = "Packet set match-and-update engine")]
pub struct Config {
    /// HTTP server listen address
    #[arg(long, default_value = "0.0.0.0:8080", env = "SETSET_LISTEN_ADDR")]
    pub listen_addr: String,

    /// Path to rules YAML file
    #[arg(long, default_value = "rules.yaml", env = "SETSET_RULES_PATH")]
    pub rules_path: PathBuf,

    /// Path to sets YAML file
    #[arg(long, default_value = "sets.yaml", env = "SETSET_SETS_PATH")]
    pub sets_path: PathBuf,

    /// Rules reload check interval in seconds
    #[arg(
        long,
        default_value = "30",
        env = "SETSET_RULES_RELOAD_SECS",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub rules_reload_secs: u64,

    /// Insert backoff after a full set, in milliseconds
    #[arg(long, default_value = "1000", env = "SETSET_BACKOFF_MS")]
    pub backoff_ms: u64,

    /// Expired entry purge interval in seconds
    #[arg(
        long,
        default_value = "10",
        env = "SETSET_GC_SECS",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub gc_secs: u64,

    /// Seed for the sampling generator (random per thread if unset)
    #[arg(long, env = "SETSET_SAMPLING_SEED")]
    pub sampling_seed: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, default_value = "false", env = "SETSET_LOG_JSON")]
    pub log_json: bool,

    /// Enable graceful shutdown
    #[arg(long, default_value = "true", env = "SETSET_GRACEFUL_SHUTDOWN")]
    pub graceful_shutdown: bool,
}

impl Config {
    /// Get rules reload interval as Duration (at least one second).
    pub fn rules_reload_interval(&self) -> Duration {
        Duration::from_secs(self.rules_reload_secs.max(1))
    }

    pub fn backoff_interval(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    /// Get purge interval as Duration (at least one second).
    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_secs.max(1))
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_addr: "0.0.0.0:8080".to_string(),
            rules_path: PathBuf::from("rules.yaml"),
            sets_path: PathBuf::from("sets.yaml"),
            rules_reload_secs: 30,
            backoff_ms: 1000,
            gc_secs: 10,
            sampling_seed: None,
            log_level: "info".to_string(),
            log_json: false,
            graceful_shutdown: true,
        }
    }
}
