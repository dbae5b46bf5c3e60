//! Command-line interface parsing for the fetchcache binary
//!
//! This module handles parsing of CLI arguments using clap and turns them into
//! the client and query configuration the library expects.

use clap::{Parser, Subcommand};
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::config::{ClientConfig, QueryOptions, DEFAULT_BASE_URL};

/// Error types for CLI argument handling
#[derive(Debug, Error)]
pub enum CliError {
    /// The request body is not valid JSON
    #[error("Invalid JSON body: {0}")]
    InvalidJson(String),

    /// The log level is not one of trace, debug, info, warn, error, off
    #[error("Invalid log level: '{0}'. Valid levels: trace, debug, info, warn, error, off")]
    InvalidLogLevel(String),

    /// A zero interval would refetch in a tight loop
    #[error("Interval must be at least one second")]
    InvalidInterval,
}

/// fetchcache - cached, retrying reads and writes against a JSON API
#[derive(Parser, Debug)]
#[command(name = "fetchcache")]
#[command(about = "Cached, retrying reads and writes against a JSON API")]
#[command(version)]
pub struct Cli {
    /// Base URL every endpoint path is joined onto
    #[arg(long, env = "FETCHCACHE_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Bearer token; overrides the stored credential
    #[arg(long, env = "FETCHCACHE_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Log verbosity (RUST_LOG takes precedence when set)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Total attempts per read
    #[arg(long, default_value_t = 3)]
    pub retries: u32,

    /// Delay before the first retry, in milliseconds; doubles per attempt
    #[arg(long, default_value_t = 1000)]
    pub retry_delay_ms: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Read an endpoint through the cache
    Get {
        endpoint: String,
        /// Read the endpoint this many times to show cache hits
        #[arg(long, default_value_t = 1)]
        repeat: u32,
    },
    /// Read several endpoints concurrently
    Batch {
        #[arg(required = true)]
        endpoints: Vec<String>,
    },
    /// POST a JSON body to an endpoint
    Post {
        endpoint: String,
        body: String,
        /// Cache key to invalidate on success (repeatable)
        #[arg(long)]
        invalidate: Vec<String>,
    },
    /// Keep a query active with auto-refetch and print every refresh
    Watch {
        endpoint: String,
        #[arg(long, default_value_t = 30)]
        interval_secs: u64,
        #[arg(long, default_value_t = 3)]
        ticks: u32,
    },
    /// Store a bearer token in the credential store
    Login { token: String },
    /// Remove the stored bearer token
    Logout,
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone)]
pub struct Settings {
    pub client: ClientConfig,
    pub query: QueryOptions,
    pub log_level: LevelFilter,
}

impl Settings {
    /// Builds settings from parsed CLI arguments.
    ///
    /// # Returns
    /// * `Ok(Settings)` with the client and default query configuration
    /// * `Err(CliError)` if a value is out of range
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let log_level = parse_log_level(&cli.log_level)?;

        let mut query = QueryOptions::default()
            .retry_attempts(cli.retries)
            .retry_delay(Duration::from_millis(cli.retry_delay_ms));

        if let Command::Watch { interval_secs, .. } = &cli.command {
            if *interval_secs == 0 {
                return Err(CliError::InvalidInterval);
            }
            query = query.refetch_interval(Duration::from_secs(*interval_secs));
        }

        Ok(Settings {
            client: ClientConfig::default().with_base_url(cli.base_url.clone()),
            query,
            log_level,
        })
    }
}

/// Parses a log level argument.
pub fn parse_log_level(s: &str) -> Result<LevelFilter, CliError> {
    LevelFilter::from_str(s).map_err(|_| CliError::InvalidLogLevel(s.to_string()))
}

/// Parses a request body argument as JSON.
pub fn parse_body(s: &str) -> Result<Value, CliError> {
    serde_json::from_str(s).map_err(|e| CliError::InvalidJson(e.to_string()))
}
