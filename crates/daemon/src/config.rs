//! Daemon configuration
//!
//! Every flag can also come from the environment; `.env` is loaded before
//! parsing so local development needs no exported variables.

use clap::{Parser, ValueEnum};
use smartsearch_core::application::worker::constants::{
    DEFAULT_CONNECT_ATTEMPTS, DEFAULT_MAX_PRODUCTS_PER_SEARCH, DELIVERY_ACK_WAIT,
    DELIVERY_PROGRESS_INTERVAL,
};
use smartsearch_core::application::ConnectPolicy;
use std::path::Path;
use std::time::Duration;

const DEFAULT_NATS_URL: &str = "nats://localhost:4222";
const DEFAULT_DB_PATH: &str = "~/.smartsearch/profiles.db";

/// Independently runnable units of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Unit {
    Intake,
    Ai,
    Scrape,
    Http,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "smartsearch")]
#[command(about = "Smart Search pipeline daemon", long_about = None)]
#[command(version)]
pub struct Config {
    /// Broker URL
    #[arg(long, env = "SMARTSEARCH_NATS_URL", default_value = DEFAULT_NATS_URL)]
    pub nats_url: String,

    /// SQLite database path or sqlite: URL (tilde-expanded)
    #[arg(long, env = "SMARTSEARCH_DATABASE_URL", default_value = DEFAULT_DB_PATH)]
    pub database_url: String,

    #[arg(long, env = "SMARTSEARCH_DB_MIN_CONNECTIONS", default_value_t = 1)]
    pub db_min_connections: u32,

    #[arg(long, env = "SMARTSEARCH_DB_MAX_CONNECTIONS", default_value_t = 10)]
    pub db_max_connections: u32,

    #[arg(long, env = "SMARTSEARCH_HTTP_HOST", default_value = "0.0.0.0")]
    pub http_host: String,

    #[arg(long, env = "SMARTSEARCH_HTTP_PORT", default_value_t = 5000)]
    pub http_port: u16,

    /// Units this process runs (comma separated)
    #[arg(
        long,
        env = "SMARTSEARCH_STAGES",
        value_enum,
        value_delimiter = ',',
        default_value = "intake,ai,scrape,http"
    )]
    pub stages: Vec<Unit>,

    #[arg(long, env = "SMARTSEARCH_CONNECT_ATTEMPTS", default_value_t = DEFAULT_CONNECT_ATTEMPTS)]
    pub connect_attempts: u32,

    #[arg(long, env = "SMARTSEARCH_CONNECT_BACKOFF_SECS", default_value_t = 5)]
    pub connect_backoff_secs: u64,

    #[arg(long, env = "SMARTSEARCH_RECONNECT_COOLDOWN_SECS", default_value_t = 10)]
    pub reconnect_cooldown_secs: u64,

    /// Seconds an unresolved delivery may stay silent before the broker redelivers it
    #[arg(long, env = "SMARTSEARCH_ACK_WAIT_SECS", default_value_t = DELIVERY_ACK_WAIT.as_secs())]
    pub ack_wait_secs: u64,

    /// Default product links collected per search term
    #[arg(long, env = "MAX_PRODUCTS_PER_SEARCH", default_value_t = DEFAULT_MAX_PRODUCTS_PER_SEARCH)]
    pub max_products_per_search: usize,

    /// AI credential; checked per message, not at startup
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    pub openrouter_api_key: Option<String>,

    #[arg(long, env = "OPENROUTER_MODEL", default_value = "qwen/qwen3-235b-a22b")]
    pub openrouter_model: String,

    #[arg(long, env = "OPENROUTER_BASE_URL", default_value = "https://openrouter.ai/api/v1")]
    pub openrouter_base_url: String,

    /// Sent to OpenRouter as HTTP-Referer
    #[arg(long, env = "YOUR_SITE_URL", default_value = "http://localhost:5173")]
    pub site_url: String,

    /// Sent to OpenRouter as X-Title
    #[arg(long, env = "YOUR_SITE_NAME", default_value = "Smart Search")]
    pub site_name: String,

    #[arg(long, env = "SMARTSEARCH_LOG_FORMAT", value_enum, default_value = "pretty")]
    pub log_format: LogFormat,

    /// Directory for a daily-rolling log file (stdout only when unset)
    #[arg(long, env = "SMARTSEARCH_LOG_DIR")]
    pub log_dir: Option<String>,
}

impl Config {
    pub fn runs(&self, unit: Unit) -> bool {
        self.stages.contains(&unit)
    }

    pub fn runs_any_stage(&self) -> bool {
        self.runs(Unit::Intake) || self.runs(Unit::Ai) || self.runs(Unit::Scrape)
    }

    pub fn connect_policy(&self) -> ConnectPolicy {
        ConnectPolicy {
            max_attempts: self.connect_attempts.max(1),
            backoff: Duration::from_secs(self.connect_backoff_secs),
        }
    }

    pub fn reconnect_cooldown(&self) -> Duration {
        Duration::from_secs(self.reconnect_cooldown_secs)
    }

    pub fn ack_wait(&self) -> Duration {
        Duration::from_secs(self.ack_wait_secs.max(1))
    }

    /// Progress cadence: at least three signals per ack wait
    pub fn progress_interval(&self) -> Duration {
        DELIVERY_PROGRESS_INTERVAL.min(self.ack_wait() / 3)
    }

    /// sqlx URL for the configured database
    pub fn sqlite_url(&self) -> String {
        sqlite_url(&self.database_url)
    }

    /// Directory that must exist before the database file can be created
    pub fn database_dir(&self) -> Option<String> {
        if self.database_url.starts_with("sqlite:") {
            return None;
        }
        let path = shellexpand::tilde(&self.database_url).into_owned();
        Path::new(&path)
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.display().to_string())
    }

    pub fn log_dir(&self) -> Option<String> {
        self.log_dir
            .as_deref()
            .map(|d| shellexpand::tilde(d).into_owned())
    }
}

fn sqlite_url(raw: &str) -> String {
    if raw.starts_with("sqlite:") {
        raw.to_string()
    } else {
        format!("sqlite://{}", shellexpand::tilde(raw))
    }
}
