use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::limiter::RateLimitConfig;

/// Fintra realtime gateway
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "fintra-server", version, about = "Fintra realtime gateway")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "FINTRA_PORT", default_value = "8090")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "FINTRA_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./fintra.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "FINTRA_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Data directory for persistent state (JWT key)
    #[arg(long, env = "FINTRA_DATA_DIR", default_value = "./data")]
    pub data_dir: String,

    /// Rate limiting configuration (loaded from [limits] section in TOML)
    #[arg(skip)]
    #[serde(default)]
    pub limits: Option<LimitsConfig>,

    /// Idle/reaper configuration (loaded from [timeouts] section in TOML)
    #[arg(skip)]
    #[serde(default)]
    pub timeouts: Option<TimeoutsConfig>,

    /// Offline queue configuration (loaded from [queue] section in TOML)
    #[arg(skip)]
    #[serde(default)]
    pub queue: Option<QueueConfig>,
}

/// Per-identity inbound message limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Admitted messages per identity in any trailing minute (default: 60)
    #[serde(default = "default_per_minute")]
    pub messages_per_minute: usize,

    /// Admitted messages per identity in any trailing hour (default: 1000)
    #[serde(default = "default_per_hour")]
    pub messages_per_hour: usize,

    /// Interval in seconds between limiter cleanup sweeps (default: 300)
    #[serde(default = "default_limiter_sweep")]
    pub sweep_interval_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            messages_per_minute: default_per_minute(),
            messages_per_hour: default_per_hour(),
            sweep_interval_secs: default_limiter_sweep(),
        }
    }
}

impl LimitsConfig {
    pub fn to_rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            per_minute: self.messages_per_minute,
            per_hour: self.messages_per_hour,
            sweep_interval: std::time::Duration::from_secs(self.sweep_interval_secs),
            ..RateLimitConfig::default()
        }
    }
}

fn default_per_minute() -> usize {
    60
}

fn default_per_hour() -> usize {
    1000
}

fn default_limiter_sweep() -> u64 {
    300
}

/// Connection idle handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    /// Inactivity in seconds after which a connection is reaped (default: 1800)
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Interval in seconds between reaper sweeps (default: 300)
    #[serde(default = "default_reaper_interval")]
    pub reaper_interval_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout(),
            reaper_interval_secs: default_reaper_interval(),
        }
    }
}

fn default_idle_timeout() -> u64 {
    1800
}

fn default_reaper_interval() -> u64 {
    300
}

/// Offline message buffering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Buffered messages per absent recipient; oldest dropped first (default: 100)
    #[serde(default = "default_offline_capacity")]
    pub offline_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            offline_capacity: default_offline_capacity(),
        }
    }
}

fn default_offline_capacity() -> usize {
    100
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8090,
            bind_address: "0.0.0.0".to_string(),
            config: "./fintra.toml".to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            limits: None,
            timeouts: None,
            queue: None,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (FINTRA_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Config::parse();
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("FINTRA_"))
            .merge(Serialized::defaults(cli))
            .extract()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Fintra Realtime Gateway Configuration
# Place this file at ./fintra.toml or specify with --config <path>
# All settings can be overridden via environment variables (FINTRA_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 8090)
# port = 8090

# Bind address (default: 0.0.0.0 — all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for the JWT verification key
# data_dir = "./data"

# ---- Rate Limiting ----
# [limits]

# Admitted messages per identity in any trailing minute (default: 60)
# messages_per_minute = 60

# Admitted messages per identity in any trailing hour (default: 1000)
# messages_per_hour = 1000

# Interval in seconds between limiter cleanup sweeps (default: 300)
# sweep_interval_secs = 300

# ---- Idle Connections ----
# [timeouts]

# Inactivity in seconds after which a connection is reaped (default: 1800)
# idle_timeout_secs = 1800

# Interval in seconds between reaper sweeps (default: 300)
# reaper_interval_secs = 300

# ---- Offline Queue ----
# [queue]

# Buffered messages per absent recipient; oldest dropped first (default: 100)
# offline_capacity = 100
"#
    .to_string()
}
