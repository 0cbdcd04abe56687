//! Configuration management for the cache mirror
//!
//! Configuration comes from defaults, a TOML file, or `CFMIRROR_*`
//! environment variables. Every section has defaults, so a TOML file only
//! needs the keys it overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Codeforces API client configuration
    pub api: ApiConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Cache timing and behavior
    pub cache: CacheConfig,

    /// Admin HTTP server configuration
    pub server: ServerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Codeforces API client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// API root, ending with a slash
    pub base_url: String,

    /// Rate limit (requests per second)
    pub requests_per_second: u32,

    /// Attempts per call on transport failures or call limit errors
    pub max_tries: u32,

    /// Delay before the second attempt in milliseconds
    pub retry_base_delay_ms: u64,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// User agent string
    pub user_agent: String,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database path
    pub sqlite_path: PathBuf,
}

/// Cache refresh cadence and policies. Durations are in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Contest list refresh interval when nothing is about to happen
    pub contest_reload_secs: u64,

    /// Contest list retry delay after a failed refresh
    pub contest_exception_delay_secs: u64,

    /// Contest list refresh interval while a contest is running or imminent
    pub contest_active_delay_secs: u64,

    /// How long before a contest starts it counts as imminent
    pub contest_activation_lead_secs: u64,

    /// Global problem set refresh interval
    pub problem_reload_secs: u64,

    /// How long after a contest ends its problem list keeps being checked
    pub problemset_retention_secs: u64,

    /// How long after a contest ends rating changes are waited for
    pub rating_changes_window_secs: u64,

    /// Poll interval for contests awaiting rating changes
    pub rating_changes_poll_secs: u64,

    /// Poll interval for monitored ranklists
    pub ranklist_poll_secs: u64,

    /// Lifetime of the cached `user.ratedList` snapshot
    pub rated_list_ttl_secs: u64,

    /// Rating assumed for handles without any rating history
    pub default_rating: i32,

    /// Only handles rated below this take part in Educational round predictions
    pub educational_rating_limit: i32,

    /// Contests never monitored for rating changes or ranklists
    pub contest_blacklist: Vec<i32>,

    /// Contests per batch in bulk rating change fetches
    pub fetch_batch_size: usize,
}

/// Admin HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Serve the admin API while running
    pub enabled: bool,

    /// Listen address
    pub bind_addr: SocketAddr,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let blacklist = match std::env::var("CFMIRROR_CONTEST_BLACKLIST") {
            Ok(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<i32>()
                        .with_context(|| format!("Invalid contest id in CFMIRROR_CONTEST_BLACKLIST: {s}"))
                })
                .collect::<Result<Vec<_>>>()?,
            Err(_) => defaults.cache.contest_blacklist.clone(),
        };

        let bind_addr = match std::env::var("CFMIRROR_SERVER_ADDR") {
            Ok(raw) => raw
                .parse()
                .with_context(|| format!("Invalid CFMIRROR_SERVER_ADDR: {raw}"))?,
            Err(_) => defaults.server.bind_addr,
        };

        Ok(Self {
            api: ApiConfig {
                base_url: env_or("CFMIRROR_API_BASE_URL", defaults.api.base_url),
                requests_per_second: env_or("CFMIRROR_RATE_LIMIT", defaults.api.requests_per_second),
                max_tries: env_or("CFMIRROR_MAX_TRIES", defaults.api.max_tries),
                retry_base_delay_ms: defaults.api.retry_base_delay_ms,
                request_timeout_secs: env_or(
                    "CFMIRROR_REQUEST_TIMEOUT",
                    defaults.api.request_timeout_secs,
                ),
                user_agent: env_or("CFMIRROR_USER_AGENT", defaults.api.user_agent),
            },
            database: DatabaseConfig {
                sqlite_path: env_or("CFMIRROR_SQLITE_PATH", defaults.database.sqlite_path),
            },
            cache: CacheConfig {
                default_rating: env_or("CFMIRROR_DEFAULT_RATING", defaults.cache.default_rating),
                contest_blacklist: blacklist,
                ..defaults.cache
            },
            server: ServerConfig {
                enabled: env_or("CFMIRROR_SERVER_ENABLED", defaults.server.enabled),
                bind_addr,
            },
            logging: LoggingConfig {
                level: env_or("CFMIRROR_LOG_LEVEL", defaults.logging.level),
                format: env_or("CFMIRROR_LOG_FORMAT", defaults.logging.format),
            },
        })
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.api.requests_per_second == 0 {
            anyhow::bail!("requests_per_second must be greater than 0");
        }

        if self.api.max_tries == 0 {
            anyhow::bail!("max_tries must be greater than 0");
        }

        url::Url::parse(&self.api.base_url)
            .with_context(|| format!("Invalid API base URL: {}", self.api.base_url))?;
        if !self.api.base_url.ends_with('/') {
            anyhow::bail!("API base URL must end with '/'");
        }

        let cache = &self.cache;
        if cache.contest_reload_secs == 0
            || cache.contest_exception_delay_secs == 0
            || cache.contest_active_delay_secs == 0
            || cache.problem_reload_secs == 0
            || cache.rating_changes_poll_secs == 0
            || cache.ranklist_poll_secs == 0
        {
            anyhow::bail!("cache refresh intervals must be greater than 0");
        }

        if cache.fetch_batch_size == 0 {
            anyhow::bail!("fetch_batch_size must be greater than 0");
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            anyhow::bail!("log format must be 'text' or 'json'");
        }

        Ok(())
    }

    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }
}

impl CacheConfig {
    pub fn contest_reload(&self) -> Duration {
        Duration::from_secs(self.contest_reload_secs)
    }

    pub fn contest_exception_delay(&self) -> Duration {
        Duration::from_secs(self.contest_exception_delay_secs)
    }

    pub fn contest_active_delay(&self) -> Duration {
        Duration::from_secs(self.contest_active_delay_secs)
    }

    pub fn problem_reload(&self) -> Duration {
        Duration::from_secs(self.problem_reload_secs)
    }

    pub fn rating_changes_poll(&self) -> Duration {
        Duration::from_secs(self.rating_changes_poll_secs)
    }

    pub fn ranklist_poll(&self) -> Duration {
        Duration::from_secs(self.ranklist_poll_secs)
    }

    pub fn rated_list_ttl(&self) -> Duration {
        Duration::from_secs(self.rated_list_ttl_secs)
    }

    pub fn blacklist(&self) -> HashSet<i32> {
        self.contest_blacklist.iter().copied().collect()
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::from("https://codeforces.com/api/"),
            requests_per_second: 1,
            max_tries: 3,
            retry_base_delay_ms: 1000,
            request_timeout_secs: 30,
            user_agent: format!("cfmirror/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("data/cache.db"),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            contest_reload_secs: 30 * 60,
            contest_exception_delay_secs: 5 * 60,
            contest_active_delay_secs: 5 * 60,
            contest_activation_lead_secs: 20 * 60,
            problem_reload_secs: 6 * 60 * 60,
            problemset_retention_secs: 14 * 24 * 60 * 60,
            rating_changes_window_secs: 36 * 60 * 60,
            rating_changes_poll_secs: 10 * 60,
            ranklist_poll_secs: 2 * 60,
            rated_list_ttl_secs: 30 * 60,
            default_rating: 1500,
            educational_rating_limit: 2100,
            contest_blacklist: vec![1308, 1309, 1431, 1432],
            fetch_batch_size: 100,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8089)),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}
