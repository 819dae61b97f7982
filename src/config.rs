use std::time::Duration;

use serde::Deserialize;

/// Variables are read as `DB_HOST`, `DB_USER`, `DB_PWD`, ...
const ENV_PREFIX: &str = "DB_";

/// Database configuration loaded from environment variables
#[derive(Deserialize, Clone)]
pub struct Config {
    /// Database server host
    #[serde(default = "default_host")]
    pub host: String,

    /// Database server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Login user
    #[serde(default = "default_user")]
    pub user: String,

    /// Login password (`DB_PWD`)
    #[serde(rename = "pwd", default)]
    pub password: String,

    /// Schema to select after connecting (`DB_NAME`)
    #[serde(rename = "name")]
    pub database: String,

    /// Maximum number of pooled connections
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// How long `execute` may wait for a connection
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,

    /// How long `close` waits for in-flight queries before aborting them
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    3306
}

fn default_user() -> String {
    "root".to_string()
}

fn default_pool_size() -> usize {
    10
}

fn default_acquire_timeout_ms() -> u64 {
    10_000
}

fn default_shutdown_grace_ms() -> u64 {
    5_000
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("pool_size", &self.pool_size)
            .field("acquire_timeout_ms", &self.acquire_timeout_ms)
            .field("shutdown_grace_ms", &self.shutdown_grace_ms)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables (and `.env` if present)
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::prefixed(ENV_PREFIX)
            .from_env::<Config>()
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    /// Load configuration from an explicit set of `DB_*` variables
    pub fn from_vars<I>(vars: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::prefixed(ENV_PREFIX)
            .from_iter::<_, Config>(vars)
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    /// Pool settings for [`crate::QueryExecutor`]
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::default()
            .with_max_size(self.pool_size)
            .with_acquire_timeout(Duration::from_millis(self.acquire_timeout_ms))
            .with_shutdown_grace(Duration::from_millis(self.shutdown_grace_ms))
    }
}

/// Pool sizing and timing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum number of live connections
    pub max_size: usize,
    /// Maximum wait for a connection, including opening a new one
    pub acquire_timeout: Duration,
    /// How long `close` lets in-flight queries finish
    pub shutdown_grace: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: default_pool_size(),
            acquire_timeout: Duration::from_millis(default_acquire_timeout_ms()),
            shutdown_grace: Duration::from_millis(default_shutdown_grace_ms()),
        }
    }
}

impl PoolConfig {
    /// Set maximum pool size (at least one connection is always allowed)
    pub fn with_max_size(mut self, size: usize) -> Self {
        self.max_size = size.max(1);
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }
}
