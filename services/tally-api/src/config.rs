//! Configuration for the Tally API service.

use std::time::Duration;

use tally_core::{QuotaConfig, TierPolicyStore};

/// Tally API configuration
#[derive(Clone)]
pub struct Config {
    /// HTTP server port
    pub http_port: u16,
    /// Database URL
    pub database_url: String,
    /// Pool size
    pub db_max_connections: u32,
    /// Quota engine configuration
    pub quota: QuotaConfig,
    /// Interval between scheduled reset runs
    pub reset_interval: Duration,
    /// Interval between prompt sweeps
    pub prompt_sweep_interval: Duration,
    /// Bearer token for the admin routes
    pub admin_token: String,
    /// Request timeout
    pub request_timeout: Duration,
    /// Metrics enabled
    pub metrics_enabled: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Database
        let database_url =
            std::env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;

        let db_max_connections = parse_or("DB_MAX_CONNECTIONS", 10)?;

        // Server
        let http_port = parse_or("HTTP_PORT", 8082)?;
        let request_timeout_secs: u64 = parse_or("REQUEST_TIMEOUT_SECS", 30)?;

        // Admin
        let admin_token =
            std::env::var("ADMIN_TOKEN").map_err(|_| ConfigError::Missing("ADMIN_TOKEN"))?;
        if admin_token.len() < 16 {
            return Err(ConfigError::Invalid("ADMIN_TOKEN"));
        }

        // Quota engine
        let policies = match std::env::var("QUOTA_POLICY_FILE") {
            Ok(path) => TierPolicyStore::load_file(&path).map_err(|e| {
                tracing::error!(path = %path, error = %e, "Policy file rejected");
                ConfigError::Invalid("QUOTA_POLICY_FILE")
            })?,
            Err(_) => TierPolicyStore::default(),
        };

        let quota = QuotaConfig::new()
            .with_policies(policies)
            .with_prompt_threshold(parse_or("PROMPT_THRESHOLD", 0.75)?)
            .with_tier_cache_ttl(Duration::from_secs(parse_or("TIER_CACHE_TTL_SECS", 60)?));
        quota
            .validate()
            .map_err(|_| ConfigError::Invalid("PROMPT_THRESHOLD"))?;

        let reset_interval_secs: u64 = parse_or("RESET_INTERVAL_SECS", 3600)?;
        let prompt_sweep_interval_secs: u64 = parse_or("PROMPT_SWEEP_INTERVAL_SECS", 900)?;
        if reset_interval_secs == 0 {
            return Err(ConfigError::Invalid("RESET_INTERVAL_SECS"));
        }
        if prompt_sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid("PROMPT_SWEEP_INTERVAL_SECS"));
        }

        // Metrics
        let metrics_enabled = std::env::var("METRICS_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);

        Ok(Self {
            http_port,
            database_url,
            db_max_connections,
            quota,
            reset_interval: Duration::from_secs(reset_interval_secs),
            prompt_sweep_interval: Duration::from_secs(prompt_sweep_interval_secs),
            admin_token,
            request_timeout: Duration::from_secs(request_timeout_secs),
            metrics_enabled,
        })
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("http_port", &self.http_port)
            .field("db_max_connections", &self.db_max_connections)
            .field("quota", &self.quota)
            .field("reset_interval", &self.reset_interval)
            .field("prompt_sweep_interval", &self.prompt_sweep_interval)
            .field("admin_token", &"[redacted]")
            .field("request_timeout", &self.request_timeout)
            .field("metrics_enabled", &self.metrics_enabled)
            .finish_non_exhaustive()
    }
}

fn parse_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
