/// Configuration shared by the submission service and the analysis engine
///
/// Every section is loaded from environment variables (a `.env` file is honored
/// by the binaries), has a `Default`, and a `validate` step. Components receive
/// their section at construction; nothing reads the environment afterwards.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use redis::{ConnectionInfo, IntoConnectionInfo, RedisResult};
use serde::{Deserialize, Serialize};

use crate::observability::{LogConfig, LogFormat, LogLevel};

pub const DEFAULT_SANDBOX_BASE_URL: &str = "https://www.hybrid-analysis.com/api/v2";
/// Windows 10 64-bit
pub const DEFAULT_SANDBOX_ENVIRONMENT_ID: &str = "120";

/// Read `key`, falling back to `default`, and parse it
pub fn env_or<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .with_context(|| format!("Invalid {}", key))
}

/// Read a variable that has no sensible default
pub fn required_env(key: &str) -> Result<String> {
    let value = env::var(key).with_context(|| format!("{} environment variable must be defined", key))?;
    if value.trim().is_empty() {
        anyhow::bail!("{} environment variable must not be empty", key);
    }
    Ok(value)
}

/// Redis configuration
///
/// Blobs and reports live in separate logical databases of the same server;
/// the work queue lists get a third one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    pub blob_db: i64,
    pub report_db: i64,
    pub queue_db: i64,
}

impl RedisConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            blob_db: env_or("BLOB_DB", "0")?,
            report_db: env_or("REPORT_DB", "1")?,
            queue_db: env_or("QUEUE_DB", "2")?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            anyhow::bail!("Redis URL cannot be empty");
        }
        if self.blob_db == self.report_db {
            anyhow::bail!("BLOB_DB and REPORT_DB must differ: both stores key by content hash");
        }
        Ok(())
    }

    /// Connection info for `db`, overriding any database index in the URL
    pub fn connection_info(&self, db: i64) -> RedisResult<ConnectionInfo> {
        let mut info = self.url.as_str().into_connection_info()?;
        info.redis.db = db;
        Ok(info)
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            blob_db: 0,
            report_db: 1,
            queue_db: 2,
        }
    }
}

/// Work queue channel names
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub scan_queue: String,
    pub poll_queue: String,
    pub receive_timeout_seconds: u64,
}

impl QueueConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            scan_queue: env::var("SCAN_QUEUE").unwrap_or_else(|_| "waiting_scan".to_string()),
            poll_queue: env::var("POLL_QUEUE").unwrap_or_else(|_| "polling_falcon".to_string()),
            receive_timeout_seconds: env_or("QUEUE_RECEIVE_TIMEOUT_SECS", "5")?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.scan_queue.is_empty() || self.poll_queue.is_empty() {
            anyhow::bail!("Queue names cannot be empty");
        }
        if self.scan_queue == self.poll_queue {
            anyhow::bail!("Scan and poll queues must be distinct");
        }
        if self.receive_timeout_seconds == 0 {
            anyhow::bail!("Queue receive timeout must be at least 1 second");
        }
        Ok(())
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_secs(self.receive_timeout_seconds)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            scan_queue: "waiting_scan".to_string(),
            poll_queue: "polling_falcon".to_string(),
            receive_timeout_seconds: 5,
        }
    }
}

/// External sandbox service configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    pub api_key: String,
    pub base_url: String,
    pub environment_id: String,
    pub user_agent: String,
    pub timeout_seconds: u64,
}

impl std::fmt::Debug for SandboxConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("environment_id", &self.environment_id)
            .field("user_agent", &self.user_agent)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

impl SandboxConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            api_key: required_env("SANDBOX_API_KEY")?,
            base_url: env::var("SANDBOX_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_SANDBOX_BASE_URL.to_string()),
            environment_id: env::var("SANDBOX_ENVIRONMENT_ID")
                .unwrap_or_else(|_| DEFAULT_SANDBOX_ENVIRONMENT_ID.to_string()),
            user_agent: env::var("SANDBOX_USER_AGENT")
                .unwrap_or_else(|_| "Falcon Sandbox".to_string()),
            timeout_seconds: env_or("SANDBOX_TIMEOUT_SECS", "60")?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.is_empty() {
            anyhow::bail!("Sandbox API key cannot be empty");
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            anyhow::bail!("Sandbox base URL must be http(s): {}", self.base_url);
        }
        if self.timeout_seconds == 0 {
            anyhow::bail!("Sandbox timeout must be at least 1 second");
        }
        Ok(())
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_SANDBOX_BASE_URL.to_string(),
            environment_id: DEFAULT_SANDBOX_ENVIRONMENT_ID.to_string(),
            user_agent: "Falcon Sandbox".to_string(),
            timeout_seconds: 60,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
        })
    }

    pub fn validate(&self) -> Result<()> {
        self.level.parse::<LogLevel>()?;
        self.format.parse::<LogFormat>()?;
        Ok(())
    }

    pub fn to_log_config(&self, service_name: &str) -> Result<LogConfig> {
        Ok(LogConfig {
            level: self.level.parse()?,
            format: self.format.parse()?,
            service_name: service_name.to_string(),
            ..LogConfig::default()
        })
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
