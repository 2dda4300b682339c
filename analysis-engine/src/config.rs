/// Configuration module for the Analysis Engine
///
/// This module provides centralized configuration management with support for:
/// - Environment variable loading
/// - Default values
/// - Configuration validation
/// - The worker runtime settings on top of the shared Redis, queue and sandbox sections

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use shared::config::{env_or, LoggingConfig, QueueConfig, RedisConfig, SandboxConfig};
use shared::Channel;

/// Main configuration structure for the Analysis Engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub redis: RedisConfig,
    pub queue: QueueConfig,
    pub sandbox: SandboxConfig,
    pub worker: WorkerConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            redis: RedisConfig::from_env()?,
            queue: QueueConfig::from_env()?,
            sandbox: SandboxConfig::from_env()?,
            worker: WorkerConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.redis.validate()?;
        self.queue.validate()?;
        self.sandbox.validate()?;
        self.worker.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis: RedisConfig::default(),
            queue: QueueConfig::default(),
            sandbox: SandboxConfig::default(),
            worker: WorkerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Which channels this process consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerRole {
    Scan,
    Poll,
    All,
}

impl WorkerRole {
    pub fn channels(&self) -> Vec<Channel> {
        match self {
            WorkerRole::Scan => vec![Channel::Scan],
            WorkerRole::Poll => vec![Channel::Poll],
            WorkerRole::All => vec![Channel::Scan, Channel::Poll],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerRole::Scan => "scan",
            WorkerRole::Poll => "poll",
            WorkerRole::All => "all",
        }
    }
}

impl FromStr for WorkerRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "scan" => Ok(WorkerRole::Scan),
            "poll" => Ok(WorkerRole::Poll),
            "all" => Ok(WorkerRole::All),
            other => anyhow::bail!("Unknown worker role: {} (expected scan, poll or all)", other),
        }
    }
}

impl fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Worker runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub role: WorkerRole,
    /// Deliveries handled at once, per channel
    pub max_concurrent: usize,
    /// Leave failed deliveries unacknowledged so `recover` hands them out again
    pub redeliver_failed: bool,
    pub dedupe_in_flight: bool,
    pub in_flight_ttl_secs: u64,
    pub poll_delay_ms: u64,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self> {
        let role = std::env::var("WORKER_ROLE").unwrap_or_else(|_| "all".to_string());
        Ok(Self {
            worker_id: std::env::var("WORKER_ID").unwrap_or_else(|_| Uuid::new_v4().to_string()),
            role: role.parse()?,
            max_concurrent: env_or("WORKER_MAX_CONCURRENT", "10")?,
            redeliver_failed: env_or("WORKER_REDELIVER_FAILED", "false")?,
            dedupe_in_flight: env_or("WORKER_DEDUPE_IN_FLIGHT", "true")?,
            in_flight_ttl_secs: env_or("WORKER_IN_FLIGHT_TTL_SECS", "3600")?,
            poll_delay_ms: env_or("WORKER_POLL_DELAY_MS", "0")?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            anyhow::bail!("Max concurrent deliveries must be greater than 0");
        }
        if self.dedupe_in_flight && self.in_flight_ttl_secs == 0 {
            anyhow::bail!("In-flight marker TTL must be at least 1 second");
        }
        Ok(())
    }

    pub fn in_flight_ttl(&self) -> Duration {
        Duration::from_secs(self.in_flight_ttl_secs)
    }

    pub fn poll_delay(&self) -> Duration {
        Duration::from_millis(self.poll_delay_ms)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: Uuid::new_v4().to_string(),
            role: WorkerRole::All,
            max_concurrent: 10,
            redeliver_failed: false,
            dedupe_in_flight: true,
            in_flight_ttl_secs: 3600,
            poll_delay_ms: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_worker_config() {
        let config = WorkerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.role, WorkerRole::All);
        assert_eq!(config.poll_delay(), Duration::ZERO);
        assert!(!config.redeliver_failed);
    }

    #[test]
    fn test_worker_role_parsing() {
        assert_eq!("scan".parse::<WorkerRole>().unwrap(), WorkerRole::Scan);
        assert_eq!("POLL".parse::<WorkerRole>().unwrap(), WorkerRole::Poll);
        assert!("both".parse::<WorkerRole>().is_err());
    }

    #[test]
    fn test_role_channels() {
        assert_eq!(WorkerRole::Scan.channels(), vec![Channel::Scan]);
        assert_eq!(WorkerRole::All.channels(), vec![Channel::Scan, Channel::Poll]);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = WorkerConfig {
            max_concurrent: 0,
            ..WorkerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_config_needs_api_key() {
        // every other section has usable defaults
        assert!(Config::default().validate().is_err());
    }
}
