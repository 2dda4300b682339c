use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;

use shared::config::{env_or, LoggingConfig, QueueConfig, RedisConfig};

/// Submission service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub redis: RedisConfig,
    pub queue: QueueConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener and upload limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_file_size_mb: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            server: ServerConfig::from_env()?,
            redis: RedisConfig::from_env()?,
            queue: QueueConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.redis.validate()?;
        self.queue.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: env::var("SUBMISSION_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_or("SUBMISSION_SERVICE_PORT", "8000")?,
            max_file_size_mb: env_or("MAX_FILE_SIZE_MB", "100")?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_file_size_mb == 0 {
            anyhow::bail!("Max file size must be greater than 0");
        }
        self.socket_addr()?;
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.host, self.port))
    }

    pub fn max_file_size_bytes(&self) -> usize {
        self.max_file_size_mb * 1024 * 1024
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_file_size_mb: 100,
        }
    }
}
