//! # LDN Inbox Configuration
//!
//! Layered configuration for the inbox, delivery engine and retry scheduler.
//!
//! ## Sources
//!
//! Loaded by [`ConfigManager`] in increasing priority:
//!
//! 1. `config/ldn.toml`
//! 2. `config/ldn.<environment>.toml` (environment from `LDN_ENV`, default `development`)
//! 3. Environment variables prefixed `LDN__`, nested with `__`
//!    (`LDN__RETRY__MAX_ATTEMPTS=8`)
//!
//! Every field has a default, so an empty configuration is valid.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use ldn_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let timeout = manager.config().processor.timeout();
//! let routes = &manager.config().routes;
//! # let _ = (timeout, routes);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

pub use error::ConfigurationError;
pub use loader::ConfigManager;

pub type ConfigResult<T> = Result<T, ConfigurationError>;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LdnConfig {
    pub inbox: InboxConfig,
    pub processor: ProcessorConfig,
    pub retry: RetryConfig,
    pub scheduler: SchedulerConfig,
    pub database: DatabaseConfig,
    pub web: WebConfig,
    pub outbound: OutboundConfig,
    /// Ordered routing table; first match wins
    pub routes: Vec<RouteConfig>,
}

/// Inbound document handling
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InboxConfig {
    /// Assign a `urn:uuid:` id to documents that arrive without one
    pub generate_missing_ids: bool,
    pub max_document_bytes: usize,
}

impl Default for InboxConfig {
    fn default() -> Self {
        Self {
            generate_missing_ids: false,
            max_document_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProcessorConfig {
    pub timeout_ms: u64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self { timeout_ms: 30_000 }
    }
}

impl ProcessorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Backoff strategy selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    Exponential,
    Fixed,
}

/// Backoff and retry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    pub strategy: RetryStrategy,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
    pub jitter_enabled: bool,
    pub jitter_max_percentage: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            strategy: RetryStrategy::Exponential,
            base_delay_ms: 1_000,
            multiplier: 2.0,
            max_delay_ms: 300_000,
            max_attempts: 5,
            jitter_enabled: false,
            jitter_max_percentage: 0.1,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Retry scheduler configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub interval_ms: u64,
    /// Maximum records claimed per tick
    pub batch_size: usize,
    /// Maximum records retried concurrently within a tick
    pub max_concurrency: usize,
    /// Age after which an `UNTRIED` record is treated as abandoned and
    /// re-attempted; must exceed `processor.timeout_ms`
    pub stale_after_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 5_000,
            batch_size: 100,
            max_concurrency: 8,
            stale_after_ms: 120_000,
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }
}

/// PostgreSQL connection settings; the in-memory store is used when `url` is unset
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout_seconds: u64,
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            acquire_timeout_seconds: 5,
            run_migrations: true,
        }
    }
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebConfig {
    pub bind_address: String,
    pub request_timeout_ms: u64,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_ms: 60_000,
        }
    }
}

impl WebConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Outbound notification delivery
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutboundConfig {
    pub timeout_ms: u64,
    pub user_agent: String,
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            user_agent: format!("ldn-core-rs/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl OutboundConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// One entry of the ordered routing table
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Processor id; unique across routes
    pub name: String,
    /// Processor kind understood by the `ProcessorFactory`
    pub processor: String,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub object_types: Vec<String>,
    #[serde(default)]
    pub target_types: Vec<String>,
    /// Kind-specific settings
    #[serde(default)]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

impl LdnConfig {
    /// Validate configuration for consistency
    pub fn validate(&self) -> ConfigResult<()> {
        if self.processor.timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "processor.timeout_ms",
                "0",
                "processor timeout must be greater than 0",
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "retry.max_attempts",
                "0",
                "at least one attempt must be allowed",
            ));
        }

        if self.retry.base_delay_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "retry.base_delay_ms",
                "0",
                "retry delay must be greater than 0",
            ));
        }

        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(ConfigurationError::invalid_value(
                "retry.max_delay_ms",
                self.retry.max_delay_ms.to_string(),
                "max delay must not be lower than base delay",
            ));
        }

        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "retry.multiplier",
                self.retry.multiplier.to_string(),
                "multiplier must be a finite number >= 1.0",
            ));
        }

        if !(0.0..=1.0).contains(&self.retry.jitter_max_percentage) {
            return Err(ConfigurationError::invalid_value(
                "retry.jitter_max_percentage",
                self.retry.jitter_max_percentage.to_string(),
                "jitter percentage must be between 0.0 and 1.0",
            ));
        }

        if self.scheduler.interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "scheduler.interval_ms",
                "0",
                "scheduler interval must be greater than 0",
            ));
        }

        if self.scheduler.batch_size == 0 || self.scheduler.max_concurrency == 0 {
            return Err(ConfigurationError::invalid_value(
                "scheduler.batch_size",
                format!(
                    "{}/{}",
                    self.scheduler.batch_size, self.scheduler.max_concurrency
                ),
                "batch size and concurrency must be greater than 0",
            ));
        }

        if self.scheduler.stale_after_ms <= self.processor.timeout_ms {
            return Err(ConfigurationError::invalid_value(
                "scheduler.stale_after_ms",
                self.scheduler.stale_after_ms.to_string(),
                "stale threshold must exceed the processor timeout",
            ));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigurationError::invalid_value(
                "database.max_connections",
                "0",
                "pool size must be greater than 0",
            ));
        }

        let mut names = HashSet::new();
        for route in &self.routes {
            if route.name.trim().is_empty() {
                return Err(ConfigurationError::missing_required_field(
                    "routes.name",
                    "route configuration",
                ));
            }
            if route.types.is_empty() {
                return Err(ConfigurationError::missing_required_field(
                    format!("routes.{}.types", route.name),
                    "a route must match at least one notification type",
                ));
            }
            if !names.insert(route.name.as_str()) {
                return Err(ConfigurationError::DuplicateRoute {
                    name: route.name.clone(),
                });
            }
        }

        Ok(())
    }
}
