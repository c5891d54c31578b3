pub mod options;

pub use options::{CallOptions, Priority};

use crate::error::config::ConfigError;

use common::ErrorLocation;

use std::panic::Location;
use std::path::Path;
use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use url::Url;

const CONFIG_FILE_NAME: &str = "bridge.toml";

/// Upper bound for request timeouts and retry delays (one day).
const MAX_DURATION_MS: u64 = 86_400_000;

// ============================================
// ENUMS WITH DEFAULTS
// ============================================

/// What the offline queue does when it is full.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Drop the oldest queued request (rejected with `QueueOverflow`) to make room.
    EvictOldest,
    /// Refuse the new request (rejected with `ChannelClosed`).
    RejectNewest,
}

impl Default for OverflowPolicy {
    fn default() -> Self {
        OverflowPolicy::EvictOldest
    }
}

// ============================================
// CONFIG STRUCTS
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Randomization factor; 0.2 means ±20%.
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_batch_max_size")]
    pub max_size: usize,
    #[serde(default = "default_batch_max_window_ms")]
    pub max_window_ms: u64,
    /// Methods batched unless a call overrides it.
    #[serde(default)]
    pub methods: Vec<String>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_size: default_batch_max_size(),
            max_window_ms: default_batch_max_window_ms(),
            methods: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
    #[serde(default)]
    pub overflow: OverflowPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
            overflow: OverflowPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Probe interval while Connected. Zero disables probing.
    #[serde(default = "default_health_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_degraded_interval_ms")]
    pub degraded_interval_ms: u64,
    #[serde(default = "default_misses_before_degraded")]
    pub misses_before_degraded: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_health_interval_ms(),
            degraded_interval_ms: default_degraded_interval_ms(),
            misses_before_degraded: default_misses_before_degraded(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    pub url: Option<String>,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: None,
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_latency_window")]
    pub latency_window: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            latency_window: default_latency_window(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub request: RequestConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

// ============================================
// DEFAULT FUNCTIONS
// ============================================

fn default_timeout_ms() -> u64 {
    5_000
}
fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    250
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_max_delay_ms() -> u64 {
    8_000
}
fn default_jitter() -> f64 {
    0.2
}
fn default_batch_max_size() -> usize {
    10
}
fn default_batch_max_window_ms() -> u64 {
    50
}
fn default_queue_capacity() -> usize {
    100
}
fn default_health_interval_ms() -> u64 {
    10_000
}
fn default_degraded_interval_ms() -> u64 {
    2_500
}
fn default_misses_before_degraded() -> u32 {
    3
}
fn default_connect_timeout_ms() -> u64 {
    5_000
}
fn default_latency_window() -> usize {
    1_024
}

// ============================================
// IMPLEMENTATION
// ============================================

impl BridgeConfig {
    /// Load config from {config_dir}/bridge.toml.
    ///
    /// # Returns
    ///
    /// Returns `Ok(BridgeConfig)` if loaded successfully or defaults if the file is missing.
    /// Returns `Err(ConfigError)` if the file exists but is unreadable, corrupted or invalid.
    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            info!(
                "Bridge config not found at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path).map_err(|e| {
            warn!("Failed to read bridge config: {}", e);
            ConfigError::ReadError {
                location: ErrorLocation::from(Location::caller()),
                path: config_path.clone(),
                source: e,
            }
        })?;

        let config = Self::from_toml_str(&contents).map_err(|e| {
            warn!("Failed to parse bridge config: {}", e);
            ConfigError::ParseError {
                location: ErrorLocation::from(Location::caller()),
                path: config_path.clone(),
                reason: e.to_string(),
            }
        })?;

        config.validate()?;

        info!("Bridge config loaded from {}", config_path.display());
        Ok(config)
    }

    /// Parse config from TOML text without validating it.
    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Validate config values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request.timeout_ms == 0 {
            return Err(validation_error("request.timeout_ms must be greater than 0"));
        }

        if self.request.timeout_ms > MAX_DURATION_MS {
            return Err(validation_error(format!(
                "request.timeout_ms must be at most {MAX_DURATION_MS}, got {}",
                self.request.timeout_ms
            )));
        }

        if self.request.max_attempts == 0 {
            return Err(validation_error("request.max_attempts must be at least 1"));
        }

        if self.retry.base_delay_ms == 0 {
            return Err(validation_error("retry.base_delay_ms must be greater than 0"));
        }

        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(validation_error(format!(
                "retry.max_delay_ms ({}) must be >= retry.base_delay_ms ({})",
                self.retry.max_delay_ms, self.retry.base_delay_ms
            )));
        }

        if self.retry.max_delay_ms > MAX_DURATION_MS {
            return Err(validation_error(format!(
                "retry.max_delay_ms must be at most {MAX_DURATION_MS}, got {}",
                self.retry.max_delay_ms
            )));
        }

        if !(self.retry.multiplier >= 1.0) {
            return Err(validation_error(format!(
                "retry.multiplier must be >= 1.0, got {}",
                self.retry.multiplier
            )));
        }

        if !(0.0..1.0).contains(&self.retry.jitter) {
            return Err(validation_error(format!(
                "retry.jitter must be in [0.0, 1.0), got {}",
                self.retry.jitter
            )));
        }

        if self.batch.max_size == 0 {
            return Err(validation_error("batch.max_size must be at least 1"));
        }

        if self.queue.capacity == 0 {
            return Err(validation_error("queue.capacity must be at least 1"));
        }

        if self.health.interval_ms > 0 {
            if self.health.degraded_interval_ms == 0 {
                return Err(validation_error(
                    "health.degraded_interval_ms must be greater than 0 when probing is enabled",
                ));
            }
            if self.health.misses_before_degraded == 0 {
                return Err(validation_error(
                    "health.misses_before_degraded must be at least 1",
                ));
            }
        }

        if self.transport.connect_timeout_ms == 0 {
            return Err(validation_error(
                "transport.connect_timeout_ms must be greater than 0",
            ));
        }

        if self.metrics.latency_window == 0 {
            return Err(validation_error("metrics.latency_window must be at least 1"));
        }

        self.transport.parsed_url()?;

        Ok(())
    }

    /// Whether `method` is on the batch allow-list.
    pub fn is_batchable(&self, method: &str) -> bool {
        self.batch.methods.iter().any(|m| m == method)
    }
}

impl RequestConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl BatchConfig {
    pub fn max_window(&self) -> Duration {
        Duration::from_millis(self.max_window_ms)
    }
}

impl HealthConfig {
    /// Probe interval while Connected; `None` when probing is disabled.
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_ms > 0).then(|| Duration::from_millis(self.interval_ms))
    }

    pub fn degraded_interval(&self) -> Duration {
        Duration::from_millis(self.degraded_interval_ms)
    }
}

impl TransportConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Parse `url`, accepting only `ws` and `wss` schemes.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if the URL is malformed or not a WebSocket URL.
    pub fn parsed_url(&self) -> Result<Option<Url>, ConfigError> {
        let Some(raw) = self.transport_url() else {
            return Ok(None);
        };

        let url = Url::parse(&raw)
            .map_err(|e| validation_error(format!("Invalid transport.url '{raw}': {e}")))?;

        match url.scheme() {
            "ws" | "wss" => Ok(Some(url)),
            other => Err(validation_error(format!(
                "transport.url must use ws or wss, got '{other}'"
            ))),
        }
    }

    fn transport_url(&self) -> Option<String> {
        self.url.as_ref().filter(|u| !u.is_empty()).cloned()
    }
}

#[track_caller]
fn validation_error(reason: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        location: ErrorLocation::from(Location::caller()),
        reason: reason.into(),
    }
}
