//! WebSocket client configuration.

use std::time::Duration;

use serde::Deserialize;

use super::types::BinaryMode;
use crate::{
    error::{ClientError, ClientResult},
    reconnect::BackoffConfig,
};

/// Configuration for the WebSocket client.
///
/// Immutable once the client is constructed.
#[derive(Clone, Debug)]
pub struct WsConfig {
    /// WebSocket endpoint URL.
    pub url: String,

    /// Time allowed for the transport to open before it is torn down.
    pub connect_timeout: Duration,

    // Reconnection settings
    /// Reconnect automatically after an unexpected close or a connect timeout.
    pub reconnect: bool,
    /// Delay before the first reconnection attempt.
    pub reconnect_interval: Duration,
    /// Upper bound on the reconnection delay.
    pub reconnect_max_interval: Duration,
    /// Maximum number of reconnection attempts (0 = unlimited).
    pub reconnect_max_attempts: u32,
    /// Random jitter factor (0.0-1.0) for reconnection delays.
    pub reconnect_jitter: f64,

    // Correlation
    /// Payload field that carries the correlation key.
    pub correlation_field: String,
    /// Expire pending requests after this long (None = never).
    pub request_timeout: Option<Duration>,
    /// How often expired pending requests are swept when `request_timeout` is set.
    pub pending_sweep_interval: Duration,

    // Offline cache
    /// Queue sends issued while no transport exists.
    pub cache_when_disconnected: bool,
    /// Maximum queued messages; the oldest is dropped beyond this.
    pub max_cached_messages: usize,
    /// Spacing between replayed messages after a reconnect.
    pub cache_drain_interval: Duration,

    /// Delivery of inbound binary frames.
    pub binary_mode: BinaryMode,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            connect_timeout: Duration::from_millis(5000),
            reconnect: true,
            reconnect_interval: Duration::from_millis(5000),
            reconnect_max_interval: Duration::from_millis(10_000),
            reconnect_max_attempts: 0,
            reconnect_jitter: 0.0,
            correlation_field: "message_id".to_string(),
            request_timeout: None,
            pending_sweep_interval: Duration::from_secs(1),
            cache_when_disconnected: false,
            max_cached_messages: 100,
            cache_drain_interval: Duration::from_millis(100),
            binary_mode: BinaryMode::Raw,
        }
    }
}

impl WsConfig {
    /// Create a new configuration with the given URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Merge caller-supplied options over the defaults.
    ///
    /// Fails when `url` is absent or empty.
    pub fn from_options(options: WsOptions) -> ClientResult<Self> {
        let url = options
            .url
            .ok_or_else(|| ClientError::validation("URL is required"))?;

        let mut config = Self::new(url);
        if let Some(ms) = options.timeout_ms {
            config.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(reconnect) = options.reconnect {
            config.reconnect = reconnect;
        }
        if let Some(ms) = options.reconnect_interval_ms {
            config.reconnect_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = options.reconnect_max_interval_ms {
            config.reconnect_max_interval = Duration::from_millis(ms);
        }
        if let Some(attempts) = options.reconnect_max_attempts {
            config.reconnect_max_attempts = attempts;
        }
        if let Some(jitter) = options.reconnect_jitter {
            config.reconnect_jitter = jitter;
        }
        if let Some(field) = options.correlation_field {
            config.correlation_field = field;
        }
        if let Some(ms) = options.request_timeout_ms {
            config.request_timeout = Some(Duration::from_millis(ms));
        }
        if let Some(ms) = options.pending_sweep_interval_ms {
            config.pending_sweep_interval = Duration::from_millis(ms);
        }
        if let Some(cache) = options.cache_when_disconnected {
            config.cache_when_disconnected = cache;
        }
        if let Some(max) = options.max_cached_messages {
            config.max_cached_messages = max;
        }
        if let Some(ms) = options.cache_drain_interval_ms {
            config.cache_drain_interval = Duration::from_millis(ms);
        }
        if let Some(mode) = options.binary_mode {
            config.binary_mode = mode;
        }

        config.validate().map_err(ClientError::validation)?;
        Ok(config)
    }

    /// Parse a JSON options object and merge it over the defaults.
    pub fn from_json(json: &str) -> ClientResult<Self> {
        let options: WsOptions = serde_json::from_str(json)
            .map_err(|e| ClientError::validation(format!("Invalid options: {e}")))?;
        Self::from_options(options)
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Enable or disable automatic reconnection.
    #[must_use]
    pub fn reconnect(mut self, reconnect: bool) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Set the base reconnection interval.
    #[must_use]
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Set the maximum reconnection interval.
    #[must_use]
    pub fn reconnect_max_interval(mut self, interval: Duration) -> Self {
        self.reconnect_max_interval = interval;
        self
    }

    /// Set the maximum reconnection attempts (0 = unlimited).
    #[must_use]
    pub fn reconnect_max_attempts(mut self, attempts: u32) -> Self {
        self.reconnect_max_attempts = attempts;
        self
    }

    /// Set the reconnection jitter factor.
    #[must_use]
    pub fn reconnect_jitter(mut self, jitter: f64) -> Self {
        self.reconnect_jitter = jitter;
        self
    }

    /// Set the correlation field name.
    #[must_use]
    pub fn correlation_field(mut self, field: impl Into<String>) -> Self {
        self.correlation_field = field.into();
        self
    }

    /// Expire pending requests after `timeout`.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Enable or disable the offline cache.
    #[must_use]
    pub fn cache_when_disconnected(mut self, cache: bool) -> Self {
        self.cache_when_disconnected = cache;
        self
    }

    /// Set the offline cache capacity.
    #[must_use]
    pub fn max_cached_messages(mut self, max: usize) -> Self {
        self.max_cached_messages = max;
        self
    }

    /// Set the spacing between replayed messages.
    #[must_use]
    pub fn cache_drain_interval(mut self, interval: Duration) -> Self {
        self.cache_drain_interval = interval;
        self
    }

    /// Set the initial binary mode.
    #[must_use]
    pub fn binary_mode(mut self, mode: BinaryMode) -> Self {
        self.binary_mode = mode;
        self
    }

    pub(crate) fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            initial_delay: self.reconnect_interval,
            max_delay: self.reconnect_max_interval,
            factor: 2.0,
            jitter: self.reconnect_jitter,
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.url.is_empty() {
            return Err("URL cannot be empty".to_string());
        }
        if self.connect_timeout.is_zero() {
            return Err("Connect timeout must be > 0".to_string());
        }
        self.backoff().validate()?;
        if self.correlation_field.is_empty() {
            return Err("Correlation field cannot be empty".to_string());
        }
        if self.request_timeout.is_some_and(|t| t.is_zero()) {
            return Err("Request timeout must be > 0".to_string());
        }
        if self.pending_sweep_interval.is_zero() {
            return Err("Pending sweep interval must be > 0".to_string());
        }
        if self.max_cached_messages == 0 {
            return Err("Max cached messages must be > 0".to_string());
        }
        Ok(())
    }
}

/// Caller-supplied options; every field is optional and falls back to the
/// [`WsConfig`] default. Field names follow the camelCase JSON convention.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WsOptions {
    pub url: Option<String>,
    pub timeout_ms: Option<u64>,
    pub reconnect: Option<bool>,
    pub reconnect_interval_ms: Option<u64>,
    pub reconnect_max_interval_ms: Option<u64>,
    pub reconnect_max_attempts: Option<u32>,
    pub reconnect_jitter: Option<f64>,
    pub correlation_field: Option<String>,
    pub request_timeout_ms: Option<u64>,
    pub pending_sweep_interval_ms: Option<u64>,
    pub cache_when_disconnected: Option<bool>,
    pub max_cached_messages: Option<usize>,
    pub cache_drain_interval_ms: Option<u64>,
    pub binary_mode: Option<BinaryMode>,
}
