//! Reconnect backoff calculation and retry bookkeeping.

use std::time::Duration;

use rand::Rng;

use crate::websocket::WsConfig;

/// Reconnect/backoff parameters resolved from [`WsConfig`].
#[derive(Clone, Copy, Debug)]
pub(crate) struct BackoffConfig {
    pub(crate) initial_delay: Duration,
    pub(crate) max_delay: Duration,
    pub(crate) factor: f64,
    pub(crate) jitter: f64,
}

impl BackoffConfig {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.initial_delay.is_zero() {
            return Err("Reconnect interval must be > 0".to_string());
        }
        if self.max_delay.is_zero() {
            return Err("Max reconnect interval must be > 0".to_string());
        }
        if self.max_delay < self.initial_delay {
            return Err("Max reconnect interval must be >= reconnect interval".to_string());
        }
        if self.factor < 1.0 || !self.factor.is_finite() {
            return Err("Backoff factor must be >= 1.0".to_string());
        }
        if !(0.0..=1.0).contains(&self.jitter) || !self.jitter.is_finite() {
            return Err("Jitter must be between 0.0 and 1.0".to_string());
        }
        Ok(())
    }
}

/// `min(initial * factor^attempt, max)`, optionally blended with jitter.
pub(crate) fn calculate_backoff(config: BackoffConfig, attempt: u32) -> Duration {
    let initial = config.initial_delay.as_secs_f64();
    let max = config.max_delay.as_secs_f64();
    let exponent = config.factor.powf(f64::from(attempt));
    let base = (initial * exponent).min(max);

    if config.jitter == 0.0 {
        return Duration::from_secs_f64(base);
    }

    let mut rng = rand::rng();
    let randomized = rng.random_range(0.0..=base);
    let blended = base * (1.0 - config.jitter) + randomized * config.jitter;
    Duration::from_secs_f64(blended)
}

/// Stateful retry policy owned by the connection controller.
///
/// The attempt counter starts at 0 for the first retry, increments every time
/// a retry is scheduled, and resets to 0 whenever a connection opens.
#[derive(Debug)]
pub(crate) struct ReconnectPolicy {
    backoff: BackoffConfig,
    max_attempts: u32,
    attempt: u32,
}

impl ReconnectPolicy {
    pub(crate) fn new(config: &WsConfig) -> Self {
        Self {
            backoff: config.backoff(),
            max_attempts: config.reconnect_max_attempts,
            attempt: 0,
        }
    }

    /// Current attempt count.
    pub(crate) fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay before the retry with the given attempt index.
    pub(crate) fn delay_for(&self, attempt: u32) -> Duration {
        calculate_backoff(self.backoff, attempt)
    }

    /// False once a nonzero attempt limit has been reached.
    pub(crate) fn should_retry(&self) -> bool {
        self.max_attempts == 0 || self.attempt < self.max_attempts
    }

    /// Consume one attempt and return the delay to wait before it.
    pub(crate) fn next_delay(&mut self) -> Duration {
        let delay = self.delay_for(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Called on every successful open.
    pub(crate) fn reset(&mut self) {
        self.attempt = 0;
    }
}
