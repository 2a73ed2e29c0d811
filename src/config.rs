//! Declarative retry configuration (feature `config`).
//!
//! A [`RetryConfig`] deserializes from any serde format and builds the runtime policy:
//! `methods` gate AND (`temporary_errors` OR `server_errors` OR `statuses`).
//!
//! ```rust
//! use retrans::config::RetryConfig;
//!
//! let config: RetryConfig = serde_json::from_str(r#"{
//!     "max_retries": 5,
//!     "methods": ["GET", "PUT"],
//!     "statuses": [429],
//!     "delay": { "kind": "linear", "base_ms": 250 }
//! }"#).unwrap();
//! config.validate().unwrap();
//! let layer = config.layer::<std::io::Error>().unwrap();
//! # let _ = layer;
//! ```

use crate::{
    Delay, RetryAll, RetryAny, RetryHttpMethods, RetryLayer, RetryPolicy, RetryStatus5xx,
    RetryStatuses, RetryTemporaryErr, Temporary,
};
use http::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Errors found while validating a [`RetryConfig`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid status code {0}")]
    InvalidStatus(u16),
    #[error("invalid HTTP method {0:?}")]
    InvalidMethod(String),
    #[error("exponential max ({max_ms}ms) must be >= base ({base_ms}ms)")]
    MaxLessThanBase { base_ms: u64, max_ms: u64 },
}

/// Delay strategy as configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DelayConfig {
    None,
    Constant { delay_ms: u64 },
    Linear { base_ms: u64 },
    Exponential { base_ms: u64, max_ms: u64 },
}

impl Default for DelayConfig {
    fn default() -> Self {
        DelayConfig::Exponential { base_ms: 100, max_ms: 10_000 }
    }
}

impl DelayConfig {
    pub fn to_delay(&self) -> Delay {
        match *self {
            DelayConfig::None => Delay::none(),
            DelayConfig::Constant { delay_ms } => Delay::constant(Duration::from_millis(delay_ms)),
            DelayConfig::Linear { base_ms } => Delay::linear(Duration::from_millis(base_ms)),
            DelayConfig::Exponential { base_ms, max_ms } => {
                Delay::exponential(Duration::from_millis(base_ms), Duration::from_millis(max_ms))
            }
        }
    }
}

/// Retry settings for a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the initial attempt.
    pub max_retries: usize,
    /// Retry errors that report themselves as temporary.
    pub temporary_errors: bool,
    /// Retry any 5xx response.
    pub server_errors: bool,
    /// Additional status codes to retry.
    pub statuses: Vec<u16>,
    /// Methods allowed to retry; empty allows every method.
    pub methods: Vec<String>,
    pub delay: DelayConfig,
    /// Never buffer or retry requests that carry a body.
    pub prevent_retry_with_body: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            temporary_errors: true,
            server_errors: true,
            statuses: Vec::new(),
            methods: Vec::new(),
            delay: DelayConfig::default(),
            prevent_retry_with_body: false,
        }
    }
}

impl RetryConfig {
    /// Check status codes, method names, and delay bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.status_codes()?;
        for method in &self.methods {
            Method::from_bytes(method.as_bytes())
                .map_err(|_| ConfigError::InvalidMethod(method.clone()))?;
        }
        if let DelayConfig::Exponential { base_ms, max_ms } = self.delay {
            if max_ms < base_ms {
                return Err(ConfigError::MaxLessThanBase { base_ms, max_ms });
            }
        }
        Ok(())
    }

    fn status_codes(&self) -> Result<Vec<StatusCode>, ConfigError> {
        self.statuses
            .iter()
            .map(|&code| StatusCode::from_u16(code).map_err(|_| ConfigError::InvalidStatus(code)))
            .collect()
    }

    /// Build the retry condition described by this config.
    pub fn condition<E>(&self) -> Result<RetryAll<E>, ConfigError>
    where
        E: Temporary + 'static,
    {
        self.validate()?;
        let mut triggers = RetryAny::new();
        if self.temporary_errors {
            triggers = triggers.with(RetryTemporaryErr::new(self.max_retries));
        }
        if self.server_errors {
            triggers = triggers.with(RetryStatus5xx::new(self.max_retries));
        }
        if !self.statuses.is_empty() {
            triggers = triggers.with(RetryStatuses::new(self.max_retries, self.status_codes()?));
        }

        let mut condition = RetryAll::new();
        if !self.methods.is_empty() {
            condition = condition.with(RetryHttpMethods::new(self.max_retries, &self.methods));
        }
        Ok(condition.with(triggers))
    }

    /// Build the full policy.
    pub fn policy<E>(&self) -> Result<RetryPolicy<E>, ConfigError>
    where
        E: Temporary + 'static,
    {
        Ok(RetryPolicy::new(self.condition::<E>()?, self.delay.to_delay()))
    }

    /// Build a tower layer applying this config.
    pub fn layer<E>(&self) -> Result<RetryLayer<E>, ConfigError>
    where
        E: Temporary + 'static,
    {
        Ok(RetryLayer::from_policy(self.policy()?)
            .prevent_retry_with_body(self.prevent_retry_with_body))
    }
}
