//! Process-wide execution defaults.
//!
//! Mirrors the `ExecutionConfig` section of the original implementation's
//! settings model: a graph's own `options` may override these per run, but
//! `max_concurrency` is an absolute ceiling no graph can raise (§4.2).

use crate::error::{EngineError, Result};
use std::env;

/// Execution defaults for the engine process.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Per-attempt timeout used when a graph/node does not override it.
    pub default_timeout_sec: u64,
    /// Additional-attempts budget used when a graph/node does not override it.
    pub max_retries: usize,
    /// Concurrency a graph gets if it does not request its own.
    pub default_concurrency: usize,
    /// Absolute ceiling on concurrency regardless of what a graph requests.
    pub max_concurrency: usize,
    /// Base of the exponential backoff delay (seconds).
    pub retry_backoff_base: f64,
    /// Multiplier applied per additional attempt.
    pub retry_backoff_factor: f64,
    /// Cap on any single backoff delay (seconds).
    pub retry_max_delay_sec: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_timeout_sec: 30,
            max_retries: 3,
            default_concurrency: 5,
            max_concurrency: 50,
            retry_backoff_base: 2.0,
            retry_backoff_factor: 2.0,
            retry_max_delay_sec: 60.0,
        }
    }
}

impl EngineConfig {
    /// Validate internal consistency. Construction helpers below call this;
    /// `Default::default()` is guaranteed to pass it.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency < self.default_concurrency {
            return Err(EngineError::Configuration(format!(
                "max_concurrency ({}) must be >= default_concurrency ({})",
                self.max_concurrency, self.default_concurrency
            )));
        }
        if self.default_concurrency == 0 {
            return Err(EngineError::Configuration(
                "default_concurrency must be positive".into(),
            ));
        }
        if self.retry_backoff_base < 0.0 || self.retry_backoff_factor < 0.0 {
            return Err(EngineError::Configuration(
                "retry backoff base/factor must be non-negative".into(),
            ));
        }
        Ok(())
    }

    /// Effective concurrency for a graph that requested `requested`.
    pub fn effective_concurrency(&self, requested: usize) -> usize {
        requested.min(self.max_concurrency)
    }

    /// Load overrides from `FLUXGRAPH_*` environment variables, falling
    /// back to [`Default`] for anything unset or unparseable. Never panics:
    /// an unparseable value is logged and ignored rather than surfaced as
    /// an error, matching the original source's tolerant env loading.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(v) = env_u64("FLUXGRAPH_DEFAULT_TIMEOUT_SEC") {
            cfg.default_timeout_sec = v;
        }
        if let Some(v) = env_usize("FLUXGRAPH_MAX_RETRIES") {
            cfg.max_retries = v;
        }
        if let Some(v) = env_usize("FLUXGRAPH_DEFAULT_CONCURRENCY") {
            cfg.default_concurrency = v;
        }
        if let Some(v) = env_usize("FLUXGRAPH_MAX_CONCURRENCY") {
            cfg.max_concurrency = v;
        }
        if let Some(v) = env_f64("FLUXGRAPH_RETRY_BACKOFF_BASE") {
            cfg.retry_backoff_base = v;
        }
        if let Some(v) = env_f64("FLUXGRAPH_RETRY_BACKOFF_FACTOR") {
            cfg.retry_backoff_factor = v;
        }
        if let Some(v) = env_f64("FLUXGRAPH_RETRY_MAX_DELAY_SEC") {
            cfg.retry_max_delay_sec = v;
        }
        cfg
    }
}

fn env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_f64(key: &str) -> Option<f64> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}
