//! Configuration for the client and its background components.
//!
//! Every struct has a `Default` and can be deserialized from JSON, with
//! missing fields taking their defaults. Durations are given in
//! milliseconds.

use crate::error::Result;
use crate::types::Credential;
use serde::{Deserialize, Serialize};
use std::time::Duration;

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Resource pool configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Max live handles. Adding past this evicts the oldest.
    /// Default: 100
    pub max: usize,

    /// Idle poll while the pool is empty.
    /// Default: 2s
    #[serde(with = "millis", rename = "poll_interval_ms")]
    pub poll_interval: Duration,

    /// Delay between noticing entries and sweeping them.
    /// Default: 1s
    #[serde(with = "millis", rename = "settle_delay_ms")]
    pub settle_delay: Duration,
}

impl PoolConfig {
    /// Config with the given capacity; negative values clamp to 0.
    pub fn with_max(max: i64) -> Self {
        Self {
            max: max.max(0) as usize,
            ..Default::default()
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max: 100,
            poll_interval: Duration::from_secs(2),
            settle_delay: Duration::from_secs(1),
        }
    }
}

/// Deferred delivery queue configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeferredConfig {
    /// How long an item may wait for its destination before being dropped.
    /// Default: 600s
    #[serde(with = "millis", rename = "max_wait_ms")]
    pub max_wait: Duration,

    /// Worker wake-up interval while items are queued.
    /// Default: 3s
    #[serde(with = "millis", rename = "poll_interval_ms")]
    pub poll_interval: Duration,
}

impl Default for DeferredConfig {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_secs(600),
            poll_interval: Duration::from_secs(3),
        }
    }
}

/// Retry policy for outbound sends.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    /// Default: 3
    pub max_retries: u32,

    /// Fixed wait before reconnecting after a broken pipe.
    /// Default: 1s
    #[serde(with = "millis", rename = "pipe_delay_ms")]
    pub pipe_delay: Duration,

    /// Base unit of the backoff after a connection reset.
    /// Default: 60s
    #[serde(with = "millis", rename = "reset_base_ms")]
    pub reset_base: Duration,
}

impl RetryPolicy {
    /// Wait before the retry that follows failed attempt number `attempt`
    /// (1-based) with a connection reset: `reset_base * (attempt^2 + 1)`.
    pub fn reset_delay(&self, attempt: u32) -> Duration {
        let factor = attempt.saturating_mul(attempt).saturating_add(1);
        self.reset_base.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            pipe_delay: Duration::from_secs(1),
            reset_base: Duration::from_secs(60),
        }
    }
}

/// Where and how the supervisor connects.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Server host. Empty means "let the collaborator resolve it".
    pub host: String,

    /// Default: 5222
    pub port: u16,

    pub credential: Credential,

    /// Service re-bound after every connect, if any.
    pub default_service: Option<String>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 5222,
            credential: Credential::default(),
            default_service: None,
        }
    }
}

/// Full client configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub supervisor: SupervisorConfig,
    pub pool: PoolConfig,
    pub deferred: DeferredConfig,
    pub retry: RetryPolicy,
    /// Status payload announced on every connect.
    pub initial_status: Option<Vec<u8>>,
}

impl ClientConfig {
    /// Parse a config from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
