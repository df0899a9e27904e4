//! Server configuration
//!
//! Defaults can be overridden with `DART_COUNTER_*` environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::codegen::DEFAULT_MAX_ATTEMPTS;
use crate::error::AppError;

/// Default server address
pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// Default score each player starts from
pub const DEFAULT_STARTING_SCORE: u32 = 301;

/// Default seconds an unobserved worker waits for commands before it stops
pub const DEFAULT_WORKER_IDLE_SECS: u64 = 60;

/// Runtime settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Address the WebSocket listener binds to
    pub bind_addr: String,
    /// Channel buffer size for each session worker
    pub session_buffer: usize,
    /// Messages a session topic keeps for slow subscribers
    pub broadcast_capacity: usize,
    /// Undo depth per session
    pub history_capacity: usize,
    /// Starting score when a create request omits it
    pub default_starting_score: u32,
    /// Codes tried before session creation fails
    pub max_code_attempts: usize,
    /// Idle time after which a worker with no subscribers stops
    pub worker_idle_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_ADDR.to_string(),
            session_buffer: 64,
            broadcast_capacity: 64,
            history_capacity: 512,
            default_starting_score: DEFAULT_STARTING_SCORE,
            max_code_attempts: DEFAULT_MAX_ATTEMPTS,
            worker_idle_timeout: Duration::from_secs(DEFAULT_WORKER_IDLE_SECS),
        }
    }
}

impl Config {
    /// Build a config from the process environment
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            bind_addr: lookup("DART_COUNTER_ADDR").unwrap_or(defaults.bind_addr),
            session_buffer: positive(&lookup, "DART_COUNTER_SESSION_BUFFER", defaults.session_buffer)?,
            broadcast_capacity: positive(
                &lookup,
                "DART_COUNTER_BROADCAST_CAPACITY",
                defaults.broadcast_capacity,
            )?,
            history_capacity: positive(
                &lookup,
                "DART_COUNTER_HISTORY_CAPACITY",
                defaults.history_capacity,
            )?,
            default_starting_score: positive(
                &lookup,
                "DART_COUNTER_STARTING_SCORE",
                defaults.default_starting_score,
            )?,
            max_code_attempts: positive(
                &lookup,
                "DART_COUNTER_MAX_CODE_ATTEMPTS",
                defaults.max_code_attempts,
            )?,
            worker_idle_timeout: Duration::from_secs(positive(
                &lookup,
                "DART_COUNTER_WORKER_IDLE_SECS",
                defaults.worker_idle_timeout.as_secs(),
            )?),
        })
    }
}

/// Parse a strictly positive number, falling back to `default` when unset
fn positive<T, F>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr + PartialOrd + Default,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => Ok(value),
        _ => Err(AppError::Config(format!(
            "{} must be a positive integer, got '{}'",
            key, raw
        ))),
    }
}
