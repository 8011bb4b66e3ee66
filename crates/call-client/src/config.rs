//! Call client configuration.
//!
//! Configuration is loaded from environment variables. The API key is
//! redacted in Debug output.

use common::config::ObservabilityConfig;
use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::retry::{
    RetryPolicy, DEFAULT_BASE_DELAY, DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_MAX_DELAY,
};

/// Default capacity of the transport → store event channel.
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Default deadline for a single backend call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Call client configuration.
#[derive(Clone)]
pub struct ClientConfig {
    /// Application API key sent with every request.
    /// Protected by `SecretString` to prevent accidental logging.
    pub api_key: SecretString,

    /// Coordinator endpoint the transport connects to.
    pub coordinator_url: String,

    /// Capacity of the bounded event channel between transport and store.
    pub event_buffer: usize,

    /// Reconnect backoff base delay.
    pub retry_base_delay: Duration,

    /// Reconnect backoff cap.
    pub retry_max_delay: Duration,

    /// Maximum connection attempts, `None` for unlimited.
    pub retry_max_attempts: Option<u32>,

    /// Upper bound for one connection attempt.
    pub connect_timeout: Duration,

    /// Default deadline applied to backend calls.
    pub request_timeout: Duration,

    /// Log filter and format.
    pub observability: ObservabilityConfig,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"[REDACTED]")
            .field("coordinator_url", &self.coordinator_url)
            .field("event_buffer", &self.event_buffer)
            .field("retry_base_delay", &self.retry_base_delay)
            .field("retry_max_delay", &self.retry_max_delay)
            .field("retry_max_attempts", &self.retry_max_attempts)
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("observability", &self.observability)
            .finish()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

fn parse_var<T: FromStr>(
    vars: &HashMap<String, String>,
    name: &str,
) -> Result<Option<T>, ConfigError> {
    vars.get(name)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(format!("{name}={raw}")))
        })
        .transpose()
}

fn parse_millis(
    vars: &HashMap<String, String>,
    name: &str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    Ok(parse_var::<u64>(vars, name)?.map_or(default, Duration::from_millis))
}

impl ClientConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let api_key = SecretString::from(
            vars.get("CALL_API_KEY")
                .ok_or_else(|| ConfigError::MissingEnvVar("CALL_API_KEY".to_string()))?
                .clone(),
        );

        let coordinator_url = vars
            .get("CALL_COORDINATOR_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("CALL_COORDINATOR_URL".to_string()))?
            .clone();

        let event_buffer = parse_var::<usize>(vars, "CALL_EVENT_BUFFER")?
            .unwrap_or(DEFAULT_EVENT_BUFFER);
        if event_buffer == 0 {
            return Err(ConfigError::InvalidValue(
                "CALL_EVENT_BUFFER must be greater than zero".to_string(),
            ));
        }

        let retry_base_delay = parse_millis(vars, "CALL_RETRY_BASE_MS", DEFAULT_BASE_DELAY)?;
        let retry_max_delay = parse_millis(vars, "CALL_RETRY_MAX_MS", DEFAULT_MAX_DELAY)?;

        // 0 means retry forever
        let retry_max_attempts = match parse_var::<u32>(vars, "CALL_RETRY_MAX_ATTEMPTS")? {
            Some(0) => None,
            Some(max) => Some(max),
            None => Some(DEFAULT_MAX_ATTEMPTS),
        };

        let connect_timeout =
            parse_millis(vars, "CALL_CONNECT_TIMEOUT_MS", DEFAULT_CONNECT_TIMEOUT)?;
        let request_timeout =
            parse_millis(vars, "CALL_REQUEST_TIMEOUT_MS", DEFAULT_REQUEST_TIMEOUT)?;

        let mut observability = ObservabilityConfig::default();
        if let Some(filter) = vars.get("CALL_LOG_FILTER") {
            observability.log_filter.clone_from(filter);
        }
        if let Some(json_logs) = parse_var::<bool>(vars, "CALL_JSON_LOGS")? {
            observability.json_logs = json_logs;
        }

        Ok(ClientConfig {
            api_key,
            coordinator_url,
            event_buffer,
            retry_base_delay,
            retry_max_delay,
            retry_max_attempts,
            connect_timeout,
            request_timeout,
            observability,
        })
    }

    /// Reconnect policy described by this configuration.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_base_delay,
            self.retry_max_delay,
            self.retry_max_attempts,
        )
        .with_connect_timeout(self.connect_timeout)
    }
}
