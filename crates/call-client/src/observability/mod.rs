//! Observability for the call client: tracing setup and metrics.
//!
//! The library itself only emits `tracing` events and `metrics` samples.
//! [`init_tracing`] is a convenience for binaries and tests that want the
//! same subscriber setup the client is developed against.

pub mod metrics;

use common::config::ObservabilityConfig;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `config.log_filter`.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<(), TryInitError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    let registry = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_installs_once() {
        let config = ObservabilityConfig {
            json_logs: true,
            ..ObservabilityConfig::default()
        };

        assert!(init_tracing(&config).is_ok());
        assert!(init_tracing(&ObservabilityConfig::default()).is_err());
    }
}
