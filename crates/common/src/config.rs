//! Common configuration types for call client components.

use serde::{Deserialize, Serialize};

/// Default `EnvFilter` directive when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "call_client=debug,common=info";

/// Observability configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// `EnvFilter` directive (e.g. `call_client=debug`)
    pub log_filter: String,
    /// Enable JSON-formatted logs
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            json_logs: false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_targets_client_crates() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.log_filter, DEFAULT_LOG_FILTER);
        assert!(!config.json_logs);
    }

    #[test]
    fn test_deserializes_from_json() {
        let config: ObservabilityConfig =
            serde_json::from_str(r#"{"log_filter": "call_client=trace", "json_logs": true}"#)
                .unwrap();
        assert_eq!(config.log_filter, "call_client=trace");
        assert!(config.json_logs);
    }
}
