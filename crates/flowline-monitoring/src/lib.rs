//! Monitoring bootstrap for Flowline.
//!
//! Installs the global `tracing` subscriber the engine logs through.

use serde::{Deserialize, Serialize};
use tracing::info;

pub mod logging;

/// Configuration for initializing the monitoring system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Service name attached to the startup log line
    pub service_name: String,
    /// Log level filter (e.g., "info,flowline_core=debug"); `RUST_LOG` wins when set
    pub log_filter: String,
    /// Environment (dev, staging, prod)
    pub environment: String,
    /// Emit JSON lines instead of human-readable output
    pub enable_json_logging: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            service_name: "flowline".to_string(),
            log_filter: "info".to_string(),
            environment: "dev".to_string(),
            enable_json_logging: false,
        }
    }
}

impl MonitoringConfig {
    /// Use `filter` as the log filter
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }
}

/// Initialize monitoring system
///
/// Fails if a global subscriber is already installed.
pub fn init(config: MonitoringConfig) -> anyhow::Result<()> {
    logging::init_logging(&config)?;

    info!(
        service_name = %config.service_name,
        environment = %config.environment,
        "Monitoring initialized"
    );

    Ok(())
}

/// Initialize monitoring unless a subscriber is already installed
///
/// Returns whether this call installed the subscriber. Safe to call from
/// every test.
pub fn try_init(config: MonitoringConfig) -> bool {
    init(config).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = MonitoringConfig::default();
        assert_eq!(config.service_name, "flowline");
        assert_eq!(config.log_filter, "info");
        assert!(!config.enable_json_logging);
    }

    #[test]
    fn test_config_partial_deserialization() {
        let config: MonitoringConfig =
            serde_json::from_str(r#"{"log_filter": "debug", "enable_json_logging": true}"#)
                .unwrap();
        assert_eq!(config.log_filter, "debug");
        assert!(config.enable_json_logging);
        assert_eq!(config.environment, "dev");
    }

    #[test]
    fn test_with_log_filter() {
        let config = MonitoringConfig::default().with_log_filter("warn,flowline_core=trace");
        assert_eq!(config.log_filter, "warn,flowline_core=trace");
    }
}
