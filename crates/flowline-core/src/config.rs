//! Engine configuration
//!
//! Defaults can be overridden from environment variables.

use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::env;
use tracing::{info, warn};

/// Default bound on traversal steps per call
pub const DEFAULT_MAX_ADVANCE_STEPS: usize = 10_000;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of elements a single call may traverse
    #[serde(default = "default_max_advance_steps")]
    pub max_advance_steps: usize,

    /// Log filter directive (e.g., "info,flowline_core=debug")
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

pub(crate) fn default_max_advance_steps() -> usize {
    DEFAULT_MAX_ADVANCE_STEPS
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_advance_steps: default_max_advance_steps(),
            log_filter: default_log_filter(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self, CoreError> {
        let mut config = Self::default();

        if let Ok(steps) = env::var("FLOWLINE_MAX_ADVANCE_STEPS") {
            if let Ok(steps) = steps.parse::<usize>() {
                config.max_advance_steps = steps;
            } else {
                warn!("Invalid FLOWLINE_MAX_ADVANCE_STEPS value: {}", steps);
            }
        }

        if let Ok(filter) = env::var("FLOWLINE_LOG_FILTER") {
            config.log_filter = filter;
        }

        config.validate()?;

        info!(
            max_advance_steps = config.max_advance_steps,
            log_filter = %config.log_filter,
            "Engine configuration loaded"
        );

        Ok(config)
    }

    /// Check that the configuration is usable
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.max_advance_steps == 0 {
            return Err(CoreError::ConfigurationError(
                "max_advance_steps must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
