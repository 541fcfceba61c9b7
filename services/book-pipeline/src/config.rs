//! Pipeline configuration
//!
//! Plain struct with defaults, loadable from JSON. Anything missing from
//! the input keeps its default.

use serde::{Deserialize, Serialize};

use crate::buffer::TeardownMode;
use crate::capabilities::SourceCapabilities;
use crate::metrics::AlertThresholds;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config json: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config field {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Configuration for a `FeedRouter` and the streams it opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Teardown used by `close_all`.
    pub teardown: TeardownMode,
    /// Backlog depth above which a stream is flagged.
    pub backlog_warning_threshold: usize,
    /// Fault count above which an alert is raised.
    pub max_faults: u64,
    /// Apply p99 latency (nanos) above which an alert is raised.
    pub max_apply_p99_ns: u64,
    /// Capabilities for book streams opened without explicit ones.
    pub default_capabilities: SourceCapabilities,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            teardown: TeardownMode::Drain,
            backlog_warning_threshold: 10_000,
            max_faults: 100,
            max_apply_p99_ns: 1_000_000,
            default_capabilities: SourceCapabilities::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backlog_warning_threshold == 0 {
            return Err(ConfigError::Invalid {
                field: "backlog_warning_threshold",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.max_apply_p99_ns == 0 {
            return Err(ConfigError::Invalid {
                field: "max_apply_p99_ns",
                reason: "must be greater than zero".to_string(),
            });
        }
        let caps = &self.default_capabilities;
        if !caps.supports_scenarios && !caps.scenarios.is_empty() {
            return Err(ConfigError::Invalid {
                field: "default_capabilities",
                reason: "scenarios listed but supports_scenarios is false".to_string(),
            });
        }
        Ok(())
    }

    pub fn alert_thresholds(&self) -> AlertThresholds {
        AlertThresholds {
            max_backlog: self.backlog_warning_threshold,
            max_faults: self.max_faults,
            max_apply_p99_ns: self.max_apply_p99_ns,
        }
    }
}
