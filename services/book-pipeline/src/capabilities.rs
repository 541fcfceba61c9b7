//! Source capability flags
//!
//! Supplied by the provider/connection layer. The engine only checks them;
//! it never detects or negotiates capabilities itself.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::scenarios::Scenario;

/// What a data source can do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceCapabilities {
    /// Source emits incremental deltas (some venues only send snapshots).
    pub supports_deltas: bool,
    /// Source can deliver a snapshot at an explicit sequence.
    pub supports_sequencing: bool,
    /// Source has a private-message stream that can play scenarios.
    pub supports_scenarios: bool,
    /// Scenarios modeled for this source.
    pub scenarios: BTreeSet<Scenario>,
}

impl SourceCapabilities {
    /// A fully capable source with every scenario modeled.
    pub fn full() -> Self {
        Self {
            supports_deltas: true,
            supports_sequencing: true,
            supports_scenarios: true,
            scenarios: Scenario::ALL.iter().copied().collect(),
        }
    }

    /// A source that only publishes full snapshots.
    pub fn snapshot_only() -> Self {
        Self {
            supports_deltas: false,
            supports_sequencing: true,
            supports_scenarios: false,
            scenarios: BTreeSet::new(),
        }
    }

    pub fn with_deltas(mut self, enabled: bool) -> Self {
        self.supports_deltas = enabled;
        self
    }

    pub fn with_sequencing(mut self, enabled: bool) -> Self {
        self.supports_sequencing = enabled;
        self
    }

    pub fn with_scenarios(mut self, scenarios: impl IntoIterator<Item = Scenario>) -> Self {
        self.scenarios = scenarios.into_iter().collect();
        self.supports_scenarios = !self.scenarios.is_empty();
        self
    }

    /// Whether `scenario` can be played against this source.
    pub fn models(&self, scenario: Scenario) -> bool {
        self.supports_scenarios && self.scenarios.contains(&scenario)
    }
}

impl Default for SourceCapabilities {
    fn default() -> Self {
        Self {
            supports_deltas: true,
            supports_sequencing: true,
            supports_scenarios: false,
            scenarios: BTreeSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_models_every_scenario() {
        let caps = SourceCapabilities::full();
        for scenario in Scenario::ALL {
            assert!(caps.models(*scenario));
        }
    }

    #[test]
    fn test_scenarios_require_flag() {
        let mut caps = SourceCapabilities::default().with_scenarios([Scenario::Reject]);
        assert!(caps.models(Scenario::Reject));
        assert!(!caps.models(Scenario::PartialFill));

        caps.supports_scenarios = false;
        assert!(!caps.models(Scenario::Reject));
    }

    #[test]
    fn test_deserialize_partial_flags() {
        let caps: SourceCapabilities =
            serde_json::from_str(r#"{"supports_deltas": false}"#).unwrap();
        assert!(!caps.supports_deltas);
        assert!(caps.supports_sequencing);
        assert!(!caps.supports_scenarios);
    }
}
