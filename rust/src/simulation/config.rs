//! Simulation settings.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::rates::RateMode;

/// Configuration for tree simulation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Discrete categories (cached rows) or continuous rates (direct rows).
    pub rate_mode: RateMode,
    /// Largest accepted deviation of a cached row's total from one before a
    /// warning is logged.
    pub normalization_tolerance: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            rate_mode: RateMode::Discrete,
            normalization_tolerance: 1e-9,
        }
    }
}

impl SimulationConfig {
    pub fn continuous() -> Self {
        Self {
            rate_mode: RateMode::Continuous,
            ..Self::default()
        }
    }

    /// Parse from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_with_defaults() {
        let config = SimulationConfig::from_json(r#"{"rate_mode": "continuous"}"#).unwrap();

        assert_eq!(config.rate_mode, RateMode::Continuous);
        assert_eq!(config.normalization_tolerance, 1e-9);
        assert_eq!(SimulationConfig::from_json("{}").unwrap(), SimulationConfig::default());
    }

    #[test]
    fn test_from_json_rejects_unknown_mode() {
        assert!(SimulationConfig::from_json(r#"{"rate_mode": "gamma"}"#).is_err());
    }
}
