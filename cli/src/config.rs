//! Scenario configuration: the agent roster and run options.

use std::path::Path;

use anyhow::{Context, Result};
use databounty_sim::Agent;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub run: RunConfig,
    pub agents: Vec<Agent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub train_size: usize,
    pub test_size: usize,
    pub num_features: usize,
    pub init_train_data_portion: f64,
    pub baseline_accuracy: Option<f64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            train_size: 1_000,
            test_size: 200,
            num_features: 10,
            init_train_data_portion: 0.1,
            baseline_accuracy: None,
        }
    }
}

impl ScenarioConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario file: {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("failed to parse scenario file: {}", path.display()))
    }

    /// The built-in roster: three steady good contributors and two
    /// determined label flippers.
    pub fn default_roster() -> Self {
        Self {
            run: RunConfig::default(),
            agents: vec![
                Agent::new("Good 1", 10_000.0, 5.0, 1.0, 10.0 * 60.0),
                Agent::new("Good 2", 10_000.0, 5.0, 1.0, 20.0 * 60.0),
                Agent::new("Good 3", 10_000.0, 5.0, 1.0, 30.0 * 60.0),
                Agent::new("Bad 1", 10_000.0, 10.0, 3.0, 60.0 * 60.0).bad(),
                Agent::new("Bad 2", 10_000.0, 10.0, 3.0, 60.0 * 60.0).bad(),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_scenario() {
        let toml_text = r#"
            [run]
            train_size = 100
            test_size = 20

            [[agents]]
            address = "Good 1"
            start_balance = 1000.0
            mean_deposit = 5.0
            stdev_deposit = 1.0
            mean_update_wait_s = 600.0

            [[agents]]
            address = "Bad 1"
            start_balance = 1000.0
            mean_deposit = 10.0
            stdev_deposit = 3.0
            mean_update_wait_s = 3600.0
            good = false
        "#;
        let scenario: ScenarioConfig = toml::from_str(toml_text).unwrap();
        assert_eq!(scenario.run.train_size, 100);
        // Unspecified run options keep their defaults.
        assert_eq!(scenario.run.num_features, 10);
        assert_eq!(scenario.agents.len(), 2);
        assert!(scenario.agents[0].good);
        assert!(!scenario.agents[1].good);
        assert_eq!(scenario.agents[1].stdev_update_wait_s, 1.0);
    }

    #[test]
    fn default_roster_is_well_formed() {
        let scenario = ScenarioConfig::default_roster();
        assert_eq!(scenario.agents.len(), 5);
        assert_eq!(scenario.agents.iter().filter(|a| a.good).count(), 3);
    }
}
