// Dotlanth
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use anyhow::{Context, Result};
use ccsim_core::{Scenario, SimulatorConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// CLI configuration file contents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CcsimConfig {
    pub simulator: SimulatorConfig,
    /// Scenario file; the built-in scenario is used when absent
    pub scenario: Option<PathBuf>,
}

impl CcsimConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Self = toml::from_str(&content).with_context(|| format!("invalid config {}", path.display()))?;
        Ok(config)
    }

    pub fn resolve_config(cli_config: Option<PathBuf>, cli_scenario: Option<PathBuf>) -> Result<Self> {
        let mut config = if let Some(config_path) = cli_config {
            Self::load_from_file(config_path)?
        } else if let Ok(env_config) = std::env::var("CCSIM_CONFIG") {
            Self::load_from_file(env_config)?
        } else {
            Self::default()
        };

        // CLI scenario overrides environment and file settings
        if let Some(scenario) = cli_scenario {
            config.scenario = Some(scenario);
        } else if let Ok(env_scenario) = std::env::var("CCSIM_SCENARIO") {
            config.scenario = Some(PathBuf::from(env_scenario));
        }

        config.simulator.validate()?;
        Ok(config)
    }

    pub fn load_scenario(&self) -> Result<Scenario> {
        let Some(path) = &self.scenario else {
            return Ok(Scenario::classic());
        };
        let content = std::fs::read_to_string(path).with_context(|| format!("failed to read scenario {}", path.display()))?;
        let scenario = toml::from_str(&content).with_context(|| format!("invalid scenario {}", path.display()))?;
        Ok(scenario)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccsim_core::{Protocol, VictimPolicy};

    #[test]
    fn test_parse_config_file() {
        let config: CcsimConfig = toml::from_str(
            r#"
            scenario = "scenarios/classic.toml"

            [simulator]
            protocol = "timestamping"
            victim_policy = "abort-youngest"
            "#,
        )
        .unwrap();

        assert_eq!(config.simulator.protocol, Protocol::Timestamping);
        assert_eq!(config.simulator.victim_policy, VictimPolicy::AbortYoungest);
        assert_eq!(config.simulator.max_steps, SimulatorConfig::default().max_steps);
        assert_eq!(config.scenario, Some(PathBuf::from("scenarios/classic.toml")));
    }

    #[test]
    fn test_classic_scenario_survives_toml() {
        let scenario = Scenario::classic();
        let text = toml::to_string_pretty(&scenario).unwrap();
        let parsed: Scenario = toml::from_str(&text).unwrap();
        assert_eq!(parsed, scenario);
    }

    #[test]
    fn test_bundled_scenario_matches_builtin() {
        let scenario: Scenario = toml::from_str(include_str!("../../../../scenarios/classic.toml")).unwrap();
        assert_eq!(scenario, Scenario::classic());
    }

    #[test]
    fn test_missing_scenario_path_uses_classic() {
        let config = CcsimConfig::default();
        assert_eq!(config.load_scenario().unwrap(), Scenario::classic());
    }
}
