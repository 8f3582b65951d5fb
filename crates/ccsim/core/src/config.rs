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

// Simulator configuration

use serde::{Deserialize, Serialize};

use ccsim_common::{Protocol, SimError, SimResult};

use crate::concurrency::VictimPolicy;

/// Simulator configuration options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Protocol selected when the simulator is created
    pub protocol: Protocol,
    /// How deadlock victims are chosen under locking
    pub victim_policy: VictimPolicy,
    /// Upper bound on steps taken by `run_to_completion`
    pub max_steps: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::Locking,
            victim_policy: VictimPolicy::AbortAll,
            max_steps: 10_000,
        }
    }
}

impl SimulatorConfig {
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_victim_policy(mut self, victim_policy: VictimPolicy) -> Self {
        self.victim_policy = victim_policy;
        self
    }

    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn validate(&self) -> SimResult<()> {
        if self.max_steps == 0 {
            return Err(SimError::InvalidConfig("max_steps must be greater than zero".to_string()));
        }
        Ok(())
    }
}
