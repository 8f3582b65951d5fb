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

// Error types for the simulator

use serde::Serialize;

use crate::types::Timestamp;

/// Failures of the control surface and its configuration.
///
/// Protocol outcomes (conflicts, deadlocks, timestamp violations) are never
/// reported through this type; they are resolved inside the run.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("Simulation has not been started")]
    NotStarted,

    #[error("Invalid scenario: {0}")]
    InvalidScenario(String),

    #[error("Unknown protocol: {0}")]
    UnknownProtocol(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Run did not finish within {0} steps")]
    StepLimitExceeded(u64),
}

/// Result type for simulator operations
pub type SimResult<T> = std::result::Result<T, SimError>;

/// Why a transaction was forced into the Aborted state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbortReason {
    /// Chosen as a victim to break a wait-for cycle
    #[error("Deadlock Resolution")]
    DeadlockResolution,

    /// Read of a value already overwritten by a younger transaction
    #[error("Read Old Data (TS={timestamp} < WriteTS={write_timestamp})")]
    StaleRead { timestamp: Timestamp, write_timestamp: Timestamp },

    /// Write arriving after a younger transaction read or wrote the item
    #[error("Write Conflict (TS={timestamp} < ReadTS={read_timestamp} or WriteTS={write_timestamp})")]
    LateWrite {
        timestamp: Timestamp,
        read_timestamp: Timestamp,
        write_timestamp: Timestamp,
    },

    /// The script names an item the registry does not contain
    #[error("Data item {item} not found")]
    MissingDataItem { item: String },

    /// The active protocol cannot execute this kind of operation
    #[error("Operation {operation} is not supported by {protocol}")]
    UnsupportedOperation { operation: String, protocol: String },
}

impl AbortReason {
    /// Whether the abort stems from timestamp ordering rules
    pub fn is_timestamp_violation(&self) -> bool {
        matches!(self, AbortReason::StaleRead { .. } | AbortReason::LateWrite { .. })
    }
}
