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

// Core data types shared by the engine and its drivers

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SimError;

/// Logical timestamp assigned to a transaction when a run starts
pub type Timestamp = u64;

/// Stable identifier of a transaction within a run
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    /// Create a transaction id from any string-like value
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TransactionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TransactionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Lock mode for the locking protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockMode {
    /// Shared lock for reading
    #[serde(rename = "S", alias = "shared")]
    Shared,
    /// Exclusive lock for writing
    #[serde(rename = "X", alias = "exclusive")]
    Exclusive,
}

impl LockMode {
    /// Whether a lock held in `self` already satisfies a request for `requested`
    pub fn covers(self, requested: LockMode) -> bool {
        self == LockMode::Exclusive || requested == LockMode::Shared
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockMode::Shared => f.write_str("S"),
            LockMode::Exclusive => f.write_str("X"),
        }
    }
}

/// Concurrency-control protocol driving a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Two-phase-style locking with deadlock detection
    #[default]
    Locking,
    /// Basic timestamp ordering
    Timestamping,
}

impl Protocol {
    /// Lowercase name used in configuration files and on the command line
    pub fn name(self) -> &'static str {
        match self {
            Protocol::Locking => "locking",
            Protocol::Timestamping => "timestamping",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Protocol {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "locking" | "lock" | "2pl" => Ok(Protocol::Locking),
            "timestamping" | "timestamp" | "to" => Ok(Protocol::Timestamping),
            other => Err(SimError::UnknownProtocol(other.to_string())),
        }
    }
}

/// One step of a transaction script
///
/// Scripts are plain data so a run is deterministic and replayable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Read the current value of an item
    Read { item: String },
    /// Overwrite an item with a new value
    Write { item: String, value: i64 },
    /// Explicitly acquire a lock (locking protocol only)
    RequestLock { item: String, mode: LockMode },
}

impl Operation {
    pub fn read(item: impl Into<String>) -> Self {
        Operation::Read { item: item.into() }
    }

    pub fn write(item: impl Into<String>, value: i64) -> Self {
        Operation::Write { item: item.into(), value }
    }

    pub fn request_lock(item: impl Into<String>, mode: LockMode) -> Self {
        Operation::RequestLock { item: item.into(), mode }
    }

    /// Name of the data item this operation targets
    pub fn item(&self) -> &str {
        match self {
            Operation::Read { item } | Operation::Write { item, .. } | Operation::RequestLock { item, .. } => item,
        }
    }

    /// Short operation name as shown in status displays
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Read { .. } => "read",
            Operation::Write { .. } => "write",
            Operation::RequestLock { .. } => "request_lock",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Read { item } => write!(f, "read {item}"),
            Operation::Write { item, value } => write!(f, "write {item} {value}"),
            Operation::RequestLock { item, mode } => write!(f, "request_lock {item} {mode}"),
        }
    }
}
