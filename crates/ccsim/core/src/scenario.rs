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

//! Scenario Definitions
//!
//! A scenario is static input to the engine: the initial item values and,
//! for each protocol, the ordered list of transaction scripts to run.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use ccsim_common::{LockMode, Operation, Protocol, SimError, SimResult, TransactionId};

/// Script of a single transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionScript {
    /// Stable transaction id
    pub id: TransactionId,
    /// Operations in execution order
    #[serde(default)]
    pub operations: Vec<Operation>,
}

impl TransactionScript {
    pub fn new(id: impl Into<TransactionId>, operations: Vec<Operation>) -> Self {
        Self { id: id.into(), operations }
    }
}

/// Initial item values plus per-protocol transaction scripts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// Initial value of every data item, by name
    pub items: BTreeMap<String, i64>,
    /// Transactions run under the locking protocol, in queue order
    #[serde(default)]
    pub locking: Vec<TransactionScript>,
    /// Transactions run under timestamp ordering, in queue order
    #[serde(default)]
    pub timestamping: Vec<TransactionScript>,
}

impl Scenario {
    /// The built-in scenario: a shared read/write crossing, a classic two-transaction deadlock and
    /// an upgrade for locking; eight interleaved readers and writers for timestamp ordering.
    pub fn classic() -> Self {
        use Operation as Op;

        let items = [("X", 100), ("Y", 200), ("Z", 300)].into_iter().map(|(name, value)| (name.to_string(), value)).collect();

        let locking = vec![
            TransactionScript::new("T1", vec![Op::read("X"), Op::write("Y", 150), Op::read("Z")]),
            TransactionScript::new("T2", vec![Op::read("Y"), Op::write("X", 250), Op::read("Z")]),
            TransactionScript::new("T3", vec![Op::request_lock("X", LockMode::Exclusive), Op::request_lock("Y", LockMode::Exclusive)]),
            TransactionScript::new("T4", vec![Op::request_lock("Y", LockMode::Exclusive), Op::request_lock("X", LockMode::Exclusive)]),
            TransactionScript::new("T5", vec![Op::read("X"), Op::write("X", 110)]),
        ];

        let timestamping = vec![
            TransactionScript::new("T1", vec![Op::read("X"), Op::write("Y", 150)]),
            TransactionScript::new("T2", vec![Op::read("Y"), Op::write("X", 250)]),
            TransactionScript::new("T3", vec![Op::write("X", 500)]),
            TransactionScript::new("T4", vec![Op::read("X"), Op::write("Y", 550)]),
            TransactionScript::new("T5", vec![Op::write("Y", 10)]),
            TransactionScript::new("T6", vec![Op::read("Y"), Op::write("Z", 20)]),
            TransactionScript::new("T7", vec![Op::read("Y"), Op::write("X", 70)]),
            TransactionScript::new("T8", vec![Op::write("Y", 80)]),
        ];

        Self { items, locking, timestamping }
    }

    /// Scripts to run under `protocol`
    pub fn scripts(&self, protocol: Protocol) -> &[TransactionScript] {
        match protocol {
            Protocol::Locking => &self.locking,
            Protocol::Timestamping => &self.timestamping,
        }
    }

    /// Check that the scripts for `protocol` can be instantiated
    ///
    /// Unknown item names are not rejected here; they abort the transaction that reaches them.
    pub fn validate(&self, protocol: Protocol) -> SimResult<()> {
        if self.items.is_empty() {
            return Err(SimError::InvalidScenario("scenario defines no data items".to_string()));
        }

        let mut seen = BTreeSet::new();
        for script in self.scripts(protocol) {
            if !seen.insert(&script.id) {
                return Err(SimError::InvalidScenario(format!("duplicate transaction id {} in {protocol} scripts", script.id)));
            }

            if protocol == Protocol::Timestamping {
                if let Some(op) = script.operations.iter().find(|op| matches!(op, Operation::RequestLock { .. })) {
                    return Err(SimError::InvalidScenario(format!("{} uses '{op}', which timestamp ordering does not support", script.id)));
                }
            }
        }

        Ok(())
    }
}

impl Default for Scenario {
    fn default() -> Self {
        Self::classic()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classic_scenario_is_valid() {
        let scenario = Scenario::classic();
        assert_eq!(scenario.items.len(), 3);
        assert_eq!(scenario.scripts(Protocol::Locking).len(), 5);
        assert_eq!(scenario.scripts(Protocol::Timestamping).len(), 8);
        scenario.validate(Protocol::Locking).unwrap();
        scenario.validate(Protocol::Timestamping).unwrap();
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut scenario = Scenario::classic();
        scenario.locking.push(TransactionScript::new("T1", vec![]));
        assert!(matches!(scenario.validate(Protocol::Locking), Err(SimError::InvalidScenario(_))));
    }

    #[test]
    fn test_request_lock_rejected_for_timestamping() {
        let mut scenario = Scenario::classic();
        scenario.timestamping = scenario.locking.clone();
        let err = scenario.validate(Protocol::Timestamping).unwrap_err();
        assert!(err.to_string().contains("T3"));
    }

    #[test]
    fn test_empty_items_rejected() {
        let scenario = Scenario {
            items: BTreeMap::new(),
            locking: vec![],
            timestamping: vec![],
        };
        assert!(scenario.validate(Protocol::Locking).is_err());
    }

    #[test]
    fn test_scenario_from_json() {
        let json = r#"{
            "items": {"X": 1},
            "locking": [{"id": "A", "operations": [{"op": "write", "item": "X", "value": 2}]}]
        }"#;
        let scenario: Scenario = serde_json::from_str(json).unwrap();
        assert!(scenario.timestamping.is_empty());
        assert_eq!(scenario.locking[0].operations, vec![Operation::write("X", 2)]);
    }
}
