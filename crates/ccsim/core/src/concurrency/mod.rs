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

// Concurrency Control Module
// Protocol managers that mediate every access a transaction makes to the data item registry

pub mod deadlock_detector;
pub mod lock_manager;
pub mod timestamp_manager;

use ccsim_common::{AbortReason, Operation, Protocol, TransactionId};

use crate::data_item::DataItemRegistry;
use crate::journal::Journal;
use crate::transaction::Transaction;

// Public exports
pub use deadlock_detector::{DeadlockCycle, DeadlockDetector, DeadlockStatistics, VictimPolicy, WaitForEdge, WaitForGraph};
pub use lock_manager::{LockManager, LockOutcome};
pub use timestamp_manager::TimestampManager;

/// Result of executing one scripted operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    /// The operation took effect; the transaction may move on
    Completed,
    /// Lock conflict: the transaction is now Waiting and retries on a later step
    Waiting { item: String, holder: TransactionId },
    /// Shared-to-exclusive upgrade refused because other transactions wait on the item
    UpgradeRefused { item: String },
    /// The transaction was aborted while executing the operation
    Aborted(AbortReason),
}

impl OperationOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, OperationOutcome::Completed)
    }
}

/// Protocol manager interface used by the scheduler
///
/// Implementations borrow the registry and the run journal for the duration of a step.
pub trait ConcurrencyControl {
    /// Protocol implemented by this manager
    fn protocol(&self) -> Protocol;

    /// Execute `operation` on behalf of `txn`
    fn process_operation(&mut self, txn: &mut Transaction, operation: &Operation) -> OperationOutcome;

    /// Commit `txn`; terminal
    fn commit_transaction(&mut self, txn: &mut Transaction);

    /// Abort `txn`; terminal
    fn abort_transaction(&mut self, txn: &mut Transaction, reason: AbortReason);
}

/// Build the manager for `protocol` over the given registry and journal
pub fn manager_for<'a>(protocol: Protocol, items: &'a mut DataItemRegistry, journal: &'a mut Journal) -> Box<dyn ConcurrencyControl + 'a> {
    match protocol {
        Protocol::Locking => Box::new(LockManager::new(items, journal)),
        Protocol::Timestamping => Box::new(TimestampManager::new(items, journal)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_item::DataItem;

    #[test]
    fn test_manager_for_protocol() {
        let mut items = DataItemRegistry::new();
        items.insert(DataItem::new("X", 100));
        let mut journal = Journal::new();

        assert_eq!(manager_for(Protocol::Locking, &mut items, &mut journal).protocol(), Protocol::Locking);
        assert_eq!(manager_for(Protocol::Timestamping, &mut items, &mut journal).protocol(), Protocol::Timestamping);
    }

    #[test]
    fn test_missing_item_aborts_under_both_protocols() {
        for protocol in [Protocol::Locking, Protocol::Timestamping] {
            let mut items = DataItemRegistry::new();
            let mut journal = Journal::new();
            let mut txn = Transaction::new("T1", vec![Operation::read("W")], 1);

            let outcome = manager_for(protocol, &mut items, &mut journal).process_operation(&mut txn, &Operation::read("W"));
            assert_eq!(outcome, OperationOutcome::Aborted(AbortReason::MissingDataItem { item: "W".into() }));
            assert!(txn.is_terminal());
        }
    }
}
