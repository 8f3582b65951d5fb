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

//! Lock Manager
//!
//! Two-phase-style locking over the data item registry. Each item records a
//! single primary holder and its mode; additional shared readers are granted
//! against a shared primary without changing it. Locks are held until the
//! transaction commits or aborts.
//!
//! # Compatibility
//!
//! | held \ requested | Shared              | Exclusive                     |
//! |------------------|---------------------|-------------------------------|
//! | none             | grant               | grant                         |
//! | own Shared       | no-op               | upgrade if nobody is waiting  |
//! | own Exclusive    | no-op               | no-op                         |
//! | other Shared     | grant as reader     | wait                          |
//! | other Exclusive  | wait                | wait                          |

use std::collections::BTreeSet;

use ccsim_common::{AbortReason, LockMode, Operation, Protocol, TransactionId};

use crate::concurrency::deadlock_detector::{WaitForEdge, WaitForGraph};
use crate::concurrency::{ConcurrencyControl, OperationOutcome};
use crate::data_item::DataItemRegistry;
use crate::journal::{Journal, MessageKind};
use crate::transaction::{Transaction, TransactionState};

/// Result of a lock request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    /// Item was free and is now held by the requester
    Granted,
    /// Requester already holds a lock that satisfies the request
    AlreadyHeld,
    /// Requester's shared lock became exclusive
    Upgraded,
    /// Requester joined a shared primary holder as an additional reader
    SharedGrant,
    /// Upgrade refused because other transactions are waiting on the item
    UpgradeRefused,
    /// Incompatible with the current holder; requester is now Waiting
    Conflict { holder: TransactionId, mode: LockMode },
    /// No item with that name exists
    MissingItem,
}

impl LockOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, LockOutcome::Granted | LockOutcome::AlreadyHeld | LockOutcome::Upgraded | LockOutcome::SharedGrant)
    }
}

/// Locking protocol manager
pub struct LockManager<'a> {
    items: &'a mut DataItemRegistry,
    journal: &'a mut Journal,
}

impl<'a> LockManager<'a> {
    /// Create a lock manager over `items` that reports to `journal`
    pub fn new(items: &'a mut DataItemRegistry, journal: &'a mut Journal) -> Self {
        Self { items, journal }
    }

    /// Request `mode` on `item_name` for `txn`
    pub fn acquire_lock(&mut self, txn: &mut Transaction, item_name: &str, mode: LockMode) -> LockOutcome {
        let txn_id = txn.id().clone();
        self.journal.info(format!("{txn_id} requests {mode} lock on {item_name}."));
        self.journal.message(MessageKind::LockRequest);

        let Some(item) = self.items.get_mut(item_name) else {
            self.journal.warning(format!("{txn_id} requested a lock on unknown item {item_name}."));
            return LockOutcome::MissingItem;
        };

        let outcome = match item.lock().cloned() {
            None => {
                item.set_lock(txn_id.clone(), mode);
                txn.add_held_lock(item_name);
                self.journal.success(format!("{txn_id} granted {mode} lock on {item_name}."));
                self.journal.message(MessageKind::LockGrant);
                LockOutcome::Granted
            }
            Some(lock) if lock.holder == txn_id && lock.mode.covers(mode) => {
                self.journal.success(format!("{txn_id} already holds {} lock on {item_name}.", lock.mode));
                LockOutcome::AlreadyHeld
            }
            // Holder of S asking for X
            Some(lock) if lock.holder == txn_id => {
                if item.has_waiters() {
                    self.journal.warning(format!("{txn_id} cannot upgrade S to X on {item_name} (other transactions waiting)."));
                    LockOutcome::UpgradeRefused
                } else {
                    item.upgrade();
                    self.journal.success(format!("{txn_id} upgraded S lock to X lock on {item_name}."));
                    self.journal.message(MessageKind::LockUpgrade);
                    LockOutcome::Upgraded
                }
            }
            Some(lock) if lock.mode == LockMode::Shared && mode == LockMode::Shared => {
                item.add_shared_holder(txn_id.clone());
                txn.add_held_lock(item_name);
                self.journal.success(format!("{txn_id} also granted S lock on {item_name} (shared)."));
                self.journal.message(MessageKind::LockGrant);
                LockOutcome::SharedGrant
            }
            Some(lock) => {
                self.journal.warning(format!(
                    "{txn_id} cannot get {mode} lock on {item_name}. {} holds {} lock. {txn_id} is WAITING.",
                    lock.holder, lock.mode
                ));
                item.enqueue_waiter(&txn_id);
                txn.set_state(TransactionState::Waiting);
                LockOutcome::Conflict { holder: lock.holder, mode: lock.mode }
            }
        };

        // A satisfied request is no longer pending
        if outcome.is_granted() {
            item.remove_waiter(&txn_id);
            txn.set_state(TransactionState::Running);
        }

        outcome
    }

    /// Release `txn`'s lock on `item_name`
    ///
    /// Only the recorded primary holder clears the item's lock; the item always leaves the transaction's held set.
    pub fn release_lock(&mut self, txn: &mut Transaction, item_name: &str) {
        let txn_id = txn.id().clone();
        if let Some(item) = self.items.get_mut(item_name) {
            if let Some(mode) = item.release(&txn_id) {
                self.journal.success(format!("{txn_id} releases {mode} lock on {item_name}."));
                self.journal.message(MessageKind::LockRelease);

                if item.has_waiters() {
                    let waiting: Vec<&str> = item.waiting().iter().map(TransactionId::as_str).collect();
                    self.journal.success(format!("Lock on {item_name} is now free. Waiting transactions ({}) will re-attempt.", waiting.join(", ")));
                }
            }
        }
        txn.remove_held_lock(item_name);
    }

    /// Release every lock `txn` holds
    pub fn release_all_locks(&mut self, txn: &mut Transaction) {
        let held: Vec<String> = txn.held_locks().iter().cloned().collect();
        for item_name in held {
            self.release_lock(txn, &item_name);
        }
        txn.clear_held_locks();
    }

    /// Build the wait-for graph from the transactions currently Waiting
    ///
    /// Each waiter points at the primary holder of the item its pending operation targets, and at the holder of
    /// every other item whose waiting list still names it.
    pub fn wait_for_graph(&self, transactions: &[Transaction]) -> WaitForGraph {
        let mut graph = WaitForGraph::new();

        for txn in transactions.iter().filter(|txn| txn.is_waiting()) {
            if let Some(item) = txn.current_operation().and_then(|operation| self.items.get(operation.item())) {
                if let Some(holder) = item.holder().filter(|holder| *holder != txn.id()) {
                    graph.add_edge(WaitForEdge::new(txn.id().clone(), holder.clone(), item.name()));
                }
            }

            for item in self.items.iter().filter(|item| item.is_waiting(txn.id())) {
                if let Some(holder) = item.holder().filter(|holder| *holder != txn.id()) {
                    graph.add_edge(WaitForEdge::new(txn.id().clone(), holder.clone(), item.name()));
                }
            }
        }

        graph
    }

    /// Ids of every transaction that sits on a wait-for cycle
    pub fn detect_deadlock(&self, transactions: &[Transaction]) -> BTreeSet<TransactionId> {
        self.wait_for_graph(transactions).detect_deadlocks().into_iter().flat_map(|cycle| cycle.transactions).collect()
    }

    fn blocked(&mut self, txn: &mut Transaction, item_name: &str, outcome: LockOutcome) -> OperationOutcome {
        match outcome {
            LockOutcome::Conflict { holder, .. } => OperationOutcome::Waiting {
                item: item_name.to_string(),
                holder,
            },
            LockOutcome::UpgradeRefused => OperationOutcome::UpgradeRefused { item: item_name.to_string() },
            _ => {
                let reason = AbortReason::MissingDataItem { item: item_name.to_string() };
                self.abort_transaction(txn, reason.clone());
                OperationOutcome::Aborted(reason)
            }
        }
    }
}

impl ConcurrencyControl for LockManager<'_> {
    fn protocol(&self) -> Protocol {
        Protocol::Locking
    }

    fn process_operation(&mut self, txn: &mut Transaction, operation: &Operation) -> OperationOutcome {
        let txn_id = txn.id().clone();
        match operation {
            Operation::Read { item } => {
                let outcome = self.acquire_lock(txn, item, LockMode::Shared);
                if !outcome.is_granted() {
                    return self.blocked(txn, item, outcome);
                }
                let value = self.items.get(item).map(|data| data.value()).unwrap_or_default();
                self.journal.success(format!("{txn_id} reads {item} (value: {value})."));
                OperationOutcome::Completed
            }
            Operation::Write { item, value } => {
                let outcome = self.acquire_lock(txn, item, LockMode::Exclusive);
                if !outcome.is_granted() {
                    return self.blocked(txn, item, outcome);
                }
                if let Some(data) = self.items.get_mut(item) {
                    data.set_value(*value);
                }
                self.journal.success(format!("{txn_id} writes {value} to {item}."));
                OperationOutcome::Completed
            }
            Operation::RequestLock { item, mode } => {
                let outcome = self.acquire_lock(txn, item, *mode);
                if !outcome.is_granted() {
                    return self.blocked(txn, item, outcome);
                }
                self.journal.success(format!("{txn_id} explicitly acquired {mode} lock on {item}."));
                OperationOutcome::Completed
            }
        }
    }

    fn commit_transaction(&mut self, txn: &mut Transaction) {
        self.journal.success(format!("{} is COMMITTING.", txn.id()));
        self.journal.message(MessageKind::Commit);
        self.release_all_locks(txn);
        txn.set_state(TransactionState::Committed);
        self.journal.success(format!("{} COMMITTED successfully.", txn.id()));
    }

    fn abort_transaction(&mut self, txn: &mut Transaction, reason: AbortReason) {
        self.journal.failure(format!("{} ABORTED (Reason: {reason}).", txn.id()));
        self.journal.message(MessageKind::Abort);
        self.release_all_locks(txn);
        self.items.remove_waiter_everywhere(txn.id());
        txn.mark_aborted(reason);
    }
}
