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

// Transaction model
// A transaction is an operation script plus the execution state the scheduler and the protocol managers advance.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use ccsim_common::{AbortReason, Operation, Timestamp, TransactionId};

/// Transaction state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionState {
    /// Transaction can execute its next operation
    Running,
    /// Transaction is blocked on a lock and retries its current operation later
    Waiting,
    /// Transaction finished successfully
    Committed,
    /// Transaction was aborted
    Aborted,
}

impl TransactionState {
    /// Committed and Aborted are terminal
    pub fn is_terminal(self) -> bool {
        matches!(self, TransactionState::Committed | TransactionState::Aborted)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionState::Running => "RUNNING",
            TransactionState::Waiting => "WAITING",
            TransactionState::Committed => "COMMITTED",
            TransactionState::Aborted => "ABORTED",
        };
        f.write_str(name)
    }
}

/// A scripted transaction and its execution state
#[derive(Debug, Clone)]
pub struct Transaction {
    /// Stable transaction id
    id: TransactionId,
    /// Ordered operation script
    operations: Vec<Operation>,
    /// Execution state
    state: TransactionState,
    /// Index of the next operation to execute
    next_op: usize,
    /// Items whose lock this transaction holds (locking protocol only)
    held_locks: BTreeSet<String>,
    /// Timestamp assigned at transaction start
    timestamp: Timestamp,
    /// Reason recorded when the transaction was aborted
    abort_reason: Option<AbortReason>,
}

impl Transaction {
    /// Create a transaction at the start of its script
    pub fn new(id: impl Into<TransactionId>, operations: Vec<Operation>, timestamp: Timestamp) -> Self {
        Self {
            id: id.into(),
            operations,
            state: TransactionState::Running,
            next_op: 0,
            held_locks: BTreeSet::new(),
            timestamp,
            abort_reason: None,
        }
    }

    pub fn id(&self) -> &TransactionId {
        &self.id
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Index of the next operation to execute
    pub fn next_op_index(&self) -> usize {
        self.next_op
    }

    /// Operation the transaction will execute (or retry) next
    pub fn current_operation(&self) -> Option<&Operation> {
        self.operations.get(self.next_op)
    }

    /// Whether every scripted operation has been executed
    pub fn is_complete(&self) -> bool {
        self.next_op >= self.operations.len()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn is_waiting(&self) -> bool {
        self.state == TransactionState::Waiting
    }

    pub fn held_locks(&self) -> &BTreeSet<String> {
        &self.held_locks
    }

    pub fn holds_lock_on(&self, item: &str) -> bool {
        self.held_locks.contains(item)
    }

    pub fn abort_reason(&self) -> Option<&AbortReason> {
        self.abort_reason.as_ref()
    }

    pub(crate) fn set_state(&mut self, state: TransactionState) {
        self.state = state;
    }

    pub(crate) fn mark_aborted(&mut self, reason: AbortReason) {
        self.state = TransactionState::Aborted;
        self.abort_reason = Some(reason);
    }

    /// Move past the current operation after it succeeded
    pub(crate) fn advance(&mut self) {
        if !self.is_complete() {
            self.next_op += 1;
        }
    }

    pub(crate) fn add_held_lock(&mut self, item: &str) {
        self.held_locks.insert(item.to_string());
    }

    pub(crate) fn remove_held_lock(&mut self, item: &str) {
        self.held_locks.remove(item);
    }

    pub(crate) fn clear_held_locks(&mut self) {
        self.held_locks.clear();
    }
}
