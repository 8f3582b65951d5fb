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

//! Read-only views of a run for presentation layers

use std::collections::BTreeMap;

use serde::Serialize;

use ccsim_common::{AbortReason, LockMode, Operation, Protocol, Timestamp, TransactionId};

use crate::concurrency::DeadlockStatistics;
use crate::data_item::DataItem;
use crate::journal::MessageCounter;
use crate::transaction::{Transaction, TransactionState};

/// Visible state of one data item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemSnapshot {
    pub name: String,
    pub value: i64,
    pub holder: Option<TransactionId>,
    pub mode: Option<LockMode>,
    pub holders: Vec<TransactionId>,
    pub waiting: Vec<TransactionId>,
    pub read_timestamp: Timestamp,
    pub write_timestamp: Timestamp,
}

impl From<&DataItem> for ItemSnapshot {
    fn from(item: &DataItem) -> Self {
        Self {
            name: item.name().to_string(),
            value: item.value(),
            holder: item.holder().cloned(),
            mode: item.mode(),
            holders: item.holders().iter().cloned().collect(),
            waiting: item.waiting().to_vec(),
            read_timestamp: item.read_timestamp(),
            write_timestamp: item.write_timestamp(),
        }
    }
}

/// Visible state of one transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionSnapshot {
    pub id: TransactionId,
    pub state: TransactionState,
    pub timestamp: Timestamp,
    /// Pending operation, only while Running
    pub next_operation: Option<Operation>,
    pub held_locks: Vec<String>,
    pub abort_reason: Option<AbortReason>,
}

impl From<&Transaction> for TransactionSnapshot {
    fn from(txn: &Transaction) -> Self {
        let next_operation = match txn.state() {
            TransactionState::Running => txn.current_operation().cloned(),
            _ => None,
        };

        Self {
            id: txn.id().clone(),
            state: txn.state(),
            timestamp: txn.timestamp(),
            next_operation,
            held_locks: txn.held_locks().iter().cloned().collect(),
            abort_reason: txn.abort_reason().cloned(),
        }
    }
}

/// Everything a front end needs to render a run at one point in time
#[derive(Debug, Clone, Serialize)]
pub struct RunSnapshot {
    pub protocol: Protocol,
    pub step: u64,
    pub finished: bool,
    pub items: Vec<ItemSnapshot>,
    pub transactions: Vec<TransactionSnapshot>,
    /// Round-robin queue, front first
    pub queue: Vec<TransactionId>,
    pub messages: MessageCounter,
    pub deadlocks: DeadlockStatistics,
}

/// Outcome of a completed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub protocol: Protocol,
    pub steps: u64,
    pub committed: Vec<TransactionId>,
    pub aborted: Vec<(TransactionId, AbortReason)>,
    pub final_values: BTreeMap<String, i64>,
    pub total_messages: u64,
}

impl RunSummary {
    pub fn is_committed(&self, txn_id: &str) -> bool {
        self.committed.iter().any(|id| id.as_str() == txn_id)
    }

    pub fn is_aborted(&self, txn_id: &str) -> bool {
        self.aborted.iter().any(|(id, _)| id.as_str() == txn_id)
    }
}
