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

//! Basic Timestamp Ordering
//!
//! Conflicting operations are ordered by the timestamp each transaction
//! received when the run started. An operation that would observe or
//! overwrite data out of that order aborts its transaction immediately.
//! There is no Thomas write rule and late writes are never buffered.
//!
//! Aborts are not cascaded: readers of a value written by a transaction that
//! later aborts keep what they read.

use ccsim_common::{AbortReason, Operation, Protocol};

use crate::concurrency::{ConcurrencyControl, OperationOutcome};
use crate::data_item::DataItemRegistry;
use crate::journal::{Journal, MessageKind};
use crate::transaction::{Transaction, TransactionState};

/// Timestamp-ordering protocol manager
pub struct TimestampManager<'a> {
    items: &'a mut DataItemRegistry,
    journal: &'a mut Journal,
}

impl<'a> TimestampManager<'a> {
    pub fn new(items: &'a mut DataItemRegistry, journal: &'a mut Journal) -> Self {
        Self { items, journal }
    }

    /// Read `item_name`; aborts `txn` if a younger transaction already wrote it
    pub fn read(&mut self, txn: &mut Transaction, item_name: &str) -> bool {
        match self.try_read(txn, item_name) {
            Ok(()) => true,
            Err(reason) => {
                self.abort_transaction(txn, reason);
                false
            }
        }
    }

    /// Write `value` to `item_name`; aborts `txn` if a younger transaction already read or wrote it
    pub fn write(&mut self, txn: &mut Transaction, item_name: &str, value: i64) -> bool {
        match self.try_write(txn, item_name, value) {
            Ok(()) => true,
            Err(reason) => {
                self.abort_transaction(txn, reason);
                false
            }
        }
    }

    fn try_read(&mut self, txn: &Transaction, item_name: &str) -> Result<(), AbortReason> {
        let ts = txn.timestamp();
        self.journal.info(format!("{} (TS={ts}) attempts to READ {item_name}.", txn.id()));
        self.journal.message(MessageKind::TimestampRead);

        let item = self.items.get_mut(item_name).ok_or_else(|| AbortReason::MissingDataItem { item: item_name.to_string() })?;

        if ts < item.write_timestamp() {
            return Err(AbortReason::StaleRead {
                timestamp: ts,
                write_timestamp: item.write_timestamp(),
            });
        }

        item.observe_read(ts);
        self.journal.success(format!(
            "{} READS {item_name} (value: {}). {item_name} ReadTS updated to {}.",
            txn.id(),
            item.value(),
            item.read_timestamp()
        ));
        Ok(())
    }

    fn try_write(&mut self, txn: &Transaction, item_name: &str, value: i64) -> Result<(), AbortReason> {
        let ts = txn.timestamp();
        self.journal.info(format!("{} (TS={ts}) attempts to WRITE {value} to {item_name}.", txn.id()));
        self.journal.message(MessageKind::TimestampWrite);

        let item = self.items.get_mut(item_name).ok_or_else(|| AbortReason::MissingDataItem { item: item_name.to_string() })?;

        if ts < item.read_timestamp() || ts < item.write_timestamp() {
            return Err(AbortReason::LateWrite {
                timestamp: ts,
                read_timestamp: item.read_timestamp(),
                write_timestamp: item.write_timestamp(),
            });
        }

        item.apply_write(value, ts);
        self.journal.success(format!(
            "{} WRITES {value} to {item_name}. {item_name} WriteTS updated to {}.",
            txn.id(),
            item.write_timestamp()
        ));
        Ok(())
    }
}

impl ConcurrencyControl for TimestampManager<'_> {
    fn protocol(&self) -> Protocol {
        Protocol::Timestamping
    }

    fn process_operation(&mut self, txn: &mut Transaction, operation: &Operation) -> OperationOutcome {
        let result = match operation {
            Operation::Read { item } => self.try_read(txn, item),
            Operation::Write { item, value } => self.try_write(txn, item, *value),
            Operation::RequestLock { .. } => Err(AbortReason::UnsupportedOperation {
                operation: operation.to_string(),
                protocol: Protocol::Timestamping.to_string(),
            }),
        };

        match result {
            Ok(()) => OperationOutcome::Completed,
            Err(reason) => {
                self.abort_transaction(txn, reason.clone());
                OperationOutcome::Aborted(reason)
            }
        }
    }

    fn commit_transaction(&mut self, txn: &mut Transaction) {
        self.journal.success(format!("{} is COMMITTING.", txn.id()));
        self.journal.message(MessageKind::Commit);
        txn.set_state(TransactionState::Committed);
        self.journal.success(format!("{} COMMITTED successfully.", txn.id()));
    }

    fn abort_transaction(&mut self, txn: &mut Transaction, reason: AbortReason) {
        self.journal.failure(format!("{} ABORTED (Reason: {reason}).", txn.id()));
        self.journal.message(MessageKind::Abort);
        txn.mark_aborted(reason);
    }
}
