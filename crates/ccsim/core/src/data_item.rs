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

//! Data Item Registry
//!
//! Named integer cells shared by every transaction of a run. Each item
//! carries both the locking bookkeeping (primary holder, mode, waiters) and
//! the timestamp-ordering bookkeeping (read/write timestamps); only the group
//! belonging to the active protocol is meaningful.

use std::collections::{BTreeMap, BTreeSet};

use ccsim_common::{LockMode, Timestamp, TransactionId};

/// Primary lock recorded on an item
///
/// Holder and mode live together so one is never present without the other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemLock {
    /// Transaction recorded as the holder
    pub holder: TransactionId,
    /// Mode the holder was granted
    pub mode: LockMode,
}

/// A named, mutable value plus its concurrency metadata
#[derive(Debug, Clone)]
pub struct DataItem {
    name: String,
    value: i64,
    lock: Option<ItemLock>,
    /// Every transaction currently holding this item, primary or additional shared reader
    holders: BTreeSet<TransactionId>,
    /// Distinct waiters in arrival order
    waiting: Vec<TransactionId>,
    read_timestamp: Timestamp,
    write_timestamp: Timestamp,
}

impl DataItem {
    /// Create an item with neutral concurrency state
    pub fn new(name: impl Into<String>, value: i64) -> Self {
        Self {
            name: name.into(),
            value,
            lock: None,
            holders: BTreeSet::new(),
            waiting: Vec::new(),
            read_timestamp: 0,
            write_timestamp: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    pub(crate) fn set_value(&mut self, value: i64) {
        self.value = value;
    }

    /// Primary lock, if any
    pub fn lock(&self) -> Option<&ItemLock> {
        self.lock.as_ref()
    }

    /// Transaction recorded as the primary holder
    pub fn holder(&self) -> Option<&TransactionId> {
        self.lock.as_ref().map(|lock| &lock.holder)
    }

    /// Mode of the primary lock
    pub fn mode(&self) -> Option<LockMode> {
        self.lock.as_ref().map(|lock| lock.mode)
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_some()
    }

    pub fn is_held_by(&self, txn_id: &TransactionId) -> bool {
        self.holder() == Some(txn_id)
    }

    /// All transactions holding this item, including shared readers that are not the primary holder
    pub fn holders(&self) -> &BTreeSet<TransactionId> {
        &self.holders
    }

    pub fn waiting(&self) -> &[TransactionId] {
        &self.waiting
    }

    pub fn has_waiters(&self) -> bool {
        !self.waiting.is_empty()
    }

    pub fn is_waiting(&self, txn_id: &TransactionId) -> bool {
        self.waiting.contains(txn_id)
    }

    pub fn read_timestamp(&self) -> Timestamp {
        self.read_timestamp
    }

    pub fn write_timestamp(&self) -> Timestamp {
        self.write_timestamp
    }

    pub(crate) fn set_lock(&mut self, holder: TransactionId, mode: LockMode) {
        self.holders.insert(holder.clone());
        self.lock = Some(ItemLock { holder, mode });
    }

    pub(crate) fn upgrade(&mut self) {
        if let Some(lock) = self.lock.as_mut() {
            lock.mode = LockMode::Exclusive;
        }
    }

    pub(crate) fn add_shared_holder(&mut self, txn_id: TransactionId) {
        self.holders.insert(txn_id);
    }

    /// Drop `txn_id` from the holder set; clears the primary lock when it was the recorded holder.
    ///
    /// Returns the released mode if the primary lock was cleared.
    pub(crate) fn release(&mut self, txn_id: &TransactionId) -> Option<LockMode> {
        self.holders.remove(txn_id);
        if self.is_held_by(txn_id) {
            return self.lock.take().map(|lock| lock.mode);
        }
        None
    }

    /// Enqueue a waiter unless it is already queued
    pub(crate) fn enqueue_waiter(&mut self, txn_id: &TransactionId) {
        if !self.is_waiting(txn_id) {
            self.waiting.push(txn_id.clone());
        }
    }

    pub(crate) fn remove_waiter(&mut self, txn_id: &TransactionId) -> bool {
        let before = self.waiting.len();
        self.waiting.retain(|waiter| waiter != txn_id);
        before != self.waiting.len()
    }

    pub(crate) fn observe_read(&mut self, timestamp: Timestamp) {
        self.read_timestamp = self.read_timestamp.max(timestamp);
    }

    pub(crate) fn apply_write(&mut self, value: i64, timestamp: Timestamp) {
        self.value = value;
        self.write_timestamp = timestamp;
    }

    /// Reset both field groups to neutral values, keeping the current value
    pub fn reset_concurrency_state(&mut self) {
        self.lock = None;
        self.holders.clear();
        self.waiting.clear();
        self.read_timestamp = 0;
        self.write_timestamp = 0;
    }
}

/// Registry of all data items of a run, keyed by name
#[derive(Debug, Clone, Default)]
pub struct DataItemRegistry {
    items: BTreeMap<String, DataItem>,
}

impl DataItemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a name -> initial value mapping
    pub fn from_values<'a>(values: impl IntoIterator<Item = (&'a String, &'a i64)>) -> Self {
        let items = values.into_iter().map(|(name, value)| (name.clone(), DataItem::new(name.clone(), *value))).collect();
        Self { items }
    }

    pub fn insert(&mut self, item: DataItem) {
        self.items.insert(item.name().to_string(), item);
    }

    pub fn get(&self, name: &str) -> Option<&DataItem> {
        self.items.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut DataItem> {
        self.items.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DataItem> {
        self.items.values()
    }

    /// Remove `txn_id` from the waiting set of every item
    pub(crate) fn remove_waiter_everywhere(&mut self, txn_id: &TransactionId) {
        for item in self.items.values_mut() {
            item.remove_waiter(txn_id);
        }
    }

    pub fn reset_concurrency_state(&mut self) {
        for item in self.items.values_mut() {
            item.reset_concurrency_state();
        }
    }
}
