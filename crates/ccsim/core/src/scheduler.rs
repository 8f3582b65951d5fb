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

//! Round-Robin Scheduler
//!
//! One `Scheduler` owns the state of a single run: the data items, the
//! transactions, the round-robin queue, the journal and the deadlock
//! detector. Each call to [`Scheduler::step`] executes at most one
//! operation of the transaction at the front of the queue.

use std::collections::{BTreeSet, VecDeque};

use serde::Serialize;
use tracing::debug;

use ccsim_common::{AbortReason, Operation, Protocol, SimResult, Timestamp, TransactionId};

use crate::concurrency::{ConcurrencyControl, DeadlockDetector, LockManager, OperationOutcome, VictimPolicy, manager_for};
use crate::data_item::DataItemRegistry;
use crate::journal::{Journal, MessageCounter};
use crate::scenario::Scenario;
use crate::snapshot::{ItemSnapshot, RunSnapshot, TransactionSnapshot};
use crate::transaction::Transaction;

/// What happened to the scheduled transaction during a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepOutcome {
    /// No live transactions remain
    Finished,
    /// The operation took effect
    Executed { operation: Operation },
    /// The transaction blocked on a lock held by `holder`
    Waiting { item: String, holder: TransactionId },
    /// A lock upgrade was refused; the operation is retried later
    UpgradeRefused { item: String },
    /// The script was exhausted and the transaction committed
    Committed,
    /// The transaction aborted
    Aborted { reason: AbortReason },
}

/// Report for a single scheduler step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    /// Number of steps executed so far, including this one
    pub step: u64,
    /// Transaction scheduled in this step
    pub transaction: Option<TransactionId>,
    pub outcome: StepOutcome,
    /// Transactions aborted by deadlock resolution at the end of the step
    pub deadlock_victims: Vec<TransactionId>,
}

impl StepReport {
    pub fn is_finished(&self) -> bool {
        matches!(self.outcome, StepOutcome::Finished)
    }
}

enum Action {
    Commit,
    Abort(AbortReason),
    Execute(Operation),
}

/// Round-robin scheduler over the transactions of one run
#[derive(Debug, Clone)]
pub struct Scheduler {
    protocol: Protocol,
    items: DataItemRegistry,
    transactions: Vec<Transaction>,
    /// Indices into `transactions`, front is scheduled next
    queue: VecDeque<usize>,
    journal: Journal,
    detector: DeadlockDetector,
    /// Last timestamp handed out
    clock: Timestamp,
    steps: u64,
    finished: bool,
}

impl Scheduler {
    /// Instantiate a fresh run of `scenario` under `protocol` with the scenario's initial item values
    pub fn new(protocol: Protocol, scenario: &Scenario, victim_policy: VictimPolicy) -> SimResult<Self> {
        Self::with_items(protocol, scenario, DataItemRegistry::from_values(&scenario.items), victim_policy)
    }

    /// Instantiate a run over existing `items`, keeping their values
    ///
    /// Lock and timestamp state of every item is cleared. Transactions receive timestamps 1..=n in script
    /// order and are queued in that order.
    pub fn with_items(protocol: Protocol, scenario: &Scenario, mut items: DataItemRegistry, victim_policy: VictimPolicy) -> SimResult<Self> {
        scenario.validate(protocol)?;
        items.reset_concurrency_state();

        let mut scheduler = Self {
            protocol,
            items,
            transactions: Vec::new(),
            queue: VecDeque::new(),
            journal: Journal::new(),
            detector: DeadlockDetector::new(victim_policy),
            clock: 0,
            steps: 0,
            finished: false,
        };

        scheduler.journal.info(format!("Starting simulation with {} mechanism...", protocol.name().to_uppercase()));
        for script in scenario.scripts(protocol) {
            let timestamp = scheduler.next_timestamp();
            scheduler.transactions.push(Transaction::new(script.id.clone(), script.operations.clone(), timestamp));
            scheduler.queue.push_back(scheduler.transactions.len() - 1);
        }
        scheduler.journal.info("Simulation ready.");

        debug!(protocol = %protocol, transactions = scheduler.transactions.len(), items = scheduler.items.len(), "run started");
        Ok(scheduler)
    }

    /// Consume the run, keeping only its data items
    pub fn into_items(self) -> DataItemRegistry {
        self.items
    }

    fn next_timestamp(&mut self) -> Timestamp {
        self.clock += 1;
        self.clock
    }

    /// Advance the run by one operation of the transaction at the front of the queue
    pub fn step(&mut self) -> StepReport {
        self.purge_queue();

        let Some(index) = self.queue.pop_front() else {
            if !self.finished {
                self.finished = true;
                self.journal.success("All transactions have completed or aborted. Simulation finished.");
                debug!(steps = self.steps, messages = self.journal.messages().total(), "run finished");
            }
            return StepReport {
                step: self.steps,
                transaction: None,
                outcome: StepOutcome::Finished,
                deadlock_victims: Vec::new(),
            };
        };

        self.steps += 1;
        let txn = &mut self.transactions[index];
        let txn_id = txn.id().clone();

        let action = match txn.current_operation() {
            None => Action::Commit,
            Some(op) if !self.items.contains(op.item()) => Action::Abort(AbortReason::MissingDataItem { item: op.item().to_string() }),
            Some(op) => Action::Execute(op.clone()),
        };

        self.journal.info(format!("--- Step {}: Processing {txn_id} ---", self.steps));
        if matches!(action, Action::Commit) {
            self.journal.info(format!("{txn_id}: All operations processed. Attempting COMMIT."));
        }

        let mut manager = manager_for(self.protocol, &mut self.items, &mut self.journal);
        let outcome = match action {
            Action::Commit => {
                manager.commit_transaction(txn);
                StepOutcome::Committed
            }
            Action::Abort(reason) => {
                manager.abort_transaction(txn, reason.clone());
                StepOutcome::Aborted { reason }
            }
            Action::Execute(operation) => match manager.process_operation(txn, &operation) {
                OperationOutcome::Completed => {
                    txn.advance();
                    StepOutcome::Executed { operation }
                }
                OperationOutcome::Waiting { item, holder } => StepOutcome::Waiting { item, holder },
                OperationOutcome::UpgradeRefused { item } => StepOutcome::UpgradeRefused { item },
                OperationOutcome::Aborted(reason) => StepOutcome::Aborted { reason },
            },
        };
        drop(manager);

        // Waiting and refused transactions retry on a later turn
        if !txn.is_terminal() {
            self.queue.push_back(index);
        }

        let deadlock_victims = match self.protocol {
            Protocol::Locking => self.resolve_deadlocks(),
            Protocol::Timestamping => Vec::new(),
        };
        self.purge_queue();

        StepReport {
            step: self.steps,
            transaction: Some(txn_id),
            outcome,
            deadlock_victims,
        }
    }

    /// Abort the victims of every wait-for cycle among Waiting transactions
    fn resolve_deadlocks(&mut self) -> Vec<TransactionId> {
        let graph = LockManager::new(&mut self.items, &mut self.journal).wait_for_graph(&self.transactions);
        let (cycles, victims) = self.detector.detect_and_select_victims(&graph, &self.transactions);
        if cycles.is_empty() {
            return Vec::new();
        }

        let involved: BTreeSet<&TransactionId> = cycles.iter().flat_map(|cycle| cycle.transactions.iter()).collect();
        let involved: Vec<&str> = involved.into_iter().map(TransactionId::as_str).collect();
        self.journal.failure(format!("!!! DEADLOCK DETECTED involving: {} !!!", involved.join(", ")));

        let mut manager = LockManager::new(&mut self.items, &mut self.journal);
        let mut aborted = Vec::with_capacity(victims.len());
        for victim in victims {
            let Some(txn) = self.transactions.iter_mut().find(|txn| *txn.id() == victim) else {
                continue;
            };
            if txn.is_waiting() {
                manager.abort_transaction(txn, AbortReason::DeadlockResolution);
                aborted.push(victim);
            }
        }

        aborted
    }

    /// Drop terminal transactions from the queue
    fn purge_queue(&mut self) {
        let transactions = &self.transactions;
        self.queue.retain(|&index| !transactions[index].is_terminal());
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn items(&self) -> &DataItemRegistry {
        &self.items
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn transaction(&self, txn_id: &str) -> Option<&Transaction> {
        self.transactions.iter().find(|txn| txn.id().as_str() == txn_id)
    }

    /// Queued transaction ids, front first
    pub fn queue(&self) -> Vec<TransactionId> {
        self.queue.iter().map(|&index| self.transactions[index].id().clone()).collect()
    }

    /// Whether any live transaction is still queued
    pub fn has_pending_work(&self) -> bool {
        self.queue.iter().any(|&index| !self.transactions[index].is_terminal())
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn messages(&self) -> &MessageCounter {
        self.journal.messages()
    }

    pub fn detector(&self) -> &DeadlockDetector {
        &self.detector
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            protocol: self.protocol,
            step: self.steps,
            finished: self.finished,
            items: self.items.iter().map(ItemSnapshot::from).collect(),
            transactions: self.transactions.iter().map(TransactionSnapshot::from).collect(),
            queue: self.queue(),
            messages: self.journal.messages().clone(),
            deadlocks: self.detector.statistics().clone(),
        }
    }
}
