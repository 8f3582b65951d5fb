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

//! Concurrency-control simulation engine
//!
//! Runs scripted transactions over a small set of named data items under
//! either strict locking with deadlock detection or basic timestamp
//! ordering, one operation per step.

pub mod concurrency;
pub mod config;
pub mod data_item;
pub mod journal;
pub mod scenario;
pub mod scheduler;
pub mod simulator;
pub mod snapshot;
pub mod transaction;

pub use ccsim_common::{AbortReason, LockMode, Operation, Protocol, SimError, SimResult, Timestamp, TransactionId};
pub use concurrency::{ConcurrencyControl, DeadlockDetector, LockManager, OperationOutcome, TimestampManager, VictimPolicy};
pub use config::SimulatorConfig;
pub use data_item::{DataItem, DataItemRegistry};
pub use journal::{Journal, LogEntry, MessageCounter, MessageKind, Severity};
pub use scenario::{Scenario, TransactionScript};
pub use scheduler::{Scheduler, StepOutcome, StepReport};
pub use simulator::Simulator;
pub use snapshot::{ItemSnapshot, RunSnapshot, RunSummary, TransactionSnapshot};
pub use transaction::{Transaction, TransactionState};
