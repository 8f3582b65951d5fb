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

//! Property tests over randomly generated transaction scripts
//!
//! Every run is stepped for a bounded number of steps (refused upgrades can
//! keep a run alive indefinitely) and the engine state is checked after
//! each step.

use std::collections::BTreeMap;

use ccsim_core::{AbortReason, LockMode, Operation, Protocol, Scenario, Scheduler, TransactionScript, TransactionState, VictimPolicy};
use proptest::prelude::*;

const MAX_STEPS: usize = 200;

/// Strategy for item names; `W` is deliberately absent from the registry
fn item_strategy() -> impl Strategy<Value = String> {
    prop_oneof![4 => prop::sample::select(vec!["X", "Y", "Z"]), 1 => Just("W")].prop_map(str::to_string)
}

fn mode_strategy() -> impl Strategy<Value = LockMode> {
    prop_oneof![Just(LockMode::Shared), Just(LockMode::Exclusive)]
}

fn operation_strategy(with_lock_requests: bool) -> BoxedStrategy<Operation> {
    let read = item_strategy().prop_map(|item| Operation::Read { item });
    let write = (item_strategy(), -500i64..500).prop_map(|(item, value)| Operation::Write { item, value });
    if with_lock_requests {
        let request = (item_strategy(), mode_strategy()).prop_map(|(item, mode)| Operation::RequestLock { item, mode });
        prop_oneof![read, write, request].boxed()
    } else {
        prop_oneof![read, write].boxed()
    }
}

fn scripts_strategy(with_lock_requests: bool) -> impl Strategy<Value = Vec<TransactionScript>> {
    prop::collection::vec(prop::collection::vec(operation_strategy(with_lock_requests), 0..5), 1..6).prop_map(|scripts| {
        scripts
            .into_iter()
            .enumerate()
            .map(|(index, operations)| TransactionScript::new(format!("T{}", index + 1), operations))
            .collect()
    })
}

fn policy_strategy() -> impl Strategy<Value = VictimPolicy> {
    prop_oneof![Just(VictimPolicy::AbortAll), Just(VictimPolicy::AbortYoungest), Just(VictimPolicy::AbortOldest)]
}

fn scenario(protocol: Protocol, scripts: Vec<TransactionScript>) -> Scenario {
    let mut scenario = Scenario::classic();
    match protocol {
        Protocol::Locking => scenario.locking = scripts,
        Protocol::Timestamping => scenario.timestamping = scripts,
    }
    scenario
}

fn check_lock_state(run: &Scheduler) -> Result<(), TestCaseError> {
    for item in run.items().iter() {
        prop_assert_eq!(item.holder().is_some(), item.mode().is_some());

        if let Some(holder) = item.holder() {
            prop_assert!(item.holders().contains(holder));
            let txn = run.transaction(holder.as_str()).unwrap();
            prop_assert!(!txn.is_terminal(), "{} holds {} after finishing", holder, item.name());
        }

        for waiter in item.waiting() {
            let txn = run.transaction(waiter.as_str()).unwrap();
            prop_assert!(!txn.is_terminal(), "{} still queued on {}", waiter, item.name());
        }
    }

    for txn in run.transactions() {
        if txn.is_terminal() {
            prop_assert!(txn.held_locks().is_empty(), "{} kept locks", txn.id());
        }

        if txn.state() == TransactionState::Waiting {
            let operation = txn.current_operation().unwrap();
            let item = run.items().get(operation.item()).unwrap();
            prop_assert!(item.is_waiting(txn.id()));
        }
    }

    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn locking_state_stays_consistent(scripts in scripts_strategy(true), policy in policy_strategy()) {
        let mut run = Scheduler::new(Protocol::Locking, &scenario(Protocol::Locking, scripts), policy).unwrap();
        let mut messages = 0;

        for _ in 0..MAX_STEPS {
            let report = run.step();
            check_lock_state(&run)?;

            let total = run.messages().total();
            prop_assert!(total >= messages);
            messages = total;

            for victim in &report.deadlock_victims {
                prop_assert_eq!(run.transaction(victim.as_str()).unwrap().state(), TransactionState::Aborted);
            }

            if report.is_finished() {
                break;
            }
        }
    }

    #[test]
    fn timestamp_ordering_is_monotone(scripts in scripts_strategy(false)) {
        let mut run = Scheduler::new(Protocol::Timestamping, &scenario(Protocol::Timestamping, scripts), VictimPolicy::AbortAll).unwrap();
        let mut messages = 0;
        let mut previous: BTreeMap<String, (u64, u64)> = BTreeMap::new();

        // No transaction ever waits, so every run drains
        let mut finished = false;
        for _ in 0..MAX_STEPS {
            let report = run.step();

            let total = run.messages().total();
            prop_assert!(total >= messages);
            messages = total;

            for item in run.items().iter() {
                let current = (item.read_timestamp(), item.write_timestamp());
                if let Some(&(read, write)) = previous.get(item.name()) {
                    prop_assert!(current.0 >= read);
                    prop_assert!(current.1 >= write);
                }
                prop_assert!(!item.is_locked());
                previous.insert(item.name().to_string(), current);
            }

            prop_assert!(run.transactions().iter().all(|txn| txn.state() != TransactionState::Waiting));

            if report.is_finished() {
                finished = true;
                break;
            }
        }

        prop_assert!(finished);
        for txn in run.transactions() {
            prop_assert!(txn.is_terminal());
            if let Some(reason) = txn.abort_reason() {
                let expected = reason.is_timestamp_violation() || matches!(reason, AbortReason::MissingDataItem { .. });
                prop_assert!(expected, "{} aborted for {}", txn.id(), reason);
            }
        }
    }
}
