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

//! End-to-end scenario tests
//!
//! Drive the engine through the control surface and through the protocol
//! managers directly, checking the final item values, transaction states
//! and message totals of the built-in and hand-written scenarios.

use std::collections::BTreeMap;

use ccsim_core::{
    AbortReason, ConcurrencyControl, DataItem, DataItemRegistry, Journal, LockManager, LockMode, MessageKind, Operation, OperationOutcome, Protocol,
    Scenario, SimError, Simulator, SimulatorConfig, StepOutcome, TimestampManager, Transaction, TransactionId, TransactionScript, TransactionState,
    VictimPolicy,
};

fn registry() -> DataItemRegistry {
    let mut items = DataItemRegistry::new();
    items.insert(DataItem::new("X", 100));
    items.insert(DataItem::new("Y", 200));
    items.insert(DataItem::new("Z", 300));
    items
}

fn values(items: &BTreeMap<String, i64>) -> Vec<(&str, i64)> {
    items.iter().map(|(name, value)| (name.as_str(), *value)).collect()
}

fn deadlock_scenario() -> Scenario {
    let mut scenario = Scenario::classic();
    scenario.locking = vec![
        TransactionScript::new("T3", vec![Operation::request_lock("X", LockMode::Exclusive), Operation::request_lock("Y", LockMode::Exclusive)]),
        TransactionScript::new("T4", vec![Operation::request_lock("Y", LockMode::Exclusive), Operation::request_lock("X", LockMode::Exclusive)]),
    ];
    scenario
}

#[test]
fn test_crossed_exclusive_requests_deadlock() {
    let mut simulator = Simulator::new(deadlock_scenario(), SimulatorConfig::default()).unwrap();
    simulator.start().unwrap();

    simulator.step().unwrap();
    simulator.step().unwrap();
    {
        let run = simulator.run().unwrap();
        assert_eq!(run.items().get("X").unwrap().holder().map(TransactionId::as_str), Some("T3"));
        assert_eq!(run.items().get("Y").unwrap().holder().map(TransactionId::as_str), Some("T4"));
    }

    let third = simulator.step().unwrap();
    assert!(matches!(third.outcome, StepOutcome::Waiting { ref item, .. } if item == "Y"));
    assert!(third.deadlock_victims.is_empty());

    // Both requests now wait on each other
    let fourth = simulator.step().unwrap();
    assert!(matches!(fourth.outcome, StepOutcome::Waiting { ref item, .. } if item == "X"));
    assert_eq!(fourth.deadlock_victims, vec![TransactionId::from("T3"), TransactionId::from("T4")]);

    let run = simulator.run().unwrap();
    for id in ["T3", "T4"] {
        let txn = run.transaction(id).unwrap();
        assert_eq!(txn.state(), TransactionState::Aborted);
        assert_eq!(txn.abort_reason(), Some(&AbortReason::DeadlockResolution));
        assert!(txn.held_locks().is_empty());
    }
    assert_eq!(run.messages().total(), 10);
    assert_eq!(run.detector().statistics().total_deadlocks_detected, 1);

    assert!(simulator.step().unwrap().is_finished());
}

#[test]
fn test_crossing_readers_and_writers_commit_when_serialized() {
    let mut items = registry();
    let mut journal = Journal::new();
    let mut t1 = Transaction::new("T1", vec![], 1);
    let mut t2 = Transaction::new("T2", vec![], 2);

    let mut manager = LockManager::new(&mut items, &mut journal);
    assert_eq!(manager.process_operation(&mut t1, &Operation::read("X")), OperationOutcome::Completed);
    assert_eq!(manager.process_operation(&mut t1, &Operation::write("Y", 150)), OperationOutcome::Completed);

    // T2 must wait for T1 to let go of Y
    let outcome = manager.process_operation(&mut t2, &Operation::read("Y"));
    assert_eq!(
        outcome,
        OperationOutcome::Waiting {
            item: "Y".to_string(),
            holder: TransactionId::from("T1"),
        }
    );
    assert_eq!(t2.state(), TransactionState::Waiting);

    assert_eq!(manager.process_operation(&mut t1, &Operation::read("Z")), OperationOutcome::Completed);
    manager.commit_transaction(&mut t1);
    assert_eq!(t2.state(), TransactionState::Waiting);

    for operation in [Operation::read("Y"), Operation::write("X", 250), Operation::read("Z")] {
        assert_eq!(manager.process_operation(&mut t2, &operation), OperationOutcome::Completed);
    }
    manager.commit_transaction(&mut t2);

    assert_eq!(t1.state(), TransactionState::Committed);
    assert_eq!(t2.state(), TransactionState::Committed);
    assert_eq!(items.get("X").unwrap().value(), 250);
    assert_eq!(items.get("Y").unwrap().value(), 150);
    assert_eq!(items.get("Z").unwrap().value(), 300);
    assert!(items.iter().all(|item| !item.is_locked()));
}

#[test]
fn test_crossing_readers_and_writers_deadlock_under_round_robin() {
    let mut scenario = Scenario::classic();
    scenario.locking.truncate(2);
    let mut simulator = Simulator::new(scenario, SimulatorConfig::default()).unwrap();

    let summary = simulator.run_to_completion().unwrap();
    assert!(summary.committed.is_empty());
    assert!(summary.aborted.iter().all(|(_, reason)| *reason == AbortReason::DeadlockResolution));
    assert_eq!(values(&summary.final_values), vec![("X", 100), ("Y", 200), ("Z", 300)]);
}

#[test]
fn test_timestamp_write_and_read_rules() {
    let mut items = registry();
    let mut journal = Journal::new();
    let mut t5 = Transaction::new("T5", vec![], 5);
    let mut t3 = Transaction::new("T3", vec![], 3);
    let mut t7 = Transaction::new("T7", vec![], 7);

    let mut manager = TimestampManager::new(&mut items, &mut journal);
    assert!(manager.write(&mut t5, "X", 500));
    assert!(!manager.write(&mut t3, "X", 300));
    assert!(manager.read(&mut t7, "X"));

    assert_eq!(t3.state(), TransactionState::Aborted);
    assert!(t3.abort_reason().is_some_and(AbortReason::is_timestamp_violation));
    assert_eq!(t7.state(), TransactionState::Running);

    let x = items.get("X").unwrap();
    assert_eq!(x.value(), 500);
    assert_eq!(x.write_timestamp(), 5);
    assert_eq!(x.read_timestamp(), 7);
}

#[test]
fn test_classic_locking_run() {
    let mut simulator = Simulator::classic();
    let summary = simulator.run_to_completion().unwrap();

    assert_eq!(summary.protocol, Protocol::Locking);
    assert_eq!(summary.steps, 14);
    assert_eq!(summary.committed, vec![TransactionId::from("T5")]);
    for id in ["T1", "T2", "T3", "T4"] {
        assert!(summary.is_aborted(id), "{id} should have been aborted");
    }
    assert_eq!(values(&summary.final_values), vec![("X", 110), ("Y", 200), ("Z", 300)]);

    let run = simulator.run().unwrap();
    assert!(run.is_finished());
    assert_eq!(run.detector().statistics().total_deadlocks_detected, 2);
    assert!(run.items().iter().all(|item| !item.is_locked() && !item.has_waiters()));
}

#[test]
fn test_classic_timestamp_run() {
    let mut simulator = Simulator::classic();
    simulator.select_protocol(Protocol::Timestamping);
    let summary = simulator.run_to_completion().unwrap();

    assert_eq!(summary.steps, 18);
    let committed: Vec<&str> = summary.committed.iter().map(TransactionId::as_str).collect();
    assert_eq!(committed, vec!["T3", "T5", "T6", "T7", "T8"]);
    let aborted: Vec<&str> = summary.aborted.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(aborted, vec!["T1", "T2", "T4"]);
    assert!(summary.aborted.iter().all(|(_, reason)| matches!(reason, AbortReason::LateWrite { .. })));
    assert_eq!(values(&summary.final_values), vec![("X", 70), ("Y", 80), ("Z", 20)]);

    assert_eq!(summary.total_messages, 21);
    let messages = simulator.run().unwrap().messages();
    assert_eq!(messages.count(MessageKind::TimestampRead), 5);
    assert_eq!(messages.count(MessageKind::TimestampWrite), 8);
    assert_eq!(messages.count(MessageKind::Commit), 5);
    assert_eq!(messages.count(MessageKind::Abort), 3);
}

#[test]
fn test_abort_oldest_policy() {
    let config = SimulatorConfig::default().with_victim_policy(VictimPolicy::AbortOldest);
    let mut simulator = Simulator::new(deadlock_scenario(), config).unwrap();
    let summary = simulator.run_to_completion().unwrap();

    assert_eq!(summary.committed, vec![TransactionId::from("T4")]);
    assert!(summary.is_aborted("T3"));
}

#[test]
fn test_upgrade_refusal_retries_later() {
    let mut scenario = Scenario::classic();
    scenario.locking = vec![
        TransactionScript::new("T1", vec![Operation::read("X"), Operation::write("X", 1)]),
        TransactionScript::new("T2", vec![Operation::request_lock("X", LockMode::Exclusive)]),
    ];
    let mut simulator = Simulator::new(scenario, SimulatorConfig::default()).unwrap();
    simulator.start().unwrap();

    simulator.step().unwrap();
    assert!(matches!(simulator.step().unwrap().outcome, StepOutcome::Waiting { .. }));

    let refused = simulator.step().unwrap();
    assert_eq!(refused.outcome, StepOutcome::UpgradeRefused { item: "X".to_string() });
    let t1 = simulator.run().unwrap().transaction("T1").unwrap();
    assert_eq!(t1.state(), TransactionState::Running);
    assert!(!simulator.run().unwrap().items().get("X").unwrap().is_waiting(t1.id()));
    assert_eq!(simulator.run().unwrap().queue().last().map(TransactionId::as_str), Some("T1"));
}

#[test]
fn test_control_surface_errors() {
    let mut simulator = Simulator::classic();
    assert!(matches!(simulator.step(), Err(SimError::NotStarted)));

    simulator.start().unwrap();
    simulator.reset();
    assert!(matches!(simulator.step(), Err(SimError::NotStarted)));
}
