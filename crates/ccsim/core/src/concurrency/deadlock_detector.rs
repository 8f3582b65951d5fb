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

//! Deadlock Detection and Resolution
//!
//! This module implements a wait-for graph based deadlock detection system.
//! The graph is rebuilt from the transactions currently Waiting, searched for
//! cycles of any length with a depth-first search, and victims are chosen from
//! each cycle according to a [`VictimPolicy`]. A mutual wait between two
//! transactions is the two-node case of the same search.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use ccsim_common::{SimError, Timestamp, TransactionId};

use crate::transaction::Transaction;

/// Represents a wait-for relationship between transactions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitForEdge {
    /// Transaction that is waiting
    pub waiter: TransactionId,
    /// Transaction that is being waited for
    pub holder: TransactionId,
    /// Data item being waited for
    pub resource: String,
}

impl WaitForEdge {
    /// Create a new wait-for edge
    pub fn new(waiter: TransactionId, holder: TransactionId, resource: impl Into<String>) -> Self {
        Self {
            waiter,
            holder,
            resource: resource.into(),
        }
    }
}

/// A cycle in the wait-for graph representing a deadlock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadlockCycle {
    /// Transactions involved in the deadlock, in wait order
    pub transactions: Vec<TransactionId>,
    /// Data items involved in the deadlock
    pub resources: Vec<String>,
}

impl DeadlockCycle {
    /// Get the youngest transaction in the cycle (highest timestamp)
    pub fn youngest_transaction(&self, timestamps: &BTreeMap<TransactionId, Timestamp>) -> Option<TransactionId> {
        self.transactions.iter().max_by_key(|id| (timestamps.get(*id).copied().unwrap_or(0), (*id).clone())).cloned()
    }

    /// Get the oldest transaction in the cycle (lowest timestamp)
    pub fn oldest_transaction(&self, timestamps: &BTreeMap<TransactionId, Timestamp>) -> Option<TransactionId> {
        self.transactions.iter().min_by_key(|id| (timestamps.get(*id).copied().unwrap_or(0), (*id).clone())).cloned()
    }
}

impl fmt::Display for DeadlockCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<&str> = self.transactions.iter().map(TransactionId::as_str).collect();
        f.write_str(&ids.join(", "))
    }
}

/// Policy for resolving deadlocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VictimPolicy {
    /// Abort every transaction on the cycle
    #[default]
    AbortAll,
    /// Abort the youngest transaction (highest timestamp)
    AbortYoungest,
    /// Abort the oldest transaction (lowest timestamp)
    AbortOldest,
}

impl FromStr for VictimPolicy {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "abort-all" | "all" => Ok(VictimPolicy::AbortAll),
            "abort-youngest" | "youngest" => Ok(VictimPolicy::AbortYoungest),
            "abort-oldest" | "oldest" => Ok(VictimPolicy::AbortOldest),
            other => Err(SimError::InvalidConfig(format!("unknown victim policy '{other}'"))),
        }
    }
}

/// Statistics about deadlock detection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeadlockStatistics {
    /// Number of detection passes run
    pub detection_runs: u64,
    /// Total number of deadlock cycles detected
    pub total_deadlocks_detected: u64,
    /// Total number of victims selected for abort
    pub total_victims_selected: u64,
    /// Wait-for edges seen by the most recent pass
    pub last_wait_edges: usize,
}

/// Wait-for graph for deadlock detection
#[derive(Debug, Clone, Default)]
pub struct WaitForGraph {
    /// Edges in the wait-for graph, keyed by waiter
    edges: BTreeMap<TransactionId, Vec<WaitForEdge>>,
}

impl WaitForGraph {
    /// Create a new wait-for graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a wait-for edge to the graph
    pub fn add_edge(&mut self, edge: WaitForEdge) {
        let edges = self.edges.entry(edge.waiter.clone()).or_default();
        if !edges.iter().any(|existing| existing.holder == edge.holder && existing.resource == edge.resource) {
            edges.push(edge);
        }
    }

    /// Detect cycles in the wait-for graph using DFS
    pub fn detect_deadlocks(&self) -> Vec<DeadlockCycle> {
        let mut visited = BTreeSet::new();
        let mut recursion_stack = BTreeSet::new();
        let mut current_path = Vec::new();
        let mut deadlocks = Vec::new();

        for txn_id in self.edges.keys() {
            if !visited.contains(txn_id) {
                self.dfs_detect_cycle(txn_id, &mut visited, &mut recursion_stack, &mut current_path, &mut deadlocks);
            }
        }

        deadlocks
    }

    /// Depth-first search to detect cycles
    fn dfs_detect_cycle<'g>(
        &'g self,
        txn_id: &'g TransactionId,
        visited: &mut BTreeSet<&'g TransactionId>,
        recursion_stack: &mut BTreeSet<&'g TransactionId>,
        current_path: &mut Vec<&'g TransactionId>,
        deadlocks: &mut Vec<DeadlockCycle>,
    ) {
        visited.insert(txn_id);
        recursion_stack.insert(txn_id);
        current_path.push(txn_id);

        if let Some(edges) = self.edges.get(txn_id) {
            for edge in edges {
                if !visited.contains(&edge.holder) {
                    self.dfs_detect_cycle(&edge.holder, visited, recursion_stack, current_path, deadlocks);
                } else if recursion_stack.contains(&edge.holder) {
                    // Back edge closes a cycle
                    if let Some(cycle_start) = current_path.iter().position(|id| *id == &edge.holder) {
                        let transactions: Vec<TransactionId> = current_path[cycle_start..].iter().map(|id| (*id).clone()).collect();
                        let resources = self.get_resources_in_cycle(&transactions);
                        deadlocks.push(DeadlockCycle { transactions, resources });
                    }
                }
            }
        }

        current_path.pop();
        recursion_stack.remove(txn_id);
    }

    /// Get resources involved in a cycle
    fn get_resources_in_cycle(&self, transactions: &[TransactionId]) -> Vec<String> {
        let mut resources = BTreeSet::new();

        for txn_id in transactions {
            if let Some(edges) = self.edges.get(txn_id) {
                for edge in edges {
                    if transactions.contains(&edge.holder) {
                        resources.insert(edge.resource.clone());
                    }
                }
            }
        }

        resources.into_iter().collect()
    }

    /// Get number of active edges
    pub fn edge_count(&self) -> usize {
        self.edges.values().map(|v| v.len()).sum()
    }

    /// Check if the graph has any edges
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// Picks deadlock victims and keeps detection statistics for a run
#[derive(Debug, Clone, Default)]
pub struct DeadlockDetector {
    policy: VictimPolicy,
    statistics: DeadlockStatistics,
}

impl DeadlockDetector {
    /// Create a new deadlock detector
    pub fn new(policy: VictimPolicy) -> Self {
        Self {
            policy,
            statistics: DeadlockStatistics::default(),
        }
    }

    pub fn policy(&self) -> VictimPolicy {
        self.policy
    }

    /// Search `graph` for cycles and return the victims to abort, deduplicated and sorted
    pub fn detect_and_select_victims(&mut self, graph: &WaitForGraph, transactions: &[Transaction]) -> (Vec<DeadlockCycle>, Vec<TransactionId>) {
        self.statistics.detection_runs += 1;
        self.statistics.last_wait_edges = graph.edge_count();

        let cycles = graph.detect_deadlocks();
        if cycles.is_empty() {
            return (cycles, Vec::new());
        }

        let victims = self.select_victims(&cycles, transactions);
        self.statistics.total_deadlocks_detected += cycles.len() as u64;
        self.statistics.total_victims_selected += victims.len() as u64;
        debug!(cycles = cycles.len(), victims = victims.len(), policy = ?self.policy, "deadlock detected");

        (cycles, victims)
    }

    /// Choose victims from `cycles` according to the policy
    pub fn select_victims(&self, cycles: &[DeadlockCycle], transactions: &[Transaction]) -> Vec<TransactionId> {
        let timestamps: BTreeMap<TransactionId, Timestamp> = transactions.iter().map(|txn| (txn.id().clone(), txn.timestamp())).collect();

        let victims: BTreeSet<TransactionId> = cycles
            .iter()
            .flat_map(|cycle| match self.policy {
                VictimPolicy::AbortAll => cycle.transactions.clone(),
                VictimPolicy::AbortYoungest => cycle.youngest_transaction(&timestamps).into_iter().collect(),
                VictimPolicy::AbortOldest => cycle.oldest_transaction(&timestamps).into_iter().collect(),
            })
            .collect();

        victims.into_iter().collect()
    }

    /// Get current deadlock statistics
    pub fn statistics(&self) -> &DeadlockStatistics {
        &self.statistics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> TransactionId {
        TransactionId::from(name)
    }

    fn edge(waiter: &str, holder: &str, resource: &str) -> WaitForEdge {
        WaitForEdge::new(id(waiter), id(holder), resource)
    }

    #[test]
    fn test_wait_for_graph_basic_operations() {
        let mut graph = WaitForGraph::new();

        graph.add_edge(edge("T1", "T2", "X"));
        graph.add_edge(edge("T2", "T3", "Y"));
        // Duplicate edges are ignored
        graph.add_edge(edge("T1", "T2", "X"));

        assert_eq!(graph.edge_count(), 2);
        assert!(!graph.is_empty());
        assert!(WaitForGraph::new().is_empty());
    }

    #[test]
    fn test_mutual_wait_is_a_deadlock() {
        let mut graph = WaitForGraph::new();
        graph.add_edge(edge("T3", "T4", "Y"));
        graph.add_edge(edge("T4", "T3", "X"));

        let deadlocks = graph.detect_deadlocks();
        assert_eq!(deadlocks.len(), 1);
        assert_eq!(deadlocks[0].transactions, vec![id("T3"), id("T4")]);
        assert_eq!(deadlocks[0].resources, vec!["X".to_string(), "Y".to_string()]);
    }

    #[test]
    fn test_longer_cycle_detection() {
        let mut graph = WaitForGraph::new();

        // Create a cycle: T1 -> T2 -> T3 -> T1
        graph.add_edge(edge("T1", "T2", "X"));
        graph.add_edge(edge("T2", "T3", "Y"));
        graph.add_edge(edge("T3", "T1", "Z"));

        let deadlocks = graph.detect_deadlocks();
        assert_eq!(deadlocks.len(), 1);

        let deadlock = &deadlocks[0];
        assert_eq!(deadlock.transactions.len(), 3);
        assert_eq!(deadlock.transactions, vec![id("T1"), id("T2"), id("T3")]);
        assert_eq!(deadlock.to_string(), "T1, T2, T3");
    }

    #[test]
    fn test_no_deadlock_detection() {
        let mut graph = WaitForGraph::new();

        // Non-cyclic wait chain: T1 -> T2 -> T3
        graph.add_edge(edge("T1", "T2", "X"));
        graph.add_edge(edge("T2", "T3", "Y"));

        assert!(graph.detect_deadlocks().is_empty());
    }

    #[test]
    fn test_disjoint_cycles() {
        let mut graph = WaitForGraph::new();

        graph.add_edge(edge("T1", "T2", "X"));
        graph.add_edge(edge("T2", "T1", "Y"));

        graph.add_edge(edge("T3", "T4", "Z"));
        graph.add_edge(edge("T4", "T5", "W"));
        graph.add_edge(edge("T5", "T3", "V"));

        // A waiter hanging off a cycle is not part of it
        graph.add_edge(edge("T6", "T1", "X"));

        let deadlocks = graph.detect_deadlocks();
        assert_eq!(deadlocks.len(), 2);
        assert!(deadlocks.iter().all(|cycle| !cycle.transactions.contains(&id("T6"))));
    }

    #[test]
    fn test_victim_policies() {
        let transactions = vec![Transaction::new("T3", vec![], 3), Transaction::new("T4", vec![], 4), Transaction::new("T9", vec![], 1)];
        let cycles = vec![DeadlockCycle {
            transactions: vec![id("T3"), id("T4"), id("T9")],
            resources: vec!["X".into(), "Y".into()],
        }];

        let all = DeadlockDetector::new(VictimPolicy::AbortAll).select_victims(&cycles, &transactions);
        assert_eq!(all, vec![id("T3"), id("T4"), id("T9")]);

        let youngest = DeadlockDetector::new(VictimPolicy::AbortYoungest).select_victims(&cycles, &transactions);
        assert_eq!(youngest, vec![id("T4")]);

        let oldest = DeadlockDetector::new(VictimPolicy::AbortOldest).select_victims(&cycles, &transactions);
        assert_eq!(oldest, vec![id("T9")]);
    }

    #[test]
    fn test_detector_statistics() {
        let mut detector = DeadlockDetector::default();
        let mut graph = WaitForGraph::new();
        graph.add_edge(edge("T1", "T2", "X"));

        let (cycles, victims) = detector.detect_and_select_victims(&graph, &[]);
        assert!(cycles.is_empty() && victims.is_empty());

        graph.add_edge(edge("T2", "T1", "Y"));
        let (cycles, victims) = detector.detect_and_select_victims(&graph, &[]);
        assert_eq!(cycles.len(), 1);
        assert_eq!(victims, vec![id("T1"), id("T2")]);

        let stats = detector.statistics();
        assert_eq!(stats.detection_runs, 2);
        assert_eq!(stats.total_deadlocks_detected, 1);
        assert_eq!(stats.total_victims_selected, 2);
        assert_eq!(stats.last_wait_edges, 2);
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("abort-youngest".parse::<VictimPolicy>().unwrap(), VictimPolicy::AbortYoungest);
        assert_eq!("ALL".parse::<VictimPolicy>().unwrap(), VictimPolicy::AbortAll);
        assert!("random".parse::<VictimPolicy>().is_err());
    }
}
