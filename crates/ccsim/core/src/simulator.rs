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

//! Simulator Control Surface
//!
//! `Simulator` is the entry point for front ends. It remembers the selected
//! protocol and scenario and owns at most one active run.

use std::collections::BTreeMap;

use tracing::info;

use ccsim_common::{Protocol, SimError, SimResult, TransactionId};

use crate::config::SimulatorConfig;
use crate::data_item::DataItemRegistry;
use crate::journal::LogEntry;
use crate::scenario::Scenario;
use crate::scheduler::{Scheduler, StepReport};
use crate::snapshot::{RunSnapshot, RunSummary};
use crate::transaction::TransactionState;

#[derive(Debug, Clone)]
pub struct Simulator {
    config: SimulatorConfig,
    scenario: Scenario,
    protocol: Protocol,
    run: Option<Scheduler>,
}

impl Simulator {
    pub fn new(scenario: Scenario, config: SimulatorConfig) -> SimResult<Self> {
        config.validate()?;
        Ok(Self {
            protocol: config.protocol,
            config,
            scenario,
            run: None,
        })
    }

    /// Simulator over the built-in scenario with default settings
    pub fn classic() -> Self {
        let config = SimulatorConfig::default();
        Self {
            protocol: config.protocol,
            config,
            scenario: Scenario::classic(),
            run: None,
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    /// Choose the protocol for the next run; changing it discards the active run
    pub fn select_protocol(&mut self, protocol: Protocol) {
        if protocol == self.protocol {
            return;
        }
        self.protocol = protocol;
        info!(protocol = %protocol, "concurrency mechanism selected");
        self.reset();
    }

    /// Start a fresh run with the selected protocol
    ///
    /// Item values written by a previous run carry over; `reset` restores the scenario's initial values.
    pub fn start(&mut self) -> SimResult<()> {
        let items = match self.run.take() {
            Some(previous) => previous.into_items(),
            None => DataItemRegistry::from_values(&self.scenario.items),
        };
        let run = Scheduler::with_items(self.protocol, &self.scenario, items, self.config.victim_policy)?;
        info!(protocol = %self.protocol, transactions = run.transactions().len(), "simulation started");
        self.run = Some(run);
        Ok(())
    }

    /// Execute one step of the active run
    pub fn step(&mut self) -> SimResult<StepReport> {
        let run = self.run.as_mut().ok_or(SimError::NotStarted)?;
        Ok(run.step())
    }

    /// Discard the active run; the selected protocol is kept
    pub fn reset(&mut self) {
        if self.run.take().is_some() {
            info!("simulation reset");
        }
    }

    /// Step until no live transactions remain, starting a run first if needed
    pub fn run_to_completion(&mut self) -> SimResult<RunSummary> {
        if self.run.is_none() {
            self.start()?;
        }
        let max_steps = self.config.max_steps;
        let run = self.run.as_mut().ok_or(SimError::NotStarted)?;

        while run.has_pending_work() {
            if run.steps() >= max_steps {
                return Err(SimError::StepLimitExceeded(max_steps));
            }
            run.step();
        }
        // Records the finish in the journal
        run.step();

        Ok(summarize(run))
    }

    pub fn is_started(&self) -> bool {
        self.run.is_some()
    }

    pub fn is_finished(&self) -> bool {
        self.run.as_ref().is_some_and(Scheduler::is_finished)
    }

    pub fn run(&self) -> Option<&Scheduler> {
        self.run.as_ref()
    }

    /// Log stream of the active run
    pub fn log(&self) -> &[LogEntry] {
        self.run.as_ref().map(|run| run.journal().entries()).unwrap_or_default()
    }

    pub fn message_count(&self) -> u64 {
        self.run.as_ref().map_or(0, |run| run.messages().total())
    }

    pub fn snapshot(&self) -> Option<RunSnapshot> {
        self.run.as_ref().map(Scheduler::snapshot)
    }
}

fn summarize(run: &Scheduler) -> RunSummary {
    let mut committed: Vec<TransactionId> = Vec::new();
    let mut aborted = Vec::new();
    for txn in run.transactions() {
        match (txn.state(), txn.abort_reason()) {
            (TransactionState::Committed, _) => committed.push(txn.id().clone()),
            (TransactionState::Aborted, Some(reason)) => aborted.push((txn.id().clone(), reason.clone())),
            _ => {}
        }
    }

    let final_values: BTreeMap<String, i64> = run.items().iter().map(|item| (item.name().to_string(), item.value())).collect();

    RunSummary {
        protocol: run.protocol(),
        steps: run.steps(),
        committed,
        aborted,
        final_values,
        total_messages: run.messages().total(),
    }
}
