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

use anyhow::Result;
use ccsim_core::{Protocol, RunSnapshot, Scenario, Severity, Simulator, StepOutcome, VictimPolicy};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process;
use tracing::{error, info};

mod config;

use config::CcsimConfig;

#[derive(Parser, Debug)]
#[command(name = "ccsim", about = "Concurrency control simulator", version)]
pub struct Cli {
    /// Path to configuration file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Scenario file (overrides $CCSIM_SCENARIO)
    #[arg(long)]
    pub scenario: Option<PathBuf>,

    /// Concurrency control protocol
    #[arg(long, value_enum)]
    pub protocol: Option<ProtocolArg>,

    /// Deadlock victim selection
    #[arg(long, value_enum)]
    pub victim_policy: Option<VictimPolicyArg>,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Protocol selection for CLI
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ProtocolArg {
    Locking,
    Timestamping,
}

impl From<ProtocolArg> for Protocol {
    fn from(protocol: ProtocolArg) -> Self {
        match protocol {
            ProtocolArg::Locking => Protocol::Locking,
            ProtocolArg::Timestamping => Protocol::Timestamping,
        }
    }
}

/// Victim policy selection for CLI
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum VictimPolicyArg {
    AbortAll,
    AbortYoungest,
    AbortOldest,
}

impl From<VictimPolicyArg> for VictimPolicy {
    fn from(policy: VictimPolicyArg) -> Self {
        match policy {
            VictimPolicyArg::AbortAll => VictimPolicy::AbortAll,
            VictimPolicyArg::AbortYoungest => VictimPolicy::AbortYoungest,
            VictimPolicyArg::AbortOldest => VictimPolicy::AbortOldest,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the scenario until every transaction has committed or aborted
    Run,

    /// Advance a fresh run by a number of steps and show its state
    Step {
        /// Number of steps to take
        #[arg(long, default_value_t = 1)]
        count: u64,
    },

    /// Print the effective scenario as TOML
    Scenario,
}

fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = execute(cli) {
        error!("Command failed: {:#}", e);
        process::exit(1);
    }
}

fn execute(cli: Cli) -> Result<()> {
    let mut config = CcsimConfig::resolve_config(cli.config, cli.scenario)?;

    // Command-line flags override file settings
    if let Some(protocol) = cli.protocol {
        config.simulator.protocol = protocol.into();
    }
    if let Some(policy) = cli.victim_policy {
        config.simulator.victim_policy = policy.into();
    }

    let scenario = config.load_scenario()?;
    info!(protocol = %config.simulator.protocol, items = scenario.items.len(), "configuration loaded");

    match cli.command {
        Commands::Run => handle_run(scenario, &config, cli.json),
        Commands::Step { count } => handle_step(scenario, &config, count, cli.json),
        Commands::Scenario => handle_scenario(&scenario),
    }
}

fn handle_run(scenario: Scenario, config: &CcsimConfig, json: bool) -> Result<()> {
    let mut simulator = Simulator::new(scenario, config.simulator.clone())?;
    let summary = simulator.run_to_completion()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    print_log(&simulator);
    println!();
    println!("Protocol: {}", summary.protocol);
    println!("Steps: {}", summary.steps);
    println!("Messages: {}", summary.total_messages);
    println!("Final values:");
    for (name, value) in &summary.final_values {
        println!("  {name} = {value}");
    }
    println!("Committed: {}", join(summary.committed.iter().map(|id| id.to_string())));
    println!("Aborted:");
    for (id, reason) in &summary.aborted {
        println!("  {id}: {reason}");
    }
    Ok(())
}

fn handle_step(scenario: Scenario, config: &CcsimConfig, count: u64, json: bool) -> Result<()> {
    let mut simulator = Simulator::new(scenario, config.simulator.clone())?;
    simulator.start()?;

    for _ in 0..count {
        let report = simulator.step()?;
        if !json {
            if let Some(txn) = &report.transaction {
                println!("step {}: {txn} -> {}", report.step, describe(&report.outcome));
            }
            if !report.deadlock_victims.is_empty() {
                println!("  deadlock victims: {}", join(report.deadlock_victims.iter().map(|id| id.to_string())));
            }
        }
        if report.is_finished() {
            break;
        }
    }

    let Some(snapshot) = simulator.snapshot() else {
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print_snapshot(&snapshot);
    }
    Ok(())
}

fn handle_scenario(scenario: &Scenario) -> Result<()> {
    print!("{}", toml::to_string_pretty(scenario)?);
    Ok(())
}

fn describe(outcome: &StepOutcome) -> String {
    match outcome {
        StepOutcome::Finished => "finished".to_string(),
        StepOutcome::Executed { operation } => operation.to_string(),
        StepOutcome::Waiting { item, holder } => format!("waiting for {item} (held by {holder})"),
        StepOutcome::UpgradeRefused { item } => format!("upgrade on {item} refused"),
        StepOutcome::Committed => "committed".to_string(),
        StepOutcome::Aborted { reason } => format!("aborted ({reason})"),
    }
}

fn print_log(simulator: &Simulator) {
    for entry in simulator.log() {
        let marker = match entry.severity {
            Severity::Info => " ",
            Severity::Success => "+",
            Severity::Warning => "!",
            Severity::Failure => "x",
        };
        println!("{marker} {}", entry.text);
    }
}

fn print_snapshot(snapshot: &RunSnapshot) {
    println!();
    println!("Protocol: {}  Step: {}  Messages: {}", snapshot.protocol, snapshot.step, snapshot.messages.total());
    println!("Items:");
    for item in &snapshot.items {
        let lock = match (&item.holder, item.mode) {
            (Some(holder), Some(mode)) => format!("{mode} by {holder}"),
            _ => "free".to_string(),
        };
        println!(
            "  {} = {} [{lock}] waiting: [{}] rts={} wts={}",
            item.name,
            item.value,
            join(item.waiting.iter().map(|id| id.to_string())),
            item.read_timestamp,
            item.write_timestamp
        );
    }
    println!("Transactions:");
    for txn in &snapshot.transactions {
        let next = txn.next_operation.as_ref().map(|op| format!(" next: {op}")).unwrap_or_default();
        println!("  {} (ts={}) {}{next}", txn.id, txn.timestamp, txn.state);
    }
    println!("Queue: {}", join(snapshot.queue.iter().map(|id| id.to_string())));
}

fn join(ids: impl Iterator<Item = String>) -> String {
    ids.collect::<Vec<_>>().join(", ")
}
