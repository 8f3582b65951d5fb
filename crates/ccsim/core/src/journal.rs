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

//! Run Journal
//!
//! Ordered log stream of `(text, severity)` entries describing every state
//! transition of a run, plus the logical message counter used as a proxy for
//! inter-site communication cost. Entries are mirrored to `tracing`.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};

/// Severity attached to a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Failure,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Failure => "failure",
        };
        f.write_str(name)
    }
}

/// One line of the log stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub text: String,
    pub severity: Severity,
}

/// Protocol-significant events that count as one logical message each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    LockRequest,
    LockGrant,
    LockUpgrade,
    LockRelease,
    Commit,
    Abort,
    TimestampRead,
    TimestampWrite,
}

/// Monotonic message counter with a per-kind breakdown
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MessageCounter {
    total: u64,
    by_kind: BTreeMap<MessageKind, u64>,
}

impl MessageCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, kind: MessageKind) {
        self.total += 1;
        *self.by_kind.entry(kind).or_default() += 1;
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn count(&self, kind: MessageKind) -> u64 {
        self.by_kind.get(&kind).copied().unwrap_or(0)
    }

    pub fn by_kind(&self) -> &BTreeMap<MessageKind, u64> {
        &self.by_kind
    }
}

/// Log stream and message counter of one run
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Vec<LogEntry>,
    messages: MessageCounter,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry and mirror it to `tracing`
    pub fn log(&mut self, severity: Severity, text: impl Into<String>) {
        let text = text.into();
        match severity {
            Severity::Info => debug!(%severity, "{text}"),
            Severity::Success => info!(%severity, "{text}"),
            Severity::Warning | Severity::Failure => warn!(%severity, "{text}"),
        }
        self.entries.push(LogEntry { text, severity });
    }

    pub fn info(&mut self, text: impl Into<String>) {
        self.log(Severity::Info, text);
    }

    pub fn success(&mut self, text: impl Into<String>) {
        self.log(Severity::Success, text);
    }

    pub fn warning(&mut self, text: impl Into<String>) {
        self.log(Severity::Warning, text);
    }

    pub fn failure(&mut self, text: impl Into<String>) {
        self.log(Severity::Failure, text);
    }

    /// Count one logical message
    pub fn message(&mut self, kind: MessageKind) {
        self.messages.record(kind);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn messages(&self) -> &MessageCounter {
        &self.messages
    }
}
