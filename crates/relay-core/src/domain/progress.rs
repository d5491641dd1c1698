//! Run progress and terminal states published to observers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Progress of one dispatch run. Reset at the start of each run.
///
/// `sent` counts jobs handed to the transport; `attempted` also counts jobs
/// that failed locally. Both only grow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub attempted: usize,
    pub sent: usize,
    pub failed: usize,
    pub total: usize,
}

impl Progress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn record_sent(&mut self) {
        self.attempted += 1;
        self.sent += 1;
    }

    pub fn record_failed(&mut self) {
        self.attempted += 1;
        self.failed += 1;
    }

    pub fn is_done(&self) -> bool {
        self.attempted >= self.total
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sent {}/{}", self.sent, self.total)
    }
}

/// How a run ended. Every run ends in exactly one of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TerminalState {
    /// Batch exhausted.
    Completed { sent: usize },

    /// Stopped by a cancellation request. Not a failure.
    Cancelled { sent: usize },

    /// The run could not proceed (no send capability, store unavailable, ...).
    Failed { reason: String },

    /// Nothing to claim.
    EmptyPool,
}

impl fmt::Display for TerminalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminalState::Completed { sent } => write!(f, "completed ({sent} sent)"),
            TerminalState::Cancelled { sent } => write!(f, "cancelled ({sent} sent)"),
            TerminalState::Failed { reason } => write!(f, "failed: {reason}"),
            TerminalState::EmptyPool => write!(f, "no jobs available"),
        }
    }
}

/// Where the worker currently is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Claiming,
    Dispatching,
    Finished { terminal: TerminalState },
}
