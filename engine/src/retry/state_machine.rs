//! Retry state machine: explicit states and legal transition guards.
//!
//! ```text
//! Planning   → Applying | Failed
//! Applying   → Validating | Failed
//! Validating → Success | Fixing (attempt < max) | Failed
//! Fixing     → Applying | Failed
//! ```
//!
//! `attempt` starts at 1 and increments only on entry to `Fixing`, so a run
//! can pass through `Validating` at most `max_attempts` times.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStatus {
    Planning,
    Applying,
    Validating,
    Fixing,
    Success,
    Failed,
}

impl RetryStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

impl fmt::Display for RetryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Planning => write!(f, "Planning"),
            Self::Applying => write!(f, "Applying"),
            Self::Validating => write!(f, "Validating"),
            Self::Fixing => write!(f, "Fixing"),
            Self::Success => write!(f, "Success"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Snapshot of where a run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryState {
    pub attempt: u32,
    pub max_attempts: u32,
    pub status: RetryStatus,
}

impl RetryState {
    pub fn can_retry(&self) -> bool {
        self.attempt < self.max_attempts
    }
}

fn is_legal_transition(state: RetryState, to: RetryStatus) -> bool {
    use RetryStatus::*;

    if to == Failed && !state.status.is_terminal() {
        return true;
    }

    match (state.status, to) {
        (Planning, Applying)
        | (Applying, Validating)
        | (Validating, Success)
        | (Fixing, Applying) => true,
        (Validating, Fixing) => state.can_retry(),
        _ => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: RetryStatus,
    pub to: RetryStatus,
    /// Attempt number after the transition.
    pub attempt: u32,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal retry transition: {from} → {to} (attempt {attempt}/{max_attempts})")]
pub struct IllegalTransition {
    pub from: RetryStatus,
    pub to: RetryStatus,
    pub attempt: u32,
    pub max_attempts: u32,
}

pub struct RetryMachine {
    state: RetryState,
    created_at: Instant,
    transitions: Vec<TransitionRecord>,
}

impl RetryMachine {
    /// Start at `Planning`, attempt 1. A `max_attempts` of 0 is treated as 1.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            state: RetryState {
                attempt: 1,
                max_attempts: max_attempts.max(1),
                status: RetryStatus::Planning,
            },
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    pub fn state(&self) -> RetryState {
        self.state
    }

    pub fn status(&self) -> RetryStatus {
        self.state.status
    }

    pub fn attempt(&self) -> u32 {
        self.state.attempt
    }

    pub fn can_retry(&self) -> bool {
        self.state.can_retry()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.status.is_terminal()
    }

    pub fn advance(&mut self, to: RetryStatus, reason: Option<&str>) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.state, to) {
            return Err(IllegalTransition {
                from: self.state.status,
                to,
                attempt: self.state.attempt,
                max_attempts: self.state.max_attempts,
            });
        }

        let from = self.state.status;
        if to == RetryStatus::Fixing {
            self.state.attempt += 1;
        }
        self.state.status = to;

        tracing::debug!(
            from = %from,
            to = %to,
            attempt = self.state.attempt,
            "Retry transition"
        );

        self.transitions.push(TransitionRecord {
            from,
            to,
            attempt: self.state.attempt,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        });
        Ok(())
    }

    pub fn fail(&mut self, reason: &str) -> Result<(), IllegalTransition> {
        self.advance(RetryStatus::Failed, Some(reason))
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    /// How many times the machine entered `status`.
    pub fn entries(&self, status: RetryStatus) -> usize {
        self.transitions.iter().filter(|t| t.to == status).count()
    }

    pub fn summary(&self) -> String {
        let path: Vec<String> = self.transitions.iter().map(|t| t.to.to_string()).collect();
        format!(
            "{} → {} (attempt {}/{}, {} transitions) [{}]",
            RetryStatus::Planning,
            self.state.status,
            self.state.attempt,
            self.state.max_attempts,
            self.transitions.len(),
            path.join(" → ")
        )
    }
}
