// cycle.rs — Phases of one audited commit.
//
// A save runs through a fixed sequence:
//   Idle → AuditingModifications → CommittingPrimary → AuditingAdditions
//     → CommittingAuditOnly → Idle
// AuditingAdditions may return straight to Idle when no addition produced a
// header, and any phase may fall back to Idle when the cycle aborts.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TrackerError;

/// Where a commit cycle currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitPhase {
    /// No cycle in progress.
    Idle,

    /// Building headers for modified, soft-deleted and deleted entries.
    AuditingModifications,

    /// The real commit of domain rows plus queued audit rows.
    CommittingPrimary,

    /// Building headers for inserted entries from their committed values.
    AuditingAdditions,

    /// Writing the addition headers.
    CommittingAuditOnly,
}

impl fmt::Display for CommitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitPhase::Idle => write!(f, "idle"),
            CommitPhase::AuditingModifications => write!(f, "auditing_modifications"),
            CommitPhase::CommittingPrimary => write!(f, "committing_primary"),
            CommitPhase::AuditingAdditions => write!(f, "auditing_additions"),
            CommitPhase::CommittingAuditOnly => write!(f, "committing_audit_only"),
        }
    }
}

impl CommitPhase {
    /// Check whether moving from this phase to `next` is valid.
    pub fn can_transition_to(&self, next: &CommitPhase) -> bool {
        // Aborting is always allowed.
        if *next == CommitPhase::Idle && *self != CommitPhase::Idle {
            return true;
        }

        matches!(
            (self, next),
            (CommitPhase::Idle, CommitPhase::AuditingModifications)
                | (CommitPhase::AuditingModifications, CommitPhase::CommittingPrimary)
                | (CommitPhase::CommittingPrimary, CommitPhase::AuditingAdditions)
                | (CommitPhase::AuditingAdditions, CommitPhase::CommittingAuditOnly)
        )
    }
}

/// Tracks the phase of one cycle and rejects out-of-order steps.
#[derive(Debug, Clone)]
pub struct CommitCycle {
    phase: CommitPhase,
}

impl CommitCycle {
    pub fn new() -> Self {
        Self {
            phase: CommitPhase::Idle,
        }
    }

    pub fn phase(&self) -> CommitPhase {
        self.phase
    }

    /// Move to `next`, or fail with `InvalidTransition`.
    pub fn advance(&mut self, next: CommitPhase) -> Result<(), TrackerError> {
        if !self.phase.can_transition_to(&next) {
            return Err(TrackerError::InvalidTransition {
                from: self.phase.to_string(),
                to: next.to_string(),
            });
        }
        tracing::debug!(from = %self.phase, to = %next, "commit phase");
        self.phase = next;
        Ok(())
    }
}

impl Default for CommitCycle {
    fn default() -> Self {
        Self::new()
    }
}
