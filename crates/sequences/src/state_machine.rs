use outreach_core::{OutreachError, OutreachResult};
use serde::{Deserialize, Serialize};

use crate::types::AssignmentStatus;

/// Describes a single valid state transition for an assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: AssignmentStatus,
    pub to: AssignmentStatus,
    pub trigger: String,
}

/// Guards the assignment lifecycle by enforcing a finite set of valid
/// status transitions. `Completed` and `Stopped` have no outgoing edges.
#[derive(Debug, Clone)]
pub struct AssignmentStateMachine {
    transitions: Vec<StateTransition>,
}

impl AssignmentStateMachine {
    pub fn new() -> Self {
        let transitions = vec![
            // Active ->
            StateTransition {
                from: AssignmentStatus::Active,
                to: AssignmentStatus::Active,
                trigger: "advance".to_string(),
            },
            StateTransition {
                from: AssignmentStatus::Active,
                to: AssignmentStatus::Completed,
                trigger: "sequence_exhausted".to_string(),
            },
            StateTransition {
                from: AssignmentStatus::Active,
                to: AssignmentStatus::Paused,
                trigger: "pause".to_string(),
            },
            StateTransition {
                from: AssignmentStatus::Active,
                to: AssignmentStatus::Stopped,
                trigger: "stop".to_string(),
            },
            // Paused ->
            StateTransition {
                from: AssignmentStatus::Paused,
                to: AssignmentStatus::Active,
                trigger: "resume".to_string(),
            },
            StateTransition {
                from: AssignmentStatus::Paused,
                to: AssignmentStatus::Stopped,
                trigger: "stop".to_string(),
            },
        ];

        Self { transitions }
    }

    /// Returns `true` if the given transition is allowed.
    pub fn can_transition(&self, from: AssignmentStatus, to: AssignmentStatus) -> bool {
        self.transitions.iter().any(|t| t.from == from && t.to == to)
    }

    /// Returns a `Conflict` error naming both states when the transition is
    /// not permitted.
    pub fn check(&self, from: AssignmentStatus, to: AssignmentStatus) -> OutreachResult<()> {
        if self.can_transition(from, to) {
            Ok(())
        } else {
            Err(OutreachError::conflict(format!(
                "invalid assignment transition from {:?} to {:?}",
                from, to
            )))
        }
    }

    pub fn transitions(&self) -> &[StateTransition] {
        &self.transitions
    }
}

impl Default for AssignmentStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
