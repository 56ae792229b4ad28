use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle event emitted by the sequence engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceEvent {
    pub event_id: Uuid,
    pub event_type: SequenceEventType,
    pub sequence_id: Uuid,
    pub assignment_id: Option<Uuid>,
    pub prospect_id: Option<String>,
    pub step_number: Option<u32>,
    pub node_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SequenceEventType {
    SequenceCreated,
    SequenceDeleted,
    StepsRenumbered,
    ProspectAssigned,
    ActivityScheduled,
    ActivitySkipped,
    ActivityResolved,
    AssignmentCompleted,
    AssignmentPaused,
    AssignmentResumed,
    AssignmentStopped,
}
