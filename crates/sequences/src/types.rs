use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// An ordered, reusable outreach campaign definition.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SequenceDefinition {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    /// Always equal to the number of steps; maintained by the store.
    pub total_steps: u32,
    /// Bumped on every change to the step list.
    pub version: u64,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Kind of outreach a step performs. Delivery is up to the external executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    Email,
    Call,
    Task,
    Wait,
}

impl ActionType {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Email => "Email",
            Self::Call => "Call",
            Self::Task => "Task",
            Self::Wait => "Wait",
        }
    }
}

/// How a step's `scheduled_at` is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DelayType {
    /// `delay_days` after the tick that schedules the step.
    #[default]
    AfterPrevious,
    /// The step's `fixed_date`; `delay_days` is ignored.
    FixedDate,
    /// `delay_days` after the assignment started.
    AfterAssignmentStart,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SequenceStep {
    pub id: Uuid,
    pub sequence_id: Uuid,
    /// 1-based and contiguous within the sequence.
    pub step_number: u32,
    pub name: String,
    pub action_type: ActionType,
    pub template_id: Option<String>,
    pub delay_days: u32,
    pub delay_type: DelayType,
    pub fixed_date: Option<DateTime<Utc>>,
    /// Opaque predicate, interpreted only by the executor.
    #[schema(value_type = Option<Object>)]
    pub conditions: Option<serde_json::Value>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Consistent snapshot of a definition and its ordered steps.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SequenceWithSteps {
    #[serde(flatten)]
    pub definition: SequenceDefinition,
    pub steps: Vec<SequenceStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SequenceSummary {
    #[serde(flatten)]
    pub definition: SequenceDefinition,
    pub step_count: usize,
    pub assignment_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SequenceDetail {
    #[serde(flatten)]
    pub sequence: SequenceWithSteps,
    pub recent_assignments: Vec<SequenceAssignment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentStatus {
    Active,
    Paused,
    Completed,
    Stopped,
}

impl AssignmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Stopped)
    }
}

/// Binding of one prospect to one sequence.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SequenceAssignment {
    pub id: Uuid,
    pub sequence_id: Uuid,
    pub prospect_id: String,
    pub status: AssignmentStatus,
    /// Never decreases. Equals `total_steps + 1` once every step has been worked.
    pub current_step: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub next_step_scheduled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityStatus {
    Pending,
    Completed,
    Failed,
    Skipped,
}

impl ActivityStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// One scheduled occurrence of a step for an assignment.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SequenceActivity {
    pub id: Uuid,
    pub assignment_id: Uuid,
    pub sequence_id: Uuid,
    pub step_id: Uuid,
    pub step_number: u32,
    /// Copied from the step when the activity is created.
    pub action_type: ActionType,
    pub status: ActivityStatus,
    pub scheduled_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentDetail {
    #[serde(flatten)]
    pub assignment: SequenceAssignment,
    pub activities: Vec<SequenceActivity>,
}

// ─── Inputs ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewSequence {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub steps: Vec<NewStep>,
}

/// Step payload for create and append. `action_type` is optional on the wire
/// so a missing value surfaces as a validation error.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewStep {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub action_type: Option<ActionType>,
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub delay_days: u32,
    #[serde(default)]
    pub delay_type: DelayType,
    #[serde(default)]
    pub fixed_date: Option<DateTime<Utc>>,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub conditions: Option<serde_json::Value>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SequencePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

/// Partial step update. Step numbers only change through renumbering.
///
/// For `templateId`, `fixedDate` and `conditions` an absent field leaves the
/// value alone while an explicit `null` clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StepPatch {
    pub name: Option<String>,
    pub action_type: Option<ActionType>,
    #[serde(default, deserialize_with = "nullable_field", skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>, nullable)]
    pub template_id: Option<Option<String>>,
    pub delay_days: Option<u32>,
    pub delay_type: Option<DelayType>,
    #[serde(default, deserialize_with = "nullable_field", skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>, format = DateTime, nullable)]
    pub fixed_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "nullable_field", skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>, nullable)]
    pub conditions: Option<Option<serde_json::Value>>,
    pub is_active: Option<bool>,
}

/// Maps a present field to `Some`, so `null` becomes `Some(None)`.
fn nullable_field<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssignResult {
    pub assigned: usize,
    pub skipped: usize,
    pub assignments: Vec<SequenceAssignment>,
}

/// Outcome reported by the external executor for a pending activity.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeReport {
    pub status: ActivityStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

// ─── Advancement ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TickKind {
    /// A pending activity was created for the current step.
    Scheduled,
    /// The current step is inactive; a skipped activity was recorded.
    Skipped,
    /// Every step has been worked; the assignment is now completed.
    Completed,
}

/// Result of one Step Advancer tick.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceResult {
    pub outcome: TickKind,
    pub assignment: SequenceAssignment,
    pub activity: Option<SequenceActivity>,
    pub step: Option<SequenceStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeResult {
    pub activity: SequenceActivity,
    pub assignment: SequenceAssignment,
}

// ─── Stats ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentStatusCounts {
    pub active: u64,
    pub paused: u64,
    pub completed: u64,
    pub stopped: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActivityStatusCounts {
    pub pending: u64,
    pub completed: u64,
    pub failed: u64,
    pub skipped: u64,
}

/// Funnel statistics for one sequence.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SequenceStats {
    pub sequence_id: Uuid,
    pub total_assignments: u64,
    pub by_status: AssignmentStatusCounts,
    pub conversions: u64,
    pub conversion_rate: f64,
    pub avg_steps_completed: f64,
    pub by_stage: BTreeMap<String, u64>,
    pub activities_by_status: ActivityStatusCounts,
}
