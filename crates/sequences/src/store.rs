//! Storage port for the sequence engine, plus the DashMap-backed store used
//! by the server and the tests.
//!
//! Every mutating operation is a single atomic unit. Renumbering goes through
//! `replace_steps`, activity creation through `apply_tick`, and outcome
//! reports through `resolve_activity`, so a failure never leaves half of an
//! operation applied.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use outreach_core::{OutreachError, OutreachResult};
use tracing::{debug, info};
use uuid::Uuid;

use crate::types::{
    ActivityStatus, AssignmentStatus, SequenceActivity, SequenceAssignment, SequenceDefinition,
    SequenceStep, SequenceWithSteps,
};

/// Expected `(status, current_step)` of an assignment. A tick only applies
/// if the stored assignment still matches what the advancer read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickGuard {
    pub status: AssignmentStatus,
    pub current_step: u32,
}

impl TickGuard {
    pub fn of(assignment: &SequenceAssignment) -> Self {
        Self {
            status: assignment.status,
            current_step: assignment.current_step,
        }
    }

    fn matches(&self, assignment: &SequenceAssignment) -> bool {
        assignment.status == self.status && assignment.current_step == self.current_step
    }
}

/// Field changes applied to an assignment by a tick.
#[derive(Debug, Clone, Default)]
pub struct AssignmentUpdate {
    pub status: Option<AssignmentStatus>,
    /// Applied as `max(current, new)`.
    pub current_step: Option<u32>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_activity_at: Option<DateTime<Utc>>,
    /// `Some(None)` clears the field.
    pub next_step_scheduled_at: Option<Option<DateTime<Utc>>>,
}

impl AssignmentUpdate {
    fn apply_to(self, assignment: &mut SequenceAssignment) {
        if let Some(status) = self.status {
            assignment.status = status;
        }
        if let Some(step) = self.current_step {
            assignment.current_step = assignment.current_step.max(step);
        }
        if let Some(at) = self.completed_at {
            assignment.completed_at = Some(at);
        }
        if let Some(at) = self.last_activity_at {
            assignment.last_activity_at = Some(at);
        }
        if let Some(next) = self.next_step_scheduled_at {
            assignment.next_step_scheduled_at = next;
        }
    }
}

/// What resolving a pending activity does to its assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeEffect {
    /// Move `current_step` up to the given step number (never down).
    AdvanceTo(u32),
    /// Leave `current_step` where it is.
    KeepStep,
    /// Stop the assignment.
    StopAssignment,
}

#[derive(Debug, Clone)]
pub struct ActivityResolution {
    pub status: ActivityStatus,
    pub notes: Option<String>,
    pub resolved_at: DateTime<Utc>,
    pub effect: OutcomeEffect,
}

/// Persistence seen by the Definition Store, Assignment Manager, Step
/// Advancer and Stats Aggregator.
pub trait SequenceRepository: Send + Sync {
    /// Persists a definition together with its initial steps.
    fn insert_sequence(
        &self,
        definition: SequenceDefinition,
        steps: Vec<SequenceStep>,
    ) -> OutreachResult<SequenceWithSteps>;

    fn get_sequence(&self, id: Uuid) -> OutreachResult<Option<SequenceWithSteps>>;

    fn list_sequences(&self, is_active: Option<bool>) -> OutreachResult<Vec<SequenceDefinition>>;

    /// Writes the editable fields of a definition. `total_steps`, `version`
    /// and creation metadata stay as stored.
    fn save_sequence(&self, definition: SequenceDefinition) -> OutreachResult<SequenceDefinition>;

    /// Deletes a definition with its steps, assignments and activities.
    /// Returns `false` if it did not exist.
    fn delete_sequence(&self, id: Uuid) -> OutreachResult<bool>;

    /// Atomically replaces the whole step list of a sequence, rewriting
    /// `total_steps` and bumping `version`. Fails with `Conflict` if the
    /// stored version is not `expected_version`.
    fn replace_steps(
        &self,
        sequence_id: Uuid,
        expected_version: u64,
        steps: Vec<SequenceStep>,
        at: DateTime<Utc>,
    ) -> OutreachResult<SequenceWithSteps>;

    /// Inserts the assignments whose (sequence, prospect) pair is not taken
    /// yet and returns the ones inserted.
    fn insert_assignments(
        &self,
        assignments: Vec<SequenceAssignment>,
    ) -> OutreachResult<Vec<SequenceAssignment>>;

    fn get_assignment(&self, id: Uuid) -> OutreachResult<Option<SequenceAssignment>>;

    /// Assignments of a sequence, newest first.
    fn list_assignments(&self, sequence_id: Uuid) -> OutreachResult<Vec<SequenceAssignment>>;

    fn count_assignments(&self, sequence_id: Uuid) -> OutreachResult<usize>;

    /// Compare-and-swap on the assignment status.
    fn set_assignment_status(
        &self,
        id: Uuid,
        expected: AssignmentStatus,
        to: AssignmentStatus,
    ) -> OutreachResult<SequenceAssignment>;

    /// Applies one advancement: checks `guard`, inserts `activity` (taking
    /// the single pending slot of the assignment if it is `Pending`) and
    /// applies `update`, all or nothing. Refused with `Conflict` while the
    /// assignment already has a pending activity.
    fn apply_tick(
        &self,
        assignment_id: Uuid,
        guard: TickGuard,
        activity: Option<SequenceActivity>,
        update: AssignmentUpdate,
    ) -> OutreachResult<SequenceAssignment>;

    fn get_activity(&self, id: Uuid) -> OutreachResult<Option<SequenceActivity>>;

    /// Activities of an assignment in creation order.
    fn list_activities(&self, assignment_id: Uuid) -> OutreachResult<Vec<SequenceActivity>>;

    fn list_sequence_activities(&self, sequence_id: Uuid) -> OutreachResult<Vec<SequenceActivity>>;

    /// Moves a pending activity to a terminal status, frees the pending slot
    /// and applies `effect` to a non-terminal assignment.
    fn resolve_activity(
        &self,
        activity_id: Uuid,
        resolution: ActivityResolution,
    ) -> OutreachResult<(SequenceActivity, SequenceAssignment)>;
}

struct StoredSequence {
    definition: SequenceDefinition,
    steps: Vec<SequenceStep>,
}

impl StoredSequence {
    fn snapshot(&self) -> SequenceWithSteps {
        SequenceWithSteps {
            definition: self.definition.clone(),
            steps: self.steps.clone(),
        }
    }
}

/// Thread-safe in-memory store.
///
/// Lock order is enrollments, then sequences, then assignments, then
/// pending, then activities; no operation holds a pending guard and an
/// activity guard at the same time. Deleting a sequence never holds two
/// guards at once.
pub struct InMemorySequenceStore {
    sequences: DashMap<Uuid, StoredSequence>,
    assignments: DashMap<Uuid, SequenceAssignment>,
    /// (sequence, prospect) -> assignment; the uniqueness index.
    enrollments: DashMap<(Uuid, String), Uuid>,
    activities: DashMap<Uuid, SequenceActivity>,
    /// assignment -> its single pending activity.
    pending: DashMap<Uuid, Uuid>,
}

impl std::fmt::Debug for InMemorySequenceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemorySequenceStore")
            .field("sequences", &self.sequences.len())
            .field("assignments", &self.assignments.len())
            .field("activities", &self.activities.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl InMemorySequenceStore {
    pub fn new() -> Self {
        info!("Sequence store initialized (in-memory)");
        Self {
            sequences: DashMap::new(),
            assignments: DashMap::new(),
            enrollments: DashMap::new(),
            activities: DashMap::new(),
            pending: DashMap::new(),
        }
    }
}

impl Default for InMemorySequenceStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Rejects step lists that break the `1..=N` numbering or belong elsewhere.
fn check_ordering(sequence_id: Uuid, steps: &[SequenceStep]) -> OutreachResult<()> {
    for (index, step) in steps.iter().enumerate() {
        if step.sequence_id != sequence_id {
            return Err(OutreachError::Internal(format!(
                "step {} belongs to sequence {}, not {}",
                step.id, step.sequence_id, sequence_id
            )));
        }
        if step.step_number as usize != index + 1 {
            return Err(OutreachError::Internal(format!(
                "step list of sequence {} is not numbered 1..{} (found {} at position {})",
                sequence_id,
                steps.len(),
                step.step_number,
                index + 1
            )));
        }
    }
    Ok(())
}

impl SequenceRepository for InMemorySequenceStore {
    fn insert_sequence(
        &self,
        mut definition: SequenceDefinition,
        steps: Vec<SequenceStep>,
    ) -> OutreachResult<SequenceWithSteps> {
        check_ordering(definition.id, &steps)?;
        definition.total_steps = steps.len() as u32;
        match self.sequences.entry(definition.id) {
            Entry::Occupied(_) => Err(OutreachError::conflict(format!(
                "sequence {} already exists",
                definition.id
            ))),
            Entry::Vacant(slot) => {
                let stored = StoredSequence { definition, steps };
                let snapshot = stored.snapshot();
                slot.insert(stored);
                Ok(snapshot)
            }
        }
    }

    fn get_sequence(&self, id: Uuid) -> OutreachResult<Option<SequenceWithSteps>> {
        Ok(self.sequences.get(&id).map(|r| r.snapshot()))
    }

    fn list_sequences(&self, is_active: Option<bool>) -> OutreachResult<Vec<SequenceDefinition>> {
        let mut definitions: Vec<SequenceDefinition> = self
            .sequences
            .iter()
            .map(|r| r.value().definition.clone())
            .filter(|d| is_active.map_or(true, |active| d.is_active == active))
            .collect();
        definitions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(definitions)
    }

    fn save_sequence(&self, definition: SequenceDefinition) -> OutreachResult<SequenceDefinition> {
        let mut entry = self
            .sequences
            .get_mut(&definition.id)
            .ok_or_else(|| OutreachError::not_found(format!("sequence {}", definition.id)))?;
        let stored = &mut entry.value_mut().definition;
        stored.name = definition.name;
        stored.description = definition.description;
        stored.is_active = definition.is_active;
        stored.updated_at = definition.updated_at;
        Ok(stored.clone())
    }

    fn delete_sequence(&self, id: Uuid) -> OutreachResult<bool> {
        if self.sequences.remove(&id).is_none() {
            return Ok(false);
        }

        // Inserts that saw the sequence hold their enrollment slot until the
        // assignment row exists, so sweeping enrollments first catches them.
        self.enrollments.retain(|(sequence_id, _), _| *sequence_id != id);
        let assignment_ids: Vec<Uuid> = self
            .assignments
            .iter()
            .filter(|r| r.value().sequence_id == id)
            .map(|r| *r.key())
            .collect();
        for assignment_id in &assignment_ids {
            self.assignments.remove(assignment_id);
            self.pending.remove(assignment_id);
        }
        self.activities.retain(|_, a| a.sequence_id != id);

        debug!(
            sequence_id = %id,
            assignments = assignment_ids.len(),
            "Cascaded sequence delete"
        );
        Ok(true)
    }

    fn replace_steps(
        &self,
        sequence_id: Uuid,
        expected_version: u64,
        steps: Vec<SequenceStep>,
        at: DateTime<Utc>,
    ) -> OutreachResult<SequenceWithSteps> {
        check_ordering(sequence_id, &steps)?;
        let mut entry = self
            .sequences
            .get_mut(&sequence_id)
            .ok_or_else(|| OutreachError::not_found(format!("sequence {}", sequence_id)))?;
        let stored = entry.value_mut();
        if stored.definition.version != expected_version {
            return Err(OutreachError::conflict(format!(
                "sequence {} was modified concurrently (version {} != {})",
                sequence_id, stored.definition.version, expected_version
            )));
        }
        stored.definition.total_steps = steps.len() as u32;
        stored.definition.version += 1;
        stored.definition.updated_at = at;
        stored.steps = steps;
        Ok(stored.snapshot())
    }

    fn insert_assignments(
        &self,
        assignments: Vec<SequenceAssignment>,
    ) -> OutreachResult<Vec<SequenceAssignment>> {
        let mut inserted = Vec::with_capacity(assignments.len());
        for assignment in assignments {
            let key = (assignment.sequence_id, assignment.prospect_id.clone());
            match self.enrollments.entry(key) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(slot) => {
                    if !self.sequences.contains_key(&assignment.sequence_id) {
                        return Err(OutreachError::not_found(format!(
                            "sequence {}",
                            assignment.sequence_id
                        )));
                    }
                    self.assignments.insert(assignment.id, assignment.clone());
                    slot.insert(assignment.id);
                }
            }
            inserted.push(assignment);
        }
        Ok(inserted)
    }

    fn get_assignment(&self, id: Uuid) -> OutreachResult<Option<SequenceAssignment>> {
        Ok(self.assignments.get(&id).map(|r| r.value().clone()))
    }

    fn list_assignments(&self, sequence_id: Uuid) -> OutreachResult<Vec<SequenceAssignment>> {
        let mut assignments: Vec<SequenceAssignment> = self
            .assignments
            .iter()
            .filter(|r| r.value().sequence_id == sequence_id)
            .map(|r| r.value().clone())
            .collect();
        assignments.sort_by(|a, b| {
            b.started_at
                .cmp(&a.started_at)
                .then_with(|| a.prospect_id.cmp(&b.prospect_id))
        });
        Ok(assignments)
    }

    fn count_assignments(&self, sequence_id: Uuid) -> OutreachResult<usize> {
        Ok(self
            .assignments
            .iter()
            .filter(|r| r.value().sequence_id == sequence_id)
            .count())
    }

    fn set_assignment_status(
        &self,
        id: Uuid,
        expected: AssignmentStatus,
        to: AssignmentStatus,
    ) -> OutreachResult<SequenceAssignment> {
        let mut entry = self
            .assignments
            .get_mut(&id)
            .ok_or_else(|| OutreachError::not_found(format!("assignment {}", id)))?;
        if entry.status != expected {
            return Err(OutreachError::conflict(format!(
                "assignment {} is {:?}, expected {:?}",
                id, entry.status, expected
            )));
        }
        entry.status = to;
        Ok(entry.clone())
    }

    fn apply_tick(
        &self,
        assignment_id: Uuid,
        guard: TickGuard,
        activity: Option<SequenceActivity>,
        update: AssignmentUpdate,
    ) -> OutreachResult<SequenceAssignment> {
        // Holding the assignment entry serializes ticks for this assignment.
        let mut entry = self
            .assignments
            .get_mut(&assignment_id)
            .ok_or_else(|| OutreachError::not_found(format!("assignment {}", assignment_id)))?;
        if !guard.matches(&entry) {
            return Err(OutreachError::conflict(format!(
                "assignment {} changed while advancing (now {:?} at step {})",
                assignment_id, entry.status, entry.current_step
            )));
        }
        if !self.sequences.contains_key(&entry.sequence_id) {
            return Err(OutreachError::not_found(format!("sequence {}", entry.sequence_id)));
        }

        match self.pending.entry(assignment_id) {
            Entry::Occupied(existing) => {
                return Err(OutreachError::conflict(format!(
                    "assignment {} is awaiting the outcome of activity {}",
                    assignment_id,
                    existing.get()
                )));
            }
            Entry::Vacant(slot) => {
                if let Some(pending) = activity
                    .as_ref()
                    .filter(|a| a.status == ActivityStatus::Pending)
                {
                    slot.insert(pending.id);
                }
            }
        }
        if let Some(activity) = activity {
            self.activities.insert(activity.id, activity);
        }

        update.apply_to(entry.value_mut());
        Ok(entry.clone())
    }

    fn get_activity(&self, id: Uuid) -> OutreachResult<Option<SequenceActivity>> {
        Ok(self.activities.get(&id).map(|r| r.value().clone()))
    }

    fn list_activities(&self, assignment_id: Uuid) -> OutreachResult<Vec<SequenceActivity>> {
        let mut activities: Vec<SequenceActivity> = self
            .activities
            .iter()
            .filter(|r| r.value().assignment_id == assignment_id)
            .map(|r| r.value().clone())
            .collect();
        activities.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.step_number.cmp(&b.step_number))
        });
        Ok(activities)
    }

    fn list_sequence_activities(&self, sequence_id: Uuid) -> OutreachResult<Vec<SequenceActivity>> {
        Ok(self
            .activities
            .iter()
            .filter(|r| r.value().sequence_id == sequence_id)
            .map(|r| r.value().clone())
            .collect())
    }

    fn resolve_activity(
        &self,
        activity_id: Uuid,
        resolution: ActivityResolution,
    ) -> OutreachResult<(SequenceActivity, SequenceAssignment)> {
        if !resolution.status.is_terminal() {
            return Err(OutreachError::validation(
                "an activity can only be resolved to a terminal status",
            ));
        }
        let assignment_id = self
            .activities
            .get(&activity_id)
            .map(|r| r.value().assignment_id)
            .ok_or_else(|| OutreachError::not_found(format!("activity {}", activity_id)))?;

        let mut assignment = self
            .assignments
            .get_mut(&assignment_id)
            .ok_or_else(|| OutreachError::not_found(format!("assignment {}", assignment_id)))?;

        let activity = {
            let mut activity = self
                .activities
                .get_mut(&activity_id)
                .ok_or_else(|| OutreachError::not_found(format!("activity {}", activity_id)))?;
            if activity.status.is_terminal() {
                return Err(OutreachError::conflict(format!(
                    "activity {} was already resolved as {:?}",
                    activity_id, activity.status
                )));
            }
            activity.status = resolution.status;
            activity.completed_at = Some(resolution.resolved_at);
            if resolution.notes.is_some() {
                activity.notes = resolution.notes;
            }
            activity.clone()
        };
        self.pending
            .remove_if(&assignment_id, |_, pending_id| *pending_id == activity_id);

        if !assignment.status.is_terminal() {
            match resolution.effect {
                OutcomeEffect::AdvanceTo(step) => {
                    assignment.current_step = assignment.current_step.max(step);
                }
                OutcomeEffect::KeepStep => {}
                OutcomeEffect::StopAssignment => {
                    assignment.status = AssignmentStatus::Stopped;
                }
            }
            assignment.last_activity_at = Some(resolution.resolved_at);
        }

        Ok((activity, assignment.clone()))
    }
}
