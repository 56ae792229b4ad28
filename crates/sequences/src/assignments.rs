//! Assignment Manager: binds prospects to sequences and controls the
//! externally driven pause, resume and stop transitions.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use outreach_core::event_bus::{make_event, EventSink};
use outreach_core::types::SequenceEventType;
use outreach_core::{OutreachError, OutreachResult};
use tracing::info;
use uuid::Uuid;

use crate::state_machine::AssignmentStateMachine;
use crate::store::SequenceRepository;
use crate::types::{
    AssignResult, AssignmentDetail, AssignmentStatus, SequenceAssignment,
};

#[derive(Clone)]
pub struct AssignmentManager {
    store: Arc<dyn SequenceRepository>,
    events: Arc<dyn EventSink>,
    state_machine: Arc<AssignmentStateMachine>,
    max_prospects_per_assign: usize,
}

impl AssignmentManager {
    pub fn new(
        store: Arc<dyn SequenceRepository>,
        events: Arc<dyn EventSink>,
        max_prospects_per_assign: usize,
    ) -> Self {
        Self {
            store,
            events,
            state_machine: Arc::new(AssignmentStateMachine::new()),
            max_prospects_per_assign,
        }
    }

    pub fn assign_prospects(
        &self,
        sequence_id: Uuid,
        prospect_ids: &[String],
    ) -> OutreachResult<AssignResult> {
        self.assign_prospects_at(sequence_id, prospect_ids, Utc::now())
    }

    /// Creates an `Active` assignment at step 1 for every prospect not yet
    /// bound to the sequence. Existing pairs are skipped, not reported as
    /// errors. No activity is scheduled here; the first tick does that.
    pub fn assign_prospects_at(
        &self,
        sequence_id: Uuid,
        prospect_ids: &[String],
        now: DateTime<Utc>,
    ) -> OutreachResult<AssignResult> {
        if prospect_ids.is_empty() {
            return Err(OutreachError::validation("prospectIds must not be empty"));
        }
        if prospect_ids.len() > self.max_prospects_per_assign {
            return Err(OutreachError::validation(format!(
                "at most {} prospects can be assigned per request",
                self.max_prospects_per_assign
            )));
        }

        let sequence = self
            .store
            .get_sequence(sequence_id)?
            .ok_or_else(|| OutreachError::not_found(format!("sequence {}", sequence_id)))?;
        if !sequence.definition.is_active {
            return Err(OutreachError::conflict(format!(
                "sequence {} is inactive",
                sequence_id
            )));
        }

        let mut seen = HashSet::new();
        let mut candidates = Vec::with_capacity(prospect_ids.len());
        for raw in prospect_ids {
            let prospect_id = raw.trim();
            if prospect_id.is_empty() {
                return Err(OutreachError::validation("prospect ids must not be blank"));
            }
            if !seen.insert(prospect_id.to_string()) {
                continue;
            }
            candidates.push(SequenceAssignment {
                id: Uuid::new_v4(),
                sequence_id,
                prospect_id: prospect_id.to_string(),
                status: AssignmentStatus::Active,
                current_step: 1,
                started_at: now,
                completed_at: None,
                last_activity_at: None,
                next_step_scheduled_at: None,
            });
        }

        let requested = candidates.len();
        let assignments = self.store.insert_assignments(candidates)?;
        let skipped = requested - assignments.len();

        for assignment in &assignments {
            self.events.emit(make_event(
                SequenceEventType::ProspectAssigned,
                sequence_id,
                Some(assignment.id),
                Some(assignment.prospect_id.clone()),
                None,
            ));
        }
        metrics::counter!("assignments.created").increment(assignments.len() as u64);
        metrics::counter!("assignments.skipped_duplicates").increment(skipped as u64);
        info!(
            sequence_id = %sequence_id,
            assigned = assignments.len(),
            skipped,
            "Assigned prospects"
        );

        Ok(AssignResult {
            assigned: assignments.len(),
            skipped,
            assignments,
        })
    }

    pub fn get_assignment(&self, id: Uuid) -> OutreachResult<AssignmentDetail> {
        let assignment = self
            .store
            .get_assignment(id)?
            .ok_or_else(|| OutreachError::not_found(format!("assignment {}", id)))?;
        let activities = self.store.list_activities(id)?;
        Ok(AssignmentDetail {
            assignment,
            activities,
        })
    }

    /// Assignments of a sequence, newest first.
    pub fn list_assignments(&self, sequence_id: Uuid) -> OutreachResult<Vec<SequenceAssignment>> {
        if self.store.get_sequence(sequence_id)?.is_none() {
            return Err(OutreachError::not_found(format!("sequence {}", sequence_id)));
        }
        self.store.list_assignments(sequence_id)
    }

    pub fn pause(&self, id: Uuid) -> OutreachResult<SequenceAssignment> {
        self.transition(id, AssignmentStatus::Paused, SequenceEventType::AssignmentPaused)
    }

    pub fn resume(&self, id: Uuid) -> OutreachResult<SequenceAssignment> {
        self.transition(id, AssignmentStatus::Active, SequenceEventType::AssignmentResumed)
    }

    /// Stops an assignment for good. An in-flight tick that already passed
    /// its status check still finishes; the next one is refused.
    pub fn stop(&self, id: Uuid) -> OutreachResult<SequenceAssignment> {
        self.transition(id, AssignmentStatus::Stopped, SequenceEventType::AssignmentStopped)
    }

    fn transition(
        &self,
        id: Uuid,
        to: AssignmentStatus,
        event_type: SequenceEventType,
    ) -> OutreachResult<SequenceAssignment> {
        let current = self
            .store
            .get_assignment(id)?
            .ok_or_else(|| OutreachError::not_found(format!("assignment {}", id)))?;
        if current.status == to {
            return Err(OutreachError::conflict(format!(
                "assignment {} is already {:?}",
                id, to
            )));
        }
        self.state_machine.check(current.status, to)?;

        let updated = self.store.set_assignment_status(id, current.status, to)?;
        info!(assignment_id = %id, from = ?current.status, to = ?to, "Assignment status changed");
        self.events.emit(make_event(
            event_type,
            updated.sequence_id,
            Some(id),
            Some(updated.prospect_id.clone()),
            Some(updated.current_step),
        ));
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::DefinitionStore;
    use crate::store::InMemorySequenceStore;
    use crate::types::{ActionType, NewSequence, NewStep, SequencePatch};
    use outreach_core::event_bus::noop_sink;

    fn setup() -> (DefinitionStore, AssignmentManager, Uuid) {
        let store: Arc<dyn SequenceRepository> = Arc::new(InMemorySequenceStore::new());
        let definitions = DefinitionStore::new(store.clone(), noop_sink());
        let manager = AssignmentManager::new(store, noop_sink(), 5);
        let created = definitions
            .create_sequence(NewSequence {
                name: "Demo follow-up".to_string(),
                steps: vec![NewStep {
                    action_type: Some(ActionType::Email),
                    ..Default::default()
                }],
                ..Default::default()
            })
            .unwrap();
        (definitions, manager, created.definition.id)
    }

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_assign_is_idempotent() {
        let (_, manager, sequence_id) = setup();

        let first = manager
            .assign_prospects(sequence_id, &ids(&["p1", "p2"]))
            .unwrap();
        assert_eq!(first.assigned, 2);
        assert!(first
            .assignments
            .iter()
            .all(|a| a.status == AssignmentStatus::Active && a.current_step == 1));

        let second = manager
            .assign_prospects(sequence_id, &ids(&["p2", "p3", "p3"]))
            .unwrap();
        assert_eq!(second.assigned, 1);
        assert_eq!(second.skipped, 1);

        let all = manager.list_assignments(sequence_id).unwrap();
        assert_eq!(all.len(), 3);
        let mut prospects: Vec<&str> = all.iter().map(|a| a.prospect_id.as_str()).collect();
        prospects.sort();
        assert_eq!(prospects, vec!["p1", "p2", "p3"]);
    }

    #[test]
    fn test_assign_schedules_nothing() {
        let (_, manager, sequence_id) = setup();
        let result = manager.assign_prospects(sequence_id, &ids(&["p1"])).unwrap();
        let detail = manager.get_assignment(result.assignments[0].id).unwrap();
        assert!(detail.activities.is_empty());
        assert!(detail.assignment.next_step_scheduled_at.is_none());
    }

    #[test]
    fn test_assign_validation() {
        let (definitions, manager, sequence_id) = setup();

        assert!(matches!(
            manager.assign_prospects(sequence_id, &[]).unwrap_err(),
            OutreachError::Validation(_)
        ));
        assert!(matches!(
            manager
                .assign_prospects(sequence_id, &ids(&["a", "b", "c", "d", "e", "f"]))
                .unwrap_err(),
            OutreachError::Validation(_)
        ));
        assert!(matches!(
            manager.assign_prospects(sequence_id, &ids(&[" "])).unwrap_err(),
            OutreachError::Validation(_)
        ));
        assert!(matches!(
            manager.assign_prospects(Uuid::new_v4(), &ids(&["p1"])).unwrap_err(),
            OutreachError::NotFound(_)
        ));

        definitions
            .update_sequence(
                sequence_id,
                SequencePatch {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(matches!(
            manager.assign_prospects(sequence_id, &ids(&["p1"])).unwrap_err(),
            OutreachError::Conflict(_)
        ));
    }

    #[test]
    fn test_pause_resume_stop() {
        let (_, manager, sequence_id) = setup();
        let id = manager
            .assign_prospects(sequence_id, &ids(&["p1"]))
            .unwrap()
            .assignments[0]
            .id;

        assert_eq!(manager.pause(id).unwrap().status, AssignmentStatus::Paused);
        assert!(matches!(manager.pause(id).unwrap_err(), OutreachError::Conflict(_)));
        assert_eq!(manager.resume(id).unwrap().status, AssignmentStatus::Active);
        assert_eq!(manager.stop(id).unwrap().status, AssignmentStatus::Stopped);

        assert!(matches!(manager.resume(id).unwrap_err(), OutreachError::Conflict(_)));
        assert!(matches!(
            manager.pause(Uuid::new_v4()).unwrap_err(),
            OutreachError::NotFound(_)
        ));
    }
}
