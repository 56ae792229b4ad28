//! Step Advancer: moves one assignment through its sequence, one tick at a
//! time, and applies outcomes reported by the external executor.
//!
//! A tick never increments `current_step` for a scheduled activity; the
//! step only moves when the executor reports the outcome. Ticks for the
//! same assignment are serialized by the store's guarded `apply_tick`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use outreach_core::event_bus::{make_event, EventSink};
use outreach_core::types::SequenceEventType;
use outreach_core::{FailurePolicy, OutreachError, OutreachResult};
use tracing::{debug, info};
use uuid::Uuid;

use crate::schedule;
use crate::state_machine::AssignmentStateMachine;
use crate::store::{
    ActivityResolution, AssignmentUpdate, OutcomeEffect, SequenceRepository, TickGuard,
};
use crate::types::{
    ActivityStatus, AdvanceResult, AssignmentStatus, OutcomeReport, OutcomeResult,
    SequenceActivity, SequenceAssignment, SequenceStep, TickKind,
};

#[derive(Clone)]
pub struct StepAdvancer {
    store: Arc<dyn SequenceRepository>,
    events: Arc<dyn EventSink>,
    state_machine: Arc<AssignmentStateMachine>,
    failure_policy: FailurePolicy,
}

impl StepAdvancer {
    pub fn new(
        store: Arc<dyn SequenceRepository>,
        events: Arc<dyn EventSink>,
        failure_policy: FailurePolicy,
    ) -> Self {
        Self {
            store,
            events,
            state_machine: Arc::new(AssignmentStateMachine::new()),
            failure_policy,
        }
    }

    pub fn execute_next_step(&self, assignment_id: Uuid) -> OutreachResult<AdvanceResult> {
        self.execute_next_step_at(assignment_id, Utc::now())
    }

    /// Runs one tick for the assignment.
    ///
    /// Completed and stopped assignments are refused with `Conflict`, as
    /// are paused ones and ones still waiting on a pending activity. A
    /// current step that no longer exists is `NotFound`. In every failure
    /// case the assignment is left untouched.
    pub fn execute_next_step_at(
        &self,
        assignment_id: Uuid,
        now: DateTime<Utc>,
    ) -> OutreachResult<AdvanceResult> {
        metrics::counter!("advancer.ticks").increment(1);
        let assignment = self
            .store
            .get_assignment(assignment_id)?
            .ok_or_else(|| OutreachError::not_found(format!("assignment {}", assignment_id)))?;

        match assignment.status {
            AssignmentStatus::Completed | AssignmentStatus::Stopped => {
                return Err(OutreachError::conflict(format!(
                    "assignment {} is {:?} and cannot advance",
                    assignment_id, assignment.status
                )));
            }
            AssignmentStatus::Paused => {
                return Err(OutreachError::conflict(format!(
                    "assignment {} is paused",
                    assignment_id
                )));
            }
            AssignmentStatus::Active => {}
        }

        let sequence = self
            .store
            .get_sequence(assignment.sequence_id)?
            .ok_or_else(|| {
                OutreachError::not_found(format!("sequence {}", assignment.sequence_id))
            })?;
        let guard = TickGuard::of(&assignment);

        if assignment.current_step > sequence.definition.total_steps {
            return self.complete(&assignment, guard, now);
        }

        let step = sequence
            .steps
            .into_iter()
            .find(|s| s.step_number == assignment.current_step)
            .ok_or_else(|| {
                OutreachError::not_found(format!(
                    "step {} of sequence {} referenced by assignment {}",
                    assignment.current_step, assignment.sequence_id, assignment_id
                ))
            })?;

        if !step.is_active {
            return self.skip(&assignment, guard, step, now);
        }

        let scheduled_at = schedule::scheduled_at(&step, &assignment, now)?;
        let activity = new_activity(&assignment, &step, ActivityStatus::Pending, scheduled_at, now);
        let updated = self.store.apply_tick(
            assignment_id,
            guard,
            Some(activity.clone()),
            AssignmentUpdate {
                last_activity_at: Some(now),
                next_step_scheduled_at: Some(Some(scheduled_at)),
                ..Default::default()
            },
        )?;

        info!(
            assignment_id = %assignment_id,
            activity_id = %activity.id,
            step_number = step.step_number,
            action_type = ?step.action_type,
            scheduled_at = %scheduled_at,
            "Scheduled sequence activity"
        );
        metrics::counter!("advancer.activities.scheduled").increment(1);
        self.events.emit(make_event(
            SequenceEventType::ActivityScheduled,
            updated.sequence_id,
            Some(assignment_id),
            Some(updated.prospect_id.clone()),
            Some(step.step_number),
        ));

        Ok(AdvanceResult {
            outcome: TickKind::Scheduled,
            assignment: updated,
            activity: Some(activity),
            step: Some(step),
        })
    }

    fn complete(
        &self,
        assignment: &SequenceAssignment,
        guard: TickGuard,
        now: DateTime<Utc>,
    ) -> OutreachResult<AdvanceResult> {
        self.state_machine
            .check(assignment.status, AssignmentStatus::Completed)?;
        let updated = self.store.apply_tick(
            assignment.id,
            guard,
            None,
            AssignmentUpdate {
                status: Some(AssignmentStatus::Completed),
                completed_at: Some(now),
                next_step_scheduled_at: Some(None),
                ..Default::default()
            },
        )?;

        info!(
            assignment_id = %assignment.id,
            sequence_id = %assignment.sequence_id,
            "Assignment completed its sequence"
        );
        metrics::counter!("advancer.completed").increment(1);
        self.events.emit(make_event(
            SequenceEventType::AssignmentCompleted,
            updated.sequence_id,
            Some(updated.id),
            Some(updated.prospect_id.clone()),
            None,
        ));

        Ok(AdvanceResult {
            outcome: TickKind::Completed,
            assignment: updated,
            activity: None,
            step: None,
        })
    }

    /// Records an inactive step as skipped and moves past it.
    fn skip(
        &self,
        assignment: &SequenceAssignment,
        guard: TickGuard,
        step: SequenceStep,
        now: DateTime<Utc>,
    ) -> OutreachResult<AdvanceResult> {
        let mut activity = new_activity(assignment, &step, ActivityStatus::Skipped, now, now);
        activity.completed_at = Some(now);
        activity.notes = Some("step is inactive".to_string());

        let updated = self.store.apply_tick(
            assignment.id,
            guard,
            Some(activity.clone()),
            AssignmentUpdate {
                current_step: Some(step.step_number + 1),
                last_activity_at: Some(now),
                next_step_scheduled_at: Some(None),
                ..Default::default()
            },
        )?;

        debug!(
            assignment_id = %assignment.id,
            step_number = step.step_number,
            "Skipped inactive step"
        );
        self.events.emit(make_event(
            SequenceEventType::ActivitySkipped,
            updated.sequence_id,
            Some(updated.id),
            Some(updated.prospect_id.clone()),
            Some(step.step_number),
        ));

        Ok(AdvanceResult {
            outcome: TickKind::Skipped,
            assignment: updated,
            activity: Some(activity),
            step: Some(step),
        })
    }

    pub fn report_outcome(
        &self,
        activity_id: Uuid,
        report: OutcomeReport,
    ) -> OutreachResult<OutcomeResult> {
        self.report_outcome_at(activity_id, report, Utc::now())
    }

    /// Applies the executor's report for a pending activity.
    ///
    /// `Completed` and `Skipped` move the assignment past the activity's
    /// step, located by id so a renumber in between is honored. `Failed`
    /// follows the configured [`FailurePolicy`].
    pub fn report_outcome_at(
        &self,
        activity_id: Uuid,
        report: OutcomeReport,
        now: DateTime<Utc>,
    ) -> OutreachResult<OutcomeResult> {
        if !report.status.is_terminal() {
            return Err(OutreachError::validation(
                "outcome status must be COMPLETED, FAILED or SKIPPED",
            ));
        }
        let activity = self
            .store
            .get_activity(activity_id)?
            .ok_or_else(|| OutreachError::not_found(format!("activity {}", activity_id)))?;
        if activity.status.is_terminal() {
            return Err(OutreachError::conflict(format!(
                "activity {} was already resolved as {:?}",
                activity_id, activity.status
            )));
        }

        let effect = match (report.status, self.failure_policy) {
            (ActivityStatus::Failed, FailurePolicy::Retry) => OutcomeEffect::KeepStep,
            (ActivityStatus::Failed, FailurePolicy::Stop) => OutcomeEffect::StopAssignment,
            _ => self.advance_past(&activity)?,
        };

        let (activity, assignment) = self.store.resolve_activity(
            activity_id,
            ActivityResolution {
                status: report.status,
                notes: report.notes,
                resolved_at: now,
                effect,
            },
        )?;

        info!(
            activity_id = %activity_id,
            assignment_id = %assignment.id,
            status = ?activity.status,
            current_step = assignment.current_step,
            "Recorded activity outcome"
        );
        metrics::counter!("activities.resolved").increment(1);
        self.events.emit(make_event(
            SequenceEventType::ActivityResolved,
            assignment.sequence_id,
            Some(assignment.id),
            Some(assignment.prospect_id.clone()),
            Some(activity.step_number),
        ));
        if effect == OutcomeEffect::StopAssignment && assignment.status == AssignmentStatus::Stopped {
            self.events.emit(make_event(
                SequenceEventType::AssignmentStopped,
                assignment.sequence_id,
                Some(assignment.id),
                Some(assignment.prospect_id.clone()),
                Some(assignment.current_step),
            ));
        }

        Ok(OutcomeResult {
            activity,
            assignment,
        })
    }

    /// Target step after the activity's step, by its number as of now. A step
    /// deleted in the meantime leaves the assignment where it is, because its
    /// number already points at the step that followed.
    fn advance_past(&self, activity: &SequenceActivity) -> OutreachResult<OutcomeEffect> {
        let sequence = self
            .store
            .get_sequence(activity.sequence_id)?
            .ok_or_else(|| OutreachError::not_found(format!("sequence {}", activity.sequence_id)))?;
        Ok(sequence
            .steps
            .iter()
            .find(|s| s.id == activity.step_id)
            .map(|s| OutcomeEffect::AdvanceTo(s.step_number + 1))
            .unwrap_or(OutcomeEffect::KeepStep))
    }
}

fn new_activity(
    assignment: &SequenceAssignment,
    step: &SequenceStep,
    status: ActivityStatus,
    scheduled_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> SequenceActivity {
    SequenceActivity {
        id: Uuid::new_v4(),
        assignment_id: assignment.id,
        sequence_id: assignment.sequence_id,
        step_id: step.id,
        step_number: step.step_number,
        action_type: step.action_type,
        status,
        scheduled_at,
        completed_at: None,
        notes: None,
        created_at: now,
    }
}
