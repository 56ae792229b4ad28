//! Definition Store: sequences and their ordered steps.
//!
//! Every change to a step list is computed on a snapshot, renumbered to
//! `1..=N` and written back with one versioned `replace_steps` call.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use outreach_core::event_bus::{make_event, EventSink};
use outreach_core::types::SequenceEventType;
use outreach_core::{OutreachError, OutreachResult};
use tracing::{info, warn};
use uuid::Uuid;

use crate::store::SequenceRepository;
use crate::types::{
    DelayType, NewSequence, NewStep, SequenceDefinition, SequencePatch, SequenceStep,
    SequenceSummary, SequenceWithSteps, StepPatch,
};

/// Attempts made when another writer changes the step list between our read
/// and our write.
const MAX_STEP_WRITE_ATTEMPTS: usize = 3;

/// Upper bound on a step's `delayDays` (one hundred years).
pub const MAX_DELAY_DAYS: u32 = 36_500;

#[derive(Clone)]
pub struct DefinitionStore {
    store: Arc<dyn SequenceRepository>,
    events: Arc<dyn EventSink>,
}

impl DefinitionStore {
    pub fn new(store: Arc<dyn SequenceRepository>, events: Arc<dyn EventSink>) -> Self {
        Self { store, events }
    }

    /// Creates a definition with its initial steps, numbered in array order.
    pub fn create_sequence(&self, request: NewSequence) -> OutreachResult<SequenceWithSteps> {
        let name = validate_name(&request.name)?;
        let now = Utc::now();
        let id = Uuid::new_v4();

        let steps = request
            .steps
            .into_iter()
            .enumerate()
            .map(|(index, step)| build_step(id, index as u32 + 1, step, now))
            .collect::<OutreachResult<Vec<_>>>()?;

        let definition = SequenceDefinition {
            id,
            name,
            description: request.description,
            is_active: request.is_active.unwrap_or(true),
            total_steps: steps.len() as u32,
            version: 0,
            created_by: request.created_by,
            created_at: now,
            updated_at: now,
        };

        let created = self.store.insert_sequence(definition, steps)?;
        info!(
            sequence_id = %id,
            name = %created.definition.name,
            steps = created.steps.len(),
            "Created sequence"
        );
        metrics::counter!("sequences.created").increment(1);
        self.events
            .emit(make_event(SequenceEventType::SequenceCreated, id, None, None, None));
        Ok(created)
    }

    pub fn get_sequence(&self, id: Uuid) -> OutreachResult<SequenceWithSteps> {
        self.store
            .get_sequence(id)?
            .ok_or_else(|| OutreachError::not_found(format!("sequence {}", id)))
    }

    /// Lists definitions, newest first, with step and assignment counts.
    pub fn list_sequences(&self, is_active: Option<bool>) -> OutreachResult<Vec<SequenceSummary>> {
        self.store
            .list_sequences(is_active)?
            .into_iter()
            .map(|definition| {
                let assignment_count = self.store.count_assignments(definition.id)?;
                Ok(SequenceSummary {
                    step_count: definition.total_steps as usize,
                    assignment_count,
                    definition,
                })
            })
            .collect()
    }

    pub fn update_sequence(
        &self,
        id: Uuid,
        patch: SequencePatch,
    ) -> OutreachResult<SequenceDefinition> {
        let mut definition = self.get_sequence(id)?.definition;
        if let Some(name) = patch.name {
            definition.name = validate_name(&name)?;
        }
        if let Some(description) = patch.description {
            definition.description = Some(description);
        }
        if let Some(is_active) = patch.is_active {
            definition.is_active = is_active;
        }
        definition.updated_at = Utc::now();

        let saved = self.store.save_sequence(definition)?;
        info!(sequence_id = %id, is_active = saved.is_active, "Updated sequence");
        Ok(saved)
    }

    /// Deletes a definition; steps, assignments and activities go with it.
    pub fn delete_sequence(&self, id: Uuid) -> OutreachResult<()> {
        if !self.store.delete_sequence(id)? {
            return Err(OutreachError::not_found(format!("sequence {}", id)));
        }
        info!(sequence_id = %id, "Deleted sequence");
        metrics::counter!("sequences.deleted").increment(1);
        self.events
            .emit(make_event(SequenceEventType::SequenceDeleted, id, None, None, None));
        Ok(())
    }

    /// Appends a step as number `total_steps + 1`.
    pub fn add_step(&self, sequence_id: Uuid, request: NewStep) -> OutreachResult<SequenceStep> {
        let (updated, step_id) = self.rewrite_steps(sequence_id, |steps, now| {
            let step = build_step(sequence_id, steps.len() as u32 + 1, request.clone(), now)?;
            let id = step.id;
            steps.push(step);
            Ok(id)
        })?;

        let step = find_step(&updated, step_id)?;
        info!(
            sequence_id = %sequence_id,
            step_number = step.step_number,
            action_type = ?step.action_type,
            "Added step"
        );
        Ok(step)
    }

    /// Applies a partial update to a step. The step keeps its number.
    pub fn update_step(
        &self,
        sequence_id: Uuid,
        step_id: Uuid,
        patch: StepPatch,
    ) -> OutreachResult<SequenceStep> {
        let (updated, ()) = self.rewrite_steps(sequence_id, |steps, now| {
            let step = steps
                .iter_mut()
                .find(|s| s.id == step_id)
                .ok_or_else(|| step_not_found(sequence_id, step_id))?;
            apply_step_patch(step, patch.clone(), now)
        })?;

        let step = find_step(&updated, step_id)?;
        info!(sequence_id = %sequence_id, step_number = step.step_number, "Updated step");
        Ok(step)
    }

    /// Removes a step and closes the gap so numbering stays `1..=N`.
    pub fn delete_step(&self, sequence_id: Uuid, step_id: Uuid) -> OutreachResult<SequenceWithSteps> {
        let (updated, removed) = self.rewrite_steps(sequence_id, |steps, _| {
            let position = steps
                .iter()
                .position(|s| s.id == step_id)
                .ok_or_else(|| step_not_found(sequence_id, step_id))?;
            Ok(steps.remove(position))
        })?;

        info!(
            sequence_id = %sequence_id,
            removed_step = removed.step_number,
            total_steps = updated.definition.total_steps,
            "Deleted step and renumbered"
        );
        metrics::counter!("sequences.steps.deleted").increment(1);

        // Their current_step now points one step further along.
        let shifted = self.assignments_past_step(sequence_id, removed.step_number)?;
        if shifted > 0 {
            warn!(
                sequence_id = %sequence_id,
                removed_step = removed.step_number,
                shifted_assignments = shifted,
                "Deleted a step that in-flight assignments had already passed; their next step is skipped"
            );
            metrics::counter!("sequences.steps.deleted.shifted_assignments").increment(shifted as u64);
        }
        self.events.emit(make_event(
            SequenceEventType::StepsRenumbered,
            sequence_id,
            None,
            None,
            Some(removed.step_number),
        ));
        Ok(updated)
    }

    /// Counts non-terminal assignments of a sequence that have moved past
    /// `step_number`.
    pub fn assignments_past_step(&self, sequence_id: Uuid, step_number: u32) -> OutreachResult<usize> {
        Ok(self
            .store
            .list_assignments(sequence_id)?
            .iter()
            .filter(|a| !a.status.is_terminal() && a.current_step > step_number)
            .count())
    }

    fn rewrite_steps<T>(
        &self,
        sequence_id: Uuid,
        mut edit: impl FnMut(&mut Vec<SequenceStep>, DateTime<Utc>) -> OutreachResult<T>,
    ) -> OutreachResult<(SequenceWithSteps, T)> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let current = self.get_sequence(sequence_id)?;
            let now = Utc::now();
            let mut steps = current.steps;
            let output = edit(&mut steps, now)?;
            renumber(&mut steps, now);

            match self
                .store
                .replace_steps(sequence_id, current.definition.version, steps, now)
            {
                Ok(updated) => return Ok((updated, output)),
                Err(OutreachError::Conflict(reason)) if attempt < MAX_STEP_WRITE_ATTEMPTS => {
                    warn!(sequence_id = %sequence_id, attempt, %reason, "Step list changed concurrently, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Rewrites step numbers to `1..=N` in list order and returns how many moved.
pub fn renumber(steps: &mut [SequenceStep], now: DateTime<Utc>) -> usize {
    let mut moved = 0;
    for (index, step) in steps.iter_mut().enumerate() {
        let number = index as u32 + 1;
        if step.step_number != number {
            step.step_number = number;
            step.updated_at = now;
            moved += 1;
        }
    }
    moved
}

fn validate_name(name: &str) -> OutreachResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(OutreachError::validation("sequence name must not be empty"));
    }
    Ok(trimmed.to_string())
}

fn check_fixed_date(step: &SequenceStep) -> OutreachResult<()> {
    if step.delay_type == DelayType::FixedDate && step.fixed_date.is_none() {
        return Err(OutreachError::validation(format!(
            "step {} uses FIXED_DATE and needs a fixedDate",
            step.step_number
        )));
    }
    Ok(())
}

fn check_delay_days(step_number: u32, delay_days: u32) -> OutreachResult<()> {
    if delay_days > MAX_DELAY_DAYS {
        return Err(OutreachError::validation(format!(
            "step {} delayDays must be at most {}, got {}",
            step_number, MAX_DELAY_DAYS, delay_days
        )));
    }
    Ok(())
}

fn build_step(
    sequence_id: Uuid,
    step_number: u32,
    request: NewStep,
    now: DateTime<Utc>,
) -> OutreachResult<SequenceStep> {
    let action_type = request.action_type.ok_or_else(|| {
        OutreachError::validation(format!("step {} is missing actionType", step_number))
    })?;
    let name = request
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| action_type.label().to_string());
    check_delay_days(step_number, request.delay_days)?;

    let step = SequenceStep {
        id: Uuid::new_v4(),
        sequence_id,
        step_number,
        name,
        action_type,
        template_id: request.template_id,
        delay_days: request.delay_days,
        delay_type: request.delay_type,
        fixed_date: request.fixed_date,
        conditions: request.conditions,
        is_active: request.is_active.unwrap_or(true),
        created_at: now,
        updated_at: now,
    };
    check_fixed_date(&step)?;
    Ok(step)
}

fn apply_step_patch(step: &mut SequenceStep, patch: StepPatch, now: DateTime<Utc>) -> OutreachResult<()> {
    if let Some(name) = patch.name {
        let name = name.trim();
        if name.is_empty() {
            return Err(OutreachError::validation("step name must not be empty"));
        }
        step.name = name.to_string();
    }
    if let Some(action_type) = patch.action_type {
        step.action_type = action_type;
    }
    if let Some(template_id) = patch.template_id {
        step.template_id = template_id;
    }
    if let Some(delay_days) = patch.delay_days {
        check_delay_days(step.step_number, delay_days)?;
        step.delay_days = delay_days;
    }
    if let Some(delay_type) = patch.delay_type {
        step.delay_type = delay_type;
    }
    if let Some(fixed_date) = patch.fixed_date {
        step.fixed_date = fixed_date;
    }
    if let Some(conditions) = patch.conditions {
        step.conditions = conditions;
    }
    if let Some(is_active) = patch.is_active {
        step.is_active = is_active;
    }
    step.updated_at = now;
    check_fixed_date(step)
}

fn find_step(sequence: &SequenceWithSteps, step_id: Uuid) -> OutreachResult<SequenceStep> {
    sequence
        .steps
        .iter()
        .find(|s| s.id == step_id)
        .cloned()
        .ok_or_else(|| step_not_found(sequence.definition.id, step_id))
}

fn step_not_found(sequence_id: Uuid, step_id: Uuid) -> OutreachError {
    OutreachError::not_found(format!("step {} in sequence {}", step_id, sequence_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ActivityResolution, AssignmentUpdate, InMemorySequenceStore, TickGuard};
    use crate::types::{ActionType, AssignmentStatus, SequenceActivity, SequenceAssignment};
    use outreach_core::event_bus::{capture_sink, noop_sink};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn definitions() -> DefinitionStore {
        DefinitionStore::new(Arc::new(InMemorySequenceStore::new()), noop_sink())
    }

    fn email(name: &str) -> NewStep {
        NewStep {
            name: Some(name.to_string()),
            action_type: Some(ActionType::Email),
            ..Default::default()
        }
    }

    fn new_sequence(steps: Vec<NewStep>) -> NewSequence {
        NewSequence {
            name: "Cold Outreach".to_string(),
            steps,
            ..Default::default()
        }
    }

    fn assert_contiguous(sequence: &SequenceWithSteps) {
        let numbers: Vec<u32> = sequence.steps.iter().map(|s| s.step_number).collect();
        let expected: Vec<u32> = (1..=sequence.definition.total_steps).collect();
        assert_eq!(numbers, expected);
        assert_eq!(sequence.steps.len() as u32, sequence.definition.total_steps);
    }

    #[test]
    fn test_create_numbers_steps_in_order() {
        let store = definitions();
        let created = store
            .create_sequence(new_sequence(vec![email("Intro"), email("Bump"), email("Breakup")]))
            .unwrap();

        assert_eq!(created.definition.total_steps, 3);
        assert!(created.definition.is_active);
        assert_eq!(created.steps[2].name, "Breakup");
        assert_contiguous(&created);
    }

    #[test]
    fn test_create_rejects_missing_action_type() {
        let store = definitions();
        let mut missing = email("Call them");
        missing.action_type = None;

        let err = store
            .create_sequence(new_sequence(vec![email("Intro"), missing]))
            .unwrap_err();
        assert!(matches!(err, OutreachError::Validation(_)));
        assert!(store.list_sequences(None).unwrap().is_empty());
    }

    #[test]
    fn test_create_rejects_blank_name_and_dateless_fixed_step() {
        let store = definitions();
        let mut blank = new_sequence(vec![]);
        blank.name = "   ".to_string();
        assert!(matches!(
            store.create_sequence(blank).unwrap_err(),
            OutreachError::Validation(_)
        ));

        let mut fixed = email("Launch day");
        fixed.delay_type = DelayType::FixedDate;
        assert!(matches!(
            store.create_sequence(new_sequence(vec![fixed])).unwrap_err(),
            OutreachError::Validation(_)
        ));
    }

    #[test]
    fn test_unnamed_step_uses_action_label() {
        let store = definitions();
        let created = store
            .create_sequence(new_sequence(vec![NewStep {
                action_type: Some(ActionType::Call),
                ..Default::default()
            }]))
            .unwrap();
        assert_eq!(created.steps[0].name, "Call");
    }

    #[test]
    fn test_add_step_appends() {
        let store = definitions();
        let created = store.create_sequence(new_sequence(vec![email("Intro")])).unwrap();

        let added = store.add_step(created.definition.id, email("Follow up")).unwrap();
        assert_eq!(added.step_number, 2);

        let fetched = store.get_sequence(created.definition.id).unwrap();
        assert_eq!(fetched.definition.total_steps, 2);
        assert_eq!(fetched.definition.version, 1);
        assert_contiguous(&fetched);
    }

    #[test]
    fn test_delete_middle_step_renumbers() {
        let sink = capture_sink();
        let store = DefinitionStore::new(Arc::new(InMemorySequenceStore::new()), sink.clone());
        let created = store
            .create_sequence(new_sequence(vec![email("One"), email("Two"), email("Three")]))
            .unwrap();
        let id = created.definition.id;
        let third = created.steps[2].id;

        let updated = store.delete_step(id, created.steps[1].id).unwrap();
        assert_eq!(updated.definition.total_steps, 2);
        assert_contiguous(&updated);
        let moved = updated.steps.iter().find(|s| s.id == third).unwrap();
        assert_eq!(moved.step_number, 2);
        assert_eq!(moved.name, "Three");
        assert_eq!(sink.count_type(SequenceEventType::StepsRenumbered), 1);
    }

    #[test]
    fn test_numbering_stays_contiguous_through_edits() {
        let store = definitions();
        let created = store.create_sequence(new_sequence(vec![])).unwrap();
        let id = created.definition.id;

        for n in 0..6 {
            store.add_step(id, email(&format!("Step {}", n))).unwrap();
        }
        for position in [0usize, 3, 1] {
            let current = store.get_sequence(id).unwrap();
            store.delete_step(id, current.steps[position].id).unwrap();
            assert_contiguous(&store.get_sequence(id).unwrap());
        }
        store.add_step(id, email("Last")).unwrap();

        let final_state = store.get_sequence(id).unwrap();
        assert_eq!(final_state.definition.total_steps, 4);
        assert_contiguous(&final_state);
        assert_eq!(final_state.steps[3].name, "Last");
    }

    #[test]
    fn test_update_step_keeps_number() {
        let store = definitions();
        let created = store
            .create_sequence(new_sequence(vec![email("One"), email("Two")]))
            .unwrap();
        let target = created.steps[1].id;

        let updated = store
            .update_step(
                created.definition.id,
                target,
                StepPatch {
                    name: Some("Second touch".to_string()),
                    delay_days: Some(4),
                    action_type: Some(ActionType::Call),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.step_number, 2);
        assert_eq!(updated.delay_days, 4);
        assert_eq!(updated.action_type, ActionType::Call);

        let missing = store
            .update_step(created.definition.id, Uuid::new_v4(), StepPatch::default())
            .unwrap_err();
        assert!(matches!(missing, OutreachError::NotFound(_)));
    }

    #[test]
    fn test_update_sequence_and_filter() {
        let store = definitions();
        let first = store.create_sequence(new_sequence(vec![email("One")])).unwrap();
        store.create_sequence(new_sequence(vec![])).unwrap();

        let updated = store
            .update_sequence(
                first.definition.id,
                SequencePatch {
                    is_active: Some(false),
                    name: Some("Paused outreach".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(!updated.is_active);
        assert_eq!(updated.total_steps, 1);

        let inactive = store.list_sequences(Some(false)).unwrap();
        assert_eq!(inactive.len(), 1);
        assert_eq!(inactive[0].definition.name, "Paused outreach");
        assert_eq!(inactive[0].step_count, 1);
        assert_eq!(store.list_sequences(None).unwrap().len(), 2);
    }

    #[test]
    fn test_delete_unknown_sequence_is_not_found() {
        let store = definitions();
        let err = store.delete_sequence(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, OutreachError::NotFound(_)));
    }

    /// Store where another writer touches the step list right before each of
    /// the next `interference` step writes.
    struct ContendedStore {
        inner: InMemorySequenceStore,
        interference: AtomicUsize,
        step_writes: AtomicUsize,
    }

    impl ContendedStore {
        fn new(interference: usize) -> Self {
            Self {
                inner: InMemorySequenceStore::new(),
                interference: AtomicUsize::new(interference),
                step_writes: AtomicUsize::new(0),
            }
        }
    }

    impl SequenceRepository for ContendedStore {
        fn insert_sequence(
            &self,
            definition: SequenceDefinition,
            steps: Vec<SequenceStep>,
        ) -> OutreachResult<SequenceWithSteps> {
            self.inner.insert_sequence(definition, steps)
        }

        fn get_sequence(&self, id: Uuid) -> OutreachResult<Option<SequenceWithSteps>> {
            self.inner.get_sequence(id)
        }

        fn list_sequences(&self, is_active: Option<bool>) -> OutreachResult<Vec<SequenceDefinition>> {
            self.inner.list_sequences(is_active)
        }

        fn save_sequence(&self, definition: SequenceDefinition) -> OutreachResult<SequenceDefinition> {
            self.inner.save_sequence(definition)
        }

        fn delete_sequence(&self, id: Uuid) -> OutreachResult<bool> {
            self.inner.delete_sequence(id)
        }

        fn replace_steps(
            &self,
            sequence_id: Uuid,
            expected_version: u64,
            steps: Vec<SequenceStep>,
            at: DateTime<Utc>,
        ) -> OutreachResult<SequenceWithSteps> {
            self.step_writes.fetch_add(1, Ordering::SeqCst);
            let interfere = self
                .interference
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if interfere {
                if let Some(current) = self.inner.get_sequence(sequence_id)? {
                    self.inner.replace_steps(
                        sequence_id,
                        current.definition.version,
                        current.steps,
                        at,
                    )?;
                }
            }
            self.inner.replace_steps(sequence_id, expected_version, steps, at)
        }

        fn insert_assignments(
            &self,
            assignments: Vec<SequenceAssignment>,
        ) -> OutreachResult<Vec<SequenceAssignment>> {
            self.inner.insert_assignments(assignments)
        }

        fn get_assignment(&self, id: Uuid) -> OutreachResult<Option<SequenceAssignment>> {
            self.inner.get_assignment(id)
        }

        fn list_assignments(&self, sequence_id: Uuid) -> OutreachResult<Vec<SequenceAssignment>> {
            self.inner.list_assignments(sequence_id)
        }

        fn count_assignments(&self, sequence_id: Uuid) -> OutreachResult<usize> {
            self.inner.count_assignments(sequence_id)
        }

        fn set_assignment_status(
            &self,
            id: Uuid,
            expected: AssignmentStatus,
            to: AssignmentStatus,
        ) -> OutreachResult<SequenceAssignment> {
            self.inner.set_assignment_status(id, expected, to)
        }

        fn apply_tick(
            &self,
            assignment_id: Uuid,
            guard: TickGuard,
            activity: Option<SequenceActivity>,
            update: AssignmentUpdate,
        ) -> OutreachResult<SequenceAssignment> {
            self.inner.apply_tick(assignment_id, guard, activity, update)
        }

        fn get_activity(&self, id: Uuid) -> OutreachResult<Option<SequenceActivity>> {
            self.inner.get_activity(id)
        }

        fn list_activities(&self, assignment_id: Uuid) -> OutreachResult<Vec<SequenceActivity>> {
            self.inner.list_activities(assignment_id)
        }

        fn list_sequence_activities(&self, sequence_id: Uuid) -> OutreachResult<Vec<SequenceActivity>> {
            self.inner.list_sequence_activities(sequence_id)
        }

        fn resolve_activity(
            &self,
            activity_id: Uuid,
            resolution: ActivityResolution,
        ) -> OutreachResult<(SequenceActivity, SequenceAssignment)> {
            self.inner.resolve_activity(activity_id, resolution)
        }
    }

    #[test]
    fn test_step_write_retries_after_concurrent_change() {
        let contended = Arc::new(ContendedStore::new(1));
        let store = DefinitionStore::new(contended.clone(), noop_sink());
        let created = store.create_sequence(new_sequence(vec![email("Intro")])).unwrap();

        let added = store.add_step(created.definition.id, email("Bump")).unwrap();
        assert_eq!(added.step_number, 2);
        assert_eq!(contended.step_writes.load(Ordering::SeqCst), 2);

        let fetched = store.get_sequence(created.definition.id).unwrap();
        assert_eq!(fetched.definition.version, 2);
        assert_contiguous(&fetched);
    }

    #[test]
    fn test_step_write_gives_up_after_repeated_conflicts() {
        let contended = Arc::new(ContendedStore::new(usize::MAX));
        let store = DefinitionStore::new(contended.clone(), noop_sink());
        let created = store.create_sequence(new_sequence(vec![email("Intro")])).unwrap();

        let err = store.add_step(created.definition.id, email("Bump")).unwrap_err();
        assert!(matches!(err, OutreachError::Conflict(_)));
        assert_eq!(contended.step_writes.load(Ordering::SeqCst), MAX_STEP_WRITE_ATTEMPTS);
        assert_eq!(store.get_sequence(created.definition.id).unwrap().steps.len(), 1);
    }

    #[test]
    fn test_concurrent_add_step_keeps_numbering_contiguous() {
        let store = definitions();
        let id = store.create_sequence(new_sequence(vec![])).unwrap().definition.id;

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let store = store.clone();
                std::thread::spawn(move || {
                    (0..10)
                        .filter(|n| {
                            store
                                .add_step(id, email(&format!("w{} s{}", worker, n)))
                                .is_ok()
                        })
                        .count()
                })
            })
            .collect();
        let added: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        let final_state = store.get_sequence(id).unwrap();
        assert_eq!(final_state.steps.len(), added);
        assert_contiguous(&final_state);
    }

    #[test]
    fn test_delay_days_is_bounded() {
        let store = definitions();
        let mut slow = email("Much later");
        slow.delay_days = MAX_DELAY_DAYS + 1;
        let err = store.create_sequence(new_sequence(vec![slow])).unwrap_err();
        assert!(matches!(err, OutreachError::Validation(_)));

        let created = store.create_sequence(new_sequence(vec![email("Intro")])).unwrap();
        let err = store
            .update_step(
                created.definition.id,
                created.steps[0].id,
                StepPatch {
                    delay_days: Some(u32::MAX),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, OutreachError::Validation(_)));
        assert_eq!(store.get_sequence(created.definition.id).unwrap().steps[0].delay_days, 0);

        let mut edge = email("Century");
        edge.delay_days = MAX_DELAY_DAYS;
        assert!(store.add_step(created.definition.id, edge).is_ok());
    }

    #[test]
    fn test_step_patch_null_clears_optional_fields() {
        let store = definitions();
        let mut templated = email("Intro");
        templated.template_id = Some("tpl-intro".to_string());
        templated.conditions = Some(serde_json::json!({ "opened": false }));
        let created = store.create_sequence(new_sequence(vec![templated])).unwrap();
        let (id, step_id) = (created.definition.id, created.steps[0].id);

        let untouched: StepPatch = serde_json::from_str(r#"{"name":"Hello"}"#).unwrap();
        let renamed = store.update_step(id, step_id, untouched).unwrap();
        assert_eq!(renamed.template_id.as_deref(), Some("tpl-intro"));

        let clearing: StepPatch =
            serde_json::from_str(r#"{"templateId":null,"conditions":null}"#).unwrap();
        let cleared = store.update_step(id, step_id, clearing).unwrap();
        assert_eq!(cleared.template_id, None);
        assert_eq!(cleared.conditions, None);
        assert_eq!(cleared.name, "Hello");

        let fixed: StepPatch = serde_json::from_str(
            r#"{"delayType":"FIXED_DATE","fixedDate":"2024-06-01T14:00:00Z"}"#,
        )
        .unwrap();
        store.update_step(id, step_id, fixed).unwrap();
        let undated: StepPatch = serde_json::from_str(r#"{"fixedDate":null}"#).unwrap();
        let err = store.update_step(id, step_id, undated).unwrap_err();
        assert!(matches!(err, OutreachError::Validation(_)));
    }
}
