//! Stats Aggregator: read-only funnel metrics for one sequence.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use outreach_core::{OutreachError, OutreachResult};
use uuid::Uuid;

use crate::prospects::{ProspectDirectory, UNKNOWN_STAGE};
use crate::store::SequenceRepository;
use crate::types::{
    ActivityStatus, ActivityStatusCounts, AssignmentStatus, AssignmentStatusCounts, SequenceStats,
};

#[derive(Clone)]
pub struct StatsAggregator {
    store: Arc<dyn SequenceRepository>,
    prospects: Arc<dyn ProspectDirectory>,
}

impl StatsAggregator {
    pub fn new(store: Arc<dyn SequenceRepository>, prospects: Arc<dyn ProspectDirectory>) -> Self {
        Self { store, prospects }
    }

    /// Computes the stats from a snapshot of the sequence's assignments and
    /// activities. `completedSteps` of an assignment is its number of
    /// `Completed` activities.
    pub fn compute(&self, sequence_id: Uuid) -> OutreachResult<SequenceStats> {
        if self.store.get_sequence(sequence_id)?.is_none() {
            return Err(OutreachError::not_found(format!("sequence {}", sequence_id)));
        }
        let assignments = self.store.list_assignments(sequence_id)?;
        let activities = self.store.list_sequence_activities(sequence_id)?;

        let mut by_status = AssignmentStatusCounts::default();
        let mut by_stage: BTreeMap<String, u64> = BTreeMap::new();
        let mut conversions = 0u64;
        for assignment in &assignments {
            match assignment.status {
                AssignmentStatus::Active => by_status.active += 1,
                AssignmentStatus::Paused => by_status.paused += 1,
                AssignmentStatus::Completed => by_status.completed += 1,
                AssignmentStatus::Stopped => by_status.stopped += 1,
            }

            let (stage, converted) = match self.prospects.lookup(&assignment.prospect_id) {
                Some(snapshot) => (snapshot.stage, snapshot.converted),
                None => (UNKNOWN_STAGE.to_string(), false),
            };
            *by_stage.entry(stage).or_insert(0) += 1;
            if converted {
                conversions += 1;
            }
        }

        let mut activities_by_status = ActivityStatusCounts::default();
        let mut completed_per_assignment: HashMap<Uuid, u64> = HashMap::new();
        for activity in &activities {
            match activity.status {
                ActivityStatus::Pending => activities_by_status.pending += 1,
                ActivityStatus::Completed => {
                    activities_by_status.completed += 1;
                    *completed_per_assignment.entry(activity.assignment_id).or_insert(0) += 1;
                }
                ActivityStatus::Failed => activities_by_status.failed += 1,
                ActivityStatus::Skipped => activities_by_status.skipped += 1,
            }
        }

        let total_assignments = assignments.len() as u64;
        let (conversion_rate, avg_steps_completed) = if total_assignments == 0 {
            (0.0, 0.0)
        } else {
            let completed_steps: u64 = assignments
                .iter()
                .map(|a| completed_per_assignment.get(&a.id).copied().unwrap_or(0))
                .sum();
            (
                conversions as f64 / total_assignments as f64,
                completed_steps as f64 / total_assignments as f64,
            )
        };

        Ok(SequenceStats {
            sequence_id,
            total_assignments,
            by_status,
            conversions,
            conversion_rate,
            avg_steps_completed,
            by_stage,
            activities_by_status,
        })
    }
}
