use std::sync::Arc;

use outreach_core::config::SequencesConfig;
use outreach_core::event_bus::{noop_sink, EventSink};
use outreach_core::OutreachResult;
use tracing::{info, warn};
use uuid::Uuid;

use crate::advancer::StepAdvancer;
use crate::assignments::AssignmentManager;
use crate::definitions::DefinitionStore;
use crate::prospects::{InMemoryProspectDirectory, ProspectDirectory};
use crate::stats::StatsAggregator;
use crate::store::{InMemorySequenceStore, SequenceRepository};
use crate::types::{ActionType, DelayType, NewSequence, NewStep, SequenceDetail};

/// Wires the four sequence components to one store, prospect directory and
/// event sink. Cheap to clone; every clone shares the same state.
#[derive(Clone)]
pub struct SequenceEngine {
    store: Arc<dyn SequenceRepository>,
    prospects: Arc<dyn ProspectDirectory>,
    config: SequencesConfig,
    definitions: DefinitionStore,
    assignments: AssignmentManager,
    advancer: StepAdvancer,
    stats: StatsAggregator,
}

impl std::fmt::Debug for SequenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceEngine")
            .field("failure_policy", &self.config.failure_policy)
            .field("max_prospects_per_assign", &self.config.max_prospects_per_assign)
            .finish()
    }
}

impl SequenceEngine {
    /// Creates an engine backed by the in-memory store and directory.
    pub fn new(config: &SequencesConfig) -> Self {
        Self::with_store(
            config,
            Arc::new(InMemorySequenceStore::new()),
            Arc::new(InMemoryProspectDirectory::new()),
        )
    }

    pub fn with_store(
        config: &SequencesConfig,
        store: Arc<dyn SequenceRepository>,
        prospects: Arc<dyn ProspectDirectory>,
    ) -> Self {
        Self::assemble(config.clone(), store, prospects, noop_sink())
    }

    /// Attach an event sink for lifecycle events.
    pub fn with_event_sink(self, sink: Arc<dyn EventSink>) -> Self {
        Self::assemble(self.config, self.store, self.prospects, sink)
    }

    fn assemble(
        config: SequencesConfig,
        store: Arc<dyn SequenceRepository>,
        prospects: Arc<dyn ProspectDirectory>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            definitions: DefinitionStore::new(store.clone(), events.clone()),
            assignments: AssignmentManager::new(
                store.clone(),
                events.clone(),
                config.max_prospects_per_assign,
            ),
            advancer: StepAdvancer::new(store.clone(), events.clone(), config.failure_policy),
            stats: StatsAggregator::new(store.clone(), prospects.clone()),
            store,
            prospects,
            config,
        }
    }

    pub fn definitions(&self) -> &DefinitionStore {
        &self.definitions
    }

    pub fn assignments(&self) -> &AssignmentManager {
        &self.assignments
    }

    pub fn advancer(&self) -> &StepAdvancer {
        &self.advancer
    }

    pub fn stats(&self) -> &StatsAggregator {
        &self.stats
    }

    pub fn prospects(&self) -> &Arc<dyn ProspectDirectory> {
        &self.prospects
    }

    pub fn config(&self) -> &SequencesConfig {
        &self.config
    }

    /// A sequence with its steps and its most recent assignments.
    pub fn sequence_detail(&self, id: Uuid) -> OutreachResult<SequenceDetail> {
        let sequence = self.definitions.get_sequence(id)?;
        let mut recent_assignments = self.store.list_assignments(id)?;
        recent_assignments.truncate(self.config.recent_assignments_limit);
        Ok(SequenceDetail {
            sequence,
            recent_assignments,
        })
    }

    /// Populate the engine with sample sequences so a fresh server has
    /// something to explore.
    pub fn seed_demo_sequences(&self) {
        info!("Seeding demo sequences");

        let demos = [
            NewSequence {
                name: "Cold Outreach".to_string(),
                description: Some("Three-touch outreach for new leads".to_string()),
                created_by: Some("demo".to_string()),
                steps: vec![
                    demo_step("Intro email", ActionType::Email, 0, Some("cold-intro")),
                    demo_step("Follow-up call", ActionType::Call, 3, None),
                    demo_step("Break-up email", ActionType::Email, 5, Some("cold-breakup")),
                ],
                ..Default::default()
            },
            NewSequence {
                name: "Post-Demo Follow-up".to_string(),
                description: Some("Keeps momentum after a product demo".to_string()),
                created_by: Some("demo".to_string()),
                steps: vec![
                    demo_step("Thank-you email", ActionType::Email, 0, Some("demo-thanks")),
                    demo_step("Prepare proposal", ActionType::Task, 1, None),
                    NewStep {
                        delay_type: DelayType::AfterAssignmentStart,
                        ..demo_step("Check-in call", ActionType::Call, 7, None)
                    },
                ],
                ..Default::default()
            },
        ];

        for demo in demos {
            let name = demo.name.clone();
            if let Err(e) = self.definitions.create_sequence(demo) {
                warn!(name = %name, error = %e, "Failed to seed demo sequence");
            }
        }
    }
}

fn demo_step(name: &str, action: ActionType, delay_days: u32, template: Option<&str>) -> NewStep {
    NewStep {
        name: Some(name.to_string()),
        action_type: Some(action),
        template_id: template.map(str::to_string),
        delay_days,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActivityStatus, OutcomeReport, TickKind};
    use outreach_core::event_bus::capture_sink;
    use outreach_core::types::SequenceEventType;

    #[test]
    fn test_seed_demo_sequences() {
        let engine = SequenceEngine::new(&SequencesConfig::default());
        engine.seed_demo_sequences();

        let sequences = engine.definitions().list_sequences(None).unwrap();
        assert_eq!(sequences.len(), 2);
        let names: Vec<&str> = sequences.iter().map(|s| s.definition.name.as_str()).collect();
        assert!(names.contains(&"Cold Outreach"));
        assert!(names.contains(&"Post-Demo Follow-up"));
        assert!(sequences.iter().all(|s| s.step_count == 3));
    }

    #[test]
    fn test_recent_assignments_are_limited() {
        let config = SequencesConfig {
            recent_assignments_limit: 2,
            ..Default::default()
        };
        let engine = SequenceEngine::new(&config);
        engine.seed_demo_sequences();
        let id = engine.definitions().list_sequences(None).unwrap()[0].definition.id;
        let prospects: Vec<String> = (0..5).map(|i| format!("p{}", i)).collect();
        engine.assignments().assign_prospects(id, &prospects).unwrap();

        let detail = engine.sequence_detail(id).unwrap();
        assert_eq!(detail.sequence.steps.len(), 3);
        assert_eq!(detail.recent_assignments.len(), 2);
    }

    #[test]
    fn test_components_share_state_and_sink() {
        let sink = capture_sink();
        let engine = SequenceEngine::new(&SequencesConfig::default()).with_event_sink(sink.clone());
        engine.seed_demo_sequences();
        assert_eq!(sink.count_type(SequenceEventType::SequenceCreated), 2);

        let id = engine.definitions().list_sequences(None).unwrap()[0].definition.id;
        let assigned = engine
            .assignments()
            .assign_prospects(id, &["p".to_string()])
            .unwrap();
        let assignment_id = assigned.assignments[0].id;

        let tick = engine.advancer().execute_next_step(assignment_id).unwrap();
        assert_eq!(tick.outcome, TickKind::Scheduled);
        engine
            .advancer()
            .report_outcome(
                tick.activity.unwrap().id,
                OutcomeReport {
                    status: ActivityStatus::Completed,
                    notes: Some("sent".to_string()),
                },
            )
            .unwrap();

        let stats = engine.stats().compute(id).unwrap();
        assert_eq!(stats.total_assignments, 1);
        assert_eq!(stats.avg_steps_completed, 1.0);
        assert_eq!(sink.count_type(SequenceEventType::ActivityResolved), 1);
    }
}
