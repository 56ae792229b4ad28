pub mod advancer;
pub mod assignments;
pub mod definitions;
pub mod engine;
pub mod prospects;
pub mod schedule;
pub mod state_machine;
pub mod stats;
pub mod store;
pub mod types;

pub use advancer::StepAdvancer;
pub use assignments::AssignmentManager;
pub use definitions::DefinitionStore;
pub use engine::SequenceEngine;
pub use prospects::{InMemoryProspectDirectory, ProspectDirectory, ProspectSnapshot};
pub use stats::StatsAggregator;
pub use store::{InMemorySequenceStore, SequenceRepository};
pub use types::*;
