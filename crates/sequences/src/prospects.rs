//! Read access to prospect facts owned by the external CRM.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Stage reported for prospects the directory has never heard of.
pub const UNKNOWN_STAGE: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProspectSnapshot {
    pub prospect_id: String,
    pub stage: String,
    #[serde(default)]
    pub converted: bool,
}

/// Source of a prospect's pipeline stage and conversion flag. Only the
/// Stats Aggregator reads it.
pub trait ProspectDirectory: Send + Sync {
    fn lookup(&self, prospect_id: &str) -> Option<ProspectSnapshot>;

    /// Records the latest snapshot pushed by the CRM.
    fn upsert(&self, snapshot: ProspectSnapshot);
}

#[derive(Debug, Default)]
pub struct InMemoryProspectDirectory {
    prospects: DashMap<String, ProspectSnapshot>,
}

impl InMemoryProspectDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProspectDirectory for InMemoryProspectDirectory {
    fn lookup(&self, prospect_id: &str) -> Option<ProspectSnapshot> {
        self.prospects.get(prospect_id).map(|r| r.value().clone())
    }

    fn upsert(&self, snapshot: ProspectSnapshot) {
        self.prospects.insert(snapshot.prospect_id.clone(), snapshot);
    }
}
