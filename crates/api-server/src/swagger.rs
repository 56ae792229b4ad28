//! OpenAPI specification and Swagger UI configuration.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Outreach Sequence Engine API",
        version = "0.1.0",
        description = "Multi-step prospecting sequences: definitions, prospect assignment, step advancement and funnel statistics.\n\nEvery response is wrapped as `{success, data|error, message?}`.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Sequences", description = "Sequence definitions and funnel statistics"),
        (name = "Steps", description = "Step editing with automatic renumbering"),
        (name = "Assignments", description = "Prospect enrollment, advancement ticks and lifecycle control"),
        (name = "Activities", description = "Outcome reports from the activity executor"),
        (name = "Prospects", description = "Prospect stage and conversion snapshots"),
        (name = "Operations", description = "Health, readiness, and liveness probes"),
    ),
    paths(
        // Sequences
        crate::sequence_rest::list_sequences,
        crate::sequence_rest::create_sequence,
        crate::sequence_rest::get_sequence,
        crate::sequence_rest::update_sequence,
        crate::sequence_rest::delete_sequence,
        crate::sequence_rest::sequence_stats,
        // Steps
        crate::sequence_rest::add_step,
        crate::sequence_rest::update_step,
        crate::sequence_rest::delete_step,
        // Assignments
        crate::sequence_rest::assign_prospects,
        crate::sequence_rest::list_assignments,
        crate::sequence_rest::get_assignment,
        crate::sequence_rest::advance_assignment,
        crate::sequence_rest::pause_assignment,
        crate::sequence_rest::resume_assignment,
        crate::sequence_rest::stop_assignment,
        // Activities and prospects
        crate::sequence_rest::report_outcome,
        crate::sequence_rest::upsert_prospect,
        // Operations
        crate::rest::health_check,
        crate::rest::readiness,
        crate::rest::liveness,
    ),
    components(schemas(
        // Definitions
        outreach_sequences::types::SequenceDefinition,
        outreach_sequences::types::SequenceStep,
        outreach_sequences::types::SequenceWithSteps,
        outreach_sequences::types::SequenceSummary,
        outreach_sequences::types::SequenceDetail,
        outreach_sequences::types::ActionType,
        outreach_sequences::types::DelayType,
        outreach_sequences::types::NewSequence,
        outreach_sequences::types::NewStep,
        outreach_sequences::types::SequencePatch,
        outreach_sequences::types::StepPatch,
        // Assignments and activities
        outreach_sequences::types::SequenceAssignment,
        outreach_sequences::types::AssignmentStatus,
        outreach_sequences::types::AssignmentDetail,
        outreach_sequences::types::AssignResult,
        outreach_sequences::types::SequenceActivity,
        outreach_sequences::types::ActivityStatus,
        outreach_sequences::types::OutcomeReport,
        outreach_sequences::types::OutcomeResult,
        outreach_sequences::types::AdvanceResult,
        outreach_sequences::types::TickKind,
        // Stats
        outreach_sequences::types::SequenceStats,
        outreach_sequences::types::AssignmentStatusCounts,
        outreach_sequences::types::ActivityStatusCounts,
        outreach_sequences::ProspectSnapshot,
        // Request/response types
        crate::sequence_rest::AssignRequest,
        crate::sequence_rest::ProspectUpdate,
        crate::error::ErrorBody,
        crate::rest::HealthResponse,
    ))
)]
pub struct ApiDoc;
