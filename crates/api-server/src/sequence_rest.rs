//! Sequence, assignment and activity REST endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use outreach_core::OutreachError;
use outreach_sequences::types::*;
use outreach_sequences::ProspectSnapshot;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::{ApiJson, ApiPath, ApiQuery, ApiResponse, ApiResult, ErrorBody};
use crate::rest::AppState;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ListSequencesQuery {
    /// Only return active (`true`) or inactive (`false`) sequences.
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssignRequest {
    pub prospect_ids: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProspectUpdate {
    pub stage: String,
    #[serde(default)]
    pub converted: bool,
}

// ─── Definitions ────────────────────────────────────────────────────────────

/// GET /sequences: List definitions with step and assignment counts.
#[utoipa::path(
    get,
    path = "/sequences",
    tag = "Sequences",
    params(ListSequencesQuery),
    responses(
        (status = 200, description = "Sequences, newest first", body = [SequenceSummary]),
        (status = 400, description = "Malformed query", body = ErrorBody),
    )
)]
pub async fn list_sequences(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListSequencesQuery>,
) -> ApiResult<Json<ApiResponse<Vec<SequenceSummary>>>> {
    let sequences = state.engine.definitions().list_sequences(query.is_active)?;
    Ok(ApiResponse::ok(sequences))
}

/// POST /sequences: Create a definition with optional initial steps.
#[utoipa::path(
    post,
    path = "/sequences",
    tag = "Sequences",
    request_body = NewSequence,
    responses(
        (status = 201, description = "Sequence created", body = SequenceWithSteps),
        (status = 400, description = "Invalid definition", body = ErrorBody),
    )
)]
pub async fn create_sequence(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<NewSequence>,
) -> ApiResult<(StatusCode, Json<ApiResponse<SequenceWithSteps>>)> {
    let sequence = state.engine.definitions().create_sequence(request)?;
    Ok(ApiResponse::created(sequence))
}

/// GET /sequences/:id: Definition with steps and recent assignments.
#[utoipa::path(
    get,
    path = "/sequences/{id}",
    tag = "Sequences",
    params(("id" = Uuid, Path, description = "Sequence id")),
    responses(
        (status = 200, description = "Sequence detail", body = SequenceDetail),
        (status = 404, description = "Unknown sequence", body = ErrorBody),
    )
)]
pub async fn get_sequence(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<ApiResponse<SequenceDetail>>> {
    Ok(ApiResponse::ok(state.engine.sequence_detail(id)?))
}

/// PUT /sequences/:id: Partial update of name, description or active flag.
#[utoipa::path(
    put,
    path = "/sequences/{id}",
    tag = "Sequences",
    params(("id" = Uuid, Path, description = "Sequence id")),
    request_body = SequencePatch,
    responses(
        (status = 200, description = "Sequence updated", body = SequenceDefinition),
        (status = 400, description = "Invalid patch", body = ErrorBody),
        (status = 404, description = "Unknown sequence", body = ErrorBody),
    )
)]
pub async fn update_sequence(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(patch): ApiJson<SequencePatch>,
) -> ApiResult<Json<ApiResponse<SequenceDefinition>>> {
    let updated = state.engine.definitions().update_sequence(id, patch)?;
    Ok(ApiResponse::ok(updated))
}

/// DELETE /sequences/:id: Delete a definition with everything under it.
#[utoipa::path(
    delete,
    path = "/sequences/{id}",
    tag = "Sequences",
    params(("id" = Uuid, Path, description = "Sequence id")),
    responses(
        (status = 200, description = "Sequence deleted"),
        (status = 404, description = "Unknown sequence", body = ErrorBody),
    )
)]
pub async fn delete_sequence(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<ApiResponse<()>>> {
    state.engine.definitions().delete_sequence(id)?;
    Ok(ApiResponse::message("Sequence deleted"))
}

// ─── Steps ──────────────────────────────────────────────────────────────────

/// POST /sequences/:id/steps: Append a step.
#[utoipa::path(
    post,
    path = "/sequences/{id}/steps",
    tag = "Steps",
    params(("id" = Uuid, Path, description = "Sequence id")),
    request_body = NewStep,
    responses(
        (status = 201, description = "Step appended", body = SequenceStep),
        (status = 400, description = "Invalid step", body = ErrorBody),
        (status = 404, description = "Unknown sequence", body = ErrorBody),
    )
)]
pub async fn add_step(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<NewStep>,
) -> ApiResult<(StatusCode, Json<ApiResponse<SequenceStep>>)> {
    let step = state.engine.definitions().add_step(id, request)?;
    Ok(ApiResponse::created(step))
}

/// PUT /sequences/:id/steps/:stepId: Update a step in place.
#[utoipa::path(
    put,
    path = "/sequences/{id}/steps/{step_id}",
    tag = "Steps",
    params(
        ("id" = Uuid, Path, description = "Sequence id"),
        ("step_id" = Uuid, Path, description = "Step id"),
    ),
    request_body = StepPatch,
    responses(
        (status = 200, description = "Step updated", body = SequenceStep),
        (status = 400, description = "Invalid patch", body = ErrorBody),
        (status = 404, description = "Unknown sequence or step", body = ErrorBody),
    )
)]
pub async fn update_step(
    State(state): State<AppState>,
    ApiPath((id, step_id)): ApiPath<(Uuid, Uuid)>,
    ApiJson(patch): ApiJson<StepPatch>,
) -> ApiResult<Json<ApiResponse<SequenceStep>>> {
    let step = state.engine.definitions().update_step(id, step_id, patch)?;
    Ok(ApiResponse::ok(step))
}

/// DELETE /sequences/:id/steps/:stepId: Delete a step and renumber the rest.
#[utoipa::path(
    delete,
    path = "/sequences/{id}/steps/{step_id}",
    tag = "Steps",
    params(
        ("id" = Uuid, Path, description = "Sequence id"),
        ("step_id" = Uuid, Path, description = "Step id"),
    ),
    responses(
        (status = 200, description = "Remaining steps, renumbered", body = SequenceWithSteps),
        (status = 404, description = "Unknown sequence or step", body = ErrorBody),
    )
)]
pub async fn delete_step(
    State(state): State<AppState>,
    ApiPath((id, step_id)): ApiPath<(Uuid, Uuid)>,
) -> ApiResult<Json<ApiResponse<SequenceWithSteps>>> {
    let sequence = state.engine.definitions().delete_step(id, step_id)?;
    Ok(ApiResponse::ok(sequence))
}

// ─── Assignments ────────────────────────────────────────────────────────────

/// POST /sequences/:id/assign: Bulk-assign prospects; existing pairs are skipped.
#[utoipa::path(
    post,
    path = "/sequences/{id}/assign",
    tag = "Assignments",
    params(("id" = Uuid, Path, description = "Sequence id")),
    request_body = AssignRequest,
    responses(
        (status = 200, description = "Assignment result", body = AssignResult),
        (status = 400, description = "Empty, oversized or blank prospect list", body = ErrorBody),
        (status = 404, description = "Unknown sequence", body = ErrorBody),
        (status = 409, description = "Sequence is inactive", body = ErrorBody),
    )
)]
pub async fn assign_prospects(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<AssignRequest>,
) -> ApiResult<Json<ApiResponse<AssignResult>>> {
    let result = state
        .engine
        .assignments()
        .assign_prospects(id, &request.prospect_ids)?;
    Ok(ApiResponse::ok(result))
}

/// GET /sequences/:id/assignments: All assignments of a sequence.
#[utoipa::path(
    get,
    path = "/sequences/{id}/assignments",
    tag = "Assignments",
    params(("id" = Uuid, Path, description = "Sequence id")),
    responses(
        (status = 200, description = "Assignments, newest first", body = [SequenceAssignment]),
        (status = 404, description = "Unknown sequence", body = ErrorBody),
    )
)]
pub async fn list_assignments(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<ApiResponse<Vec<SequenceAssignment>>>> {
    Ok(ApiResponse::ok(state.engine.assignments().list_assignments(id)?))
}

/// GET /sequences/:id/stats: Funnel statistics.
#[utoipa::path(
    get,
    path = "/sequences/{id}/stats",
    tag = "Sequences",
    params(("id" = Uuid, Path, description = "Sequence id")),
    responses(
        (status = 200, description = "Funnel statistics", body = SequenceStats),
        (status = 404, description = "Unknown sequence", body = ErrorBody),
    )
)]
pub async fn sequence_stats(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<ApiResponse<SequenceStats>>> {
    Ok(ApiResponse::ok(state.engine.stats().compute(id)?))
}

/// GET /assignments/:assignmentId: Assignment with its activities.
#[utoipa::path(
    get,
    path = "/assignments/{assignment_id}",
    tag = "Assignments",
    params(("assignment_id" = Uuid, Path, description = "Assignment id")),
    responses(
        (status = 200, description = "Assignment detail", body = AssignmentDetail),
        (status = 404, description = "Unknown assignment", body = ErrorBody),
    )
)]
pub async fn get_assignment(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<ApiResponse<AssignmentDetail>>> {
    Ok(ApiResponse::ok(state.engine.assignments().get_assignment(id)?))
}

/// POST /assignments/:assignmentId/advance: Run one advancement tick.
#[utoipa::path(
    post,
    path = "/assignments/{assignment_id}/advance",
    tag = "Assignments",
    params(("assignment_id" = Uuid, Path, description = "Assignment id")),
    responses(
        (status = 200, description = "Tick result", body = AdvanceResult),
        (status = 404, description = "Unknown assignment or step", body = ErrorBody),
        (status = 409, description = "Assignment is terminal, paused or awaiting an outcome", body = ErrorBody),
    )
)]
pub async fn advance_assignment(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<ApiResponse<AdvanceResult>>> {
    Ok(ApiResponse::ok(state.engine.advancer().execute_next_step(id)?))
}

/// POST /assignments/:assignmentId/pause
#[utoipa::path(
    post,
    path = "/assignments/{assignment_id}/pause",
    tag = "Assignments",
    params(("assignment_id" = Uuid, Path, description = "Assignment id")),
    responses(
        (status = 200, description = "Assignment paused", body = SequenceAssignment),
        (status = 404, description = "Unknown assignment", body = ErrorBody),
        (status = 409, description = "Assignment is not active", body = ErrorBody),
    )
)]
pub async fn pause_assignment(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<ApiResponse<SequenceAssignment>>> {
    Ok(ApiResponse::ok(state.engine.assignments().pause(id)?))
}

/// POST /assignments/:assignmentId/resume
#[utoipa::path(
    post,
    path = "/assignments/{assignment_id}/resume",
    tag = "Assignments",
    params(("assignment_id" = Uuid, Path, description = "Assignment id")),
    responses(
        (status = 200, description = "Assignment resumed", body = SequenceAssignment),
        (status = 404, description = "Unknown assignment", body = ErrorBody),
        (status = 409, description = "Assignment is not paused", body = ErrorBody),
    )
)]
pub async fn resume_assignment(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<ApiResponse<SequenceAssignment>>> {
    Ok(ApiResponse::ok(state.engine.assignments().resume(id)?))
}

/// POST /assignments/:assignmentId/stop
#[utoipa::path(
    post,
    path = "/assignments/{assignment_id}/stop",
    tag = "Assignments",
    params(("assignment_id" = Uuid, Path, description = "Assignment id")),
    responses(
        (status = 200, description = "Assignment stopped", body = SequenceAssignment),
        (status = 404, description = "Unknown assignment", body = ErrorBody),
        (status = 409, description = "Assignment already finished", body = ErrorBody),
    )
)]
pub async fn stop_assignment(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<ApiResponse<SequenceAssignment>>> {
    Ok(ApiResponse::ok(state.engine.assignments().stop(id)?))
}

// ─── Executor callbacks ─────────────────────────────────────────────────────

/// POST /activities/:activityId/outcome: Report the outcome of a pending activity.
#[utoipa::path(
    post,
    path = "/activities/{activity_id}/outcome",
    tag = "Activities",
    params(("activity_id" = Uuid, Path, description = "Activity id")),
    request_body = OutcomeReport,
    responses(
        (status = 200, description = "Outcome recorded", body = OutcomeResult),
        (status = 400, description = "Outcome status is not terminal", body = ErrorBody),
        (status = 404, description = "Unknown activity", body = ErrorBody),
        (status = 409, description = "Activity already resolved", body = ErrorBody),
    )
)]
pub async fn report_outcome(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(report): ApiJson<OutcomeReport>,
) -> ApiResult<Json<ApiResponse<OutcomeResult>>> {
    Ok(ApiResponse::ok(state.engine.advancer().report_outcome(id, report)?))
}

/// PUT /prospects/:prospectId: Record a prospect's stage and conversion flag.
#[utoipa::path(
    put,
    path = "/prospects/{prospect_id}",
    tag = "Prospects",
    params(("prospect_id" = String, Path, description = "Prospect id")),
    request_body = ProspectUpdate,
    responses(
        (status = 200, description = "Snapshot stored", body = ProspectSnapshot),
        (status = 400, description = "Blank prospect id or stage", body = ErrorBody),
    )
)]
pub async fn upsert_prospect(
    State(state): State<AppState>,
    ApiPath(prospect_id): ApiPath<String>,
    ApiJson(update): ApiJson<ProspectUpdate>,
) -> ApiResult<Json<ApiResponse<ProspectSnapshot>>> {
    // Same normalisation as prospect ids given to assignProspects.
    let prospect_id = prospect_id.trim();
    if prospect_id.is_empty() {
        return Err(OutreachError::validation("prospect id must not be blank").into());
    }
    let stage = update.stage.trim();
    if stage.is_empty() {
        return Err(OutreachError::validation("stage must not be blank").into());
    }
    let snapshot = ProspectSnapshot {
        prospect_id: prospect_id.to_string(),
        stage: stage.to_string(),
        converted: update.converted,
    };
    state.engine.prospects().upsert(snapshot.clone());
    metrics::counter!("prospects.upserted").increment(1);
    Ok(ApiResponse::ok(snapshot))
}
