use chrono::{DateTime, Duration, Utc};
use outreach_core::{OutreachError, OutreachResult};

use crate::types::{DelayType, SequenceAssignment, SequenceStep};

/// Computes when the activity for `step` should run.
///
/// Delays are plain days, not business days.
pub fn scheduled_at(
    step: &SequenceStep,
    assignment: &SequenceAssignment,
    now: DateTime<Utc>,
) -> OutreachResult<DateTime<Utc>> {
    let delay = Duration::days(i64::from(step.delay_days));
    let offset = |base: DateTime<Utc>| {
        base.checked_add_signed(delay).ok_or_else(|| {
            OutreachError::validation(format!(
                "step {} delay of {} days is out of range",
                step.step_number, step.delay_days
            ))
        })
    };
    match step.delay_type {
        DelayType::AfterPrevious => offset(now),
        DelayType::AfterAssignmentStart => offset(assignment.started_at),
        DelayType::FixedDate => step.fixed_date.ok_or_else(|| {
            OutreachError::validation(format!(
                "step {} uses FIXED_DATE but has no fixedDate",
                step.step_number
            ))
        }),
    }
}
