use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// Validate a proposed window against `now` and return it as a [`Span`].
///
/// The start must be strictly after `now` and the end strictly after the start.
pub(crate) fn validate_window(start: Ms, end: Ms, now: Ms) -> Result<Span, EngineError> {
    if start <= now {
        return Err(EngineError::InvalidWindow("start must be in the future"));
    }
    if end <= start {
        return Err(EngineError::InvalidWindow("end must be after start"));
    }
    let span = Span::new(start, end);
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(EngineError::LimitExceeded("span too wide"));
    }
    Ok(span)
}

/// First appointment in `existing` whose span overlaps `candidate`, skipping `exclude`.
///
/// Linear scan. A start-sorted timeline with `partition_point` on
/// `start < candidate.end` would cut this to a binary search plus the hits.
pub fn find_conflict<'a>(
    candidate: &Span,
    existing: &'a [Appointment],
    exclude: Option<Ulid>,
) -> Option<&'a Appointment> {
    existing
        .iter()
        .filter(|a| Some(a.id) != exclude)
        .find(|a| a.span.overlaps(candidate))
}

pub fn has_conflict(candidate: &Span, existing: &[Appointment], exclude: Option<Ulid>) -> bool {
    find_conflict(candidate, existing, exclude).is_some()
}

pub(crate) fn check_no_conflict(
    candidate: &Span,
    existing: &[Appointment],
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    match find_conflict(candidate, existing, exclude) {
        Some(clash) => {
            metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            Err(EngineError::SchedulingConflict(clash.id))
        }
        None => Ok(()),
    }
}
