use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

use super::{Engine, EngineError};

/// First active appointment in `existing` overlapping `candidate`, skipping `exclude`.
///
/// Only PENDING and CONFIRMED appointments occupy time; touching endpoints do not conflict.
pub fn find_conflict<'a>(
    existing: &'a [Appointment],
    candidate: &Window,
    exclude: Option<Ulid>,
) -> Option<&'a Appointment> {
    existing.iter().find(|a| {
        a.status.is_active() && Some(a.id) != exclude && a.window().overlaps(candidate)
    })
}

pub(super) fn conflict_error(existing: &Appointment) -> EngineError {
    EngineError::SlotConflict {
        appointment_id: existing.id,
        start: crate::time::format_lossy(existing.start_time),
        end: crate::time::format_lossy(existing.end_time),
    }
}

impl Engine {
    /// Read-only conflict lookup. Booking paths re-check inside a transaction.
    pub async fn has_conflict(
        &self,
        team_member_id: Ulid,
        date: NaiveDate,
        candidate: Window,
        exclude: Option<Ulid>,
    ) -> Result<bool, EngineError> {
        let existing = self.repo.find_appointments(team_member_id, date).await?;
        Ok(find_conflict(&existing, &candidate, exclude).is_some())
    }

    /// Mark each slot available unless an active appointment overlaps it.
    /// The day's appointments are loaded once for the whole list.
    pub async fn filter_available_slots(
        &self,
        slots: &[Window],
        team_member_id: Ulid,
        date: NaiveDate,
    ) -> Result<Vec<TimeSlot>, EngineError> {
        let existing = self.repo.find_appointments(team_member_id, date).await?;
        Ok(slots
            .iter()
            .map(|slot| TimeSlot {
                start_time: slot.start,
                end_time: slot.end,
                available: find_conflict(&existing, slot, None).is_none(),
            })
            .collect())
    }
}
