use chrono::NaiveDate;
use tracing::debug;
use ulid::Ulid;

use crate::model::*;
use crate::time::{self, Minutes};

use super::booking::validate_duration;
use super::{Engine, EngineError, generate_slots, validate_step};

/// Input of a slot listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotQuery {
    pub team_member_id: Ulid,
    pub shop_id: Ulid,
    pub date: NaiveDate,
    pub service_id: Ulid,
    /// Overrides the configured step for this request.
    pub step_minutes: Option<Minutes>,
}

/// Input of a single-interval availability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityCheck {
    pub team_member_id: Ulid,
    pub date: NaiveDate,
    pub start_time: String,
    pub duration_minutes: Minutes,
}

impl Engine {
    /// Every slot of the service's length inside the bookable windows,
    /// each flagged with whether an active appointment already takes it.
    pub async fn available_slots(&self, query: SlotQuery) -> Result<Vec<TimeSlot>, EngineError> {
        let step = validate_step(query.step_minutes.unwrap_or(self.config.slot_step_minutes))?;
        let duration = self.service_duration(query.service_id).await?;
        validate_duration(duration)?;

        let windows = self
            .bookable_windows(query.team_member_id, query.shop_id, query.date)
            .await?;
        let slots = generate_slots(&windows, duration, step)?;
        if slots.is_empty() {
            return Ok(Vec::new());
        }
        let annotated = self
            .filter_available_slots(&slots, query.team_member_id, query.date)
            .await?;
        debug!(
            "{} slots ({} free) for {} on {}",
            annotated.len(),
            annotated.iter().filter(|s| s.available).count(),
            query.team_member_id,
            query.date
        );
        Ok(annotated)
    }

    /// Whether `[start, start + duration)` is free of active appointments.
    /// Advisory only: a later booking re-checks under the member's lock.
    pub async fn check_availability(&self, check: AvailabilityCheck) -> Result<bool, EngineError> {
        let start = time::to_minutes(&check.start_time)?;
        validate_duration(check.duration_minutes)?;
        let end = time::add_minutes(start, check.duration_minutes)?;
        self.has_conflict(check.team_member_id, check.date, Window::new(start, end), None)
            .await
            .map(|conflict| !conflict)
    }

    pub async fn get_appointment(&self, id: Ulid) -> Result<Appointment, EngineError> {
        self.repo
            .find_appointment(id)
            .await?
            .ok_or_else(|| EngineError::not_found("appointment", id))
    }

    /// All of the member's appointments that day, any status, by start time.
    pub async fn appointments_for_day(&self, team_member_id: Ulid, date: NaiveDate) -> Result<Vec<Appointment>, EngineError> {
        Ok(self.repo.find_appointments(team_member_id, date).await?)
    }
}
