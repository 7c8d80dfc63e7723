mod booking;
mod conflict;
mod error;
mod queries;
mod slots;
mod windows;
#[cfg(test)]
mod tests;

pub use booking::{AppointmentRequest, ScheduleChange};
pub use conflict::find_conflict;
pub use error::EngineError;
pub use queries::{AvailabilityCheck, SlotQuery};
pub use slots::generate_slots;
pub use windows::{intersect_windows, member_windows, merge_windows, shop_windows};

use std::sync::Arc;

use ulid::Ulid;

use crate::clock::Clock;
use crate::limits::{MAX_SLOT_STEP_MINUTES, MIN_SLOT_STEP_MINUTES};
use crate::model::Event;
use crate::notify::NotifyHub;
use crate::store::ScheduleRepository;
use crate::time::Minutes;

pub const DEFAULT_SLOT_STEP_MINUTES: Minutes = 30;

/// Scheduling policy knobs handed to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub slot_step_minutes: Minutes,
    /// `CANCELLED` requires a non-blank reason.
    pub require_cancellation_reason: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            slot_step_minutes: DEFAULT_SLOT_STEP_MINUTES,
            require_cancellation_reason: true,
        }
    }
}

/// Availability resolution and the appointment lifecycle over one tenant's schedule.
pub struct Engine {
    repo: Arc<dyn ScheduleRepository>,
    clock: Arc<dyn Clock>,
    pub notify: Arc<NotifyHub>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(
        repo: Arc<dyn ScheduleRepository>,
        clock: Arc<dyn Clock>,
        notify: Arc<NotifyHub>,
        config: EngineConfig,
    ) -> Self {
        Self {
            repo,
            clock,
            notify,
            config,
        }
    }

    /// Committed appointment change → subscribers of that team member.
    fn publish(&self, team_member_id: Ulid, event: &Event) {
        self.notify.send(team_member_id, event);
    }
}

pub(crate) fn validate_step(step: Minutes) -> Result<Minutes, EngineError> {
    if step <= 0 {
        return Err(EngineError::InvalidDuration {
            field: "step_minutes",
            value: step,
        });
    }
    if !(MIN_SLOT_STEP_MINUTES..=MAX_SLOT_STEP_MINUTES).contains(&step) {
        return Err(EngineError::LimitExceeded("slot step out of range"));
    }
    Ok(step)
}
