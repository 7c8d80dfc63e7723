use chrono::NaiveDate;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::limits::{MAX_DURATION_MINUTES, MAX_NOTES_LEN};
use crate::model::*;
use crate::observability::{
    APPOINTMENTS_CREATED_TOTAL, APPOINTMENTS_RESCHEDULED_TOTAL, SLOT_CONFLICTS_TOTAL, STATUS_TRANSITIONS_TOTAL,
};
use crate::store::ScheduleTx;
use crate::time::{self, Minutes};

use super::conflict::{conflict_error, find_conflict};
use super::{Engine, EngineError};

/// A customer's booking request, as received from the front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppointmentRequest {
    /// Client-chosen id; generated when absent.
    pub id: Option<Ulid>,
    pub customer_user_id: Ulid,
    pub team_member_id: Ulid,
    pub service_id: Ulid,
    pub appointment_date: NaiveDate,
    /// `HH:MM` or `HH:MM:SS`.
    pub start_time: String,
    /// Falls back to the service's duration when absent.
    pub duration_minutes: Option<Minutes>,
    pub customer_notes: Option<String>,
}

/// Fields of a reschedule; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleChange {
    pub appointment_date: Option<NaiveDate>,
    pub start_time: Option<String>,
    pub duration_minutes: Option<Minutes>,
}

type Locked<'a> = (Box<dyn ScheduleTx + 'a>, Appointment);

impl Engine {
    pub async fn create_appointment(&self, req: AppointmentRequest) -> Result<Appointment, EngineError> {
        let start = time::to_minutes(&req.start_time)?;
        let duration = match req.duration_minutes {
            Some(d) => d,
            None => self.service_duration(req.service_id).await?,
        };
        validate_duration(duration)?;
        let end = time::add_minutes(start, duration)?;
        let customer_notes = bounded_text(req.customer_notes)?;

        let id = req.id.unwrap_or_else(Ulid::new);
        // Must precede `begin`: the lookup reads the owning book.
        if self.repo.find_appointment(id).await?.is_some() {
            return Err(EngineError::AlreadyExists { entity: "appointment", id });
        }

        let window = Window::new(start, end);
        let mut tx = self.repo.begin(req.team_member_id).await?;
        // A concurrent create for this member may have taken the id meanwhile.
        if tx.find_appointment(id).await?.is_some() {
            return Err(EngineError::AlreadyExists { entity: "appointment", id });
        }
        let existing = tx.find_appointments(req.appointment_date).await?;
        if let Some(hit) = find_conflict(&existing, &window, None) {
            metrics::counter!(SLOT_CONFLICTS_TOTAL).increment(1);
            warn!(
                "booking rejected: {} {}-{} overlaps {}",
                req.appointment_date,
                time::format_lossy(start),
                time::format_lossy(end),
                hit.id
            );
            return Err(conflict_error(hit));
        }

        let now = self.clock.now();
        let appointment = Appointment {
            id,
            customer_user_id: req.customer_user_id,
            team_member_id: req.team_member_id,
            service_id: req.service_id,
            appointment_date: req.appointment_date,
            start_time: start,
            end_time: end,
            duration_minutes: duration,
            status: AppointmentStatus::Pending,
            notes: None,
            customer_notes,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        };
        tx.save_appointment(appointment.clone()).await?;
        tx.commit().await?;

        metrics::counter!(APPOINTMENTS_CREATED_TOTAL).increment(1);
        info!(
            "appointment {id} booked for {} on {} at {}",
            appointment.team_member_id,
            appointment.appointment_date,
            time::format_lossy(start)
        );
        self.publish(appointment.team_member_id, &Event::AppointmentSaved(appointment.clone()));
        Ok(appointment)
    }

    /// Move an appointment in time. Re-checks conflicts against every other
    /// active appointment on the target date.
    pub async fn update_schedule(&self, id: Ulid, change: ScheduleChange) -> Result<Appointment, EngineError> {
        let (mut tx, current) = self.lock_appointment(id).await?;
        if current.status.is_terminal() {
            return Err(EngineError::InvalidTransition {
                from: current.status,
                to: current.status,
            });
        }

        let date = change.appointment_date.unwrap_or(current.appointment_date);
        let start = match &change.start_time {
            Some(s) => time::to_minutes(s)?,
            None => current.start_time,
        };
        let duration = change.duration_minutes.unwrap_or(current.duration_minutes);
        validate_duration(duration)?;
        let end = time::add_minutes(start, duration)?;

        if date == current.appointment_date && start == current.start_time && duration == current.duration_minutes {
            debug!("reschedule of {id} changes nothing");
            return Ok(current);
        }

        let window = Window::new(start, end);
        let existing = tx.find_appointments(date).await?;
        if let Some(hit) = find_conflict(&existing, &window, Some(id)) {
            metrics::counter!(SLOT_CONFLICTS_TOTAL).increment(1);
            warn!("reschedule of {id} rejected: overlaps {}", hit.id);
            return Err(conflict_error(hit));
        }

        let updated = Appointment {
            appointment_date: date,
            start_time: start,
            end_time: end,
            duration_minutes: duration,
            updated_at: self.clock.now(),
            ..current
        };
        let updated = self.save_locked(tx, updated).await?;
        metrics::counter!(APPOINTMENTS_RESCHEDULED_TOTAL).increment(1);
        info!("appointment {id} moved to {date} {}", time::format_lossy(start));
        Ok(updated)
    }

    pub async fn update_status(
        &self,
        id: Ulid,
        status: AppointmentStatus,
        cancellation_reason: Option<String>,
    ) -> Result<Appointment, EngineError> {
        let (tx, current) = self.lock_appointment(id).await?;
        if !current.status.can_transition_to(status) {
            return Err(EngineError::InvalidTransition {
                from: current.status,
                to: status,
            });
        }

        let reason = bounded_text(cancellation_reason)?.filter(|r| !r.trim().is_empty());
        let cancellation_reason = if status == AppointmentStatus::Cancelled {
            if reason.is_none() && self.config.require_cancellation_reason {
                return Err(EngineError::CancellationReasonRequired);
            }
            reason
        } else {
            current.cancellation_reason.clone()
        };

        let from = current.status;
        let updated = Appointment {
            status,
            cancellation_reason,
            updated_at: self.clock.now(),
            ..current
        };
        let updated = self.save_locked(tx, updated).await?;
        metrics::counter!(STATUS_TRANSITIONS_TOTAL, "status" => status.as_str()).increment(1);
        info!("appointment {id}: {from} -> {status}");
        Ok(updated)
    }

    pub async fn confirm(&self, id: Ulid) -> Result<Appointment, EngineError> {
        self.update_status(id, AppointmentStatus::Confirmed, None).await
    }

    pub async fn cancel(&self, id: Ulid, reason: Option<String>) -> Result<Appointment, EngineError> {
        self.update_status(id, AppointmentStatus::Cancelled, reason).await
    }

    pub async fn complete(&self, id: Ulid) -> Result<Appointment, EngineError> {
        self.update_status(id, AppointmentStatus::Completed, None).await
    }

    pub async fn mark_no_show(&self, id: Ulid) -> Result<Appointment, EngineError> {
        self.update_status(id, AppointmentStatus::NoShow, None).await
    }

    /// Partner-side notes. Allowed in any status.
    pub async fn update_notes(&self, id: Ulid, notes: Option<String>) -> Result<Appointment, EngineError> {
        let notes = bounded_text(notes)?;
        let (tx, current) = self.lock_appointment(id).await?;
        let updated = Appointment {
            notes,
            updated_at: self.clock.now(),
            ..current
        };
        self.save_locked(tx, updated).await
    }

    /// Administrative hard delete. Not part of the booking flow.
    pub async fn delete_appointment(&self, id: Ulid) -> Result<Appointment, EngineError> {
        let (mut tx, current) = self.lock_appointment(id).await?;
        tx.delete_appointment(id).await?;
        tx.commit().await?;
        info!("appointment {id} deleted");
        self.publish(
            current.team_member_id,
            &Event::AppointmentDeleted {
                id,
                team_member_id: current.team_member_id,
            },
        );
        Ok(current)
    }

    /// Open the owning member's transaction and re-read the appointment inside it.
    async fn lock_appointment(&self, id: Ulid) -> Result<Locked<'_>, EngineError> {
        let team_member_id = self
            .repo
            .find_appointment(id)
            .await?
            .ok_or_else(|| EngineError::not_found("appointment", id))?
            .team_member_id;
        let mut tx = self.repo.begin(team_member_id).await?;
        // Deleted between the lookup and the lock.
        let current = tx
            .find_appointment(id)
            .await?
            .ok_or_else(|| EngineError::not_found("appointment", id))?;
        Ok((tx, current))
    }

    async fn save_locked(&self, mut tx: Box<dyn ScheduleTx + '_>, appointment: Appointment) -> Result<Appointment, EngineError> {
        tx.save_appointment(appointment.clone()).await?;
        tx.commit().await?;
        self.publish(appointment.team_member_id, &Event::AppointmentSaved(appointment.clone()));
        Ok(appointment)
    }

    pub(super) async fn service_duration(&self, service_id: Ulid) -> Result<Minutes, EngineError> {
        self.repo
            .find_service(service_id)
            .await?
            .map(|s| s.duration_minutes)
            .ok_or_else(|| EngineError::not_found("service", service_id))
    }
}

pub(super) fn validate_duration(duration: Minutes) -> Result<Minutes, EngineError> {
    if !(1..=MAX_DURATION_MINUTES).contains(&duration) {
        return Err(EngineError::InvalidDuration {
            field: "duration_minutes",
            value: duration,
        });
    }
    Ok(duration)
}

fn bounded_text(text: Option<String>) -> Result<Option<String>, EngineError> {
    match text {
        Some(t) if t.chars().count() > MAX_NOTES_LEN => Err(EngineError::LimitExceeded("notes too long")),
        other => Ok(other),
    }
}
