use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::time::{self, Minutes, TimeError, hhmm};

/// Half-open time-of-day window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Window {
    #[serde(with = "hhmm")]
    pub start: Minutes,
    #[serde(with = "hhmm")]
    pub end: Minutes,
}

impl Window {
    pub fn new(start: Minutes, end: Minutes) -> Self {
        debug_assert!(start < end, "Window start must be before end");
        Self { start, end }
    }

    /// Build from `HH:MM[:SS]` strings, enforcing `start < end`.
    pub fn parse(start: &str, end: &str) -> Result<Self, TimeError> {
        let (s, e) = (time::to_minutes(start)?, time::to_minutes(end)?);
        Self::checked(s, e)
    }

    pub fn checked(start: Minutes, end: Minutes) -> Result<Self, TimeError> {
        if start >= end {
            return Err(TimeError::EmptyWindow {
                start: time::format_lossy(start),
                end: time::format_lossy(end),
            });
        }
        Ok(Self { start, end })
    }

    pub fn duration(&self) -> Minutes {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Window) -> bool {
        time::intervals_overlap(self.start, self.end, other.start, other.end)
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains(&self, other: &Window) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// Sunday = 0 … Saturday = 6.
pub fn day_of_week(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

// ── Availability rules (team member) ─────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleKind {
    Recurring { day_of_week: u8 },
    SpecificDate { specific_date: NaiveDate },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityRule {
    pub id: Ulid,
    pub team_member_id: Ulid,
    pub kind: RuleKind,
    pub window: Window,
}

impl AvailabilityRule {
    pub fn recurring(id: Ulid, team_member_id: Ulid, day_of_week: u8, window: Window) -> Self {
        debug_assert!(day_of_week < 7);
        Self {
            id,
            team_member_id,
            kind: RuleKind::Recurring { day_of_week },
            window,
        }
    }

    pub fn specific_date(id: Ulid, team_member_id: Ulid, specific_date: NaiveDate, window: Window) -> Self {
        Self {
            id,
            team_member_id,
            kind: RuleKind::SpecificDate { specific_date },
            window,
        }
    }
}

// ── Shop hours ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingHours {
    pub id: Ulid,
    pub shop_id: Ulid,
    pub day_of_week: u8,
    pub window: Window,
    pub slot_order: u32,
    pub is_active: bool,
}

/// A dated override of a shop's working hours. `window` is `None` exactly when the shop is closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialHours {
    pub id: Ulid,
    pub shop_id: Ulid,
    pub special_date: NaiveDate,
    /// Month/day repeats every year; the year of `special_date` is ignored.
    pub is_recurring_annual: bool,
    pub window: Option<Window>,
    pub slot_order: u32,
    pub is_active: bool,
}

impl SpecialHours {
    pub fn is_closed(&self) -> bool {
        self.window.is_none()
    }

    pub fn applies_to(&self, date: NaiveDate) -> bool {
        if self.is_recurring_annual {
            self.special_date.month() == date.month() && self.special_date.day() == date.day()
        } else {
            self.special_date == date
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShopHours {
    pub working: Vec<WorkingHours>,
    pub special: Vec<SpecialHours>,
}

/// The slice of a catalog service the scheduler needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub id: Ulid,
    pub duration_minutes: Minutes,
}

// ── Appointments ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
    NoShow,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "PENDING",
            AppointmentStatus::Confirmed => "CONFIRMED",
            AppointmentStatus::Cancelled => "CANCELLED",
            AppointmentStatus::Completed => "COMPLETED",
            AppointmentStatus::NoShow => "NO_SHOW",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Some(AppointmentStatus::Pending),
            "CONFIRMED" => Some(AppointmentStatus::Confirmed),
            "CANCELLED" => Some(AppointmentStatus::Cancelled),
            "COMPLETED" => Some(AppointmentStatus::Completed),
            "NO_SHOW" => Some(AppointmentStatus::NoShow),
            _ => None,
        }
    }

    /// Occupies the team member's time.
    pub fn is_active(&self) -> bool {
        matches!(self, AppointmentStatus::Pending | AppointmentStatus::Confirmed)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, Cancelled)
                | (Confirmed, Completed)
                | (Confirmed, NoShow)
        )
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: Ulid,
    pub customer_user_id: Ulid,
    pub team_member_id: Ulid,
    pub service_id: Ulid,
    pub appointment_date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: Minutes,
    #[serde(with = "hhmm")]
    pub end_time: Minutes,
    pub duration_minutes: Minutes,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub customer_notes: Option<String>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn window(&self) -> Window {
        Window::new(self.start_time, self.end_time)
    }
}

/// A candidate bookable interval, annotated with whether it is still free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlot {
    #[serde(with = "hhmm")]
    pub start_time: Minutes,
    #[serde(with = "hhmm")]
    pub end_time: Minutes,
    pub available: bool,
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RuleSaved(AvailabilityRule),
    RuleRemoved { id: Ulid, team_member_id: Ulid },
    WorkingHoursSaved(WorkingHours),
    SpecialHoursSaved(SpecialHours),
    ShopHoursRemoved { id: Ulid, shop_id: Ulid },
    ServiceSaved(ServiceInfo),
    AppointmentSaved(Appointment),
    AppointmentDeleted { id: Ulid, team_member_id: Ulid },
}
