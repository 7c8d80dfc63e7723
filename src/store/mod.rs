//! Persistence seam for the scheduler.
//!
//! The engine only ever talks to [`ScheduleRepository`]; every read that
//! precedes an appointment write happens inside a [`ScheduleTx`], which holds
//! an exclusive scope over one team member's book until it commits or drops.

mod maintenance;
mod memory;

pub use maintenance::run_compactor;
pub use memory::{InMemoryStore, MemberBook};

use async_trait::async_trait;
use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::{Appointment, AvailabilityRule, ServiceInfo, ShopHours};
use crate::time::Minutes;

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("WAL error: {0}")]
    Wal(String),
    #[error("WAL writer shut down")]
    WriterGone,
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("service duration out of range: {0}")]
    InvalidDuration(Minutes),
    #[error("appointment id already taken: {0}")]
    DuplicateId(Ulid),
}

#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    /// Every rule for the team member, any kind, any date.
    async fn find_availability_rules(&self, team_member_id: Ulid) -> Result<Vec<AvailabilityRule>, StoreError>;

    /// Working and special hours for the shop (empty when unknown).
    async fn find_shop_hours(&self, shop_id: Ulid) -> Result<ShopHours, StoreError>;

    async fn find_service(&self, service_id: Ulid) -> Result<Option<ServiceInfo>, StoreError>;

    async fn find_appointment(&self, id: Ulid) -> Result<Option<Appointment>, StoreError>;

    /// All appointments of any status on that date, ordered by start time.
    async fn find_appointments(&self, team_member_id: Ulid, date: NaiveDate) -> Result<Vec<Appointment>, StoreError>;

    /// Open an exclusive write scope over one team member's appointments.
    async fn begin(&self, team_member_id: Ulid) -> Result<Box<dyn ScheduleTx + '_>, StoreError>;
}

/// Writes are staged until `commit`; dropping the transaction discards them.
#[async_trait]
pub trait ScheduleTx: Send {
    async fn find_appointment(&mut self, id: Ulid) -> Result<Option<Appointment>, StoreError>;

    async fn find_appointments(&mut self, date: NaiveDate) -> Result<Vec<Appointment>, StoreError>;

    async fn save_appointment(&mut self, appointment: Appointment) -> Result<(), StoreError>;

    async fn delete_appointment(&mut self, id: Ulid) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
