use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock, RwLockReadGuard, mpsc, oneshot};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::wal::Wal;

use super::{ScheduleRepository, ScheduleTx, StoreError};

pub type SharedMemberBook = Arc<RwLock<MemberBook>>;

/// One team member's appointments, bucketed by date, each day sorted by start time.
#[derive(Debug, Default)]
pub struct MemberBook {
    pub days: BTreeMap<NaiveDate, Vec<Appointment>>,
    dates: HashMap<Ulid, NaiveDate>,
}

impl MemberBook {
    pub fn day(&self, date: NaiveDate) -> &[Appointment] {
        self.days.get(&date).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get(&self, id: Ulid) -> Option<&Appointment> {
        let date = self.dates.get(&id)?;
        self.day(*date).iter().find(|a| a.id == id)
    }

    /// Insert or replace (an update may move the appointment to another date).
    pub fn upsert(&mut self, appointment: Appointment) {
        self.remove(appointment.id);
        self.dates.insert(appointment.id, appointment.appointment_date);
        let day = self.days.entry(appointment.appointment_date).or_default();
        let pos = day.partition_point(|a| a.start_time <= appointment.start_time);
        day.insert(pos, appointment);
    }

    pub fn remove(&mut self, id: Ulid) -> Option<Appointment> {
        let date = self.dates.remove(&id)?;
        let day = self.days.get_mut(&date)?;
        let pos = day.iter().position(|a| a.id == id)?;
        let removed = day.remove(pos);
        if day.is_empty() {
            self.days.remove(&date);
        }
        Some(removed)
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Vec<Event>, oneshot::Sender<io::Result<()>>);

/// Owns the WAL. Drains every append already queued, writes them as one
/// batch, fsyncs once, then answers every sender with the shared outcome.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let WalCommand::Append { events, response } = cmd else {
            handle_non_append(&mut wal, cmd);
            continue;
        };
        let mut batch = vec![(events, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { events, response }) => batch.push((events, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        for (_, tx) in batch {
            let r = match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            };
            let _ = tx.send(r);
        }

        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let mut append_err = None;
    'outer: for (events, _) in batch {
        for event in events {
            if let Err(e) = wal.append_buffered(event) {
                append_err = Some(e);
                break 'outer;
            }
        }
    }
    // Flush even after a failed append so the partial bytes don't bleed into the next batch.
    let flush_result = wal.flush_sync();
    match append_err {
        Some(e) => Err(e),
        None => flush_result,
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result =
                Wal::write_compact_file(wal.path(), &events).and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// Reference `ScheduleRepository`: everything in memory, durable through a group-commit WAL.
pub struct InMemoryStore {
    books: DashMap<Ulid, SharedMemberBook>,
    rules: DashMap<Ulid, Vec<AvailabilityRule>>,
    shop_hours: DashMap<Ulid, ShopHours>,
    services: DashMap<Ulid, ServiceInfo>,
    /// Reverse lookup: entity (appointment, rule, hours entry) id → owning team member or shop.
    owners: DashMap<Ulid, Ulid>,
    /// Writers hold it shared (transactions from `begin`, before the book lock);
    /// compaction holds it exclusively, so it never waits on a book a writer owns.
    commit_gate: RwLock<()>,
    wal_tx: mpsc::Sender<WalCommand>,
}

impl InMemoryStore {
    /// Replay the WAL at `wal_path` and start its writer task. Must run inside a tokio runtime.
    pub fn open(wal_path: PathBuf) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let store = Self {
            books: DashMap::new(),
            rules: DashMap::new(),
            shop_hours: DashMap::new(),
            services: DashMap::new(),
            owners: DashMap::new(),
            commit_gate: RwLock::new(()),
            wal_tx,
        };

        let mut books: HashMap<Ulid, MemberBook> = HashMap::new();
        for event in &events {
            match event {
                Event::AppointmentSaved(appt) => {
                    store.owners.insert(appt.id, appt.team_member_id);
                    books.entry(appt.team_member_id).or_default().upsert(appt.clone());
                }
                Event::AppointmentDeleted { id, team_member_id } => {
                    store.owners.remove(id);
                    if let Some(book) = books.get_mut(team_member_id) {
                        book.remove(*id);
                    }
                }
                other => store.apply_catalog_event(other),
            }
        }
        for (member, book) in books {
            store.books.insert(member, Arc::new(RwLock::new(book)));
        }

        tracing::debug!("replayed {} events from {}", events.len(), wal_path.display());
        Ok(store)
    }

    async fn wal_append(&self, events: Vec<Event>) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append { events, response: tx })
            .await
            .map_err(|_| StoreError::WriterGone)?;
        rx.await
            .map_err(|_| StoreError::WriterGone)?
            .map_err(|e| StoreError::Wal(e.to_string()))
    }

    fn book(&self, team_member_id: Ulid) -> SharedMemberBook {
        self.books
            .entry(team_member_id)
            .or_insert_with(|| Arc::new(RwLock::new(MemberBook::default())))
            .value()
            .clone()
    }

    /// Apply a non-appointment event. Appointment events go through the member book lock.
    fn apply_catalog_event(&self, event: &Event) {
        match event {
            Event::RuleSaved(rule) => {
                if let Some(prev) = self.claim(rule.id, rule.team_member_id)
                    && let Some(mut stale) = self.rules.get_mut(&prev)
                {
                    stale.retain(|r| r.id != rule.id);
                }
                let mut rules = self.rules.entry(rule.team_member_id).or_default();
                rules.retain(|r| r.id != rule.id);
                rules.push(rule.clone());
            }
            Event::RuleRemoved { id, team_member_id } => {
                if let Some(mut rules) = self.rules.get_mut(team_member_id) {
                    rules.retain(|r| r.id != *id);
                }
                self.owners.remove(id);
            }
            Event::WorkingHoursSaved(wh) => {
                if let Some(prev) = self.claim(wh.id, wh.shop_id) {
                    self.drop_shop_hours(prev, wh.id);
                }
                let mut hours = self.shop_hours.entry(wh.shop_id).or_default();
                hours.working.retain(|h| h.id != wh.id);
                hours.special.retain(|h| h.id != wh.id);
                hours.working.push(wh.clone());
            }
            Event::SpecialHoursSaved(sh) => {
                if let Some(prev) = self.claim(sh.id, sh.shop_id) {
                    self.drop_shop_hours(prev, sh.id);
                }
                let mut hours = self.shop_hours.entry(sh.shop_id).or_default();
                hours.working.retain(|h| h.id != sh.id);
                hours.special.retain(|h| h.id != sh.id);
                hours.special.push(sh.clone());
            }
            Event::ShopHoursRemoved { id, shop_id } => {
                self.drop_shop_hours(*shop_id, *id);
                self.owners.remove(id);
            }
            Event::ServiceSaved(service) => {
                self.services.insert(service.id, *service);
            }
            Event::AppointmentSaved(_) | Event::AppointmentDeleted { .. } => {}
        }
    }

    /// Record the owner of a catalog id. Returns the previous owner if it differs.
    fn claim(&self, id: Ulid, owner: Ulid) -> Option<Ulid> {
        self.owners.insert(id, owner).filter(|prev| *prev != owner)
    }

    fn drop_shop_hours(&self, shop_id: Ulid, id: Ulid) {
        if let Some(mut hours) = self.shop_hours.get_mut(&shop_id) {
            hours.working.retain(|h| h.id != id);
            hours.special.retain(|h| h.id != id);
        }
    }

    /// Claim the ids of appointments this book has never held, so two books
    /// cannot both commit the same client-chosen id. Nothing stays claimed on error.
    fn reserve_new_ids(
        &self,
        team_member_id: Ulid,
        book: &MemberBook,
        staged: &[Event],
    ) -> Result<Vec<Ulid>, StoreError> {
        let mut reserved: Vec<Ulid> = Vec::new();
        for event in staged {
            let Event::AppointmentSaved(appt) = event else {
                continue;
            };
            if book.get(appt.id).is_some() || reserved.contains(&appt.id) {
                continue;
            }
            let taken = match self.owners.entry(appt.id) {
                Entry::Vacant(slot) => {
                    slot.insert(team_member_id);
                    false
                }
                Entry::Occupied(_) => true,
            };
            if taken {
                self.release_ids(team_member_id, &reserved);
                return Err(StoreError::DuplicateId(appt.id));
            }
            reserved.push(appt.id);
        }
        Ok(reserved)
    }

    fn release_ids(&self, team_member_id: Ulid, ids: &[Ulid]) {
        for id in ids {
            self.owners.remove_if(id, |_, owner| *owner == team_member_id);
        }
    }

    async fn persist_catalog_event(&self, event: Event) -> Result<(), StoreError> {
        let _gate = self.commit_gate.read().await;
        self.wal_append(vec![event.clone()]).await?;
        self.apply_catalog_event(&event);
        Ok(())
    }

    // ── Partner-management writes ────────────────────────────

    pub async fn put_rule(&self, rule: AvailabilityRule) -> Result<(), StoreError> {
        let count = self.rules.get(&rule.team_member_id).map_or(0, |r| r.len());
        if count >= MAX_RULES_PER_TEAM_MEMBER {
            return Err(StoreError::LimitExceeded("too many availability rules"));
        }
        self.persist_catalog_event(Event::RuleSaved(rule)).await
    }

    /// Returns the owning team member, or `None` if no such rule exists.
    pub async fn remove_rule(&self, id: Ulid) -> Result<Option<Ulid>, StoreError> {
        let Some(team_member_id) = self.rule_owner(id) else {
            return Ok(None);
        };
        self.persist_catalog_event(Event::RuleRemoved { id, team_member_id }).await?;
        Ok(Some(team_member_id))
    }

    pub async fn put_working_hours(&self, hours: WorkingHours) -> Result<(), StoreError> {
        self.check_shop_capacity(hours.shop_id)?;
        self.persist_catalog_event(Event::WorkingHoursSaved(hours)).await
    }

    pub async fn put_special_hours(&self, hours: SpecialHours) -> Result<(), StoreError> {
        self.check_shop_capacity(hours.shop_id)?;
        self.persist_catalog_event(Event::SpecialHoursSaved(hours)).await
    }

    /// Removes a working- or special-hours entry. Returns the shop, or `None` if unknown.
    pub async fn remove_shop_hours(&self, id: Ulid) -> Result<Option<Ulid>, StoreError> {
        let Some(shop_id) = self.hours_owner(id) else {
            return Ok(None);
        };
        self.persist_catalog_event(Event::ShopHoursRemoved { id, shop_id }).await?;
        Ok(Some(shop_id))
    }

    pub async fn put_service(&self, service: ServiceInfo) -> Result<(), StoreError> {
        if !(1..=MAX_DURATION_MINUTES).contains(&service.duration_minutes) {
            return Err(StoreError::InvalidDuration(service.duration_minutes));
        }
        self.persist_catalog_event(Event::ServiceSaved(service)).await
    }

    fn check_shop_capacity(&self, shop_id: Ulid) -> Result<(), StoreError> {
        let count = self
            .shop_hours
            .get(&shop_id)
            .map_or(0, |h| h.working.len() + h.special.len());
        if count >= MAX_HOURS_PER_SHOP {
            return Err(StoreError::LimitExceeded("too many shop hours entries"));
        }
        Ok(())
    }

    fn rule_owner(&self, id: Ulid) -> Option<Ulid> {
        let owner = *self.owners.get(&id)?;
        let rules = self.rules.get(&owner)?;
        rules.iter().any(|r| r.id == id).then_some(owner)
    }

    fn hours_owner(&self, id: Ulid) -> Option<Ulid> {
        let owner = *self.owners.get(&id)?;
        let hours = self.shop_hours.get(&owner)?;
        let known = hours.working.iter().any(|h| h.id == id) || hours.special.iter().any(|h| h.id == id);
        known.then_some(owner)
    }

    // ── Maintenance ──────────────────────────────────────────

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    /// Rewrite the WAL with only the events needed to rebuild the current state.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let _gate = self.commit_gate.write().await;

        let mut events = Vec::new();
        for entry in self.services.iter() {
            events.push(Event::ServiceSaved(*entry.value()));
        }
        for entry in self.rules.iter() {
            events.extend(entry.value().iter().cloned().map(Event::RuleSaved));
        }
        for entry in self.shop_hours.iter() {
            let hours = entry.value();
            events.extend(hours.working.iter().cloned().map(Event::WorkingHoursSaved));
            events.extend(hours.special.iter().cloned().map(Event::SpecialHoursSaved));
        }
        let books: Vec<SharedMemberBook> = self.books.iter().map(|e| e.value().clone()).collect();
        for book in books {
            let guard = book.read().await;
            for day in guard.days.values() {
                events.extend(day.iter().cloned().map(Event::AppointmentSaved));
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| StoreError::WriterGone)?;
        rx.await
            .map_err(|_| StoreError::WriterGone)?
            .map_err(|e| StoreError::Wal(e.to_string()))
    }
}

#[async_trait]
impl ScheduleRepository for InMemoryStore {
    async fn find_availability_rules(&self, team_member_id: Ulid) -> Result<Vec<AvailabilityRule>, StoreError> {
        Ok(self
            .rules
            .get(&team_member_id)
            .map(|r| r.value().clone())
            .unwrap_or_default())
    }

    async fn find_shop_hours(&self, shop_id: Ulid) -> Result<ShopHours, StoreError> {
        Ok(self
            .shop_hours
            .get(&shop_id)
            .map(|h| h.value().clone())
            .unwrap_or_default())
    }

    async fn find_service(&self, service_id: Ulid) -> Result<Option<ServiceInfo>, StoreError> {
        Ok(self.services.get(&service_id).map(|s| *s.value()))
    }

    async fn find_appointment(&self, id: Ulid) -> Result<Option<Appointment>, StoreError> {
        let Some(member) = self.owners.get(&id).map(|e| *e.value()) else {
            return Ok(None);
        };
        let Some(book) = self.books.get(&member).map(|e| e.value().clone()) else {
            return Ok(None);
        };
        let guard = book.read().await;
        Ok(guard.get(id).cloned())
    }

    async fn find_appointments(&self, team_member_id: Ulid, date: NaiveDate) -> Result<Vec<Appointment>, StoreError> {
        let Some(book) = self.books.get(&team_member_id).map(|e| e.value().clone()) else {
            return Ok(Vec::new());
        };
        let guard = book.read().await;
        Ok(guard.day(date).to_vec())
    }

    async fn begin(&self, team_member_id: Ulid) -> Result<Box<dyn ScheduleTx + '_>, StoreError> {
        let gate = self.commit_gate.read().await;
        let guard = self.book(team_member_id).write_owned().await;
        Ok(Box::new(MemoryTx {
            store: self,
            team_member_id,
            _gate: gate,
            guard,
            staged: Vec::new(),
        }))
    }
}

/// Holds the member's book write lock for its whole life.
struct MemoryTx<'a> {
    store: &'a InMemoryStore,
    team_member_id: Ulid,
    _gate: RwLockReadGuard<'a, ()>,
    guard: OwnedRwLockWriteGuard<MemberBook>,
    staged: Vec<Event>,
}

impl MemoryTx<'_> {
    /// Committed state with this transaction's staged writes laid over it.
    fn staged_view(&self, id: Ulid) -> Option<Option<&Appointment>> {
        self.staged.iter().rev().find_map(|e| match e {
            Event::AppointmentSaved(a) if a.id == id => Some(Some(a)),
            Event::AppointmentDeleted { id: d, .. } if *d == id => Some(None),
            _ => None,
        })
    }
}

#[async_trait]
impl ScheduleTx for MemoryTx<'_> {
    async fn find_appointment(&mut self, id: Ulid) -> Result<Option<Appointment>, StoreError> {
        if let Some(staged) = self.staged_view(id) {
            return Ok(staged.cloned());
        }
        Ok(self.guard.get(id).cloned())
    }

    async fn find_appointments(&mut self, date: NaiveDate) -> Result<Vec<Appointment>, StoreError> {
        let mut day: Vec<Appointment> = self
            .guard
            .day(date)
            .iter()
            .filter(|a| self.staged_view(a.id).is_none())
            .cloned()
            .collect();
        let mut seen = std::collections::HashSet::new();
        for event in self.staged.iter().rev() {
            if let Event::AppointmentSaved(a) = event
                && seen.insert(a.id)
                && a.appointment_date == date
                && matches!(self.staged_view(a.id), Some(Some(_)))
            {
                day.push(a.clone());
            }
        }
        day.sort_by_key(|a| a.start_time);
        Ok(day)
    }

    async fn save_appointment(&mut self, appointment: Appointment) -> Result<(), StoreError> {
        debug_assert_eq!(appointment.team_member_id, self.team_member_id);
        self.staged.push(Event::AppointmentSaved(appointment));
        Ok(())
    }

    async fn delete_appointment(&mut self, id: Ulid) -> Result<(), StoreError> {
        self.staged.push(Event::AppointmentDeleted {
            id,
            team_member_id: self.team_member_id,
        });
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTx {
            store,
            team_member_id,
            mut guard,
            staged,
            ..
        } = *self;
        if staged.is_empty() {
            return Ok(());
        }
        let reserved = store.reserve_new_ids(team_member_id, &guard, &staged)?;
        if let Err(e) = store.wal_append(staged.clone()).await {
            store.release_ids(team_member_id, &reserved);
            return Err(e);
        }
        for event in staged {
            match event {
                Event::AppointmentSaved(appt) => {
                    store.owners.insert(appt.id, appt.team_member_id);
                    guard.upsert(appt);
                }
                Event::AppointmentDeleted { id, .. } => {
                    store.owners.remove(&id);
                    guard.remove(id);
                }
                other => store.apply_catalog_event(&other),
            }
        }
        Ok(())
    }
}
