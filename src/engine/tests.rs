use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tokio_test::{assert_err, assert_ok};
use ulid::Ulid;

use super::*;
use crate::clock::FixedClock;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::store::{InMemoryStore, ScheduleRepository};

const H: i32 = 60;

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("slotwise_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

// 2026-03-02 is a Monday.
fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
}

struct Fixture {
    store: Arc<InMemoryStore>,
    engine: Arc<Engine>,
    clock: Arc<FixedClock>,
    member: Ulid,
    shop: Ulid,
    service: Ulid,
}

/// Member available Mon 9–12, shop open Mon 9–17, 30-minute service.
async fn fixture(name: &str, config: EngineConfig) -> Fixture {
    let store = Arc::new(InMemoryStore::open(test_wal_path(name)).unwrap());
    let clock = Arc::new(FixedClock::new(t0()));
    let engine = Arc::new(Engine::new(
        store.clone(),
        clock.clone(),
        Arc::new(NotifyHub::new()),
        config,
    ));
    let (member, shop, service) = (Ulid::new(), Ulid::new(), Ulid::new());

    store
        .put_rule(AvailabilityRule::recurring(Ulid::new(), member, 1, Window::new(9 * H, 12 * H)))
        .await
        .unwrap();
    store
        .put_working_hours(WorkingHours {
            id: Ulid::new(),
            shop_id: shop,
            day_of_week: 1,
            window: Window::new(9 * H, 17 * H),
            slot_order: 0,
            is_active: true,
        })
        .await
        .unwrap();
    store
        .put_service(ServiceInfo {
            id: service,
            duration_minutes: 30,
        })
        .await
        .unwrap();

    Fixture {
        store,
        engine,
        clock,
        member,
        shop,
        service,
    }
}

impl Fixture {
    fn request(&self, start: &str, duration: Option<i32>) -> AppointmentRequest {
        AppointmentRequest {
            id: None,
            customer_user_id: Ulid::new(),
            team_member_id: self.member,
            service_id: self.service,
            appointment_date: monday(),
            start_time: start.into(),
            duration_minutes: duration,
            customer_notes: None,
        }
    }

    async fn book(&self, start: &str) -> Appointment {
        self.engine.create_appointment(self.request(start, None)).await.unwrap()
    }

    fn slot_query(&self) -> SlotQuery {
        SlotQuery {
            team_member_id: self.member,
            shop_id: self.shop,
            date: monday(),
            service_id: self.service,
            step_minutes: None,
        }
    }
}

// ── Slot listing ─────────────────────────────────────────────

#[tokio::test]
async fn morning_availability_yields_six_half_hour_slots() {
    let f = fixture("six_slots.wal", EngineConfig::default()).await;
    let slots = f.engine.available_slots(f.slot_query()).await.unwrap();

    assert_eq!(slots.len(), 6);
    assert_eq!((slots[0].start_time, slots[0].end_time), (9 * H, 9 * H + 30));
    assert_eq!((slots[5].start_time, slots[5].end_time), (11 * H + 30, 12 * H));
    assert!(slots.iter().all(|s| s.available));
}

#[tokio::test]
async fn booked_slot_is_flagged_unavailable() {
    let f = fixture("flagged.wal", EngineConfig::default()).await;
    let appt = f.book("10:00").await;
    f.engine.confirm(appt.id).await.unwrap();

    let slots = f.engine.available_slots(f.slot_query()).await.unwrap();
    let taken: Vec<i32> = slots.iter().filter(|s| !s.available).map(|s| s.start_time).collect();
    assert_eq!(taken, vec![10 * H]);
    assert_eq!(slots.len(), 6);
}

#[tokio::test]
async fn cancelled_appointment_frees_its_slot() {
    let f = fixture("cancel_frees.wal", EngineConfig::default()).await;
    let appt = f.book("10:00").await;
    f.engine.cancel(appt.id, Some("customer request".into())).await.unwrap();

    let slots = f.engine.available_slots(f.slot_query()).await.unwrap();
    assert!(slots.iter().all(|s| s.available));
    assert_ok!(f.engine.create_appointment(f.request("10:00", None)).await);
}

#[tokio::test]
async fn step_override_changes_granularity() {
    let f = fixture("step_override.wal", EngineConfig::default()).await;
    let query = SlotQuery {
        step_minutes: Some(15),
        ..f.slot_query()
    };
    let slots = f.engine.available_slots(query).await.unwrap();
    // 9:00 .. 11:30 every 15 minutes.
    assert_eq!(slots.len(), 11);

    let bad = SlotQuery {
        step_minutes: Some(0),
        ..f.slot_query()
    };
    assert!(matches!(
        f.engine.available_slots(bad).await,
        Err(EngineError::InvalidDuration { field: "step_minutes", .. })
    ));
}

#[tokio::test]
async fn shop_closure_empties_slot_list() {
    let f = fixture("closure.wal", EngineConfig::default()).await;
    f.store
        .put_special_hours(SpecialHours {
            id: Ulid::new(),
            shop_id: f.shop,
            special_date: monday(),
            is_recurring_annual: false,
            window: None,
            slot_order: 0,
            is_active: true,
        })
        .await
        .unwrap();

    assert!(f.engine.shop_windows(f.shop, monday()).await.unwrap().is_empty());
    assert!(f.engine.available_slots(f.slot_query()).await.unwrap().is_empty());
}

#[tokio::test]
async fn member_hours_clipped_to_shop_hours() {
    let f = fixture("clipped.wal", EngineConfig::default()).await;
    f.store
        .put_rule(AvailabilityRule::specific_date(
            Ulid::new(),
            f.member,
            monday(),
            Window::new(7 * H, 10 * H),
        ))
        .await
        .unwrap();

    let windows = f.engine.bookable_windows(f.member, f.shop, monday()).await.unwrap();
    assert_eq!(windows, vec![Window::new(9 * H, 10 * H)]);
    assert_eq!(
        f.engine.effective_windows(f.member, monday()).await.unwrap(),
        vec![Window::new(7 * H, 10 * H)]
    );
}

#[tokio::test]
async fn shop_without_hours_has_no_bookable_windows() {
    let f = fixture("no_shop_hours.wal", EngineConfig::default()).await;
    let query = SlotQuery {
        shop_id: Ulid::new(),
        ..f.slot_query()
    };

    assert!(!f.engine.effective_windows(f.member, monday()).await.unwrap().is_empty());
    assert!(f.engine.bookable_windows(f.member, query.shop_id, monday()).await.unwrap().is_empty());
    assert!(f.engine.available_slots(query).await.unwrap().is_empty());
}

#[tokio::test]
async fn unknown_service_is_not_found() {
    let f = fixture("unknown_service.wal", EngineConfig::default()).await;
    let query = SlotQuery {
        service_id: Ulid::new(),
        ..f.slot_query()
    };
    let err = f.engine.available_slots(query).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound { entity: "service", .. }));
}

// ── Booking ──────────────────────────────────────────────────

#[tokio::test]
async fn create_derives_end_time_and_starts_pending() {
    let f = fixture("create.wal", EngineConfig::default()).await;
    let appt = f
        .engine
        .create_appointment(f.request("09:30:45", Some(45)))
        .await
        .unwrap();

    assert_eq!(appt.status, AppointmentStatus::Pending);
    assert_eq!(appt.start_time, 9 * H + 30);
    assert_eq!(appt.end_time, 10 * H + 15);
    assert_eq!(appt.duration_minutes, 45);
    assert_eq!(appt.created_at, t0());
    assert_eq!(f.engine.get_appointment(appt.id).await.unwrap(), appt);
}

#[tokio::test]
async fn omitted_duration_uses_service_default() {
    let f = fixture("default_duration.wal", EngineConfig::default()).await;
    let appt = f.book("11:00").await;
    assert_eq!(appt.duration_minutes, 30);
    assert_eq!(appt.end_time, 11 * H + 30);
}

#[tokio::test]
async fn partial_overlap_is_a_slot_conflict() {
    let f = fixture("partial_overlap.wal", EngineConfig::default()).await;
    let existing = f.book("10:15").await;

    let err = f.engine.create_appointment(f.request("10:00", None)).await.unwrap_err();
    match &err {
        EngineError::SlotConflict { appointment_id, start, end } => {
            assert_eq!(*appointment_id, existing.id);
            assert_eq!(start, "10:15");
            assert_eq!(end, "10:45");
        }
        other => panic!("expected conflict, got {other:?}"),
    }
    assert_eq!(err.status_code(), 409);
}

#[tokio::test]
async fn adjacent_bookings_do_not_conflict() {
    let f = fixture("adjacent.wal", EngineConfig::default()).await;
    f.book("10:00").await;
    f.book("10:30").await;
    f.book("09:30").await;
    assert_eq!(f.engine.appointments_for_day(f.member, monday()).await.unwrap().len(), 3);
}

#[tokio::test]
async fn booking_validation_errors() {
    let f = fixture("validation.wal", EngineConfig::default()).await;

    assert!(matches!(
        f.engine.create_appointment(f.request("9am", None)).await,
        Err(EngineError::InvalidTimeFormat(_))
    ));
    assert!(matches!(
        f.engine.create_appointment(f.request("10:00", Some(0))).await,
        Err(EngineError::InvalidDuration { value: 0, .. })
    ));
    assert!(matches!(
        f.engine.create_appointment(f.request("23:30", Some(45))).await,
        Err(EngineError::DurationOverflowsDay { duration: 45, .. })
    ));
    // Ending exactly at midnight crosses into the next day too.
    assert_err!(f.engine.create_appointment(f.request("23:30", Some(30))).await);
    assert!(f.engine.appointments_for_day(f.member, monday()).await.unwrap().is_empty());
}

#[tokio::test]
async fn client_chosen_id_must_be_unique() {
    let f = fixture("dup_id.wal", EngineConfig::default()).await;
    let id = Ulid::new();
    let first = AppointmentRequest {
        id: Some(id),
        ..f.request("09:00", None)
    };
    assert_eq!(f.engine.create_appointment(first).await.unwrap().id, id);

    let again = AppointmentRequest {
        id: Some(id),
        ..f.request("11:00", None)
    };
    assert!(matches!(
        f.engine.create_appointment(again).await,
        Err(EngineError::AlreadyExists { .. })
    ));
}

#[tokio::test]
async fn concurrent_creates_with_one_id_admit_exactly_one() {
    let f = fixture("dup_id_race.wal", EngineConfig::default()).await;
    let id = Ulid::new();
    let create = |start: &str| {
        let engine = f.engine.clone();
        let req = AppointmentRequest {
            id: Some(id),
            ..f.request(start, None)
        };
        async move { engine.create_appointment(req).await }
    };

    let (a, b) = tokio::join!(create("09:00"), create("11:00"));
    let (won, lost) = match (a, b) {
        (Ok(won), Err(lost)) | (Err(lost), Ok(won)) => (won, lost),
        (a, b) => panic!("expected one winner, got {a:?} and {b:?}"),
    };
    assert!(matches!(lost, EngineError::AlreadyExists { entity: "appointment", .. }));

    let stored = f.engine.appointments_for_day(f.member, monday()).await.unwrap();
    assert_eq!(stored, vec![won.clone()]);
    assert_eq!(f.engine.get_appointment(id).await.unwrap(), won);
}

#[tokio::test]
async fn one_id_cannot_be_booked_for_two_members() {
    let f = fixture("dup_id_members.wal", EngineConfig::default()).await;
    let other = Ulid::new();
    let id = Ulid::new();
    let for_member = AppointmentRequest {
        id: Some(id),
        ..f.request("09:00", None)
    };
    let for_other = AppointmentRequest {
        id: Some(id),
        team_member_id: other,
        ..f.request("09:00", None)
    };

    let (a, b) = tokio::join!(
        f.engine.create_appointment(for_member),
        f.engine.create_appointment(for_other)
    );
    assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
    let owner = f.engine.get_appointment(id).await.unwrap().team_member_id;
    let loser = if owner == f.member { other } else { f.member };
    assert!(f.engine.appointments_for_day(loser, monday()).await.unwrap().is_empty());
    assert_eq!(f.engine.appointments_for_day(owner, monday()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn oversized_durations_are_rejected_not_walked() {
    let f = fixture("huge_duration.wal", EngineConfig::default()).await;
    let huge = ServiceInfo {
        id: Ulid::new(),
        duration_minutes: i32::MAX,
    };
    assert!(matches!(
        EngineError::from(f.store.put_service(huge).await.unwrap_err()),
        EngineError::InvalidDuration { value: i32::MAX, .. }
    ));
    let query = SlotQuery {
        service_id: huge.id,
        ..f.slot_query()
    };
    assert!(matches!(
        f.engine.available_slots(query).await,
        Err(EngineError::NotFound { entity: "service", .. })
    ));

    assert!(matches!(
        f.engine.create_appointment(f.request("09:00", Some(i32::MAX))).await,
        Err(EngineError::InvalidDuration { value: i32::MAX, .. })
    ));
    let check = AvailabilityCheck {
        team_member_id: f.member,
        date: monday(),
        start_time: "09:00".into(),
        duration_minutes: crate::limits::MAX_DURATION_MINUTES + 1,
    };
    assert_err!(f.engine.check_availability(check).await);
}

#[tokio::test]
async fn notes_are_bounded() {
    let f = fixture("notes_bound.wal", EngineConfig::default()).await;
    let long = "x".repeat(crate::limits::MAX_NOTES_LEN + 1);
    let req = AppointmentRequest {
        customer_notes: Some(long.clone()),
        ..f.request("09:00", None)
    };
    assert!(matches!(
        f.engine.create_appointment(req).await,
        Err(EngineError::LimitExceeded(_))
    ));

    let appt = f.book("09:00").await;
    assert_err!(f.engine.update_notes(appt.id, Some(long)).await);
    let noted = f.engine.update_notes(appt.id, Some("bring forms".into())).await.unwrap();
    assert_eq!(noted.notes.as_deref(), Some("bring forms"));
}

#[tokio::test]
async fn concurrent_overlapping_bookings_admit_exactly_one() {
    let f = fixture("double_booking.wal", EngineConfig::default()).await;
    let n = 16;
    let mut handles = Vec::new();
    for i in 0..n {
        let engine = f.engine.clone();
        // Every request overlaps 10:00–10:30.
        let req = f.request(if i % 2 == 0 { "10:00" } else { "10:15" }, None);
        handles.push(tokio::spawn(async move { engine.create_appointment(req).await }));
    }

    let mut booked = 0;
    let mut conflicts = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => booked += 1,
            Err(EngineError::SlotConflict { .. }) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(booked, 1);
    assert_eq!(conflicts, n - 1);
    assert_eq!(f.engine.appointments_for_day(f.member, monday()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn concurrent_disjoint_bookings_all_succeed() {
    let f = fixture("disjoint_booking.wal", EngineConfig::default()).await;
    let starts = ["09:00", "09:30", "10:00", "10:30", "11:00", "11:30"];
    let mut handles = Vec::new();
    for start in starts {
        let engine = f.engine.clone();
        let req = f.request(start, None);
        handles.push(tokio::spawn(async move { engine.create_appointment(req).await }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }
    let slots = f.engine.available_slots(f.slot_query()).await.unwrap();
    assert!(slots.iter().all(|s| !s.available));
}

// ── Reschedule ───────────────────────────────────────────────

#[tokio::test]
async fn reschedule_recomputes_end_and_ignores_itself() {
    let f = fixture("reschedule_self.wal", EngineConfig::default()).await;
    let appt = f.book("10:00").await;
    f.clock.advance(chrono::Duration::minutes(10));

    // Shifting by 15 minutes overlaps the old position of the same appointment.
    let moved = f
        .engine
        .update_schedule(
            appt.id,
            ScheduleChange {
                start_time: Some("10:15".into()),
                duration_minutes: Some(60),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!((moved.start_time, moved.end_time), (10 * H + 15, 11 * H + 15));
    assert_eq!(moved.updated_at, t0() + chrono::Duration::minutes(10));
    assert_eq!(moved.created_at, appt.created_at);
}

#[tokio::test]
async fn reschedule_onto_another_booking_conflicts() {
    let f = fixture("reschedule_conflict.wal", EngineConfig::default()).await;
    let a = f.book("09:00").await;
    let b = f.book("11:00").await;

    let err = f
        .engine
        .update_schedule(
            a.id,
            ScheduleChange {
                start_time: Some("10:45".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SlotConflict { appointment_id, .. } if appointment_id == b.id));
    assert_eq!(f.engine.get_appointment(a.id).await.unwrap().start_time, 9 * H);
}

#[tokio::test]
async fn reschedule_to_another_date() {
    let f = fixture("reschedule_date.wal", EngineConfig::default()).await;
    let appt = f.book("09:00").await;
    let tuesday = monday().succ_opt().unwrap();

    let moved = f
        .engine
        .update_schedule(
            appt.id,
            ScheduleChange {
                appointment_date: Some(tuesday),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(moved.appointment_date, tuesday);
    assert!(f.engine.appointments_for_day(f.member, monday()).await.unwrap().is_empty());
    assert_eq!(f.engine.appointments_for_day(f.member, tuesday).await.unwrap().len(), 1);
}

#[tokio::test]
async fn reschedule_terminal_or_missing_fails() {
    let f = fixture("reschedule_terminal.wal", EngineConfig::default()).await;
    let appt = f.book("09:00").await;
    f.engine.cancel(appt.id, Some("ill".into())).await.unwrap();

    let change = ScheduleChange {
        start_time: Some("10:00".into()),
        ..Default::default()
    };
    assert!(matches!(
        f.engine.update_schedule(appt.id, change.clone()).await,
        Err(EngineError::InvalidTransition { .. })
    ));
    assert!(matches!(
        f.engine.update_schedule(Ulid::new(), change).await,
        Err(EngineError::NotFound { entity: "appointment", .. })
    ));
}

// ── Status machine ───────────────────────────────────────────

#[tokio::test]
async fn happy_path_to_completed() {
    let f = fixture("happy_path.wal", EngineConfig::default()).await;
    let appt = f.book("09:00").await;
    assert_eq!(f.engine.confirm(appt.id).await.unwrap().status, AppointmentStatus::Confirmed);
    assert_eq!(f.engine.complete(appt.id).await.unwrap().status, AppointmentStatus::Completed);
    assert!(matches!(
        f.engine.cancel(appt.id, Some("too late".into())).await,
        Err(EngineError::InvalidTransition {
            from: AppointmentStatus::Completed,
            to: AppointmentStatus::Cancelled
        })
    ));
}

#[tokio::test]
async fn cancelled_is_terminal() {
    let f = fixture("cancel_terminal.wal", EngineConfig::default()).await;
    let appt = f.book("09:00").await;
    let cancelled = f.engine.cancel(appt.id, Some("double booked".into())).await.unwrap();
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("double booked"));

    let err = f.engine.confirm(appt.id).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidTransition {
            from: AppointmentStatus::Cancelled,
            to: AppointmentStatus::Confirmed
        }
    ));
}

#[tokio::test]
async fn no_show_only_from_confirmed() {
    let f = fixture("no_show.wal", EngineConfig::default()).await;
    let appt = f.book("09:00").await;
    assert_err!(f.engine.mark_no_show(appt.id).await);
    f.engine.confirm(appt.id).await.unwrap();
    assert_eq!(f.engine.mark_no_show(appt.id).await.unwrap().status, AppointmentStatus::NoShow);
}

#[tokio::test]
async fn cancellation_reason_policy() {
    let strict = fixture("reason_required.wal", EngineConfig::default()).await;
    let appt = strict.book("09:00").await;
    assert!(matches!(
        strict.engine.cancel(appt.id, None).await,
        Err(EngineError::CancellationReasonRequired)
    ));
    assert!(matches!(
        strict.engine.cancel(appt.id, Some("   ".into())).await,
        Err(EngineError::CancellationReasonRequired)
    ));
    assert_eq!(strict.engine.get_appointment(appt.id).await.unwrap().status, AppointmentStatus::Pending);

    let lenient = fixture(
        "reason_optional.wal",
        EngineConfig {
            require_cancellation_reason: false,
            ..EngineConfig::default()
        },
    )
    .await;
    let appt = lenient.book("09:00").await;
    let cancelled = lenient.engine.cancel(appt.id, None).await.unwrap();
    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
    assert_eq!(cancelled.cancellation_reason, None);
}

// ── Admin / persistence / notifications ─────────────────────

#[tokio::test]
async fn admin_delete_removes_record() {
    let f = fixture("admin_delete.wal", EngineConfig::default()).await;
    let appt = f.book("09:00").await;
    assert_eq!(f.engine.delete_appointment(appt.id).await.unwrap().id, appt.id);
    assert!(matches!(
        f.engine.get_appointment(appt.id).await,
        Err(EngineError::NotFound { .. })
    ));
    assert_err!(f.engine.delete_appointment(appt.id).await);
}

#[tokio::test]
async fn check_availability_flags_overlap_only() {
    let f = fixture("check_overlap.wal", EngineConfig::default()).await;
    f.book("10:00").await;
    let check = |start: &str| AvailabilityCheck {
        team_member_id: f.member,
        date: monday(),
        start_time: start.into(),
        duration_minutes: 30,
    };
    assert!(!f.engine.check_availability(check("10:15")).await.unwrap());
    assert!(f.engine.check_availability(check("10:30")).await.unwrap());
    assert!(f.engine.check_availability(check("09:30")).await.unwrap());
    assert!(f.engine.has_conflict(f.member, monday(), Window::new(600, 601), None).await.unwrap());
}

#[tokio::test]
async fn state_survives_restart() {
    let path = test_wal_path("restart.wal");
    let member = Ulid::new();
    let id;
    {
        let store = Arc::new(InMemoryStore::open(path.clone()).unwrap());
        let engine = Engine::new(
            store.clone(),
            Arc::new(FixedClock::new(t0())),
            Arc::new(NotifyHub::new()),
            EngineConfig::default(),
        );
        let appt = engine
            .create_appointment(AppointmentRequest {
                id: None,
                customer_user_id: Ulid::new(),
                team_member_id: member,
                service_id: Ulid::new(),
                appointment_date: monday(),
                start_time: "14:00".into(),
                duration_minutes: Some(90),
                customer_notes: Some("first visit".into()),
            })
            .await
            .unwrap();
        engine.confirm(appt.id).await.unwrap();
        id = appt.id;
    }

    let store = Arc::new(InMemoryStore::open(path).unwrap());
    let restored = store.find_appointment(id).await.unwrap().unwrap();
    assert_eq!(restored.status, AppointmentStatus::Confirmed);
    assert_eq!(restored.end_time, 15 * H + 30);
    assert_eq!(restored.customer_notes.as_deref(), Some("first visit"));
}

#[tokio::test]
async fn subscribers_see_committed_changes() {
    let f = fixture("notify.wal", EngineConfig::default()).await;
    let mut rx = f.engine.notify.subscribe(f.member);

    let appt = f.book("09:00").await;
    match rx.recv().await.unwrap() {
        Event::AppointmentSaved(a) => assert_eq!(a.id, appt.id),
        other => panic!("unexpected event {other:?}"),
    }

    // A rejected booking publishes nothing.
    assert_err!(f.engine.create_appointment(f.request("09:00", None)).await);
    f.engine.delete_appointment(appt.id).await.unwrap();
    assert!(matches!(rx.recv().await.unwrap(), Event::AppointmentDeleted { id, .. } if id == appt.id));
}
