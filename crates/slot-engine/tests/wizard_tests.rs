//! Tests for the booking wizard state machine.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use slot_engine::availability::AvailabilityResolver;
use slot_engine::calendar::{CalendarAction, CalendarEvent, EventVariant};
use slot_engine::config::SlotPolicy;
use slot_engine::error::ServiceError;
use slot_engine::interval::Interval;
use slot_engine::model::{Appointment, FreeWindow, ParticipantId};
use slot_engine::ports::{
    AppointmentStore, AvailabilitySearch, InMemoryAppointmentStore, InMemoryBusySource,
    ServiceResult,
};
use slot_engine::slots::{SlotId, SlotState};
use slot_engine::wire::{format_datetime, AppointmentDraft, AppointmentUpdate, SearchRequest};
use slot_engine::wizard::{
    BookingDetails, BookingWizard, Settlement, Step, Submission, WizardError, MAX_NAME_LEN,
    MAX_NOTES_LEN,
};

// ── Helpers ─────────────────────────────────────────────────────────────────

fn at(hour: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 16, hour, min, 0).unwrap()
}

fn iv(start: (u32, u32), end: (u32, u32)) -> Interval {
    Interval::new(at(start.0, start.1), at(end.0, end.1)).unwrap()
}

fn pid(id: &str) -> ParticipantId {
    ParticipantId::new(id)
}

fn slot_id(start: (u32, u32), end: (u32, u32)) -> SlotId {
    SlotId::for_interval(&iv(start, end))
}

/// A wizard with a 09:00–12:00 range and two participants, ready to search.
fn ready_wizard() -> BookingWizard {
    let mut wizard = BookingWizard::new(SlotPolicy::default());
    wizard.set_range(at(9, 0), at(12, 0)).unwrap();
    wizard.set_participants([pid("U1"), pid("U2")]).unwrap();
    wizard.set_details("Planning", "").unwrap();
    wizard
}

fn draft(name: &str, span: Interval, participants: &[&str]) -> AppointmentDraft {
    AppointmentDraft {
        name: name.to_string(),
        notes: String::new(),
        start_date: format_datetime(span.start()),
        end_date: format_datetime(span.end()),
        participant_ids: participants.iter().map(|p| pid(p)).collect(),
    }
}

/// A search service that answers every request with the same result.
struct FixedSearch {
    result: ServiceResult<Vec<FreeWindow>>,
    calls: AtomicUsize,
}

impl FixedSearch {
    fn ok(windows: Vec<FreeWindow>) -> Self {
        Self {
            result: Ok(windows),
            calls: AtomicUsize::new(0),
        }
    }

    fn failing(err: ServiceError) -> Self {
        Self {
            result: Err(err),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl AvailabilitySearch for FixedSearch {
    async fn search(&self, _request: &SearchRequest) -> ServiceResult<Vec<FreeWindow>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

/// A store whose every call fails with the same error.
struct FailingStore(ServiceError);

#[async_trait]
impl AppointmentStore for FailingStore {
    async fn create(&self, _draft: &AppointmentDraft) -> ServiceResult<Appointment> {
        Err(self.0.clone())
    }

    async fn update(&self, _update: &AppointmentUpdate) -> ServiceResult<Appointment> {
        Err(self.0.clone())
    }
}

// ── Criteria collection ─────────────────────────────────────────────────────

#[tokio::test]
async fn invalid_criteria_never_reach_the_network() {
    let service = FixedSearch::ok(vec![iv((9, 0), (12, 0))]);

    let mut no_range = BookingWizard::new(SlotPolicy::default());
    no_range.set_participants([pid("U1")]).unwrap();
    let err = no_range.search(&service).await.unwrap_err();
    assert!(matches!(err, WizardError::Validation(_)));
    assert_eq!(no_range.error(), Some(&err));

    let mut no_participants = BookingWizard::new(SlotPolicy::default());
    no_participants.set_range(at(9, 0), at(12, 0)).unwrap();
    assert!(matches!(
        no_participants.search(&service).await,
        Err(WizardError::Validation(_))
    ));

    let mut inverted = BookingWizard::new(SlotPolicy::default());
    inverted.set_range(at(12, 0), at(9, 0)).unwrap();
    inverted.set_participants([pid("U1")]).unwrap();
    assert!(matches!(
        inverted.search(&service).await,
        Err(WizardError::Validation(_))
    ));

    assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    assert_eq!(inverted.step(), Step::CollectCriteria);
}

#[test]
fn search_request_reflects_the_criteria() {
    let mut wizard = ready_wizard();

    let ticket = wizard.begin_search().unwrap();

    assert_eq!(ticket.request.start_date, "2026-03-16T09:00:00Z");
    assert_eq!(ticket.request.end_date, "2026-03-16T12:00:00Z");
    assert_eq!(ticket.request.participant_ids, vec![pid("U1"), pid("U2")]);
    assert_eq!(ticket.request.exclude_appointment_id, None);
    assert!(wizard.is_pending());
}

#[test]
fn second_search_while_pending_is_refused() {
    let mut wizard = ready_wizard();
    let _ticket = wizard.begin_search().unwrap();

    assert_eq!(wizard.begin_search().unwrap_err(), WizardError::RequestPending);
    assert_eq!(
        wizard.set_range(at(8, 0), at(9, 0)).unwrap_err(),
        WizardError::RequestPending
    );
}

#[tokio::test]
async fn details_are_frozen_while_a_refresh_is_in_flight() {
    let mut wizard = ready_wizard();
    wizard
        .search(&FixedSearch::ok(vec![iv((9, 0), (10, 0))]))
        .await
        .unwrap();
    let _refresh = wizard.begin_refresh().unwrap();

    assert_eq!(
        wizard.set_details("Renamed", "").unwrap_err(),
        WizardError::RequestPending
    );
    assert_eq!(wizard.state().details.name, "Planning");
}

#[tokio::test]
async fn sub_second_range_start_is_never_undercut() {
    let start = at(9, 0) + Duration::milliseconds(700);
    let source = InMemoryBusySource::new().with_participant(pid("U1"));
    let resolver = AvailabilityResolver::new(source);
    let mut wizard = BookingWizard::new(SlotPolicy::default());
    wizard.set_range(start, at(10, 0)).unwrap();
    wizard.set_participants([pid("U1")]).unwrap();

    let ticket = wizard.begin_search().unwrap();
    assert_eq!(ticket.request.start_date, "2026-03-16T09:00:00.700Z");
    let result = resolver.search(&ticket.request).await;
    wizard.complete_search(ticket, result);

    let starts: Vec<_> = wizard.candidate_slots().iter().map(|s| s.start()).collect();
    assert_eq!(starts, vec![at(9, 15), at(9, 30)]);
}

// ── Search outcomes ─────────────────────────────────────────────────────────

#[tokio::test]
async fn successful_search_moves_to_slot_choice() {
    let mut wizard = ready_wizard();
    let service = FixedSearch::ok(vec![iv((9, 0), (10, 0))]);

    wizard.search(&service).await.unwrap();

    assert_eq!(wizard.step(), Step::ChooseSlot);
    assert_eq!(wizard.candidate_slots().len(), 3);
    assert!(!wizard.is_pending());
    assert!(wizard.error().is_none());
}

#[tokio::test]
async fn empty_search_result_still_reaches_slot_choice() {
    let mut wizard = ready_wizard();

    wizard.search(&FixedSearch::ok(vec![])).await.unwrap();

    assert_eq!(wizard.step(), Step::ChooseSlot);
    assert!(wizard.candidate_slots().is_empty());
}

#[tokio::test]
async fn network_failure_stays_on_criteria_with_an_error() {
    let mut wizard = ready_wizard();
    let service = FixedSearch::failing(ServiceError::Network("timed out".to_string()));

    let err = wizard.search(&service).await.unwrap_err();

    assert_eq!(err, WizardError::Network("timed out".to_string()));
    assert_eq!(wizard.step(), Step::CollectCriteria);
    assert!(wizard.candidate_slots().is_empty());
    assert!(!wizard.is_pending());
}

#[tokio::test]
async fn server_failure_passes_the_message_through() {
    let mut wizard = ready_wizard();
    let service = FixedSearch::failing(ServiceError::Server {
        status: 503,
        message: "maintenance".to_string(),
    });

    let err = wizard.search(&service).await.unwrap_err();

    assert_eq!(
        err,
        WizardError::Server {
            status: 503,
            message: "maintenance".to_string()
        }
    );
    assert_eq!(wizard.step(), Step::CollectCriteria);
}

#[tokio::test]
async fn failed_refresh_clears_candidates_but_keeps_the_step() {
    let mut wizard = ready_wizard();
    wizard
        .search(&FixedSearch::ok(vec![iv((9, 0), (10, 0))]))
        .await
        .unwrap();

    let service = FixedSearch::failing(ServiceError::Network("reset".to_string()));
    assert!(wizard.refresh(&service).await.is_err());

    assert_eq!(wizard.step(), Step::ChooseSlot);
    assert!(wizard.candidate_slots().is_empty());
}

// ── Navigation and teardown ─────────────────────────────────────────────────

#[test]
fn back_abandons_a_pending_search() {
    let mut wizard = ready_wizard();
    let ticket = wizard.begin_search().unwrap();

    wizard.back().unwrap();
    let settlement = wizard.complete_search(ticket, Ok(vec![iv((9, 0), (12, 0))]));

    assert_eq!(settlement, Settlement::Discarded);
    assert_eq!(wizard.step(), Step::CollectCriteria);
    assert!(wizard.candidate_slots().is_empty());
    assert!(!wizard.is_pending());
}

#[tokio::test]
async fn back_clears_candidates_and_choice() {
    let mut wizard = ready_wizard();
    wizard
        .search(&FixedSearch::ok(vec![iv((9, 0), (10, 0))]))
        .await
        .unwrap();
    wizard.choose_slot(&slot_id((9, 0), (9, 30))).unwrap();

    wizard.back().unwrap();

    assert_eq!(wizard.step(), Step::CollectCriteria);
    assert!(wizard.candidate_slots().is_empty());
    assert!(wizard.chosen().is_none());
    assert!(wizard.state().criteria.is_none());
    // The draft is kept so the user can adjust it.
    assert_eq!(wizard.state().draft.participants.len(), 2);
}

#[test]
fn results_after_close_are_discarded() {
    let mut wizard = ready_wizard();
    let ticket = wizard.begin_search().unwrap();

    wizard.close();

    assert_eq!(
        wizard.complete_search(ticket, Ok(vec![iv((9, 0), (12, 0))])),
        Settlement::Discarded
    );
    assert!(wizard.is_closed());
    assert_eq!(wizard.step(), Step::CollectCriteria);
    assert_eq!(
        wizard.set_range(at(9, 0), at(10, 0)).unwrap_err(),
        WizardError::Closed
    );
    assert_eq!(wizard.back().unwrap_err(), WizardError::Closed);
}

#[test]
fn back_is_refused_while_submitting() {
    let mut wizard = ready_wizard();
    let ticket = wizard.begin_search().unwrap();
    wizard.complete_search(ticket, Ok(vec![iv((9, 0), (10, 0))]));
    wizard.choose_slot(&slot_id((9, 0), (9, 30))).unwrap();
    let _submit = wizard.begin_submit().unwrap();

    assert_eq!(wizard.step(), Step::Submitting);
    assert_eq!(wizard.back().unwrap_err(), WizardError::RequestPending);
    assert_eq!(wizard.begin_submit().unwrap_err(), WizardError::RequestPending);
}

// ── Slot choice ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn choosing_a_slot_marks_it_selected() {
    let mut wizard = ready_wizard();
    wizard
        .search(&FixedSearch::ok(vec![iv((9, 0), (10, 0))]))
        .await
        .unwrap();

    wizard.choose_slot(&slot_id((9, 15), (9, 45))).unwrap();
    wizard.choose_slot(&slot_id((9, 30), (10, 0))).unwrap();

    let selected: Vec<_> = wizard
        .candidate_slots()
        .iter()
        .filter(|s| s.state == SlotState::Selected)
        .map(|s| s.interval)
        .collect();
    assert_eq!(selected, vec![iv((9, 30), (10, 0))]);
    assert_eq!(wizard.chosen().map(|s| s.title()), Some("Slot 3 (selected)".to_string()));
}

#[tokio::test]
async fn choosing_an_unknown_slot_is_an_error() {
    let mut wizard = ready_wizard();
    wizard
        .search(&FixedSearch::ok(vec![iv((9, 0), (10, 0))]))
        .await
        .unwrap();

    let missing = slot_id((15, 0), (15, 30));
    assert_eq!(
        wizard.choose_slot(&missing).unwrap_err(),
        WizardError::UnknownSlot(missing)
    );
    assert!(wizard.chosen().is_none());
}

#[tokio::test]
async fn calendar_clicks_drive_the_choice() {
    let mut wizard = ready_wizard();
    wizard
        .search(&FixedSearch::ok(vec![iv((9, 0), (10, 0))]))
        .await
        .unwrap();

    let view = wizard.calendar_view();
    let target = slot_id((9, 15), (9, 45));
    let action = view.on_event_activated(target.as_str()).unwrap();
    wizard.apply(action).unwrap();
    assert_eq!(wizard.chosen().map(|s| s.id.clone()), Some(target.clone()));

    // Clicking a plain appointment leaves the choice alone.
    let other = CalendarAction::EventActivated(CalendarEvent {
        id: Some("A7".to_string()),
        title: "Lunch".to_string(),
        start: at(12, 0),
        end: at(13, 0),
        variant: EventVariant::Outline,
    });
    wizard.apply(other).unwrap();
    assert_eq!(wizard.chosen().map(|s| s.id.clone()), Some(target));
}

#[tokio::test]
async fn refresh_keeps_a_still_available_choice_selected() {
    let mut wizard = ready_wizard();
    let service = FixedSearch::ok(vec![iv((9, 0), (10, 0))]);
    wizard.search(&service).await.unwrap();
    wizard.choose_slot(&slot_id((9, 0), (9, 30))).unwrap();

    wizard.refresh(&service).await.unwrap();

    assert!(wizard.candidate_slots()[0].is_selected());
    assert!(wizard.chosen().is_some());
}

// ── Submission ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn submit_without_a_choice_is_refused() {
    let mut wizard = ready_wizard();
    wizard
        .search(&FixedSearch::ok(vec![iv((9, 0), (10, 0))]))
        .await
        .unwrap();

    assert_eq!(wizard.begin_submit().unwrap_err(), WizardError::NoSelection);
    assert_eq!(wizard.step(), Step::ChooseSlot);
}

#[tokio::test]
async fn invalid_details_block_submission() {
    let mut wizard = ready_wizard();
    wizard
        .search(&FixedSearch::ok(vec![iv((9, 0), (10, 0))]))
        .await
        .unwrap();
    wizard.choose_slot(&slot_id((9, 0), (9, 30))).unwrap();

    wizard.set_details("   ", "").unwrap();
    assert!(matches!(wizard.begin_submit(), Err(WizardError::Validation(_))));
    assert!(wizard.chosen().is_some());
    assert!(!wizard.is_pending());
}

#[test]
fn booking_details_limits() {
    let ok = BookingDetails {
        name: "n".repeat(MAX_NAME_LEN),
        notes: "x".repeat(MAX_NOTES_LEN),
    };
    assert!(ok.validate().is_ok());

    let long_name = BookingDetails {
        name: "n".repeat(MAX_NAME_LEN + 1),
        notes: String::new(),
    };
    assert!(long_name.validate().is_err());

    let long_notes = BookingDetails {
        name: "Sync".to_string(),
        notes: "x".repeat(MAX_NOTES_LEN + 1),
    };
    assert!(long_notes.validate().is_err());
}

#[tokio::test]
async fn successful_submit_creates_the_appointment() {
    let store = Arc::new(InMemoryAppointmentStore::new());
    let resolver = AvailabilityResolver::new(store.clone());
    let mut wizard = ready_wizard();
    wizard.search(&resolver).await.unwrap();
    wizard.choose_slot(&slot_id((10, 0), (10, 30))).unwrap();

    let booked = wizard.submit(&*store).await.unwrap();

    assert_eq!(wizard.step(), Step::Done);
    assert_eq!(booked.interval, iv((10, 0), (10, 30)));
    assert_eq!(booked.name, "Planning");
    assert_eq!(store.appointments().len(), 1);
    assert_eq!(wizard.state().booked.as_ref(), Some(&booked));
    assert!(matches!(wizard.back(), Err(WizardError::InvalidTransition { .. })));
}

#[tokio::test]
async fn sub_second_slots_are_booked_exactly() {
    let store = Arc::new(InMemoryAppointmentStore::new());
    let resolver = AvailabilityResolver::new(store.clone());
    let policy = SlotPolicy::new(Duration::milliseconds(1500), Duration::seconds(1)).unwrap();
    let mut wizard = BookingWizard::new(policy);
    wizard
        .set_range(at(9, 0) + Duration::milliseconds(700), at(9, 0) + Duration::seconds(5))
        .unwrap();
    wizard.set_participants([pid("U1")]).unwrap();
    wizard.set_details("Sync", "").unwrap();
    wizard.search(&resolver).await.unwrap();

    let chosen = wizard.candidate_slots()[0].clone();
    assert_eq!(chosen.start(), at(9, 0) + Duration::milliseconds(1500));
    wizard.choose_slot(&chosen.id).unwrap();
    let booked = wizard.submit(&*store).await.unwrap();

    assert_eq!(booked.interval, chosen.interval);
}

#[tokio::test]
async fn creating_keeps_seeded_appointments() {
    let scratch = InMemoryAppointmentStore::new();
    scratch
        .create(&draft("Breakfast", iv((7, 0), (8, 0)), &["U1"]))
        .await
        .unwrap();
    let seeded = scratch
        .create(&draft("Standup", iv((8, 0), (9, 0)), &["U1"]))
        .await
        .unwrap();
    assert_eq!(seeded.id.to_string(), "A2");

    // One stored appointment, already holding the id a naive count would pick.
    let store = InMemoryAppointmentStore::with_appointments(vec![seeded]);
    let created = store
        .create(&draft("Review", iv((14, 0), (15, 0)), &["U1"]))
        .await
        .unwrap();

    assert_eq!(created.id.to_string(), "A3");
    let names: Vec<_> = store.appointments().into_iter().map(|a| a.name).collect();
    assert_eq!(names, vec!["Standup".to_string(), "Review".to_string()]);
}

#[tokio::test]
async fn concurrent_booking_makes_the_choice_stale() {
    let store = Arc::new(InMemoryAppointmentStore::new());
    let resolver = AvailabilityResolver::new(store.clone());
    let mut wizard = ready_wizard();
    wizard.search(&resolver).await.unwrap();
    assert_eq!(wizard.candidate_slots().len(), 11);
    let s1 = slot_id((9, 0), (9, 30));
    wizard.choose_slot(&s1).unwrap();

    // Someone else books U2 over the chosen slot.
    store
        .create(&draft("Interview", iv((9, 0), (9, 30)), &["U2"]))
        .await
        .unwrap();
    wizard.refresh(&resolver).await.unwrap();
    assert!(wizard.candidate_slots().iter().all(|s| s.id != s1));

    let err = wizard.submit(&*store).await.unwrap_err();

    assert_eq!(err, WizardError::StaleSelection { slot: s1 });
    assert_eq!(wizard.step(), Step::ChooseSlot);
    assert!(wizard.chosen().is_none());
    // Nothing was sent: only the concurrent booking exists.
    let names: Vec<_> = store.appointments().into_iter().map(|a| a.name).collect();
    assert_eq!(names, vec!["Interview".to_string()]);
}

#[tokio::test]
async fn store_conflict_forces_a_new_search() {
    let store = Arc::new(InMemoryAppointmentStore::new());
    let resolver = AvailabilityResolver::new(store.clone());
    let mut wizard = ready_wizard();
    wizard.search(&resolver).await.unwrap();
    wizard.choose_slot(&slot_id((9, 0), (9, 30))).unwrap();

    // Booked concurrently, but no refresh happens before submitting.
    store
        .create(&draft("Interview", iv((9, 15), (9, 45)), &["U1"]))
        .await
        .unwrap();
    let err = wizard.submit(&*store).await.unwrap_err();

    assert!(matches!(err, WizardError::Conflict(_)));
    assert_eq!(wizard.step(), Step::ChooseSlot);
    assert!(wizard.chosen().is_none());
    assert!(wizard.candidate_slots().is_empty());

    // A refresh brings back only what is still free.
    wizard.refresh(&resolver).await.unwrap();
    assert!(wizard
        .candidate_slots()
        .iter()
        .all(|s| s.start() >= at(9, 45)));
}

#[tokio::test]
async fn network_failure_on_submit_keeps_the_choice() {
    let mut wizard = ready_wizard();
    wizard
        .search(&FixedSearch::ok(vec![iv((9, 0), (10, 0))]))
        .await
        .unwrap();
    wizard.choose_slot(&slot_id((9, 0), (9, 30))).unwrap();

    let store = FailingStore(ServiceError::Network("connection refused".to_string()));
    let err = wizard.submit(&store).await.unwrap_err();

    assert_eq!(err, WizardError::Network("connection refused".to_string()));
    assert_eq!(wizard.step(), Step::ChooseSlot);
    assert_eq!(wizard.chosen().map(|s| s.id.clone()), Some(slot_id((9, 0), (9, 30))));
    assert!(!wizard.is_pending());
}

#[test]
fn late_submit_result_after_close_is_discarded() {
    let mut wizard = ready_wizard();
    let ticket = wizard.begin_search().unwrap();
    wizard.complete_search(ticket, Ok(vec![iv((9, 0), (10, 0))]));
    wizard.choose_slot(&slot_id((9, 0), (9, 30))).unwrap();
    let submit = wizard.begin_submit().unwrap();

    wizard.close();
    let settlement = wizard.complete_submit(
        submit,
        Err(ServiceError::Network("gone".to_string())),
    );

    assert_eq!(settlement, Settlement::Discarded);
    assert!(wizard.state().booked.is_none());
}

// ── Editing an existing appointment ─────────────────────────────────────────

#[tokio::test]
async fn editing_reschedules_the_same_appointment() {
    let store = Arc::new(InMemoryAppointmentStore::new());
    let resolver = AvailabilityResolver::new(store.clone());
    let existing = store
        .create(&draft("Standup", iv((10, 0), (11, 0)), &["U1"]))
        .await
        .unwrap();

    let mut wizard = BookingWizard::for_existing(SlotPolicy::default(), &existing);
    assert_eq!(wizard.state().details.name, "Standup");
    wizard.set_range(at(9, 0), at(12, 0)).unwrap();

    let ticket = wizard.begin_search().unwrap();
    assert_eq!(ticket.request.exclude_appointment_id, Some(existing.id.clone()));
    let result = resolver.search(&ticket.request).await;
    wizard.complete_search(ticket, result);

    // The appointment's own hour is offered again.
    let target = slot_id((10, 15), (10, 45));
    wizard.choose_slot(&target).unwrap();

    let submit = wizard.begin_submit().unwrap();
    let Submission::Update(update) = submit.submission.clone() else {
        panic!("expected an update, got {:?}", submit.submission);
    };
    assert_eq!(update.id, existing.id);
    let result = store.update(&update).await;
    assert_eq!(wizard.complete_submit(submit, result), Settlement::Applied);

    assert_eq!(wizard.step(), Step::Done);
    let stored = store.appointments();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, existing.id);
    assert_eq!(stored[0].interval, iv((10, 15), (10, 45)));
}
