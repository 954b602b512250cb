//! The booking wizard: criteria → search → slot choice → submission.
//!
//! The wizard is a plain state machine value. Each network round trip is
//! split in two: a `begin_*` call validates and returns a ticket describing
//! the request to send, and the matching `complete_*` call applies the
//! result. Only one request may be outstanding at a time, and a result whose
//! ticket is no longer current (the user went back, or the wizard was
//! closed) is discarded without touching state.
//!
//! [`BookingWizard::search`], [`BookingWizard::refresh`] and
//! [`BookingWizard::submit`] drive a full round trip against the port traits
//! for callers that can hold the wizard across an `.await`.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::availability::SearchCriteria;
use crate::calendar::{CalendarAction, CalendarView};
use crate::config::SlotPolicy;
use crate::error::ServiceError;
use crate::interval::Interval;
use crate::model::{Appointment, AppointmentId, FreeWindow, ParticipantId};
use crate::ports::{AppointmentStore, AvailabilitySearch, ServiceResult};
use crate::slots::{discretize_with_policy, Slot, SlotId};
use crate::wire::{format_datetime, AppointmentDraft, AppointmentUpdate, SearchRequest};

pub const MAX_NAME_LEN: usize = 255;
pub const MAX_NOTES_LEN: usize = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    CollectCriteria,
    ChooseSlot,
    Submitting,
    Done,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::CollectCriteria => "collect-criteria",
            Step::ChooseSlot => "choose-slot",
            Step::Submitting => "submitting",
            Step::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WizardError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Selected slot {slot} is no longer available; search again")]
    StaleSelection { slot: SlotId },

    #[error("Booking conflict: {0}; search again")]
    Conflict(String),

    #[error("A request is already in flight")]
    RequestPending,

    #[error("Cannot {action} while on step {step}")]
    InvalidTransition { step: Step, action: &'static str },

    #[error("No slot selected")]
    NoSelection,

    #[error("Unknown slot {0}")]
    UnknownSlot(SlotId),

    #[error("The wizard has been closed")]
    Closed,
}

impl From<ServiceError> for WizardError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Network(message) => WizardError::Network(message),
            ServiceError::Server { status, message } => WizardError::Server { status, message },
            ServiceError::Conflict(message) => WizardError::Conflict(message),
            ServiceError::Validation(message) => WizardError::Validation(message),
        }
    }
}

pub type WizardResult<T> = std::result::Result<T, WizardError>;

/// Criteria as the user is filling them in; validated into a
/// [`SearchCriteria`] when the search is triggered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CriteriaDraft {
    pub range_start: Option<DateTime<Utc>>,
    pub range_end: Option<DateTime<Utc>>,
    pub participants: BTreeSet<ParticipantId>,
    pub exclude_appointment: Option<AppointmentId>,
}

impl CriteriaDraft {
    pub fn validate(&self) -> WizardResult<SearchCriteria> {
        let (Some(start), Some(end)) = (self.range_start, self.range_end) else {
            return Err(WizardError::Validation("date range is required".to_string()));
        };
        if self.participants.is_empty() {
            return Err(WizardError::Validation(
                "at least one participant is required".to_string(),
            ));
        }
        let range = Interval::new(start, end)
            .map_err(|_| WizardError::Validation("range end must be after its start".to_string()))?;
        Ok(SearchCriteria {
            range,
            participants: self.participants.clone(),
            exclude_appointment: self.exclude_appointment.clone(),
        })
    }
}

/// Name and notes of the meeting being booked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingDetails {
    pub name: String,
    pub notes: String,
}

impl BookingDetails {
    pub fn validate(&self) -> WizardResult<()> {
        let name_len = self.name.trim().chars().count();
        if name_len == 0 {
            return Err(WizardError::Validation("meeting name is required".to_string()));
        }
        if self.name.chars().count() > MAX_NAME_LEN {
            return Err(WizardError::Validation(format!(
                "meeting name must be at most {} characters",
                MAX_NAME_LEN
            )));
        }
        if self.notes.chars().count() > MAX_NOTES_LEN {
            return Err(WizardError::Validation(format!(
                "notes must be at most {} characters",
                MAX_NOTES_LEN
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestKind {
    Search,
    Refresh,
    Submit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ticket {
    id: u64,
    kind: RequestKind,
}

/// An availability search the caller must send, then hand back to
/// [`BookingWizard::complete_search`].
#[derive(Debug, Clone, PartialEq)]
pub struct SearchTicket {
    ticket: Ticket,
    pub request: SearchRequest,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    Create(AppointmentDraft),
    Update(AppointmentUpdate),
}

/// A booking the caller must send, then hand back to
/// [`BookingWizard::complete_submit`].
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitTicket {
    ticket: Ticket,
    pub submission: Submission,
}

/// Whether a completed request changed the wizard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Applied,
    /// The request was superseded or the wizard was closed.
    Discarded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WizardState {
    pub step: Step,
    pub draft: CriteriaDraft,
    /// The criteria the current candidates were computed from.
    pub criteria: Option<SearchCriteria>,
    pub candidate_slots: Vec<Slot>,
    pub chosen: Option<Slot>,
    pub details: BookingDetails,
    /// Annotation on the current step; never changes the step by itself.
    pub error: Option<WizardError>,
    pub booked: Option<Appointment>,
}

#[derive(Debug, Clone)]
pub struct BookingWizard {
    state: WizardState,
    policy: SlotPolicy,
    editing: Option<AppointmentId>,
    pending: Option<Ticket>,
    next_ticket: u64,
    closed: bool,
}

impl BookingWizard {
    pub fn new(policy: SlotPolicy) -> Self {
        Self {
            state: WizardState {
                step: Step::CollectCriteria,
                draft: CriteriaDraft::default(),
                criteria: None,
                candidate_slots: Vec::new(),
                chosen: None,
                details: BookingDetails::default(),
                error: None,
                booked: None,
            },
            policy,
            editing: None,
            pending: None,
            next_ticket: 1,
            closed: false,
        }
    }

    /// A wizard that reschedules `appointment`: its own interval is ignored
    /// during the search and submission updates it instead of creating a new one.
    pub fn for_existing(policy: SlotPolicy, appointment: &Appointment) -> Self {
        let mut wizard = Self::new(policy);
        wizard.editing = Some(appointment.id.clone());
        wizard.state.draft.exclude_appointment = Some(appointment.id.clone());
        wizard.state.draft.participants =
            appointment.participants.iter().map(|p| p.id.clone()).collect();
        wizard.state.details = BookingDetails {
            name: appointment.name.clone(),
            notes: appointment.notes.clone(),
        };
        wizard
    }

    pub fn state(&self) -> &WizardState {
        &self.state
    }

    pub fn step(&self) -> Step {
        self.state.step
    }

    pub fn candidate_slots(&self) -> &[Slot] {
        &self.state.candidate_slots
    }

    pub fn chosen(&self) -> Option<&Slot> {
        self.state.chosen.as_ref()
    }

    pub fn error(&self) -> Option<&WizardError> {
        self.state.error.as_ref()
    }

    /// Whether a request is outstanding; the triggering control should be disabled.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    // -----------------------------------------------------------------------
    // Criteria and details
    // -----------------------------------------------------------------------

    fn ensure_editable(&self, step: Step, action: &'static str) -> WizardResult<()> {
        if self.closed {
            return Err(WizardError::Closed);
        }
        if self.pending.is_some() {
            return Err(WizardError::RequestPending);
        }
        if self.state.step != step {
            return Err(WizardError::InvalidTransition {
                step: self.state.step,
                action,
            });
        }
        Ok(())
    }

    pub fn set_range(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> WizardResult<()> {
        self.ensure_editable(Step::CollectCriteria, "change the date range")?;
        self.state.draft.range_start = Some(start);
        self.state.draft.range_end = Some(end);
        Ok(())
    }

    pub fn set_participants(
        &mut self,
        participants: impl IntoIterator<Item = ParticipantId>,
    ) -> WizardResult<()> {
        self.ensure_editable(Step::CollectCriteria, "change participants")?;
        self.state.draft.participants = participants.into_iter().collect();
        Ok(())
    }

    pub fn set_details(
        &mut self,
        name: impl Into<String>,
        notes: impl Into<String>,
    ) -> WizardResult<()> {
        if self.closed {
            return Err(WizardError::Closed);
        }
        if self.pending.is_some() {
            return Err(WizardError::RequestPending);
        }
        if matches!(self.state.step, Step::Submitting | Step::Done) {
            return Err(WizardError::InvalidTransition {
                step: self.state.step,
                action: "change meeting details",
            });
        }
        self.state.details = BookingDetails {
            name: name.into(),
            notes: notes.into(),
        };
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Search
    // -----------------------------------------------------------------------

    fn issue(&mut self, kind: RequestKind) -> Ticket {
        let ticket = Ticket {
            id: self.next_ticket,
            kind,
        };
        self.next_ticket += 1;
        self.pending = Some(ticket);
        ticket
    }

    /// Leave criteria collection: validate locally and issue the search.
    pub fn begin_search(&mut self) -> WizardResult<SearchTicket> {
        self.ensure_editable(Step::CollectCriteria, "search")?;
        let criteria = match self.state.draft.validate() {
            Ok(criteria) => criteria,
            Err(err) => {
                self.state.error = Some(err.clone());
                return Err(err);
            }
        };

        let request = SearchRequest::from(&criteria);
        self.state.criteria = Some(criteria);
        self.state.error = None;
        let ticket = self.issue(RequestKind::Search);
        info!(ticket = ticket.id, "availability search issued");
        Ok(SearchTicket { ticket, request })
    }

    /// Re-run the current search from the slot step, e.g. as a background
    /// freshness check. The chosen slot is kept; it is re-validated at submit.
    pub fn begin_refresh(&mut self) -> WizardResult<SearchTicket> {
        self.ensure_editable(Step::ChooseSlot, "refresh availability")?;
        let Some(criteria) = self.state.criteria.as_ref() else {
            return Err(WizardError::InvalidTransition {
                step: self.state.step,
                action: "refresh without a previous search",
            });
        };
        let request = SearchRequest::from(criteria);
        let ticket = self.issue(RequestKind::Refresh);
        info!(ticket = ticket.id, "availability refresh issued");
        Ok(SearchTicket { ticket, request })
    }

    /// Take back `ticket` if it is the outstanding request.
    fn settle(&mut self, ticket: Ticket) -> bool {
        if self.closed || self.pending != Some(ticket) {
            warn!(ticket = ticket.id, "discarding result of a superseded request");
            return false;
        }
        self.pending = None;
        true
    }

    /// Apply the outcome of a search or refresh.
    pub fn complete_search(
        &mut self,
        ticket: SearchTicket,
        result: ServiceResult<Vec<FreeWindow>>,
    ) -> Settlement {
        if !self.settle(ticket.ticket) {
            return Settlement::Discarded;
        }

        match result {
            Ok(windows) => {
                let slots = discretize_with_policy(&windows, &self.policy);
                self.state.candidate_slots = self.mark_chosen(slots);
                self.state.step = Step::ChooseSlot;
                self.state.error = None;
                info!(
                    slots = self.state.candidate_slots.len(),
                    "candidate slots replaced"
                );
            }
            Err(err) => {
                // Fail closed: an errored search exposes no candidates.
                self.state.candidate_slots.clear();
                self.state.error = Some(err.into());
                if ticket.ticket.kind == RequestKind::Search {
                    self.state.step = Step::CollectCriteria;
                }
            }
        }
        Settlement::Applied
    }

    fn mark_chosen(&self, slots: Vec<Slot>) -> Vec<Slot> {
        let chosen = self.state.chosen.as_ref().map(|c| &c.id);
        slots
            .into_iter()
            .map(|slot| {
                if Some(&slot.id) == chosen {
                    slot.select()
                } else {
                    slot
                }
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Slot choice
    // -----------------------------------------------------------------------

    pub fn choose_slot(&mut self, id: &SlotId) -> WizardResult<()> {
        self.ensure_editable(Step::ChooseSlot, "choose a slot")?;
        let Some(slot) = self.state.candidate_slots.iter().find(|s| &s.id == id) else {
            return Err(WizardError::UnknownSlot(id.clone()));
        };
        self.state.chosen = Some(slot.select());
        self.state.candidate_slots = self
            .state
            .candidate_slots
            .iter()
            .map(|s| if &s.id == id { s.select() } else { s.deselect() })
            .collect();
        self.state.error = None;
        Ok(())
    }

    /// Apply a calendar callback. Activating a non-slot event is a no-op.
    pub fn apply(&mut self, action: CalendarAction) -> WizardResult<()> {
        match action {
            CalendarAction::SlotChosen(slot) => self.choose_slot(&slot.id),
            CalendarAction::EventActivated(_) => Ok(()),
        }
    }

    /// The calendar as it should be rendered for the slot step.
    pub fn calendar_view(&self) -> CalendarView {
        CalendarView::default().with_candidate_slots(self.state.candidate_slots.clone())
    }

    // -----------------------------------------------------------------------
    // Submission
    // -----------------------------------------------------------------------

    /// Validate details, run the freshness check, and issue the booking.
    ///
    /// A chosen slot that is absent from the current candidates is cleared
    /// and reported as [`WizardError::StaleSelection`]; no other slot is
    /// substituted.
    pub fn begin_submit(&mut self) -> WizardResult<SubmitTicket> {
        self.ensure_editable(Step::ChooseSlot, "submit")?;
        let Some(chosen) = self.state.chosen.clone() else {
            return Err(WizardError::NoSelection);
        };
        if let Err(err) = self.state.details.validate() {
            self.state.error = Some(err.clone());
            return Err(err);
        }

        if !self
            .state
            .candidate_slots
            .iter()
            .any(|slot| slot.id == chosen.id)
        {
            warn!(slot = %chosen.id, "chosen slot failed the freshness check");
            let err = WizardError::StaleSelection { slot: chosen.id };
            self.state.chosen = None;
            self.state.error = Some(err.clone());
            return Err(err);
        }

        let participant_ids = self
            .state
            .criteria
            .as_ref()
            .map(|c| c.participants.iter().cloned().collect())
            .unwrap_or_default();
        let draft = AppointmentDraft {
            name: self.state.details.name.clone(),
            notes: self.state.details.notes.clone(),
            start_date: format_datetime(chosen.start()),
            end_date: format_datetime(chosen.end()),
            participant_ids,
        };
        let submission = match &self.editing {
            Some(id) => Submission::Update(AppointmentUpdate {
                id: id.clone(),
                draft,
            }),
            None => Submission::Create(draft),
        };

        self.state.step = Step::Submitting;
        self.state.error = None;
        let ticket = self.issue(RequestKind::Submit);
        info!(ticket = ticket.id, slot = %chosen.id, "booking submitted");
        Ok(SubmitTicket { ticket, submission })
    }

    pub fn complete_submit(
        &mut self,
        ticket: SubmitTicket,
        result: ServiceResult<Appointment>,
    ) -> Settlement {
        if !self.settle(ticket.ticket) {
            return Settlement::Discarded;
        }

        match result {
            Ok(appointment) => {
                info!(appointment = %appointment.id, "booking confirmed");
                self.state.booked = Some(appointment);
                self.state.step = Step::Done;
                self.state.error = None;
            }
            Err(ServiceError::Conflict(message)) => {
                // Same recovery as a stale selection: nothing local can be
                // trusted until the user searches again.
                warn!(%message, "booking rejected as conflicting");
                self.state.step = Step::ChooseSlot;
                self.state.chosen = None;
                self.state.candidate_slots.clear();
                self.state.error = Some(WizardError::Conflict(message));
            }
            Err(err) => {
                self.state.step = Step::ChooseSlot;
                self.state.error = Some(err.into());
            }
        }
        Settlement::Applied
    }

    // -----------------------------------------------------------------------
    // Navigation and teardown
    // -----------------------------------------------------------------------

    /// Return to criteria collection, discarding candidates and the choice.
    ///
    /// An outstanding search is abandoned; its result will be discarded.
    /// A submission is not: once sent it may already have booked the slot,
    /// so its outcome has to settle before the wizard can leave the step.
    pub fn back(&mut self) -> WizardResult<()> {
        if self.closed {
            return Err(WizardError::Closed);
        }
        match self.state.step {
            Step::Done => {
                return Err(WizardError::InvalidTransition {
                    step: Step::Done,
                    action: "go back",
                })
            }
            Step::Submitting => return Err(WizardError::RequestPending),
            Step::CollectCriteria | Step::ChooseSlot => {}
        }

        if let Some(ticket) = self.pending.take() {
            info!(ticket = ticket.id, "abandoning outstanding search");
        }
        self.state.step = Step::CollectCriteria;
        self.state.candidate_slots.clear();
        self.state.chosen = None;
        self.state.criteria = None;
        self.state.error = None;
        Ok(())
    }

    /// Tear the wizard down. Results arriving afterwards are discarded.
    pub fn close(&mut self) {
        self.closed = true;
        self.pending = None;
    }

    // -----------------------------------------------------------------------
    // Round-trip drivers
    // -----------------------------------------------------------------------

    pub async fn search<A>(&mut self, service: &A) -> WizardResult<()>
    where
        A: AvailabilitySearch + ?Sized,
    {
        let ticket = self.begin_search()?;
        let result = service.search(&ticket.request).await;
        self.complete_search(ticket, result);
        self.current_error()
    }

    pub async fn refresh<A>(&mut self, service: &A) -> WizardResult<()>
    where
        A: AvailabilitySearch + ?Sized,
    {
        let ticket = self.begin_refresh()?;
        let result = service.search(&ticket.request).await;
        self.complete_search(ticket, result);
        self.current_error()
    }

    pub async fn submit<S>(&mut self, store: &S) -> WizardResult<Appointment>
    where
        S: AppointmentStore + ?Sized,
    {
        let ticket = self.begin_submit()?;
        let result = match &ticket.submission {
            Submission::Create(draft) => store.create(draft).await,
            Submission::Update(update) => store.update(update).await,
        };
        self.complete_submit(ticket, result);
        self.current_error()?;
        self.state.booked.clone().ok_or(WizardError::NoSelection)
    }

    fn current_error(&self) -> WizardResult<()> {
        match &self.state.error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}
