//! The calendar widget contract.
//!
//! [`CalendarView`] is what a rendering layer binds to: it owns the events
//! and zones to display and answers the widget's hooks (range proposals,
//! per-cell style, event activation) through a single [`SelectionGuard`].

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::guard::{CellState, RangeDecision, SelectionGuard};
use crate::interval::Interval;
use crate::slots::{align_up, Slot};

/// Visual variant of a calendar event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventVariant {
    #[default]
    Primary,
    Secondary,
    Outline,
    Destructive,
}

/// An item displayed on the calendar: an appointment or a candidate slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub variant: EventVariant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InteractionMode {
    /// Any range permitted by the zones may be dragged.
    #[default]
    FreeDrag,
    /// Only ranges inside a candidate slot may be dragged.
    CandidateSlots,
}

/// What the widget reports back after an event is clicked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalendarAction {
    SlotChosen(Slot),
    EventActivated(CalendarEvent),
}

#[derive(Debug, Clone, Default)]
pub struct CalendarView {
    events: Vec<CalendarEvent>,
    slots: Vec<Slot>,
    allow_zones: Vec<Interval>,
    deny_zones: Vec<Interval>,
    mode: InteractionMode,
}

impl CalendarView {
    pub fn new(events: Vec<CalendarEvent>) -> Self {
        Self {
            events,
            ..Self::default()
        }
    }

    pub fn with_allow_zones(mut self, zones: Vec<Interval>) -> Self {
        self.allow_zones = zones;
        self
    }

    pub fn with_deny_zones(mut self, zones: Vec<Interval>) -> Self {
        self.deny_zones = zones;
        self
    }

    /// Show `slots` as events and constrain selection to them.
    pub fn with_candidate_slots(mut self, slots: Vec<Slot>) -> Self {
        self.events
            .extend(slots.iter().map(Slot::to_calendar_event));
        self.slots = slots;
        self.mode = InteractionMode::CandidateSlots;
        self
    }

    pub fn mode(&self) -> InteractionMode {
        self.mode
    }

    pub fn events(&self) -> &[CalendarEvent] {
        &self.events
    }

    /// The guard both hooks consult.
    ///
    /// In candidate mode the candidate slots are the allow-zones.
    pub fn guard(&self) -> SelectionGuard {
        match self.mode {
            InteractionMode::FreeDrag => SelectionGuard::new(&self.allow_zones, &self.deny_zones),
            InteractionMode::CandidateSlots => {
                let zones: Vec<Interval> = self.slots.iter().map(|s| s.interval).collect();
                SelectionGuard::allow_only(&zones)
            }
        }
    }

    pub fn on_range_proposed(&self, range: &Interval) -> RangeDecision {
        self.guard().check_range(range)
    }

    pub fn cell_state(&self, t: DateTime<Utc>) -> CellState {
        self.guard().cell_state(t)
    }

    /// Cell states for one day, one cell every `step`.
    pub fn day_cells(&self, day: NaiveDate, step: Duration) -> Vec<(DateTime<Utc>, CellState)> {
        let guard = self.guard();
        let Some(whole_day) = day_interval(day) else {
            return Vec::new();
        };
        grid_marks(&whole_day, day, step)
            .into_iter()
            .map(|t| (t, guard.cell_state(t)))
            .collect()
    }

    /// Resolve a click on the event with `event_id`.
    pub fn on_event_activated(&self, event_id: &str) -> Option<CalendarAction> {
        if let Some(slot) = self.slots.iter().find(|s| s.id.as_str() == event_id) {
            return Some(CalendarAction::SlotChosen(slot.clone()));
        }
        self.events
            .iter()
            .find(|e| e.id.as_deref() == Some(event_id))
            .cloned()
            .map(CalendarAction::EventActivated)
    }
}

fn day_interval(day: NaiveDate) -> Option<Interval> {
    let start = day.and_hms_opt(0, 0, 0)?.and_utc();
    Interval::starting_at(start, Duration::days(1)).ok()
}

/// Every UTC calendar day touched by `[start, end]`, inclusive of both ends.
pub fn days_between(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<NaiveDate> {
    let last = end.date_naive();
    let mut days = Vec::new();
    let mut current = start.date_naive();
    while current <= last {
        days.push(current);
        match current.succ_opt() {
            Some(next) => current = next,
            None => break,
        }
    }
    days
}

/// Clock-aligned marks every `step` inside `window`, restricted to `day`.
pub fn grid_marks(window: &Interval, day: NaiveDate, step: Duration) -> Vec<DateTime<Utc>> {
    if step <= Duration::zero() {
        return Vec::new();
    }
    let Some(bounded) = day_interval(day).and_then(|d| window.clip(&d)) else {
        return Vec::new();
    };

    let mut marks = Vec::new();
    let mut next = align_up(bounded.start(), step);
    while let Some(current) = next.filter(|t| *t < bounded.end()) {
        marks.push(current);
        next = current.checked_add_signed(step);
    }
    marks
}
