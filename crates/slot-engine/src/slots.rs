//! Discretize free windows into bookable, clock-aligned candidate slots.
//!
//! Within each window the first candidate starts at the next clock boundary
//! that is a multiple of the granularity (15 minutes → :00, :15, :30, :45),
//! then candidates step forward by the granularity for as long as a full
//! meeting still fits inside the window.

use std::fmt;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::calendar::{CalendarEvent, EventVariant};
use crate::config::SlotPolicy;
use crate::error::Result;
use crate::interval::Interval;
use crate::model::FreeWindow;

const SELECTED_SUFFIX: &str = " (selected)";

/// Content-addressed slot identity: hex SHA-256 of the slot's start and end.
///
/// Recomputing the same time range always yields the same id, whichever
/// resolve call produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(String);

impl SlotId {
    pub fn for_interval(interval: &Interval) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(interval.start().to_rfc3339_opts(SecondsFormat::AutoSi, true));
        hasher.update(interval.end().to_rfc3339_opts(SecondsFormat::AutoSi, true));
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SlotId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotState {
    #[default]
    Available,
    Selected,
}

/// A candidate booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Slot {
    pub id: SlotId,
    #[serde(flatten)]
    pub interval: Interval,
    pub label: String,
    pub state: SlotState,
}

impl Slot {
    pub fn new(interval: Interval, label: impl Into<String>) -> Self {
        Self {
            id: SlotId::for_interval(&interval),
            interval,
            label: label.into(),
            state: SlotState::Available,
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.interval.start()
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.interval.end()
    }

    pub fn is_selected(&self) -> bool {
        self.state == SlotState::Selected
    }

    pub fn select(&self) -> Self {
        Self {
            state: SlotState::Selected,
            ..self.clone()
        }
    }

    pub fn deselect(&self) -> Self {
        Self {
            state: SlotState::Available,
            ..self.clone()
        }
    }

    /// Display title; selected slots carry a single `" (selected)"` suffix.
    pub fn title(&self) -> String {
        let base = self.label.trim_end_matches(SELECTED_SUFFIX);
        if self.is_selected() {
            format!("{}{}", base, SELECTED_SUFFIX)
        } else {
            base.to_string()
        }
    }

    pub fn to_calendar_event(&self) -> CalendarEvent {
        CalendarEvent {
            id: Some(self.id.to_string()),
            title: self.title(),
            start: self.start(),
            end: self.end(),
            variant: if self.is_selected() {
                EventVariant::Secondary
            } else {
                EventVariant::Primary
            },
        }
    }
}

/// Round `t` up to the next multiple of `step` since the Unix epoch.
///
/// Instants already on a boundary are returned unchanged. `None` when `step`
/// is under a millisecond or the next boundary is past the representable
/// range.
pub fn align_up(t: DateTime<Utc>, step: Duration) -> Option<DateTime<Utc>> {
    let step_ms = step.num_milliseconds();
    if step_ms <= 0 {
        return None;
    }
    let ms = t.timestamp_millis();
    let sub_ms = t.timestamp_subsec_nanos() % 1_000_000;
    let rem = ms.rem_euclid(step_ms);
    if rem == 0 && sub_ms == 0 {
        return Some(t);
    }
    (ms - rem)
        .checked_add(step_ms)
        .and_then(DateTime::from_timestamp_millis)
}

/// Slice `windows` into slots of `duration`, stepping by `granularity`.
///
/// # Errors
/// `EngineError::InvalidDuration` for a granularity under one second or a
/// non-positive duration.
pub fn discretize(
    windows: &[FreeWindow],
    granularity: Duration,
    duration: Duration,
) -> Result<Vec<Slot>> {
    let policy = SlotPolicy::new(granularity, duration)?;
    Ok(discretize_with_policy(windows, &policy))
}

/// Slice `windows` with an already validated policy.
///
/// Slots are labelled `"{prefix} {n}"`, numbered from 1 across all windows.
pub fn discretize_with_policy(windows: &[FreeWindow], policy: &SlotPolicy) -> Vec<Slot> {
    let mut slots = Vec::new();

    for window in windows {
        let Some(mut start) = align_up(window.start(), policy.granularity()) else {
            continue;
        };
        // Stepping past the representable range ends the window.
        while let Some(end) = start.checked_add_signed(policy.duration()) {
            if end > window.end() {
                break;
            }
            // `duration` is positive, so the interval is valid.
            if let Ok(interval) = Interval::new(start, end) {
                let label = format!("{} {}", policy.label_prefix(), slots.len() + 1);
                slots.push(Slot::new(interval, label));
            }
            match start.checked_add_signed(policy.granularity()) {
                Some(next) => start = next,
                None => break,
            }
        }
    }

    debug!(
        windows = windows.len(),
        slots = slots.len(),
        granularity_minutes = policy.granularity().num_minutes(),
        duration_minutes = policy.duration().num_minutes(),
        "discretized free windows"
    );
    slots
}
