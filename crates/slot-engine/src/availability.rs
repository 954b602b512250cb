//! Multi-participant availability resolution.
//!
//! Each participant's busy intervals are carved out of the search range, then
//! the resulting free lists are intersected. The result is the set of windows
//! where *every* participant is free.
//!
//! Resolution fails closed: a participant whose busy data cannot be fetched
//! is treated as busy for the whole range, so an uncertain opening is never
//! reported as bookable.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ServiceError;
use crate::interval::{intersect_all, subtract, Interval};
use crate::model::{AppointmentId, BusyInterval, FreeWindow, ParticipantId};
use crate::ports::{AvailabilitySearch, BusyIntervalSource, ServiceResult};
use crate::wire::{parse_datetime, SearchRequest};

/// What to search for: who, when, and which existing appointment to ignore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchCriteria {
    pub range: Interval,
    pub participants: BTreeSet<ParticipantId>,
    /// When editing an appointment, its own interval must not count as busy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_appointment: Option<AppointmentId>,
}

impl SearchCriteria {
    pub fn new(range: Interval, participants: impl IntoIterator<Item = ParticipantId>) -> Self {
        Self {
            range,
            participants: participants.into_iter().collect(),
            exclude_appointment: None,
        }
    }

    pub fn excluding(mut self, appointment: AppointmentId) -> Self {
        self.exclude_appointment = Some(appointment);
        self
    }
}

impl TryFrom<&SearchRequest> for SearchCriteria {
    type Error = ServiceError;

    fn try_from(request: &SearchRequest) -> ServiceResult<Self> {
        let invalid = |e: crate::error::EngineError| ServiceError::Validation(e.to_string());
        let range = Interval::new(
            parse_datetime(&request.start_date).map_err(invalid)?,
            parse_datetime(&request.end_date).map_err(invalid)?,
        )
        .map_err(invalid)?;
        Ok(Self {
            range,
            participants: request.participant_ids.iter().cloned().collect(),
            exclude_appointment: request.exclude_appointment_id.clone(),
        })
    }
}

/// One participant's busy data as fetched, or the reason it could not be.
pub type BusyLookup = (ParticipantId, ServiceResult<Vec<BusyInterval>>);

/// Free time of a single participant within `criteria.range`.
///
/// A failed lookup yields no free time.
pub fn participant_free_windows(
    criteria: &SearchCriteria,
    participant: &ParticipantId,
    lookup: &ServiceResult<Vec<BusyInterval>>,
) -> Vec<FreeWindow> {
    let busy = match lookup {
        Ok(busy) => busy,
        Err(err) => {
            warn!(
                participant = %participant,
                error = %err,
                "busy lookup failed; treating participant as fully busy"
            );
            return Vec::new();
        }
    };

    let intervals: Vec<Interval> = busy
        .iter()
        .filter(|b| &b.participant == participant)
        .filter(|b| {
            criteria.exclude_appointment.is_none()
                || b.appointment.as_ref() != criteria.exclude_appointment.as_ref()
        })
        .map(|b| b.interval)
        .collect();

    subtract(&criteria.range, &intervals)
}

/// Combine already-fetched busy data into the common free windows.
///
/// Every participant in `criteria` must have a lookup entry; a participant
/// with no entry is treated like a failed lookup.
pub fn resolve_from_lookups(criteria: &SearchCriteria, lookups: &[BusyLookup]) -> Vec<FreeWindow> {
    if criteria.participants.is_empty() {
        return Vec::new();
    }

    let missing: ServiceResult<Vec<BusyInterval>> = Err(ServiceError::Network(
        "no busy data fetched".to_string(),
    ));

    let per_participant: Vec<Vec<FreeWindow>> = criteria
        .participants
        .iter()
        .map(|participant| {
            let lookup = lookups
                .iter()
                .find(|(id, _)| id == participant)
                .map(|(_, lookup)| lookup)
                .unwrap_or(&missing);
            participant_free_windows(criteria, participant, lookup)
        })
        .collect();

    let mut windows = intersect_all(&per_participant);
    windows.sort();

    debug!(
        participants = criteria.participants.len(),
        windows = windows.len(),
        "resolved availability"
    );
    windows
}

/// Resolves availability by querying a [`BusyIntervalSource`] per participant.
#[derive(Debug, Clone)]
pub struct AvailabilityResolver<S> {
    source: S,
}

impl<S: BusyIntervalSource> AvailabilityResolver<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Free windows common to every participant, sorted by start.
    ///
    /// Never fails: lookup errors make the affected participant fully busy.
    pub async fn resolve(&self, criteria: &SearchCriteria) -> Vec<FreeWindow> {
        let mut lookups: Vec<BusyLookup> = Vec::with_capacity(criteria.participants.len());
        for participant in &criteria.participants {
            let lookup = self
                .source
                .busy_intervals(participant, &criteria.range)
                .await;
            lookups.push((participant.clone(), lookup));
        }
        resolve_from_lookups(criteria, &lookups)
    }
}

#[async_trait]
impl<S: BusyIntervalSource> AvailabilitySearch for AvailabilityResolver<S> {
    async fn search(&self, request: &SearchRequest) -> ServiceResult<Vec<FreeWindow>> {
        let criteria = SearchCriteria::try_from(request)?;
        Ok(self.resolve(&criteria).await)
    }
}
