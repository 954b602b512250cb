//! Port interfaces for the external collaborators.
//!
//! These traits are the boundary between the pure core and whatever
//! transport actually reaches the appointment store. Implementations are
//! expected to map transport failures to [`ServiceError::Network`] and non-2xx
//! responses to [`ServiceError::Server`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::ServiceError;
use crate::interval::{overlaps, Interval};
use crate::model::{
    Appointment, AppointmentId, AppointmentStatus, BusyInterval, FreeWindow, Participant,
    ParticipantId,
};
use crate::wire::{AppointmentDraft, AppointmentUpdate, SearchRequest};

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Lookup of a participant's committed time.
#[async_trait]
pub trait BusyIntervalSource: Send + Sync {
    /// Busy intervals of `participant` overlapping `range`.
    async fn busy_intervals(
        &self,
        participant: &ParticipantId,
        range: &Interval,
    ) -> ServiceResult<Vec<BusyInterval>>;
}

#[async_trait]
impl<T: BusyIntervalSource + ?Sized> BusyIntervalSource for Arc<T> {
    async fn busy_intervals(
        &self,
        participant: &ParticipantId,
        range: &Interval,
    ) -> ServiceResult<Vec<BusyInterval>> {
        (**self).busy_intervals(participant, range).await
    }
}

/// The availability search service.
#[async_trait]
pub trait AvailabilitySearch: Send + Sync {
    /// Free windows common to every requested participant, sorted by start.
    async fn search(&self, request: &SearchRequest) -> ServiceResult<Vec<FreeWindow>>;
}

/// Appointment persistence.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn create(&self, draft: &AppointmentDraft) -> ServiceResult<Appointment>;

    async fn update(&self, update: &AppointmentUpdate) -> ServiceResult<Appointment>;
}

/// Busy data held in memory, keyed by participant.
///
/// Participants that were never registered fail the lookup with a 404, which
/// the resolver treats as "fully busy".
#[derive(Debug, Default)]
pub struct InMemoryBusySource {
    busy: HashMap<ParticipantId, Vec<BusyInterval>>,
}

impl InMemoryBusySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a participant with no commitments.
    pub fn with_participant(mut self, participant: ParticipantId) -> Self {
        self.busy.entry(participant).or_default();
        self
    }

    pub fn with_busy(mut self, busy: BusyInterval) -> Self {
        self.busy
            .entry(busy.participant.clone())
            .or_default()
            .push(busy);
        self
    }

    /// Record the appointment as busy time for each of its participants.
    pub fn with_appointment(mut self, appointment: &Appointment) -> Self {
        for participant in &appointment.participants {
            self = self.with_busy(appointment.busy_for(&participant.id));
        }
        self
    }

    pub fn participants(&self) -> impl Iterator<Item = &ParticipantId> {
        self.busy.keys()
    }
}

#[async_trait]
impl BusyIntervalSource for InMemoryBusySource {
    async fn busy_intervals(
        &self,
        participant: &ParticipantId,
        range: &Interval,
    ) -> ServiceResult<Vec<BusyInterval>> {
        let busy = self.busy.get(participant).ok_or_else(|| ServiceError::Server {
            status: 404,
            message: format!("unknown participant '{}'", participant),
        })?;
        Ok(busy
            .iter()
            .filter(|b| overlaps(&b.interval, range))
            .cloned()
            .collect())
    }
}

/// An appointment store that keeps created appointments in memory and
/// refuses overlapping bookings for a shared participant.
#[derive(Debug, Default)]
pub struct InMemoryAppointmentStore {
    appointments: Mutex<Vec<Appointment>>,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_appointments(appointments: Vec<Appointment>) -> Self {
        Self {
            appointments: Mutex::new(appointments),
        }
    }

    pub fn appointments(&self) -> Vec<Appointment> {
        self.appointments
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    fn book(
        &self,
        id: Option<AppointmentId>,
        draft: &AppointmentDraft,
    ) -> ServiceResult<Appointment> {
        let interval = draft
            .interval()
            .map_err(|e| ServiceError::Validation(e.to_string()))?;
        let mut appointments = self
            .appointments
            .lock()
            .map_err(|_| ServiceError::Network("appointment store unavailable".to_string()))?;

        let clash = appointments.iter().any(|existing| {
            Some(&existing.id) != id.as_ref()
                && overlaps(&existing.interval, &interval)
                && existing
                    .participants
                    .iter()
                    .any(|p| draft.participant_ids.contains(&p.id))
        });
        if clash {
            return Err(ServiceError::Conflict(format!(
                "{} is no longer free",
                interval
            )));
        }

        let id = id.unwrap_or_else(|| next_free_id(&appointments));
        let appointment = Appointment {
            id: id.clone(),
            name: draft.name.clone(),
            notes: draft.notes.clone(),
            interval,
            status: AppointmentStatus::Pending,
            participants: draft
                .participant_ids
                .iter()
                .map(|pid| Participant {
                    id: pid.clone(),
                    firstname: String::new(),
                    lastname: pid.to_string(),
                    email: String::new(),
                    timezone: chrono_tz::UTC,
                })
                .collect(),
        };

        match appointments.iter_mut().find(|existing| existing.id == id) {
            Some(stored) => *stored = appointment.clone(),
            None => appointments.push(appointment.clone()),
        }
        Ok(appointment)
    }
}

/// First `A{n}` id, counting from the store size, that no stored
/// appointment uses.
fn next_free_id(appointments: &[Appointment]) -> AppointmentId {
    let mut n = appointments.len() + 1;
    loop {
        let candidate = AppointmentId::new(format!("A{}", n));
        if appointments.iter().all(|existing| existing.id != candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn create(&self, draft: &AppointmentDraft) -> ServiceResult<Appointment> {
        self.book(None, draft)
    }

    async fn update(&self, update: &AppointmentUpdate) -> ServiceResult<Appointment> {
        let known = self
            .appointments
            .lock()
            .map(|guard| guard.iter().any(|a| a.id == update.id))
            .unwrap_or(false);
        if !known {
            return Err(ServiceError::Server {
                status: 404,
                message: format!("unknown appointment '{}'", update.id),
            });
        }
        self.book(Some(update.id.clone()), &update.draft)
    }
}

/// Stored appointments double as busy data: every participant of an
/// appointment is busy for its whole interval.
#[async_trait]
impl BusyIntervalSource for InMemoryAppointmentStore {
    async fn busy_intervals(
        &self,
        participant: &ParticipantId,
        range: &Interval,
    ) -> ServiceResult<Vec<BusyInterval>> {
        let appointments = self
            .appointments
            .lock()
            .map_err(|_| ServiceError::Network("appointment store unavailable".to_string()))?;
        Ok(appointments
            .iter()
            .filter(|a| overlaps(&a.interval, range))
            .filter(|a| a.participants.iter().any(|p| &p.id == participant))
            .map(|a| a.busy_for(participant))
            .collect())
    }
}
