//! Domain records: participants, appointments, busy intervals.
//!
//! Records are plain immutable data. Raw JSON payloads from the appointment
//! store are turned into records by explicit `hydrate_*` functions, nested
//! objects included.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::calendar::EventVariant;
use crate::error::{EngineError, Result};
use crate::interval::Interval;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Identifier of a user taking part in a meeting.
    ParticipantId
);
string_id!(
    /// Identifier of a persisted appointment.
    AppointmentId
);
string_id!(
    /// Identifier of a calendar (agenda) owned by a participant.
    AgendaId
);

/// An interval free for every participant under consideration.
pub type FreeWindow = Interval;

/// A time range during which one participant is already committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusyInterval {
    pub participant: ParticipantId,
    /// The appointment occupying this time, when the store reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appointment: Option<AppointmentId>,
    #[serde(flatten)]
    pub interval: Interval,
}

/// Lifecycle status of an appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppointmentStatus {
    Validated,
    Refused,
    Pending,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 3] = [Self::Validated, Self::Refused, Self::Pending];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validated => "Validated",
            Self::Refused => "Refused",
            Self::Pending => "Pending",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| EngineError::Hydration(format!("unknown appointment status '{}'", s)))
    }
}

/// Where an agenda's events come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgendaKind {
    Intern,
    Google,
    Apple,
}

impl FromStr for AgendaKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Intern" => Ok(Self::Intern),
            "Google" => Ok(Self::Google),
            "Apple" => Ok(Self::Apple),
            other => Err(EngineError::Hydration(format!(
                "unknown agenda type '{}'",
                other
            ))),
        }
    }
}

/// A user who can be invited to meetings.
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub id: ParticipantId,
    pub firstname: String,
    pub lastname: String,
    pub email: String,
    /// Carried as an attribute only; no conversion happens in this crate.
    pub timezone: Tz,
}

impl Participant {
    /// First and last name, skipping whichever is empty.
    pub fn full_name(&self) -> String {
        [self.firstname.as_str(), self.lastname.as_str()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// An agenda (calendar) belonging to one participant.
#[derive(Debug, Clone, PartialEq)]
pub struct Agenda {
    pub id: AgendaId,
    pub name: String,
    pub kind: AgendaKind,
    pub owner: Option<Participant>,
}

/// A persisted meeting.
#[derive(Debug, Clone, PartialEq)]
pub struct Appointment {
    pub id: AppointmentId,
    pub name: String,
    pub notes: String,
    pub interval: Interval,
    pub status: AppointmentStatus,
    pub participants: Vec<Participant>,
}

impl Appointment {
    pub fn start(&self) -> DateTime<Utc> {
        self.interval.start()
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.interval.end()
    }

    /// Participants' full names, comma separated; `"Me"` when nobody else is invited.
    pub fn collaborators(&self) -> String {
        if self.participants.is_empty() {
            return "Me".to_string();
        }
        self.participants
            .iter()
            .map(Participant::full_name)
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn event_variant(&self) -> EventVariant {
        match self.status {
            AppointmentStatus::Pending => EventVariant::Outline,
            AppointmentStatus::Validated => EventVariant::Primary,
            AppointmentStatus::Refused => EventVariant::Destructive,
        }
    }

    /// The busy interval this appointment contributes for `participant`.
    pub fn busy_for(&self, participant: &ParticipantId) -> BusyInterval {
        BusyInterval {
            participant: participant.clone(),
            appointment: Some(self.id.clone()),
            interval: self.interval,
        }
    }
}

// ---------------------------------------------------------------------------
// Raw payloads and hydration
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawParticipant {
    id: String,
    #[serde(default)]
    firstname: String,
    #[serde(default)]
    lastname: String,
    #[serde(default)]
    email: String,
    timezone: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAgenda {
    id: String,
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    user: Option<RawParticipant>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAppointment {
    id: String,
    name: String,
    #[serde(default)]
    notes: String,
    start_date: String,
    end_date: String,
    status: String,
    #[serde(default)]
    users: Vec<RawParticipant>,
}

fn participant_from_raw(raw: RawParticipant) -> Result<Participant> {
    let timezone: Tz = raw
        .timezone
        .parse()
        .map_err(|_| EngineError::InvalidTimezone(raw.timezone.clone()))?;
    Ok(Participant {
        id: ParticipantId(raw.id),
        firstname: raw.firstname,
        lastname: raw.lastname,
        email: raw.email,
        timezone,
    })
}

/// Hydrate a participant from a raw user payload.
///
/// # Errors
/// `EngineError::InvalidTimezone` when `timezone` is not an IANA identifier.
pub fn hydrate_participant(value: &serde_json::Value) -> Result<Participant> {
    let raw: RawParticipant = serde_json::from_value(value.clone())?;
    participant_from_raw(raw)
}

/// Hydrate an agenda, including its owner when present.
pub fn hydrate_agenda(value: &serde_json::Value) -> Result<Agenda> {
    let raw: RawAgenda = serde_json::from_value(value.clone())?;
    Ok(Agenda {
        id: AgendaId(raw.id),
        name: raw.name,
        kind: raw.kind.parse()?,
        owner: raw.user.map(participant_from_raw).transpose()?,
    })
}

/// Hydrate an appointment and its nested participants.
///
/// # Errors
/// Fails on unparseable dates, an inverted range, an unknown status, or any
/// participant that fails [`hydrate_participant`].
pub fn hydrate_appointment(value: &serde_json::Value) -> Result<Appointment> {
    let raw: RawAppointment = serde_json::from_value(value.clone())?;
    let start = crate::wire::parse_datetime(&raw.start_date)?;
    let end = crate::wire::parse_datetime(&raw.end_date)?;
    let participants = raw
        .users
        .into_iter()
        .map(participant_from_raw)
        .collect::<Result<Vec<_>>>()?;

    Ok(Appointment {
        id: AppointmentId(raw.id),
        name: raw.name,
        notes: raw.notes,
        interval: Interval::new(start, end)?,
        status: raw.status.parse()?,
        participants,
    })
}
