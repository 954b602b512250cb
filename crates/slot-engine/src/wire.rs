//! Request and response shapes of the remote collaborators.
//!
//! Timestamps cross the wire as RFC 3339 strings in UTC and keys are
//! camelCase. Transport is not handled here; these DTOs are what an HTTP
//! client would serialize.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::availability::SearchCriteria;
use crate::error::{EngineError, Result, ServiceError};
use crate::interval::Interval;
use crate::model::{AppointmentId, ParticipantId};

/// Parse an ISO 8601 datetime string into `DateTime<Utc>`.
///
/// Accepts RFC 3339 (with offset) and naive `YYYY-MM-DDTHH:MM:SS[.fff]`,
/// which is interpreted as UTC.
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|ndt| ndt.and_utc())
        .map_err(|e| EngineError::InvalidDatetime(format!("'{}': {}", s, e)))
}

/// Format an instant the way the remote services expect it.
/// Fractional seconds are kept when present.
pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Body of an availability search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub start_date: String,
    pub end_date: String,
    pub participant_ids: Vec<ParticipantId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_appointment_id: Option<AppointmentId>,
}

impl From<&SearchCriteria> for SearchRequest {
    fn from(criteria: &SearchCriteria) -> Self {
        Self {
            start_date: format_datetime(criteria.range.start()),
            end_date: format_datetime(criteria.range.end()),
            participant_ids: criteria.participants.iter().cloned().collect(),
            exclude_appointment_id: criteria.exclude_appointment.clone(),
        }
    }
}

/// One free window in a search response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowDto {
    pub start: String,
    pub end: String,
}

impl From<&Interval> for WindowDto {
    fn from(iv: &Interval) -> Self {
        Self {
            start: format_datetime(iv.start()),
            end: format_datetime(iv.end()),
        }
    }
}

impl TryFrom<&WindowDto> for Interval {
    type Error = EngineError;

    fn try_from(dto: &WindowDto) -> Result<Self> {
        Interval::new(parse_datetime(&dto.start)?, parse_datetime(&dto.end)?)
    }
}

/// Validate a search response body into sorted intervals.
///
/// A body that does not decode, or that carries an invalid window, is
/// reported as a server fault: the caller gets no partial result.
pub fn windows_from_response(body: &str) -> std::result::Result<Vec<Interval>, ServiceError> {
    let malformed = |message: String| ServiceError::Server {
        status: 200,
        message: format!("malformed availability response: {}", message),
    };

    let dtos: Vec<WindowDto> = serde_json::from_str(body).map_err(|e| malformed(e.to_string()))?;
    let mut windows = dtos
        .iter()
        .map(Interval::try_from)
        .collect::<Result<Vec<_>>>()
        .map_err(|e| malformed(e.to_string()))?;
    windows.sort();
    Ok(windows)
}

/// Body of an appointment creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentDraft {
    pub name: String,
    pub notes: String,
    pub start_date: String,
    pub end_date: String,
    pub participant_ids: Vec<ParticipantId>,
}

impl AppointmentDraft {
    pub fn interval(&self) -> Result<Interval> {
        Interval::new(
            parse_datetime(&self.start_date)?,
            parse_datetime(&self.end_date)?,
        )
    }
}

/// Body of an appointment update: a draft plus the id being edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentUpdate {
    pub id: AppointmentId,
    #[serde(flatten)]
    pub draft: AppointmentDraft,
}
