//! Engine configuration.
//!
//! `EngineConfig` is the serde-facing shape (minutes as integers, suitable
//! for a TOML or JSON file). It is validated into a [`SlotPolicy`] before any
//! computation uses it.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

pub const DEFAULT_GRANULARITY_MINUTES: i64 = 15;
pub const DEFAULT_DURATION_MINUTES: i64 = 30;
pub const DEFAULT_SLOT_LABEL_PREFIX: &str = "Slot";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Step of the candidate grid, and the clock boundary slots align to.
    pub granularity_minutes: i64,
    /// Length of the meeting being booked.
    pub duration_minutes: i64,
    /// Slots are labelled `"{prefix} {n}"`.
    pub slot_label_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            granularity_minutes: DEFAULT_GRANULARITY_MINUTES,
            duration_minutes: DEFAULT_DURATION_MINUTES,
            slot_label_prefix: DEFAULT_SLOT_LABEL_PREFIX.to_string(),
        }
    }
}

impl EngineConfig {
    /// # Errors
    /// `EngineError::InvalidDuration` when either value is out of range.
    pub fn policy(&self) -> Result<SlotPolicy> {
        SlotPolicy::new(
            minutes("granularity", self.granularity_minutes)?,
            minutes("duration", self.duration_minutes)?,
        )
        .map(|policy| policy.with_label_prefix(self.slot_label_prefix.clone()))
    }
}

fn minutes(field: &str, value: i64) -> Result<Duration> {
    Duration::try_minutes(value).ok_or_else(|| {
        EngineError::InvalidDuration(format!("{} of {} minutes is out of range", field, value))
    })
}

/// Validated discretization parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotPolicy {
    granularity: Duration,
    duration: Duration,
    label_prefix: String,
}

impl SlotPolicy {
    /// # Errors
    /// `EngineError::InvalidDuration` when the granularity is under one second
    /// or the duration is not positive.
    pub fn new(granularity: Duration, duration: Duration) -> Result<Self> {
        if granularity < Duration::seconds(1) {
            return Err(EngineError::InvalidDuration(format!(
                "granularity must be at least one second, got {} ms",
                granularity.num_milliseconds()
            )));
        }
        if duration <= Duration::zero() {
            return Err(EngineError::InvalidDuration(format!(
                "duration must be positive, got {} minutes",
                duration.num_minutes()
            )));
        }
        Ok(Self {
            granularity,
            duration,
            label_prefix: DEFAULT_SLOT_LABEL_PREFIX.to_string(),
        })
    }

    pub fn with_label_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.label_prefix = prefix.into();
        self
    }

    pub fn granularity(&self) -> Duration {
        self.granularity
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn label_prefix(&self) -> &str {
        &self.label_prefix
    }
}

impl Default for SlotPolicy {
    fn default() -> Self {
        Self {
            granularity: Duration::minutes(DEFAULT_GRANULARITY_MINUTES),
            duration: Duration::minutes(DEFAULT_DURATION_MINUTES),
            label_prefix: DEFAULT_SLOT_LABEL_PREFIX.to_string(),
        }
    }
}
