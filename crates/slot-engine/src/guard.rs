//! Selection policy for interactive calendar drags.
//!
//! The calendar asks two independent questions: "may this drag proceed?" and
//! "how should this cell look?". Both are answered from the same
//! [`ZonePolicy`], so a cell never looks selectable while its drag is
//! rejected, or the other way around.
//!
//! Precedence: when any allow-zone is present, only allow-zones matter and
//! deny-zones are ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::interval::{contains, overlaps, Interval};

/// The effective policy after precedence has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZonePolicy {
    /// No zones supplied: everything is selectable.
    Unrestricted,
    /// Selections must fit entirely inside one of these zones.
    AllowOnly(Vec<Interval>),
    /// Selections must not touch any of these zones.
    DenyListed(Vec<Interval>),
}

impl ZonePolicy {
    pub fn from_zones(allow: &[Interval], deny: &[Interval]) -> Self {
        if !allow.is_empty() {
            ZonePolicy::AllowOnly(allow.to_vec())
        } else if !deny.is_empty() {
            ZonePolicy::DenyListed(deny.to_vec())
        } else {
            ZonePolicy::Unrestricted
        }
    }
}

/// Visual state of a calendar cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellState {
    /// Selectable: inside an allow-zone, or outside every deny-zone.
    Available,
    /// Outside every allow-zone, or inside a deny-zone: not interactive.
    Blocked,
}

impl CellState {
    pub fn is_interactive(&self) -> bool {
        !matches!(self, CellState::Blocked)
    }
}

/// Outcome of a proposed drag-range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeDecision {
    Accept,
    Reject,
}

impl RangeDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, RangeDecision::Accept)
    }
}

impl From<bool> for RangeDecision {
    fn from(accepted: bool) -> Self {
        if accepted {
            RangeDecision::Accept
        } else {
            RangeDecision::Reject
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionGuard {
    policy: ZonePolicy,
}

impl SelectionGuard {
    pub fn new(allow: &[Interval], deny: &[Interval]) -> Self {
        Self {
            policy: ZonePolicy::from_zones(allow, deny),
        }
    }

    /// Restrict selection to `zones`, blocking everything when `zones` is empty.
    pub fn allow_only(zones: &[Interval]) -> Self {
        Self {
            policy: ZonePolicy::AllowOnly(zones.to_vec()),
        }
    }

    pub fn unrestricted() -> Self {
        Self {
            policy: ZonePolicy::Unrestricted,
        }
    }

    pub fn policy(&self) -> &ZonePolicy {
        &self.policy
    }

    /// Whether a completed drag over `range` may be kept.
    ///
    /// Partial overlap with an allow-zone is rejected, never clipped.
    pub fn check_range(&self, range: &Interval) -> RangeDecision {
        let accepted = match &self.policy {
            ZonePolicy::Unrestricted => true,
            ZonePolicy::AllowOnly(zones) => zones.iter().any(|zone| contains(zone, range)),
            ZonePolicy::DenyListed(zones) => !zones.iter().any(|zone| overlaps(range, zone)),
        };
        accepted.into()
    }

    /// Style of the cell starting at `t`.
    pub fn cell_state(&self, t: DateTime<Utc>) -> CellState {
        match &self.policy {
            ZonePolicy::Unrestricted => CellState::Available,
            ZonePolicy::AllowOnly(zones) => {
                if zones.iter().any(|zone| zone.contains_instant(t)) {
                    CellState::Available
                } else {
                    CellState::Blocked
                }
            }
            ZonePolicy::DenyListed(zones) => {
                if zones.iter().any(|zone| zone.contains_instant(t)) {
                    CellState::Blocked
                } else {
                    CellState::Available
                }
            }
        }
    }
}

impl Default for SelectionGuard {
    fn default() -> Self {
        Self::unrestricted()
    }
}
