//! Half-open interval arithmetic over UTC instants.
//!
//! Every other module builds on these operations: busy periods are merged
//! with [`merge_union`], carved out of a search range with [`subtract`], and
//! per-participant free lists are combined with [`intersect_all`].
//!
//! Intervals are half-open (`start <= t < end`), so two intervals that touch
//! at an endpoint do not overlap, but they are still coalesced by
//! [`merge_union`].

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// A non-empty half-open time range `[start, end)`.
///
/// The `start < end` invariant is enforced at construction, including when
/// deserializing, so downstream code never sees a zero or negative length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawInterval")]
pub struct Interval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RawInterval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TryFrom<RawInterval> for Interval {
    type Error = EngineError;

    fn try_from(raw: RawInterval) -> Result<Self> {
        Interval::new(raw.start, raw.end)
    }
}

impl Interval {
    /// Build an interval, rejecting `start >= end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start >= end {
            return Err(EngineError::InvalidInterval(format!(
                "start {} is not before end {}",
                start.to_rfc3339(),
                end.to_rfc3339()
            )));
        }
        Ok(Self { start, end })
    }

    /// Build an interval from a start and a positive length.
    pub fn starting_at(start: DateTime<Utc>, length: Duration) -> Result<Self> {
        let end = start.checked_add_signed(length).ok_or_else(|| {
            EngineError::InvalidInterval(format!(
                "{} plus {} s is out of range",
                start.to_rfc3339(),
                length.num_seconds()
            ))
        })?;
        Self::new(start, end)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Whether the instant falls inside `[start, end)`.
    pub fn contains_instant(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }

    /// Restrict this interval to `bounds`. `None` when nothing is left.
    pub fn clip(&self, bounds: &Interval) -> Option<Interval> {
        let start = self.start.max(bounds.start);
        let end = self.end.min(bounds.end);
        (start < end).then_some(Interval { start, end })
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// Two intervals overlap when `a.start < b.end && b.start < a.end`.
///
/// Touching endpoints do not overlap.
pub fn overlaps(a: &Interval, b: &Interval) -> bool {
    a.start < b.end && b.start < a.end
}

/// Whether `inner` lies entirely within `outer`.
pub fn contains(outer: &Interval, inner: &Interval) -> bool {
    inner.start >= outer.start && inner.end <= outer.end
}

/// Merge overlapping or adjacent intervals into a minimal sorted cover.
pub fn merge_union(intervals: &[Interval]) -> Vec<Interval> {
    if intervals.is_empty() {
        return Vec::new();
    }

    let mut sorted = intervals.to_vec();
    sorted.sort_by_key(|iv| (iv.start, iv.end));

    let mut merged: Vec<Interval> = Vec::with_capacity(sorted.len());
    for iv in sorted {
        if let Some(last) = merged.last_mut() {
            if iv.start <= last.end {
                // Overlapping or adjacent: extend the accumulator.
                last.end = last.end.max(iv.end);
                continue;
            }
        }
        merged.push(iv);
    }

    merged
}

/// The parts of `base` not covered by any interval in `busy`.
///
/// `busy` may be unsorted, overlapping, or extend past `base`; it is merged
/// and clipped first. Returned gaps are sorted and never zero-length.
pub fn subtract(base: &Interval, busy: &[Interval]) -> Vec<Interval> {
    let clipped: Vec<Interval> = busy.iter().filter_map(|b| b.clip(base)).collect();
    let merged = merge_union(&clipped);

    let mut gaps = Vec::with_capacity(merged.len() + 1);
    let mut cursor = base.start;

    for b in &merged {
        if cursor < b.start {
            gaps.push(Interval {
                start: cursor,
                end: b.start,
            });
        }
        cursor = cursor.max(b.end);
    }

    // Trailing gap after the last busy period.
    if cursor < base.end {
        gaps.push(Interval {
            start: cursor,
            end: base.end,
        });
    }

    gaps
}

/// Intersect two interval lists with a linear merge.
///
/// Inputs are normalized with [`merge_union`] so callers may pass unsorted
/// lists.
pub fn intersect(a: &[Interval], b: &[Interval]) -> Vec<Interval> {
    let a = merge_union(a);
    let b = merge_union(b);

    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);

    while i < a.len() && j < b.len() {
        let start = a[i].start.max(b[j].start);
        let end = a[i].end.min(b[j].end);
        if start < end {
            out.push(Interval { start, end });
        }
        // Advance whichever list finishes first.
        if a[i].end <= b[j].end {
            i += 1;
        } else {
            j += 1;
        }
    }

    out
}

/// Intersect any number of free-window lists, one per participant.
///
/// An empty set of lists yields no windows.
pub fn intersect_all(window_sets: &[Vec<Interval>]) -> Vec<Interval> {
    let mut sets = window_sets.iter();
    let Some(first) = sets.next() else {
        return Vec::new();
    };

    sets.fold(merge_union(first), |acc, next| {
        if acc.is_empty() {
            acc
        } else {
            intersect(&acc, next)
        }
    })
}
