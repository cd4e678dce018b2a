//! Per-component run summaries.
//!
//! Row-level data problems are not errors: the offending row is dropped,
//! the matching counter is bumped, and the run continues. Each component
//! reports rows in, rows out and a dropped-per-reason breakdown when it
//! finishes.

use std::collections::BTreeMap;
use std::fmt;

/// Why a row or feature was dropped instead of processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DropReason {
    BadTimestamp,
    OutsideWindow,
    MissingCoordinate,
    OutsideBbox,
    OutsideBoundary,
    InvalidGeometry,
    UnknownSubclass,
    NotALine,
    NotAPoint,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::BadTimestamp => "bad_timestamp",
            DropReason::OutsideWindow => "outside_window",
            DropReason::MissingCoordinate => "missing_coordinate",
            DropReason::OutsideBbox => "outside_bbox",
            DropReason::OutsideBoundary => "outside_boundary",
            DropReason::InvalidGeometry => "invalid_geometry",
            DropReason::UnknownSubclass => "unknown_subclass",
            DropReason::NotALine => "not_a_line",
            DropReason::NotAPoint => "not_a_point",
        }
    }
}

/// Tally of one component's run: rows in/out plus drops by reason.
#[derive(Debug, Clone)]
pub struct RunSummary {
    component: &'static str,
    rows_in: u64,
    rows_out: u64,
    drops: BTreeMap<DropReason, u64>,
}

impl RunSummary {
    pub fn new(component: &'static str) -> Self {
        Self { component, rows_in: 0, rows_out: 0, drops: BTreeMap::new() }
    }

    #[inline]
    pub fn read(&mut self, n: u64) {
        self.rows_in += n;
    }

    #[inline]
    pub fn keep(&mut self) {
        self.rows_out += 1;
    }

    #[inline]
    pub fn drop_row(&mut self, reason: DropReason) {
        *self.drops.entry(reason).or_default() += 1;
    }

    #[inline] pub fn rows_in(&self) -> u64 { self.rows_in }
    #[inline] pub fn rows_out(&self) -> u64 { self.rows_out }

    pub fn dropped(&self) -> u64 {
        self.drops.values().sum()
    }

    pub fn dropped_for(&self, reason: DropReason) -> u64 {
        self.drops.get(&reason).copied().unwrap_or(0)
    }

    /// Fraction of input rows that were dropped, in [0, 1].
    pub fn drop_rate(&self) -> f64 {
        if self.rows_in == 0 {
            0.0
        } else {
            self.dropped() as f64 / self.rows_in as f64
        }
    }

    /// Log the compact success summary required on component completion.
    pub fn report(&self) {
        log::info!("{self}");
        for (reason, count) in &self.drops {
            log::info!("[{}]   - {}: {}", self.component, reason.as_str(), count);
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] rows in: {}, rows out: {}, dropped: {} ({:.2}%)",
            self.component,
            self.rows_in,
            self.rows_out,
            self.dropped(),
            self.drop_rate() * 100.0
        )
    }
}
