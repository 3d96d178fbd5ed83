//! Interval arithmetic for cross-sample feature matching.
//!
//! All functions are pure; invalid parameters are rejected with
//! [`ClindexError::OverlapParameter`] before any store is touched.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::ClindexError;

/// Genomic span on one chromosome with both endpoints included.
///
/// Intervals that share only an endpoint intersect, with zero overlap length.
/// Length is `end - start`, so a point (`start == end`) has zero length.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    /// First covered position.
    pub start: u64,
    /// Last covered position.
    pub end: u64,
}

impl Interval {
    /// Build an interval, rejecting `end < start`.
    pub fn new(start: u64, end: u64) -> Result<Self, ClindexError> {
        let interval = Self { start, end };
        interval.check_ordered()?;
        Ok(interval)
    }

    /// `end - start`.
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// Returns `true` for zero-length (degenerate) intervals.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_ordered(&self) -> Result<(), ClindexError> {
        if self.end < self.start {
            return Err(ClindexError::OverlapParameter(format!(
                "interval {self} ends before it starts"
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.start, self.end)
    }
}

/// Fraction of `a` covered by `b`, in `[0, 1]`.
///
/// `a` must have non-zero length; `b` may be a point.
pub fn overlap_fraction(a: Interval, b: Interval) -> Result<f64, ClindexError> {
    a.check_ordered()?;
    b.check_ordered()?;
    if a.is_empty() {
        return Err(ClindexError::OverlapParameter(format!(
            "interval {a} has zero length"
        )));
    }
    let len_a = a.len() as f64;
    let fraction = if b.start > a.end || a.start > b.end {
        0.0
    } else if b.start <= a.start && b.end >= a.end {
        1.0
    } else if b.start >= a.start && b.end <= a.end {
        b.len() as f64 / len_a
    } else if b.start >= a.start && b.end > a.end {
        // 3' overhang
        (a.end - b.start) as f64 / len_a
    } else {
        // 5' overhang: b.start < a.start and b.end < a.end
        (b.end - a.start) as f64 / len_a
    };
    Ok(fraction)
}

/// `true` when each interval covers at least `threshold` of the other.
pub fn reciprocal_overlap(a: Interval, b: Interval, threshold: f64) -> Result<bool, ClindexError> {
    check_threshold(threshold)?;
    Ok(overlap_fraction(a, b)? >= threshold && overlap_fraction(b, a)? >= threshold)
}

/// `true` when `b` starts no more than `tol5` before `a` and ends no more than
/// `tol3` after it.
pub fn within_tolerance(a: Interval, b: Interval, tol5: u64, tol3: u64) -> bool {
    b.start.saturating_add(tol5) >= a.start && b.end <= a.end.saturating_add(tol3)
}

fn check_threshold(threshold: f64) -> Result<(), ClindexError> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(ClindexError::OverlapParameter(format!(
            "overlap threshold {threshold} is outside [0, 1]"
        )));
    }
    Ok(())
}

/// How a candidate interval is compared against a query interval.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum MatchMode {
    /// Identical start and end.
    Exact,
    /// Asymmetric slack at each end.
    Tolerance {
        /// Bases the candidate may start before the query.
        five_prime: u64,
        /// Bases the candidate may end after the query.
        three_prime: u64,
    },
    /// Minimum covered fraction of the query (and of the candidate when reciprocal).
    Overlap {
        /// Required covered fraction, in `[0, 1]`.
        fraction: f64,
        /// Also require the candidate to be covered by the query.
        reciprocal: bool,
    },
}

impl MatchMode {
    /// Validated overlap mode.
    pub fn overlap(fraction: f64, reciprocal: bool) -> Result<Self, ClindexError> {
        check_threshold(fraction)?;
        Ok(MatchMode::Overlap {
            fraction,
            reciprocal,
        })
    }

    /// Does `candidate` count as the same feature as `query`?
    pub fn matches(&self, query: Interval, candidate: Interval) -> Result<bool, ClindexError> {
        match *self {
            MatchMode::Exact => Ok(query == candidate),
            MatchMode::Tolerance {
                five_prime,
                three_prime,
            } => Ok(within_tolerance(query, candidate, five_prime, three_prime)),
            MatchMode::Overlap {
                fraction,
                reciprocal: true,
            } => reciprocal_overlap(query, candidate, fraction),
            MatchMode::Overlap {
                fraction,
                reciprocal: false,
            } => {
                check_threshold(fraction)?;
                Ok(overlap_fraction(query, candidate)? >= fraction)
            }
        }
    }
}
