use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::constants::ingest::{DEFAULT_MAX_BATCH_RETRIES, DEFAULT_MIN_JUNCTION_READS};
use crate::errors::ClindexError;
use crate::overlap::MatchMode;

/// How the link engine treats samples that already have links in a scope.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExistingSamplesPolicy {
    /// Drop every row of a sample that already has links (incremental imports).
    #[default]
    Skip,
    /// Link every row; a repeated `(sample, feature)` pair aborts the batch.
    #[serde(alias = "overwrite")]
    Append,
}

impl FromStr for ExistingSamplesPolicy {
    type Err = ClindexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "append" | "overwrite" => Ok(Self::Append),
            other => Err(ClindexError::Configuration(format!(
                "existing samples policy can only be 'skip', 'append' or 'overwrite', got '{other}'"
            ))),
        }
    }
}

/// What to do when per-file annotation field sets disagree.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotSamePolicy {
    /// Reject the import.
    #[default]
    Error,
    /// Keep every field seen in any file.
    Union,
    /// Keep only fields present in every file.
    Intersection,
}

impl FromStr for NotSamePolicy {
    type Err = ClindexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "union" => Ok(Self::Union),
            "intersection" => Ok(Self::Intersection),
            other => Err(ClindexError::Configuration(format!(
                "not_same can only be 'error', 'union' or 'intersection', got '{other}'"
            ))),
        }
    }
}

/// Batch import settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Junction rows with fewer unique reads are dropped before resolution.
    pub min_junction_reads: u32,
    /// Drop junction rows whose strand is undefined (`.`).
    pub drop_undefined_strand: bool,
    /// Treatment of samples that already have links in the target scope.
    pub existing_samples: ExistingSamplesPolicy,
    /// Whole-batch retries after a concurrent writer conflict.
    pub max_batch_retries: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            min_junction_reads: DEFAULT_MIN_JUNCTION_READS,
            drop_undefined_strand: true,
            existing_samples: ExistingSamplesPolicy::default(),
            max_batch_retries: DEFAULT_MAX_BATCH_RETRIES,
        }
    }
}

/// Cross-sample matching parameters for "same junction" queries.
///
/// `tolerance` and `overlap` are mutually exclusive; leaving both unset asks
/// for exact coordinate matches.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Allowed slack at the 5' and 3' ends, in bases.
    pub tolerance: Option<(u64, u64)>,
    /// Minimum fraction of the query covered by a candidate.
    pub overlap: Option<f64>,
    /// Require the overlap fraction in both directions.
    pub reciprocal: bool,
}

impl MatchConfig {
    /// Validate and convert into a match mode.
    pub fn mode(&self) -> Result<MatchMode, ClindexError> {
        match (self.tolerance, self.overlap) {
            (Some(tolerance), Some(overlap)) => Err(ClindexError::OverlapParameter(format!(
                "tolerance {tolerance:?} and overlap {overlap} are mutually exclusive"
            ))),
            (Some((five_prime, three_prime)), None) => {
                if self.reciprocal {
                    return Err(ClindexError::OverlapParameter(
                        "reciprocal matching requires an overlap fraction".into(),
                    ));
                }
                Ok(MatchMode::Tolerance {
                    five_prime,
                    three_prime,
                })
            }
            (None, Some(fraction)) => MatchMode::overlap(fraction, self.reciprocal),
            (None, None) => {
                if self.reciprocal {
                    return Err(ClindexError::OverlapParameter(
                        "reciprocal matching requires an overlap fraction".into(),
                    ));
                }
                Ok(MatchMode::Exact)
            }
        }
    }
}
