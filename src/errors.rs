use std::io;

use thiserror::Error;

use crate::scope::StoreScope;
use crate::types::{FeatureId, KeyLabel};

/// Error type for identity resolution, linking, query arithmetic, and persistence failures.
#[derive(Debug, Error)]
pub enum ClindexError {
    /// Keys the batch tried to mint already exist durably.
    #[error("duplicate composite key(s) in scope '{scope}': {}", keys.join(", "))]
    DuplicateKey {
        /// Scope the conflict happened in.
        scope: StoreScope,
        /// Labels of the conflicting keys.
        keys: Vec<KeyLabel>,
    },
    /// Another writer advanced the id sequence after the batch was staged.
    #[error(
        "scope '{scope}' changed underneath the batch staging {} (expected next id {expected}, found {found})",
        keys.join(", ")
    )]
    StaleBatch {
        /// Scope the conflict happened in.
        scope: StoreScope,
        /// Next id the batch was staged against.
        expected: FeatureId,
        /// Durable next id at commit time.
        found: FeatureId,
        /// Labels of the keys the batch was minting.
        keys: Vec<KeyLabel>,
    },
    /// A `(sample, record)` pair is already linked, or repeated in the batch.
    #[error("duplicate sample link(s) in scope '{scope}': {}", links.join(", "))]
    DuplicateLink {
        /// Scope the conflict happened in.
        scope: StoreScope,
        /// `sample@id` labels of the repeated links.
        links: Vec<KeyLabel>,
    },
    /// Links or impacts point at ids that were never minted.
    #[error("sample link(s) in scope '{scope}' reference unknown feature id(s) {ids:?}")]
    UnknownFeature {
        /// Scope searched.
        scope: StoreScope,
        /// Missing ids.
        ids: Vec<FeatureId>,
    },
    /// Genotype string that cannot be parsed.
    #[error("invalid genotype: {0}")]
    InvalidGenotype(String),
    /// Zero-length interval, reversed interval or threshold outside `[0, 1]`.
    #[error("invalid overlap parameters: {0}")]
    OverlapParameter(String),
    /// Frequency requested over a population with no samples.
    #[error("allele frequency requested over an empty population: {0}")]
    ZeroPopulation(String),
    /// Scope used before `init_scope`.
    #[error("store scope '{0}' has not been initialized")]
    MissingScope(StoreScope),
    /// Cohort name the directory does not know.
    #[error("unknown cohort '{0}'")]
    UnknownCohort(String),
    /// Backend read, write or decode failure.
    #[error("feature store failure: {0}")]
    Store(String),
    /// Filesystem error.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// Invalid configuration or input rows.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ClindexError {
    /// Returns `true` when the whole batch may be retried from the collapse step.
    ///
    /// Only conflicts caused by another writer touching the same scope qualify.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClindexError::DuplicateKey { .. } | ClindexError::StaleBatch { .. }
        )
    }
}
