//! Canonical feature and sample-link persistence.
//!
//! Three small traits split the surface the way callers use it:
//! [`CanonicalStore`] resolves composite keys to ids, [`LinkStore`] reads the
//! per-sample link rows, and [`BatchCommit`] applies one staged batch
//! atomically. [`MemoryFeatureStore`] and [`FileFeatureStore`] implement all
//! three; [`BatchTransaction`] overlays a batch on top of either.

use std::collections::{HashMap, HashSet};

use indexmap::IndexSet;

use crate::constants::store::FIRST_FEATURE_ID;
use crate::data::{CanonicalRecord, CompositeKey, NewRecord, SampleLink, VariantImpact};
use crate::errors::ClindexError;
use crate::scope::StoreScope;
use crate::types::{FeatureId, SampleId};

mod file;
mod memory;
mod transaction;

pub use file::FileFeatureStore;
pub use memory::MemoryFeatureStore;
pub use transaction::BatchTransaction;

/// Composite-key to id resolution for one or more scopes.
pub trait CanonicalStore: Send + Sync {
    /// Returns `true` once `scope` has been initialized.
    fn has_scope(&self, scope: StoreScope) -> Result<bool, ClindexError>;
    /// Ids of the keys already present; absent keys are omitted.
    fn lookup_many(
        &self,
        scope: StoreScope,
        keys: &HashSet<CompositeKey>,
    ) -> Result<HashMap<CompositeKey, FeatureId>, ClindexError>;
    /// Mint strictly increasing ids for `records`, in input order.
    ///
    /// Fails with [`ClindexError::DuplicateKey`] when any key is already
    /// present or repeated in `records`; nothing is inserted in that case.
    fn insert_many(
        &self,
        scope: StoreScope,
        records: &[NewRecord],
    ) -> Result<HashMap<CompositeKey, FeatureId>, ClindexError>;
    /// Record by id, if minted.
    fn record(
        &self,
        scope: StoreScope,
        id: FeatureId,
    ) -> Result<Option<CanonicalRecord>, ClindexError>;
    /// Every record of `scope` in id order.
    fn records(&self, scope: StoreScope) -> Result<Vec<CanonicalRecord>, ClindexError>;
    /// Id the next minted record will receive.
    fn next_id(&self, scope: StoreScope) -> Result<FeatureId, ClindexError>;
}

/// Read access to sample links and consequence annotations.
pub trait LinkStore: Send + Sync {
    /// Every link of `scope`, ordered by record id then insertion.
    fn links(&self, scope: StoreScope) -> Result<Vec<SampleLink>, ClindexError>;
    /// Links attached to one record, in insertion order.
    fn links_for_record(
        &self,
        scope: StoreScope,
        id: FeatureId,
    ) -> Result<Vec<SampleLink>, ClindexError>;
    /// Samples with at least one link in `scope`.
    fn linked_samples(&self, scope: StoreScope) -> Result<HashSet<SampleId>, ClindexError>;
    /// Consequence annotations attached to one record.
    fn impacts(
        &self,
        scope: StoreScope,
        id: FeatureId,
    ) -> Result<Vec<VariantImpact>, ClindexError>;
}

/// Canonical rows, links and annotations produced by one batch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StagedBatch {
    /// New canonical records with ids continuing the durable sequence.
    pub records: Vec<CanonicalRecord>,
    /// Links to new or existing records.
    pub links: Vec<SampleLink>,
    /// Annotations for new variant records.
    pub impacts: Vec<VariantImpact>,
}

impl StagedBatch {
    /// Nothing staged.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.links.is_empty() && self.impacts.is_empty()
    }
}

/// Row counts applied by one commit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CommitSummary {
    /// Canonical records written.
    pub records: usize,
    /// Links written.
    pub links: usize,
    /// Impacts written.
    pub impacts: usize,
    /// Durable next id after the commit.
    pub next_id: FeatureId,
}

/// Atomic, all-or-nothing application of staged batches.
pub trait BatchCommit: Send + Sync {
    /// Create `scope` if missing; a no-op for existing scopes.
    fn init_scope(&self, scope: StoreScope) -> Result<(), ClindexError>;
    /// Validate `batch` against durable state and apply it in one step.
    ///
    /// Rejects key conflicts ([`ClindexError::DuplicateKey`]), a moved id
    /// sequence ([`ClindexError::StaleBatch`]), repeated `(sample, record)`
    /// pairs ([`ClindexError::DuplicateLink`]) and references to ids that are
    /// neither durable nor staged ([`ClindexError::UnknownFeature`]).
    fn commit_batch(
        &self,
        scope: StoreScope,
        batch: StagedBatch,
    ) -> Result<CommitSummary, ClindexError>;

    /// Append links to existing records without staging canonical rows.
    fn append_links(
        &self,
        scope: StoreScope,
        links: Vec<SampleLink>,
    ) -> Result<CommitSummary, ClindexError> {
        self.commit_batch(
            scope,
            StagedBatch {
                links,
                ..StagedBatch::default()
            },
        )
    }
}

/// Everything the ingestion pipeline needs from a backend.
pub trait FeatureStore: CanonicalStore + LinkStore + BatchCommit {}

impl<T: CanonicalStore + LinkStore + BatchCommit + ?Sized> FeatureStore for T {}

/// Durable state a backend exposes to [`validate_batch`] while holding its write guard.
pub(crate) trait DurableView {
    fn next_id(&self) -> FeatureId;
    /// Subset of `keys` already present.
    fn existing_keys(&self, keys: &[&CompositeKey]) -> Result<Vec<CompositeKey>, ClindexError>;
    /// Subset of `pairs` already linked.
    fn existing_pairs(
        &self,
        pairs: &[(&str, FeatureId)],
    ) -> Result<Vec<(SampleId, FeatureId)>, ClindexError>;
}

/// Assign ids `next_id..` to `records` in order.
pub(crate) fn mint_records(next_id: FeatureId, records: &[NewRecord]) -> Vec<CanonicalRecord> {
    records
        .iter()
        .zip(next_id..)
        .map(|(record, id)| CanonicalRecord {
            id,
            key: record.key.clone(),
            extras: record.extras.clone(),
        })
        .collect()
}

pub(crate) fn check_kind(scope: StoreScope, key: &CompositeKey) -> Result<(), ClindexError> {
    if key.kind() != scope.kind {
        return Err(ClindexError::Configuration(format!(
            "{} key {key} cannot be stored in scope '{scope}'",
            key.kind()
        )));
    }
    Ok(())
}

/// Shared commit validation; runs before any write.
pub(crate) fn validate_batch(
    scope: StoreScope,
    batch: &StagedBatch,
    durable: &dyn DurableView,
) -> Result<(), ClindexError> {
    let next_id = durable.next_id();

    let mut staged_keys: IndexSet<&CompositeKey> = IndexSet::with_capacity(batch.records.len());
    let mut conflicts: Vec<String> = Vec::new();
    for record in &batch.records {
        check_kind(scope, &record.key)?;
        if !staged_keys.insert(&record.key) {
            conflicts.push(record.key.to_string());
        }
    }
    let keys: Vec<&CompositeKey> = staged_keys.iter().copied().collect();
    conflicts.extend(
        durable
            .existing_keys(&keys)?
            .iter()
            .map(|key| key.to_string()),
    );
    if !conflicts.is_empty() {
        return Err(ClindexError::DuplicateKey {
            scope,
            keys: conflicts,
        });
    }

    if let Some(first) = batch.records.first() {
        if first.id != next_id {
            return Err(ClindexError::StaleBatch {
                scope,
                expected: first.id,
                found: next_id,
                keys: batch.records.iter().map(|record| record.key.to_string()).collect(),
            });
        }
        for (record, expected) in batch.records.iter().zip(next_id..) {
            if record.id != expected {
                return Err(ClindexError::Store(format!(
                    "staged ids in scope '{scope}' are not contiguous (expected {expected}, found {})",
                    record.id
                )));
            }
        }
    }
    let staged_end = next_id + batch.records.len() as FeatureId;
    let known = |id: FeatureId| (FIRST_FEATURE_ID..staged_end).contains(&id);

    let mut unknown: Vec<FeatureId> = batch
        .links
        .iter()
        .map(|link| link.record_id)
        .chain(batch.impacts.iter().map(|impact| impact.record_id))
        .filter(|id| !known(*id))
        .collect();
    if !unknown.is_empty() {
        unknown.sort_unstable();
        unknown.dedup();
        return Err(ClindexError::UnknownFeature {
            scope,
            ids: unknown,
        });
    }

    let mut pairs: IndexSet<(&str, FeatureId)> = IndexSet::with_capacity(batch.links.len());
    let mut repeated: Vec<String> = Vec::new();
    for link in &batch.links {
        if link.metrics.kind() != scope.kind {
            return Err(ClindexError::Configuration(format!(
                "{} metrics for {} cannot be linked in scope '{scope}'",
                link.metrics.kind(),
                link.label()
            )));
        }
        if !pairs.insert((link.sample_id.as_str(), link.record_id)) {
            repeated.push(link.label());
        }
    }
    let durable_pairs: Vec<(&str, FeatureId)> = pairs
        .iter()
        .copied()
        .filter(|(_, id)| *id < next_id)
        .collect();
    repeated.extend(
        durable
            .existing_pairs(&durable_pairs)?
            .iter()
            .map(|(sample, id)| format!("{sample}@{id}")),
    );
    if !repeated.is_empty() {
        return Err(ClindexError::DuplicateLink {
            scope,
            links: repeated,
        });
    }
    Ok(())
}
