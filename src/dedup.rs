//! Identity resolution: map raw rows to canonical ids, minting ids for new keys.

use indexmap::{IndexMap, IndexSet};
use std::collections::HashSet;
use tracing::debug;

use crate::data::{CompositeKey, NewRecord, RawRecord};
use crate::errors::ClindexError;
use crate::scope::StoreScope;
use crate::store::CanonicalStore;
use crate::types::FeatureId;

/// Result of resolving one batch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Resolved id for every input row, in input order (duplicates included).
    pub id_by_row: Vec<FeatureId>,
    /// Keys minted by this resolution, in first-seen order.
    pub newly_inserted: IndexSet<CompositeKey>,
    /// Keys that were already in the store, in first-seen order.
    pub already_known: IndexSet<CompositeKey>,
    /// Index of the first row carrying each distinct key.
    pub first_row: IndexMap<CompositeKey, usize>,
    /// Rows whose key repeats an earlier row of the batch.
    pub duplicate_rows: usize,
}

impl Resolution {
    /// Number of distinct composite keys in the batch.
    pub fn distinct_keys(&self) -> usize {
        self.first_row.len()
    }

    /// Id resolved for `key`, if the key was part of the batch.
    pub fn id_of(&self, key: &CompositeKey) -> Option<FeatureId> {
        self.first_row.get(key).map(|row| self.id_by_row[*row])
    }

    /// Returns `true` when `key` was minted by this resolution.
    pub fn is_new(&self, key: &CompositeKey) -> bool {
        self.newly_inserted.contains(key)
    }
}

/// Collapse rows by composite key, keeping the first occurrence of each.
///
/// Returns `key -> index of first row`; later rows with the same key are
/// ignored, including their extras and metrics.
pub fn collapse_batch(rows: &[RawRecord]) -> IndexMap<CompositeKey, usize> {
    let mut first_row = IndexMap::with_capacity(rows.len());
    for (idx, row) in rows.iter().enumerate() {
        first_row.entry(row.key.clone()).or_insert(idx);
    }
    first_row
}

/// Resolves raw batches against one canonical scope.
#[derive(Clone, Copy, Debug)]
pub struct Deduplicator {
    scope: StoreScope,
}

impl Deduplicator {
    /// Deduplicator bound to `scope`.
    pub fn new(scope: StoreScope) -> Self {
        Self { scope }
    }

    /// Scope batches are resolved against.
    pub fn scope(&self) -> StoreScope {
        self.scope
    }

    /// Map every row of `rows` to a canonical id, minting ids for unseen keys.
    ///
    /// A [`ClindexError::DuplicateKey`] from `insert_many` means another writer
    /// minted one of the keys between lookup and insert; the caller restarts
    /// the whole batch.
    pub fn resolve<S: CanonicalStore + ?Sized>(
        &self,
        rows: &[RawRecord],
        store: &S,
    ) -> Result<Resolution, ClindexError> {
        let scope = self.scope;
        if let Some(row) = rows.iter().find(|row| row.key.kind() != scope.kind) {
            return Err(ClindexError::Configuration(format!(
                "{} row {} for sample '{}' cannot be resolved in scope '{scope}'",
                row.key.kind(),
                row.key,
                row.sample_id
            )));
        }

        let first_row = collapse_batch(rows);
        let duplicate_rows = rows.len() - first_row.len();
        if duplicate_rows > 0 {
            debug!(
                scope = %scope,
                rows = rows.len(),
                dropped = duplicate_rows,
                "collapsed duplicate composite keys"
            );
        }

        let keys: HashSet<CompositeKey> = first_row.keys().cloned().collect();
        let mut ids = store.lookup_many(scope, &keys)?;

        let mut already_known = IndexSet::new();
        let mut pending: Vec<NewRecord> = Vec::new();
        for (key, row) in &first_row {
            if ids.contains_key(key) {
                already_known.insert(key.clone());
            } else {
                pending.push(rows[*row].new_record());
            }
        }

        let newly_inserted: IndexSet<CompositeKey> =
            pending.iter().map(|record| record.key.clone()).collect();
        if !pending.is_empty() {
            let minted = store.insert_many(scope, &pending)?;
            debug!(scope = %scope, minted = minted.len(), "minted feature ids");
            ids.extend(minted);
        }

        let id_by_row = rows
            .iter()
            .map(|row| {
                ids.get(&row.key).copied().ok_or_else(|| {
                    ClindexError::Store(format!(
                        "store returned no id for {} in scope '{scope}'",
                        row.key
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Resolution {
            id_by_row,
            newly_inserted,
            already_known,
            first_row,
            duplicate_rows,
        })
    }
}
