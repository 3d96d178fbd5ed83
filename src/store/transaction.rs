use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::data::{CanonicalRecord, CompositeKey, NewRecord, SampleLink, VariantImpact};
use crate::errors::ClindexError;
use crate::scope::StoreScope;
use crate::types::{FeatureId, SampleId};

use super::{CanonicalStore, CommitSummary, FeatureStore, StagedBatch, check_kind, mint_records};

#[derive(Debug, Default)]
struct Staged {
    ids: IndexMap<CompositeKey, FeatureId>,
    batch: StagedBatch,
}

/// One batch staged on top of a durable store.
///
/// Reads see durable rows plus everything staged so far; ids minted here
/// continue the durable sequence observed at [`BatchTransaction::begin`].
/// Nothing reaches the store until [`BatchTransaction::commit`]; dropping the
/// transaction discards the staged rows.
pub struct BatchTransaction<'s, S: FeatureStore + ?Sized> {
    store: &'s S,
    scope: StoreScope,
    base_next_id: FeatureId,
    staged: Mutex<Staged>,
}

impl<'s, S: FeatureStore + ?Sized> BatchTransaction<'s, S> {
    /// Start a batch against an initialized `scope`.
    pub fn begin(store: &'s S, scope: StoreScope) -> Result<Self, ClindexError> {
        if !store.has_scope(scope)? {
            return Err(ClindexError::MissingScope(scope));
        }
        let base_next_id = store.next_id(scope)?;
        Ok(Self {
            store,
            scope,
            base_next_id,
            staged: Mutex::new(Staged::default()),
        })
    }

    /// Scope this transaction writes to.
    pub fn scope(&self) -> StoreScope {
        self.scope
    }

    fn staged(&self) -> Result<MutexGuard<'_, Staged>, ClindexError> {
        self.staged
            .lock()
            .map_err(|_| ClindexError::Store("batch transaction lock poisoned".into()))
    }

    fn check_scope(&self, scope: StoreScope) -> Result<(), ClindexError> {
        if scope != self.scope {
            return Err(ClindexError::Configuration(format!(
                "transaction for scope '{}' cannot write to scope '{scope}'",
                self.scope
            )));
        }
        Ok(())
    }

    /// Queue sample links for the commit.
    pub fn stage_links(&self, links: Vec<SampleLink>) -> Result<(), ClindexError> {
        self.staged()?.batch.links.extend(links);
        Ok(())
    }

    /// Queue consequence annotations for the commit.
    pub fn stage_impacts(&self, impacts: Vec<VariantImpact>) -> Result<(), ClindexError> {
        self.staged()?.batch.impacts.extend(impacts);
        Ok(())
    }

    /// Samples with durable links in this scope; staged links are not included.
    pub fn durable_linked_samples(&self) -> Result<HashSet<SampleId>, ClindexError> {
        self.store.linked_samples(self.scope)
    }

    /// Apply the staged batch atomically.
    pub fn commit(self) -> Result<CommitSummary, ClindexError> {
        let batch = std::mem::take(&mut self.staged()?.batch);
        self.store.commit_batch(self.scope, batch)
    }
}

impl<S: FeatureStore + ?Sized> Drop for BatchTransaction<'_, S> {
    fn drop(&mut self) {
        if let Ok(staged) = self.staged.get_mut()
            && !staged.batch.is_empty()
        {
            debug!(
                scope = %self.scope,
                records = staged.batch.records.len(),
                links = staged.batch.links.len(),
                "discarding uncommitted batch"
            );
        }
    }
}

impl<S: FeatureStore + ?Sized> CanonicalStore for BatchTransaction<'_, S> {
    fn has_scope(&self, scope: StoreScope) -> Result<bool, ClindexError> {
        self.store.has_scope(scope)
    }

    fn lookup_many(
        &self,
        scope: StoreScope,
        keys: &HashSet<CompositeKey>,
    ) -> Result<HashMap<CompositeKey, FeatureId>, ClindexError> {
        let mut found = self.store.lookup_many(scope, keys)?;
        if scope == self.scope {
            let staged = self.staged()?;
            for key in keys {
                if let Some(id) = staged.ids.get(key) {
                    found.insert(key.clone(), *id);
                }
            }
        }
        Ok(found)
    }

    fn insert_many(
        &self,
        scope: StoreScope,
        records: &[NewRecord],
    ) -> Result<HashMap<CompositeKey, FeatureId>, ClindexError> {
        self.check_scope(scope)?;
        for record in records {
            check_kind(scope, &record.key)?;
        }

        let mut seen: HashSet<&CompositeKey> = HashSet::with_capacity(records.len());
        let mut conflicts: Vec<String> = records
            .iter()
            .filter(|record| !seen.insert(&record.key))
            .map(|record| record.key.to_string())
            .collect();
        let requested: HashSet<CompositeKey> =
            records.iter().map(|record| record.key.clone()).collect();
        let mut present: Vec<&CompositeKey> = self
            .lookup_many(scope, &requested)?
            .keys()
            .filter_map(|key| requested.get(key))
            .collect();
        present.sort();
        conflicts.extend(present.into_iter().map(|key| key.to_string()));
        if !conflicts.is_empty() {
            return Err(ClindexError::DuplicateKey {
                scope,
                keys: conflicts,
            });
        }

        let mut staged = self.staged()?;
        let next_id = self.base_next_id + staged.batch.records.len() as FeatureId;
        let minted = mint_records(next_id, records);
        let mut ids = HashMap::with_capacity(minted.len());
        for record in &minted {
            staged.ids.insert(record.key.clone(), record.id);
            ids.insert(record.key.clone(), record.id);
        }
        staged.batch.records.extend(minted);
        Ok(ids)
    }

    fn record(
        &self,
        scope: StoreScope,
        id: FeatureId,
    ) -> Result<Option<CanonicalRecord>, ClindexError> {
        if scope == self.scope && id >= self.base_next_id {
            let staged = self.staged()?;
            let offset = (id - self.base_next_id) as usize;
            return Ok(staged.batch.records.get(offset).cloned());
        }
        self.store.record(scope, id)
    }

    fn records(&self, scope: StoreScope) -> Result<Vec<CanonicalRecord>, ClindexError> {
        let mut records = self.store.records(scope)?;
        if scope == self.scope {
            records.extend(self.staged()?.batch.records.iter().cloned());
        }
        Ok(records)
    }

    fn next_id(&self, scope: StoreScope) -> Result<FeatureId, ClindexError> {
        if scope == self.scope {
            let staged = self.staged()?;
            return Ok(self.base_next_id + staged.batch.records.len() as FeatureId);
        }
        self.store.next_id(scope)
    }
}
