use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use tracing::debug;

use crate::constants::store::FIRST_FEATURE_ID;
use crate::data::{CanonicalRecord, CompositeKey, NewRecord, SampleLink, VariantImpact};
use crate::errors::ClindexError;
use crate::scope::StoreScope;
use crate::types::{FeatureId, SampleId};

use super::{
    BatchCommit, CanonicalStore, CommitSummary, DurableView, LinkStore, StagedBatch,
    mint_records, validate_batch,
};

#[derive(Debug)]
struct ScopeTables {
    next_id: FeatureId,
    ids: HashMap<CompositeKey, FeatureId>,
    records: IndexMap<FeatureId, CanonicalRecord>,
    links: HashMap<FeatureId, Vec<SampleLink>>,
    samples: HashSet<SampleId>,
    impacts: HashMap<FeatureId, Vec<VariantImpact>>,
}

impl ScopeTables {
    fn new() -> Self {
        Self {
            next_id: FIRST_FEATURE_ID,
            ids: HashMap::new(),
            records: IndexMap::new(),
            links: HashMap::new(),
            samples: HashSet::new(),
            impacts: HashMap::new(),
        }
    }

    fn apply(&mut self, batch: StagedBatch) -> CommitSummary {
        let summary = CommitSummary {
            records: batch.records.len(),
            links: batch.links.len(),
            impacts: batch.impacts.len(),
            next_id: self.next_id + batch.records.len() as FeatureId,
        };
        for record in batch.records {
            self.ids.insert(record.key.clone(), record.id);
            self.records.insert(record.id, record);
        }
        for link in batch.links {
            self.samples.insert(link.sample_id.clone());
            self.links.entry(link.record_id).or_default().push(link);
        }
        for impact in batch.impacts {
            self.impacts.entry(impact.record_id).or_default().push(impact);
        }
        self.next_id = summary.next_id;
        summary
    }
}

impl DurableView for ScopeTables {
    fn next_id(&self) -> FeatureId {
        self.next_id
    }

    fn existing_keys(&self, keys: &[&CompositeKey]) -> Result<Vec<CompositeKey>, ClindexError> {
        Ok(keys
            .iter()
            .filter(|key| self.ids.contains_key(**key))
            .map(|key| (*key).clone())
            .collect())
    }

    fn existing_pairs(
        &self,
        pairs: &[(&str, FeatureId)],
    ) -> Result<Vec<(SampleId, FeatureId)>, ClindexError> {
        Ok(pairs
            .iter()
            .filter(|(sample, id)| {
                self.links
                    .get(id)
                    .is_some_and(|links| links.iter().any(|link| link.sample_id == *sample))
            })
            .map(|(sample, id)| (sample.to_string(), *id))
            .collect())
    }
}

/// In-memory feature store for tests and single-process runs.
///
/// Nothing survives the process; every commit is applied under one write lock.
#[derive(Debug, Default)]
pub struct MemoryFeatureStore {
    scopes: RwLock<HashMap<StoreScope, ScopeTables>>,
}

impl MemoryFeatureStore {
    /// Store with no scopes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with `scopes` already initialized.
    pub fn with_scopes(scopes: impl IntoIterator<Item = StoreScope>) -> Self {
        let tables = scopes
            .into_iter()
            .map(|scope| (scope, ScopeTables::new()))
            .collect();
        Self {
            scopes: RwLock::new(tables),
        }
    }

    fn read<T>(
        &self,
        scope: StoreScope,
        f: impl FnOnce(&ScopeTables) -> T,
    ) -> Result<T, ClindexError> {
        let guard = self
            .scopes
            .read()
            .map_err(|_| ClindexError::Store("feature store lock poisoned".into()))?;
        let tables = guard.get(&scope).ok_or(ClindexError::MissingScope(scope))?;
        Ok(f(tables))
    }

    fn commit_locked(
        &self,
        scope: StoreScope,
        build: impl FnOnce(&ScopeTables) -> StagedBatch,
    ) -> Result<(StagedBatch, CommitSummary), ClindexError> {
        let mut guard = self
            .scopes
            .write()
            .map_err(|_| ClindexError::Store("feature store lock poisoned".into()))?;
        let tables = guard
            .get_mut(&scope)
            .ok_or(ClindexError::MissingScope(scope))?;
        let batch = build(tables);
        validate_batch(scope, &batch, &*tables)?;
        let summary = tables.apply(batch.clone());
        Ok((batch, summary))
    }
}

impl CanonicalStore for MemoryFeatureStore {
    fn has_scope(&self, scope: StoreScope) -> Result<bool, ClindexError> {
        let guard = self
            .scopes
            .read()
            .map_err(|_| ClindexError::Store("feature store lock poisoned".into()))?;
        Ok(guard.contains_key(&scope))
    }

    fn lookup_many(
        &self,
        scope: StoreScope,
        keys: &HashSet<CompositeKey>,
    ) -> Result<HashMap<CompositeKey, FeatureId>, ClindexError> {
        self.read(scope, |tables| {
            keys.iter()
                .filter_map(|key| tables.ids.get(key).map(|id| (key.clone(), *id)))
                .collect()
        })
    }

    fn insert_many(
        &self,
        scope: StoreScope,
        records: &[NewRecord],
    ) -> Result<HashMap<CompositeKey, FeatureId>, ClindexError> {
        let (batch, summary) = self.commit_locked(scope, |tables| StagedBatch {
            records: mint_records(tables.next_id, records),
            ..StagedBatch::default()
        })?;
        debug!(scope = %scope, minted = summary.records, next_id = summary.next_id, "inserted canonical records");
        Ok(batch
            .records
            .into_iter()
            .map(|record| (record.key, record.id))
            .collect())
    }

    fn record(
        &self,
        scope: StoreScope,
        id: FeatureId,
    ) -> Result<Option<CanonicalRecord>, ClindexError> {
        self.read(scope, |tables| tables.records.get(&id).cloned())
    }

    fn records(&self, scope: StoreScope) -> Result<Vec<CanonicalRecord>, ClindexError> {
        self.read(scope, |tables| tables.records.values().cloned().collect())
    }

    fn next_id(&self, scope: StoreScope) -> Result<FeatureId, ClindexError> {
        self.read(scope, |tables| tables.next_id)
    }
}

impl LinkStore for MemoryFeatureStore {
    fn links(&self, scope: StoreScope) -> Result<Vec<SampleLink>, ClindexError> {
        self.read(scope, |tables| {
            tables
                .records
                .keys()
                .filter_map(|id| tables.links.get(id))
                .flatten()
                .cloned()
                .collect()
        })
    }

    fn links_for_record(
        &self,
        scope: StoreScope,
        id: FeatureId,
    ) -> Result<Vec<SampleLink>, ClindexError> {
        self.read(scope, |tables| tables.links.get(&id).cloned().unwrap_or_default())
    }

    fn linked_samples(&self, scope: StoreScope) -> Result<HashSet<SampleId>, ClindexError> {
        self.read(scope, |tables| tables.samples.clone())
    }

    fn impacts(
        &self,
        scope: StoreScope,
        id: FeatureId,
    ) -> Result<Vec<VariantImpact>, ClindexError> {
        self.read(scope, |tables| {
            tables.impacts.get(&id).cloned().unwrap_or_default()
        })
    }
}

impl BatchCommit for MemoryFeatureStore {
    fn init_scope(&self, scope: StoreScope) -> Result<(), ClindexError> {
        let mut guard = self
            .scopes
            .write()
            .map_err(|_| ClindexError::Store("feature store lock poisoned".into()))?;
        guard.entry(scope).or_insert_with(ScopeTables::new);
        Ok(())
    }

    fn commit_batch(
        &self,
        scope: StoreScope,
        batch: StagedBatch,
    ) -> Result<CommitSummary, ClindexError> {
        let (_, summary) = self.commit_locked(scope, |_| batch)?;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{JunctionKey, SampleMetrics, Strand};

    fn key(start: u64) -> CompositeKey {
        JunctionKey::new("chr1", start, start + 50, Strand::Minus).into()
    }

    #[test]
    fn uninitialized_scope_is_reported() {
        let store = MemoryFeatureStore::new();
        let err = store
            .lookup_many(StoreScope::junctions(), &HashSet::new())
            .unwrap_err();
        assert!(matches!(err, ClindexError::MissingScope(scope) if scope == StoreScope::junctions()));
        assert!(!store.has_scope(StoreScope::junctions()).unwrap());
    }

    #[test]
    fn insert_many_mints_increasing_ids_and_rejects_repeats() {
        let scope = StoreScope::junctions();
        let store = MemoryFeatureStore::with_scopes([scope]);
        let ids = store
            .insert_many(scope, &[key(10).into(), key(20).into()])
            .unwrap();
        assert_eq!(ids[&key(10)], 1);
        assert_eq!(ids[&key(20)], 2);

        let err = store
            .insert_many(scope, &[key(30).into(), key(10).into()])
            .unwrap_err();
        assert!(matches!(err, ClindexError::DuplicateKey { keys, .. } if keys == vec![key(10).to_string()]));
        // nothing from the rejected call is visible
        assert_eq!(store.next_id(scope).unwrap(), 3);
        assert!(store.lookup_many(scope, &HashSet::from([key(30)])).unwrap().is_empty());
    }

    #[test]
    fn scopes_do_not_share_id_space() {
        let plain = StoreScope::junctions();
        let filtered = plain.with_filtered(true);
        let store = MemoryFeatureStore::with_scopes([plain, filtered]);
        store.insert_many(plain, &[key(10).into(), key(20).into()]).unwrap();
        let ids = store.insert_many(filtered, &[key(20).into()]).unwrap();
        assert_eq!(ids[&key(20)], 1);
    }

    #[test]
    fn links_are_listed_in_record_order() {
        let scope = StoreScope::junctions();
        let store = MemoryFeatureStore::with_scopes([scope]);
        store.insert_many(scope, &[key(10).into(), key(20).into()]).unwrap();
        let link = |sample: &str, id| SampleLink {
            sample_id: sample.into(),
            record_id: id,
            metrics: SampleMetrics::Junction {
                uniq_map: 11,
                multi_map: 1,
            },
        };
        store
            .append_links(scope, vec![link("s1", 2), link("s1", 1), link("s2", 1)])
            .unwrap();
        let listed: Vec<String> = store
            .links(scope)
            .unwrap()
            .iter()
            .map(SampleLink::label)
            .collect();
        assert_eq!(listed, vec!["s1@1", "s2@1", "s1@2"]);
        assert_eq!(store.links_for_record(scope, 1).unwrap().len(), 2);
        assert_eq!(
            store.linked_samples(scope).unwrap(),
            HashSet::from(["s1".to_string(), "s2".to_string()])
        );

        let err = store.append_links(scope, vec![link("s2", 1)]).unwrap_err();
        assert!(matches!(err, ClindexError::DuplicateLink { links, .. } if links == vec!["s2@1".to_string()]));
    }
}
