use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use clindex::store::{BatchCommit, CanonicalStore, CommitSummary, LinkStore, StagedBatch};
use clindex::{
    CanonicalRecord, ClindexError, CompositeKey, ExistingSamplesPolicy, FeatureId, FieldValue,
    IngestConfig, Ingestor, JunctionKey, MemoryFeatureStore, NewRecord, RawRecord, SampleId,
    SampleLink, Strand, StoreScope, VariantCall, VariantImpact, VariantKey,
};

fn junction(sample: &str, start: u64, uniq: u32) -> RawRecord {
    RawRecord::junction(sample, JunctionKey::new("chr1", start, start + 250, Strand::Plus), uniq, 1)
}

/// Memory store that lets another writer mint a key right before each of the
/// first `races` commits.
struct RacingStore {
    inner: MemoryFeatureStore,
    races: usize,
    commits: AtomicUsize,
    intruders: Vec<CompositeKey>,
}

impl RacingStore {
    fn new(scope: StoreScope, races: usize, intruders: Vec<CompositeKey>) -> Self {
        Self {
            inner: MemoryFeatureStore::with_scopes([scope]),
            races,
            commits: AtomicUsize::new(0),
            intruders,
        }
    }
}

impl CanonicalStore for RacingStore {
    fn has_scope(&self, scope: StoreScope) -> Result<bool, ClindexError> {
        self.inner.has_scope(scope)
    }

    fn lookup_many(
        &self,
        scope: StoreScope,
        keys: &HashSet<CompositeKey>,
    ) -> Result<HashMap<CompositeKey, FeatureId>, ClindexError> {
        self.inner.lookup_many(scope, keys)
    }

    fn insert_many(
        &self,
        scope: StoreScope,
        records: &[NewRecord],
    ) -> Result<HashMap<CompositeKey, FeatureId>, ClindexError> {
        self.inner.insert_many(scope, records)
    }

    fn record(
        &self,
        scope: StoreScope,
        id: FeatureId,
    ) -> Result<Option<CanonicalRecord>, ClindexError> {
        self.inner.record(scope, id)
    }

    fn records(&self, scope: StoreScope) -> Result<Vec<CanonicalRecord>, ClindexError> {
        self.inner.records(scope)
    }

    fn next_id(&self, scope: StoreScope) -> Result<FeatureId, ClindexError> {
        self.inner.next_id(scope)
    }
}

impl LinkStore for RacingStore {
    fn links(&self, scope: StoreScope) -> Result<Vec<SampleLink>, ClindexError> {
        self.inner.links(scope)
    }

    fn links_for_record(
        &self,
        scope: StoreScope,
        id: FeatureId,
    ) -> Result<Vec<SampleLink>, ClindexError> {
        self.inner.links_for_record(scope, id)
    }

    fn linked_samples(&self, scope: StoreScope) -> Result<HashSet<SampleId>, ClindexError> {
        self.inner.linked_samples(scope)
    }

    fn impacts(
        &self,
        scope: StoreScope,
        id: FeatureId,
    ) -> Result<Vec<VariantImpact>, ClindexError> {
        self.inner.impacts(scope, id)
    }
}

impl BatchCommit for RacingStore {
    fn init_scope(&self, scope: StoreScope) -> Result<(), ClindexError> {
        self.inner.init_scope(scope)
    }

    fn commit_batch(
        &self,
        scope: StoreScope,
        batch: StagedBatch,
    ) -> Result<CommitSummary, ClindexError> {
        let attempt = self.commits.fetch_add(1, Ordering::SeqCst);
        if attempt < self.races {
            let key = self.intruders[attempt % self.intruders.len()].clone();
            self.inner.insert_many(scope, &[key.into()])?;
        }
        self.inner.commit_batch(scope, batch)
    }
}

#[test]
fn concurrent_mint_restarts_the_batch_and_reuses_the_winner_id() {
    let scope = StoreScope::junctions();
    let contested = junction("s1", 100, 30);
    let store = RacingStore::new(scope, 1, vec![contested.key.clone()]);
    let ingestor = Ingestor::new(&store, IngestConfig::default());

    let report = ingestor
        .import(scope, &[contested.clone(), junction("s1", 900, 30)])
        .unwrap();
    assert_eq!(report.attempts, 2);
    assert_eq!(report.already_known, 1);
    assert_eq!(report.newly_inserted, 1);

    let records = store.records(scope).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].key, contested.key);
    let linked: Vec<FeatureId> = store.links(scope).unwrap().iter().map(|link| link.record_id).collect();
    assert_eq!(linked, vec![1, 2]);
}

#[test]
fn retries_are_bounded() {
    let scope = StoreScope::junctions();
    let intruders = (0..5)
        .map(|idx| junction("other", 5_000 + idx * 1_000, 30).key)
        .collect();
    let store = RacingStore::new(scope, 10, intruders);
    let config = IngestConfig {
        max_batch_retries: 1,
        ..IngestConfig::default()
    };

    let err = Ingestor::new(&store, config)
        .import(scope, &[junction("s1", 100, 30)])
        .unwrap_err();
    assert!(err.is_retryable());
    assert!(matches!(
        &err,
        ClindexError::StaleBatch { keys, .. } if keys == &vec!["chr1:100-350:+".to_string()]
    ));
    assert_eq!(store.commits.load(Ordering::SeqCst), 2);
    assert!(store.links(scope).unwrap().is_empty());
}

#[test]
fn skip_policy_rerun_adds_nothing_for_known_samples() {
    let scope = StoreScope::junctions();
    let store = MemoryFeatureStore::with_scopes([scope]);
    let ingestor = Ingestor::new(&store, IngestConfig::default());
    let s1 = vec![junction("s1", 100, 30), junction("s1", 400, 30)];
    ingestor.import(scope, &s1).unwrap();
    let before = store.links(scope).unwrap();

    let mut rerun = s1.clone();
    rerun.push(junction("s1", 700, 30));
    rerun.push(junction("s2", 400, 30));
    let report = ingestor.import(scope, &rerun).unwrap();

    assert_eq!(report.samples_skipped, vec!["s1".to_string()]);
    assert_eq!(report.newly_inserted, 0);
    assert_eq!(report.already_known, 1);
    assert_eq!(report.links_written, 1);

    let after = store.links(scope).unwrap();
    let s1_before = before.iter().filter(|link| link.sample_id == "s1").count();
    let s1_after = after.iter().filter(|link| link.sample_id == "s1").count();
    assert_eq!(s1_before, s1_after);
    // the s1-only junction at 700 was never minted
    assert_eq!(store.next_id(scope).unwrap(), 3);
}

#[test]
fn append_policy_links_new_features_for_known_samples() {
    let scope = StoreScope::junctions();
    let store = MemoryFeatureStore::with_scopes([scope]);
    let config = IngestConfig {
        existing_samples: "overwrite".parse::<ExistingSamplesPolicy>().unwrap(),
        ..IngestConfig::default()
    };
    let ingestor = Ingestor::new(&store, config);
    ingestor.import(scope, &[junction("s1", 100, 30)]).unwrap();
    let report = ingestor.import(scope, &[junction("s1", 800, 30)]).unwrap();
    assert!(report.samples_skipped.is_empty());
    assert_eq!(report.links_written, 1);
    assert_eq!(store.links(scope).unwrap().len(), 2);
}

#[test]
fn variant_impacts_are_committed_with_their_batch() {
    let scope = StoreScope::variants();
    let store = MemoryFeatureStore::with_scopes([scope]);
    let ingestor = Ingestor::new(&store, IngestConfig::default());
    let impacts = vec![
        vec![
            ("consequence".to_string(), FieldValue::Str("missense_variant".into())),
            ("impact".to_string(), FieldValue::Str("MODERATE".into())),
        ],
        vec![
            ("consequence".to_string(), FieldValue::Str("intron_variant".into())),
            ("impact".to_string(), FieldValue::Null),
        ],
    ];
    let row = RawRecord::variant(
        "s1",
        VariantKey::new("chr17", 7_675_088, "C", "T"),
        VariantCall {
            qual: Some(812.4),
            filter: Some("PASS".into()),
            genotype: "0/1".into(),
            format: vec![("dp".into(), "44".into())],
        },
    )
    .with_impacts(impacts.clone());

    let report = ingestor.import(scope, &[row]).unwrap();
    assert_eq!(report.impacts_written, 2);
    let stored = store.impacts(scope, 1).unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].fields, impacts[0]);
}

#[test]
fn rows_of_the_wrong_kind_abort_the_batch() {
    let scope = StoreScope::variants();
    let store = MemoryFeatureStore::with_scopes([scope]);
    let err = Ingestor::new(&store, IngestConfig::default())
        .import(scope, &[junction("s1", 100, 30)])
        .unwrap_err();
    assert!(matches!(err, ClindexError::Configuration(msg) if msg.contains("chr1:100-350:+")));
    assert_eq!(store.next_id(scope).unwrap(), 1);
}
