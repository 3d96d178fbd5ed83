use std::collections::HashSet;

use clindex::store::{CanonicalStore, LinkStore, MemoryFeatureStore};
use clindex::{
    BatchTransaction, ClindexError, CompositeKey, Deduplicator, ExistingSamplesPolicy,
    IngestConfig, Ingestor, JunctionKey, RawRecord, SampleLinkEngine, SampleMetrics, StoreScope,
    Strand, VariantCall, VariantKey,
};

fn junction(sample: &str, chrom: &str, start: u64, end: u64, strand: Strand, uniq: u32) -> RawRecord {
    RawRecord::junction(sample, JunctionKey::new(chrom, start, end, strand), uniq, 0)
}

fn variant(sample: &str, pos: u64, genotype: &str) -> RawRecord {
    RawRecord::variant(
        sample,
        VariantKey::new("chr7", pos, "A", "T"),
        VariantCall {
            genotype: genotype.into(),
            ..VariantCall::default()
        },
    )
}

#[test]
fn same_key_twice_for_one_sample_keeps_the_first_read_count() {
    let scope = StoreScope::junctions();
    let store = MemoryFeatureStore::with_scopes([scope]);
    let rows = vec![
        junction("s1", "chr1", 100, 200, Strand::Plus, 12),
        junction("s1", "chr1", 100, 200, Strand::Plus, 5),
    ];

    let report = Ingestor::new(&store, IngestConfig::default())
        .import(scope, &rows)
        .unwrap();
    assert_eq!(report.distinct_keys, 1);
    assert_eq!(report.links_written, 1);

    let links = store.links(scope).unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(
        links[0].metrics,
        SampleMetrics::Junction {
            uniq_map: 12,
            multi_map: 0
        }
    );
}

#[test]
fn empty_store_mints_one_id_per_distinct_key() {
    let scope = StoreScope::junctions();
    let store = MemoryFeatureStore::with_scopes([scope]);
    let rows = vec![
        junction("s1", "chr1", 100, 200, Strand::Plus, 30),
        junction("s1", "chr2", 50, 60, Strand::Minus, 30),
    ];
    let resolution = Deduplicator::new(scope).resolve(&rows, &store).unwrap();
    assert_eq!(resolution.newly_inserted.len(), 2);
    let ids: HashSet<u64> = resolution.id_by_row.iter().copied().collect();
    assert_eq!(ids, HashSet::from([1, 2]));
}

#[test]
fn resolving_twice_is_idempotent() {
    let scope = StoreScope::variants();
    let store = MemoryFeatureStore::with_scopes([scope]);
    let rows = vec![
        variant("s1", 10, "0/1"),
        variant("s2", 20, "1/1"),
        variant("s3", 10, "0/1"),
    ];
    let dedup = Deduplicator::new(scope);

    let first = dedup.resolve(&rows, &store).unwrap();
    let second = dedup.resolve(&rows, &store).unwrap();
    assert_eq!(first.newly_inserted.len(), 2);
    assert!(second.newly_inserted.is_empty());
    assert_eq!(second.already_known.len(), 2);
    assert_eq!(first.id_by_row, second.id_by_row);
    assert_eq!(store.next_id(scope).unwrap(), 3);
}

#[test]
fn new_plus_known_equals_distinct_keys() {
    let scope = StoreScope::junctions();
    let store = MemoryFeatureStore::with_scopes([scope]);
    let dedup = Deduplicator::new(scope);
    dedup
        .resolve(
            &[
                junction("s1", "chr1", 1, 50, Strand::Plus, 20),
                junction("s1", "chr1", 60, 90, Strand::Plus, 20),
            ],
            &store,
        )
        .unwrap();

    let batch = vec![
        junction("s2", "chr1", 1, 50, Strand::Plus, 20),
        junction("s2", "chr1", 1, 50, Strand::Plus, 20),
        junction("s2", "chr1", 60, 90, Strand::Minus, 20),
        junction("s3", "chr1", 300, 400, Strand::Plus, 20),
        junction("s3", "chr1", 60, 90, Strand::Plus, 20),
    ];
    let resolution = dedup.resolve(&batch, &store).unwrap();
    let distinct: HashSet<&CompositeKey> = batch.iter().map(|row| &row.key).collect();
    assert_eq!(
        resolution.newly_inserted.len() + resolution.already_known.len(),
        distinct.len()
    );
    assert_eq!(resolution.newly_inserted.len(), 2);
    assert_eq!(resolution.duplicate_rows, 1);
}

#[test]
fn scopes_mint_independent_id_sequences() {
    let plain = StoreScope::variants();
    let rna = StoreScope::variants().with_rna(true);
    let filtered = StoreScope::variants().with_filtered(true);
    let store = MemoryFeatureStore::with_scopes([plain, rna, filtered]);
    let ingestor = Ingestor::new(&store, IngestConfig::default());

    ingestor.import(plain, &[variant("s1", 10, "0/1"), variant("s1", 11, "0/1")]).unwrap();
    ingestor.import(rna, &[variant("s1", 11, "0/1")]).unwrap();

    let key: CompositeKey = VariantKey::new("chr7", 11, "A", "T").into();
    let lookup = HashSet::from([key.clone()]);
    assert_eq!(store.lookup_many(plain, &lookup).unwrap()[&key], 2);
    assert_eq!(store.lookup_many(rna, &lookup).unwrap()[&key], 1);
    assert!(store.lookup_many(filtered, &lookup).unwrap().is_empty());
    assert!(store.linked_samples(filtered).unwrap().is_empty());
}

#[test]
fn uninitialized_scope_is_reported() {
    let store = MemoryFeatureStore::new();
    let err = Ingestor::new(&store, IngestConfig::default())
        .import(StoreScope::junctions(), &[junction("s1", "chr1", 1, 9, Strand::Plus, 20)])
        .unwrap_err();
    assert!(matches!(err, ClindexError::MissingScope(scope) if scope == StoreScope::junctions()));
}

#[test]
fn links_are_only_durable_with_their_records() {
    let scope = StoreScope::junctions();
    let store = MemoryFeatureStore::with_scopes([scope]);
    let rows = vec![junction("s1", "chr1", 100, 200, Strand::Plus, 30)];
    {
        let txn = BatchTransaction::begin(&store, scope).unwrap();
        let resolution = Deduplicator::new(scope).resolve(&rows, &txn).unwrap();
        SampleLinkEngine::new(ExistingSamplesPolicy::Skip)
            .link(&txn, &rows, &resolution)
            .unwrap();
        // dropped without commit
    }
    assert!(store.records(scope).unwrap().is_empty());
    assert!(store.links(scope).unwrap().is_empty());
    assert_eq!(store.next_id(scope).unwrap(), 1);
}
