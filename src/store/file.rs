use indexmap::{IndexMap, IndexSet};
use simd_r_drive::storage_engine::DataStore;
use simd_r_drive::storage_engine::traits::{DataStoreReader, DataStoreWriter};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::constants::store::{
    BITCODE_PREFIX, CANONICAL_RECORD_VERSION, DEFAULT_STORE_FILENAME, FIRST_FEATURE_ID,
    IMPACT_COUNT_PREFIX, IMPACT_PREFIX, IMPACT_RECORD_VERSION, KEY_INDEX_PREFIX,
    LINK_COUNT_PREFIX, LINK_PREFIX, LINK_RECORD_VERSION, MARKER, META_KEY, PAIR_PREFIX,
    READ_BATCH, RECORD_PREFIX, SAMPLE_MARKER_PREFIX, SAMPLE_PREFIX, SAMPLE_RECORD_VERSION,
    SCOPE_PREFIX, SCOPE_RECORD_VERSION, STORE_VERSION,
};
use crate::data::{CanonicalRecord, CompositeKey, NewRecord, SampleLink, VariantImpact};
use crate::errors::ClindexError;
use crate::scope::StoreScope;
use crate::types::{FeatureId, SampleId};

use super::{
    BatchCommit, CanonicalStore, CommitSummary, DurableView, LinkStore, StagedBatch,
    mint_records, validate_batch,
};

#[derive(Clone, Copy, Debug, bitcode::Encode, bitcode::Decode)]
/// Versioned metadata header stored once per feature-store file.
struct StoreMeta {
    version: u8,
}

/// Per-scope counters, rewritten by every commit touching the scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, bitcode::Encode, bitcode::Decode)]
struct ScopeMeta {
    next_id: FeatureId,
    /// Distinct samples with at least one link; sample entries are `0..sample_count`.
    sample_count: u64,
}

impl ScopeMeta {
    fn empty() -> Self {
        Self {
            next_id: FIRST_FEATURE_ID,
            sample_count: 0,
        }
    }
}

/// Per-feature append-only entry family (links or annotations).
///
/// Each feature keeps a small counter under `count_prefix`; entry `n` of the
/// feature lives under `entry_prefix + id + n`, so appending never rewrites
/// earlier entries.
#[derive(Clone, Copy)]
struct EntryFamily {
    count_prefix: &'static [u8],
    entry_prefix: &'static [u8],
    version: u8,
    what: &'static str,
}

const LINKS: EntryFamily = EntryFamily {
    count_prefix: LINK_COUNT_PREFIX,
    entry_prefix: LINK_PREFIX,
    version: LINK_RECORD_VERSION,
    what: "link",
};

const IMPACTS: EntryFamily = EntryFamily {
    count_prefix: IMPACT_COUNT_PREFIX,
    entry_prefix: IMPACT_PREFIX,
    version: IMPACT_RECORD_VERSION,
    what: "impact",
};

/// File-backed feature store for persistent projects.
///
/// Canonical records, the composite-key index, sample links and consequence
/// annotations live in one append-only `simd-r-drive` file. Links and
/// annotations are written once as individual entries; only small counters
/// are rewritten. Each commit is a single `batch_write` that also carries the
/// scope's updated counters, so readers see either the whole batch or none of
/// it.
pub struct FileFeatureStore {
    store: DataStore,
    path: PathBuf,
    commit_guard: Mutex<()>,
}

impl fmt::Debug for FileFeatureStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileFeatureStore")
            .field("path", &self.path)
            .finish()
    }
}

impl FileFeatureStore {
    /// Open (or create) a feature store at `path`; directories get the default filename.
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self, ClindexError> {
        let path = coerce_store_path(path.into());
        ensure_parent_dir(&path)?;
        let store = DataStore::open(path.as_path()).map_err(map_store_err)?;
        let store = Self {
            store,
            path,
            commit_guard: Mutex::new(()),
        };
        store.verify_metadata()?;
        debug!(path = %store.path.display(), "opened feature store");
        Ok(store)
    }

    /// Default store file path inside a custom directory.
    pub fn default_path_in_dir<P: AsRef<Path>>(dir: P) -> PathBuf {
        dir.as_ref().join(DEFAULT_STORE_FILENAME)
    }

    /// Resolved path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn verify_metadata(&self) -> Result<(), ClindexError> {
        match read_bytes(&self.store, META_KEY)? {
            Some(bytes) => {
                let meta = decode_store_meta(&bytes)?;
                if meta.version != STORE_VERSION {
                    return Err(ClindexError::Store(format!(
                        "feature store version mismatch (expected {}, found {})",
                        STORE_VERSION, meta.version
                    )));
                }
            }
            None => {
                let payload = encode_store_meta(&StoreMeta {
                    version: STORE_VERSION,
                });
                write_bytes(&self.store, META_KEY, &payload)?;
            }
        }
        Ok(())
    }

    fn scope_meta(&self, scope: StoreScope) -> Result<Option<ScopeMeta>, ClindexError> {
        read_bytes(&self.store, &scope_key(scope))?
            .map(|bytes| decode_versioned(SCOPE_RECORD_VERSION, &bytes, "scope"))
            .transpose()
    }

    fn require_scope(&self, scope: StoreScope) -> Result<ScopeMeta, ClindexError> {
        self.scope_meta(scope)?
            .ok_or(ClindexError::MissingScope(scope))
    }

    /// `batch_read` in chunks; results line up with `keys`.
    fn read_many(&self, keys: &[Vec<u8>]) -> Result<Vec<Option<Vec<u8>>>, ClindexError> {
        let mut out = Vec::with_capacity(keys.len());
        for chunk in keys.chunks(READ_BATCH) {
            let key_refs: Vec<&[u8]> = chunk.iter().map(|key| key.as_slice()).collect();
            let entries = self.store.batch_read(&key_refs).map_err(map_store_err)?;
            out.extend(
                entries
                    .into_iter()
                    .map(|entry| entry.map(|entry| entry.as_ref().to_vec())),
            );
        }
        Ok(out)
    }

    /// Presence of each key, in order.
    fn contains_many(&self, keys: &[Vec<u8>]) -> Result<Vec<bool>, ClindexError> {
        Ok(self
            .read_many(keys)?
            .into_iter()
            .map(|entry| entry.is_some())
            .collect())
    }

    /// Entry counters of `ids`; missing counters read as zero.
    fn entry_counts(
        &self,
        family: EntryFamily,
        scope: StoreScope,
        ids: &[FeatureId],
    ) -> Result<Vec<u64>, ClindexError> {
        let keys: Vec<Vec<u8>> = ids
            .iter()
            .map(|id| id_key(family.count_prefix, scope, *id))
            .collect();
        self.read_many(&keys)?
            .into_iter()
            .map(|entry| match entry {
                Some(bytes) => decode_u64(&bytes, family.what),
                None => Ok(0),
            })
            .collect()
    }

    /// Every entry of each feature in `ids`, grouped per feature in write order.
    fn read_entries<T: bitcode::DecodeOwned>(
        &self,
        family: EntryFamily,
        scope: StoreScope,
        ids: &[FeatureId],
    ) -> Result<Vec<Vec<T>>, ClindexError> {
        let counts = self.entry_counts(family, scope, ids)?;
        let keys: Vec<Vec<u8>> = ids
            .iter()
            .zip(&counts)
            .flat_map(|(id, count)| {
                (0..*count).map(move |seq| entry_key(family.entry_prefix, scope, *id, seq))
            })
            .collect();
        let mut raw = self.read_many(&keys)?.into_iter();
        let mut grouped = Vec::with_capacity(ids.len());
        for (id, count) in ids.iter().zip(counts) {
            let mut entries = Vec::with_capacity(count as usize);
            for seq in 0..count {
                let bytes = raw.next().flatten().ok_or_else(|| {
                    ClindexError::Store(format!(
                        "scope '{scope}' is missing {} entry {seq} of feature {id}",
                        family.what
                    ))
                })?;
                entries.push(decode_versioned(family.version, &bytes, family.what)?);
            }
            grouped.push(entries);
        }
        Ok(grouped)
    }

    /// Append `items` (grouped by feature id) as new entries plus updated counters.
    fn stage_entries<T: bitcode::Encode>(
        &self,
        family: EntryFamily,
        scope: StoreScope,
        items: &[(FeatureId, &T)],
        entries: &mut Vec<(Vec<u8>, Vec<u8>)>,
    ) -> Result<(), ClindexError> {
        let mut by_record: IndexMap<FeatureId, Vec<&T>> = IndexMap::new();
        for (id, item) in items {
            by_record.entry(*id).or_default().push(*item);
        }
        let ids: Vec<FeatureId> = by_record.keys().copied().collect();
        let counts = self.entry_counts(family, scope, &ids)?;
        for ((id, added), base) in by_record.into_iter().zip(counts) {
            for (seq, item) in (base..).zip(&added) {
                entries.push((
                    entry_key(family.entry_prefix, scope, id, seq),
                    encode_versioned(family.version, *item),
                ));
            }
            let total = base + added.len() as u64;
            entries.push((
                id_key(family.count_prefix, scope, id),
                total.to_le_bytes().to_vec(),
            ));
        }
        Ok(())
    }

    /// Validate and write one batch while holding the commit guard.
    fn commit_with(
        &self,
        scope: StoreScope,
        build: impl FnOnce(&ScopeMeta) -> StagedBatch,
    ) -> Result<(StagedBatch, CommitSummary), ClindexError> {
        let _guard = self
            .commit_guard
            .lock()
            .map_err(|_| ClindexError::Store("feature store commit lock poisoned".into()))?;
        let meta = self.require_scope(scope)?;
        let batch = build(&meta);
        let view = FileScopeView {
            store: self,
            scope,
            next_id: meta.next_id,
        };
        validate_batch(scope, &batch, &view)?;
        let summary = self.write_batch(scope, meta, &batch)?;
        Ok((batch, summary))
    }

    fn write_batch(
        &self,
        scope: StoreScope,
        mut meta: ScopeMeta,
        batch: &StagedBatch,
    ) -> Result<CommitSummary, ClindexError> {
        let mut summary = CommitSummary {
            records: batch.records.len(),
            links: batch.links.len(),
            impacts: batch.impacts.len(),
            next_id: meta.next_id,
        };
        if batch.is_empty() {
            return Ok(summary);
        }

        let mut entries: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
        for record in &batch.records {
            entries.push((index_key(scope, &record.key), record.id.to_le_bytes().to_vec()));
            entries.push((
                id_key(RECORD_PREFIX, scope, record.id),
                encode_versioned(CANONICAL_RECORD_VERSION, record),
            ));
        }

        let links: Vec<(FeatureId, &SampleLink)> =
            batch.links.iter().map(|link| (link.record_id, link)).collect();
        self.stage_entries(LINKS, scope, &links, &mut entries)?;
        for link in &batch.links {
            entries.push((pair_key(scope, link.record_id, &link.sample_id), MARKER.to_vec()));
        }

        let impacts: Vec<(FeatureId, &VariantImpact)> = batch
            .impacts
            .iter()
            .map(|impact| (impact.record_id, impact))
            .collect();
        self.stage_entries(IMPACTS, scope, &impacts, &mut entries)?;

        let samples: IndexSet<&str> = batch
            .links
            .iter()
            .map(|link| link.sample_id.as_str())
            .collect();
        let marker_keys: Vec<Vec<u8>> = samples
            .iter()
            .map(|sample| sample_marker_key(scope, sample))
            .collect();
        let known = self.contains_many(&marker_keys)?;
        for ((sample, marker), known) in samples.iter().zip(marker_keys).zip(known) {
            if known {
                continue;
            }
            entries.push((
                seq_key(SAMPLE_PREFIX, scope, meta.sample_count),
                encode_versioned(SAMPLE_RECORD_VERSION, &sample.to_string()),
            ));
            entries.push((marker, MARKER.to_vec()));
            meta.sample_count += 1;
        }

        meta.next_id += batch.records.len() as FeatureId;
        summary.next_id = meta.next_id;
        entries.push((scope_key(scope), encode_versioned(SCOPE_RECORD_VERSION, &meta)));

        let entry_refs: Vec<(&[u8], &[u8])> = entries
            .iter()
            .map(|(key, value)| (key.as_slice(), value.as_slice()))
            .collect();
        self.store.batch_write(&entry_refs).map_err(map_store_err)?;
        debug!(
            scope = %scope,
            records = summary.records,
            links = summary.links,
            impacts = summary.impacts,
            entries = entry_refs.len(),
            "wrote feature batch"
        );
        Ok(summary)
    }
}

/// Durable state of one scope as seen from inside the commit guard.
struct FileScopeView<'a> {
    store: &'a FileFeatureStore,
    scope: StoreScope,
    next_id: FeatureId,
}

impl DurableView for FileScopeView<'_> {
    fn next_id(&self) -> FeatureId {
        self.next_id
    }

    fn existing_keys(&self, keys: &[&CompositeKey]) -> Result<Vec<CompositeKey>, ClindexError> {
        let raw: Vec<Vec<u8>> = keys.iter().map(|key| index_key(self.scope, key)).collect();
        Ok(keys
            .iter()
            .zip(self.store.contains_many(&raw)?)
            .filter(|(_, present)| *present)
            .map(|(key, _)| (*key).clone())
            .collect())
    }

    fn existing_pairs(
        &self,
        pairs: &[(&str, FeatureId)],
    ) -> Result<Vec<(SampleId, FeatureId)>, ClindexError> {
        let raw: Vec<Vec<u8>> = pairs
            .iter()
            .map(|(sample, id)| pair_key(self.scope, *id, sample))
            .collect();
        Ok(pairs
            .iter()
            .zip(self.store.contains_many(&raw)?)
            .filter(|(_, present)| *present)
            .map(|((sample, id), _)| (sample.to_string(), *id))
            .collect())
    }
}

impl CanonicalStore for FileFeatureStore {
    fn has_scope(&self, scope: StoreScope) -> Result<bool, ClindexError> {
        Ok(self.scope_meta(scope)?.is_some())
    }

    fn lookup_many(
        &self,
        scope: StoreScope,
        keys: &HashSet<CompositeKey>,
    ) -> Result<HashMap<CompositeKey, FeatureId>, ClindexError> {
        self.require_scope(scope)?;
        let keys: Vec<&CompositeKey> = keys.iter().collect();
        let raw: Vec<Vec<u8>> = keys.iter().map(|key| index_key(scope, key)).collect();
        let mut found = HashMap::new();
        for (key, entry) in keys.into_iter().zip(self.read_many(&raw)?) {
            if let Some(bytes) = entry {
                found.insert(key.clone(), decode_u64(&bytes, "key index")?);
            }
        }
        Ok(found)
    }

    fn insert_many(
        &self,
        scope: StoreScope,
        records: &[NewRecord],
    ) -> Result<HashMap<CompositeKey, FeatureId>, ClindexError> {
        let (batch, summary) = self.commit_with(scope, |meta| StagedBatch {
            records: mint_records(meta.next_id, records),
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
        let meta = self.require_scope(scope)?;
        if !(FIRST_FEATURE_ID..meta.next_id).contains(&id) {
            return Ok(None);
        }
        read_bytes(&self.store, &id_key(RECORD_PREFIX, scope, id))?
            .map(|bytes| decode_versioned(CANONICAL_RECORD_VERSION, &bytes, "canonical"))
            .transpose()
    }

    fn records(&self, scope: StoreScope) -> Result<Vec<CanonicalRecord>, ClindexError> {
        let meta = self.require_scope(scope)?;
        let ids: Vec<FeatureId> = (FIRST_FEATURE_ID..meta.next_id).collect();
        let keys: Vec<Vec<u8>> = ids.iter().map(|id| id_key(RECORD_PREFIX, scope, *id)).collect();
        ids.iter()
            .zip(self.read_many(&keys)?)
            .map(|(id, entry)| {
                let bytes = entry.ok_or_else(|| {
                    ClindexError::Store(format!("scope '{scope}' is missing record {id}"))
                })?;
                decode_versioned(CANONICAL_RECORD_VERSION, &bytes, "canonical")
            })
            .collect()
    }

    fn next_id(&self, scope: StoreScope) -> Result<FeatureId, ClindexError> {
        Ok(self.require_scope(scope)?.next_id)
    }
}

impl LinkStore for FileFeatureStore {
    fn links(&self, scope: StoreScope) -> Result<Vec<SampleLink>, ClindexError> {
        let meta = self.require_scope(scope)?;
        let ids: Vec<FeatureId> = (FIRST_FEATURE_ID..meta.next_id).collect();
        Ok(self
            .read_entries::<SampleLink>(LINKS, scope, &ids)?
            .into_iter()
            .flatten()
            .collect())
    }

    fn links_for_record(
        &self,
        scope: StoreScope,
        id: FeatureId,
    ) -> Result<Vec<SampleLink>, ClindexError> {
        self.require_scope(scope)?;
        Ok(self
            .read_entries(LINKS, scope, &[id])?
            .into_iter()
            .next()
            .unwrap_or_default())
    }

    fn linked_samples(&self, scope: StoreScope) -> Result<HashSet<SampleId>, ClindexError> {
        let meta = self.require_scope(scope)?;
        let keys: Vec<Vec<u8>> = (0..meta.sample_count)
            .map(|seq| seq_key(SAMPLE_PREFIX, scope, seq))
            .collect();
        self.read_many(&keys)?
            .into_iter()
            .map(|entry| {
                let bytes = entry.ok_or_else(|| {
                    ClindexError::Store(format!("scope '{scope}' is missing a linked-sample entry"))
                })?;
                decode_versioned(SAMPLE_RECORD_VERSION, &bytes, "sample")
            })
            .collect()
    }

    fn impacts(
        &self,
        scope: StoreScope,
        id: FeatureId,
    ) -> Result<Vec<VariantImpact>, ClindexError> {
        self.require_scope(scope)?;
        Ok(self
            .read_entries(IMPACTS, scope, &[id])?
            .into_iter()
            .next()
            .unwrap_or_default())
    }
}

impl BatchCommit for FileFeatureStore {
    fn init_scope(&self, scope: StoreScope) -> Result<(), ClindexError> {
        let _guard = self
            .commit_guard
            .lock()
            .map_err(|_| ClindexError::Store("feature store commit lock poisoned".into()))?;
        if self.scope_meta(scope)?.is_none() {
            let payload = encode_versioned(SCOPE_RECORD_VERSION, &ScopeMeta::empty());
            write_bytes(&self.store, &scope_key(scope), &payload)?;
            info!(scope = %scope, path = %self.path.display(), "initialized store scope");
        }
        Ok(())
    }

    fn commit_batch(
        &self,
        scope: StoreScope,
        batch: StagedBatch,
    ) -> Result<CommitSummary, ClindexError> {
        let (_, summary) = self.commit_with(scope, |_| batch)?;
        Ok(summary)
    }
}

fn scoped_key(prefix: &[u8], scope: StoreScope, suffix: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + 1 + suffix.len());
    key.extend_from_slice(prefix);
    key.push(scope.code());
    key.extend_from_slice(suffix);
    key
}

fn scope_key(scope: StoreScope) -> Vec<u8> {
    scoped_key(SCOPE_PREFIX, scope, &[])
}

fn index_key(scope: StoreScope, key: &CompositeKey) -> Vec<u8> {
    scoped_key(KEY_INDEX_PREFIX, scope, &bitcode::encode(key))
}

fn id_key(prefix: &[u8], scope: StoreScope, id: FeatureId) -> Vec<u8> {
    scoped_key(prefix, scope, &id.to_be_bytes())
}

fn seq_key(prefix: &[u8], scope: StoreScope, seq: u64) -> Vec<u8> {
    scoped_key(prefix, scope, &seq.to_be_bytes())
}

fn entry_key(prefix: &[u8], scope: StoreScope, id: FeatureId, seq: u64) -> Vec<u8> {
    let mut suffix = [0u8; 16];
    suffix[..8].copy_from_slice(&id.to_be_bytes());
    suffix[8..].copy_from_slice(&seq.to_be_bytes());
    scoped_key(prefix, scope, &suffix)
}

fn pair_key(scope: StoreScope, id: FeatureId, sample: &str) -> Vec<u8> {
    let mut suffix = Vec::with_capacity(8 + sample.len());
    suffix.extend_from_slice(&id.to_be_bytes());
    suffix.extend_from_slice(sample.as_bytes());
    scoped_key(PAIR_PREFIX, scope, &suffix)
}

fn sample_marker_key(scope: StoreScope, sample: &str) -> Vec<u8> {
    scoped_key(SAMPLE_MARKER_PREFIX, scope, sample.as_bytes())
}

fn decode_u64(bytes: &[u8], what: &str) -> Result<u64, ClindexError> {
    let raw: [u8; 8] = bytes.try_into().map_err(|_| {
        ClindexError::Store(format!("corrupt {what} entry ({} bytes)", bytes.len()))
    })?;
    Ok(u64::from_le_bytes(raw))
}

fn encode_store_meta(meta: &StoreMeta) -> Vec<u8> {
    encode_bitcode_payload(&bitcode::encode(meta))
}

fn decode_store_meta(bytes: &[u8]) -> Result<StoreMeta, ClindexError> {
    let raw = decode_bitcode_payload(bytes)?;
    bitcode::decode(&raw).map_err(|err| {
        ClindexError::Store(format!("failed to decode feature store metadata: {err}"))
    })
}

fn encode_versioned<T: bitcode::Encode + ?Sized>(version: u8, value: &T) -> Vec<u8> {
    let payload = encode_bitcode_payload(&bitcode::encode(value));
    let mut buf = Vec::with_capacity(1 + payload.len());
    buf.push(version);
    buf.extend_from_slice(&payload);
    buf
}

fn decode_versioned<T: bitcode::DecodeOwned>(
    version: u8,
    bytes: &[u8],
    what: &str,
) -> Result<T, ClindexError> {
    match bytes.first() {
        Some(found) if *found == version => {}
        _ => {
            return Err(ClindexError::Store(format!(
                "{what} record version mismatch"
            )));
        }
    }
    let raw = decode_bitcode_payload(&bytes[1..])?;
    bitcode::decode(&raw)
        .map_err(|err| ClindexError::Store(format!("corrupt {what} record: {err}")))
}

fn encode_bitcode_payload(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + bytes.len());
    out.push(BITCODE_PREFIX);
    out.extend_from_slice(bytes);
    out
}

fn decode_bitcode_payload(bytes: &[u8]) -> Result<Vec<u8>, ClindexError> {
    if bytes.first().copied() != Some(BITCODE_PREFIX) {
        return Err(ClindexError::Store(
            "bitcode payload missing expected prefix".into(),
        ));
    }
    Ok(bytes[1..].to_vec())
}

fn read_bytes(store: &DataStore, key: &[u8]) -> Result<Option<Vec<u8>>, ClindexError> {
    store
        .read(key)
        .map_err(map_store_err)?
        .map(|entry| Ok(entry.as_ref().to_vec()))
        .transpose()
}

fn write_bytes(store: &DataStore, key: &[u8], payload: &[u8]) -> Result<(), ClindexError> {
    store.write(key, payload).map_err(map_store_err)?;
    Ok(())
}

fn coerce_store_path(path: PathBuf) -> PathBuf {
    if path.is_dir() {
        return path.join(DEFAULT_STORE_FILENAME);
    }
    path
}

fn ensure_parent_dir(path: &Path) -> Result<(), ClindexError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn map_store_err(err: io::Error) -> ClindexError {
    ClindexError::Store(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{FeatureExtras, SampleMetrics, VariantCall, VariantKey};
    use crate::annotation::FieldValue;
    use tempfile::tempdir;

    fn variant(pos: u64) -> CompositeKey {
        VariantKey::new("chr17", pos, "C", "T").into()
    }

    fn call(genotype: &str) -> SampleMetrics {
        SampleMetrics::Variant(VariantCall {
            qual: Some(50.0),
            filter: Some("PASS".into()),
            genotype: genotype.into(),
            format: vec![("dp".into(), "31".into())],
        })
    }

    #[test]
    fn file_store_persists_records_links_and_impacts() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("features.bin");
        let scope = StoreScope::variants().with_filtered(true);
        {
            let store = FileFeatureStore::open(&path).unwrap();
            store.init_scope(scope).unwrap();
            let summary = store
                .commit_batch(
                    scope,
                    StagedBatch {
                        records: mint_records(1, &[variant(100).into(), variant(200).into()]),
                        links: vec![SampleLink {
                            sample_id: "s1".into(),
                            record_id: 2,
                            metrics: call("0/1"),
                        }],
                        impacts: vec![VariantImpact {
                            record_id: 2,
                            fields: vec![("impact".into(), FieldValue::Str("HIGH".into()))],
                        }],
                    },
                )
                .unwrap();
            assert_eq!(summary.next_id, 3);
        }

        let store = FileFeatureStore::open(&path).unwrap();
        let ids = store
            .lookup_many(scope, &HashSet::from([variant(100), variant(200), variant(300)]))
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[&variant(200)], 2);
        assert_eq!(store.records(scope).unwrap().len(), 2);
        assert_eq!(
            store.record(scope, 1).unwrap().unwrap().extras,
            FeatureExtras::Variant { name: None }
        );
        assert!(store.record(scope, 7).unwrap().is_none());
        assert_eq!(store.links_for_record(scope, 2).unwrap()[0].metrics, call("0/1"));
        assert_eq!(store.impacts(scope, 2).unwrap().len(), 1);
        assert!(store.linked_samples(scope).unwrap().contains("s1"));

        // appended links extend the durable list instead of replacing it
        store
            .append_links(
                scope,
                vec![SampleLink {
                    sample_id: "s2".into(),
                    record_id: 2,
                    metrics: call("1/1"),
                }],
            )
            .unwrap();
        assert_eq!(store.links_for_record(scope, 2).unwrap().len(), 2);
        assert_eq!(store.links(scope).unwrap().len(), 2);
    }

    #[test]
    fn file_store_accepts_directory_path() {
        let dir = tempdir().unwrap();
        let store = FileFeatureStore::open(dir.path()).unwrap();
        store.init_scope(StoreScope::junctions()).unwrap();
        let expected_file = dir.path().join(DEFAULT_STORE_FILENAME);
        assert!(expected_file.is_file());
        assert_eq!(store.path(), expected_file.as_path());
    }

    #[test]
    fn file_store_rejects_version_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("features.bin");
        drop(FileFeatureStore::open(&path).unwrap());
        {
            let raw = DataStore::open(path.as_path()).unwrap();
            let payload = encode_store_meta(&StoreMeta { version: 99 });
            raw.write(META_KEY, &payload).unwrap();
        }
        let err = FileFeatureStore::open(&path).unwrap_err();
        assert!(matches!(err, ClindexError::Store(msg) if msg.contains("version mismatch")));
    }

    #[test]
    fn reads_against_missing_scope_fail() {
        let dir = tempdir().unwrap();
        let store = FileFeatureStore::open(dir.path().join("nested/dir/features.bin")).unwrap();
        let scope = StoreScope::variants().with_rna(true);
        assert!(!store.has_scope(scope).unwrap());
        assert!(matches!(
            store.records(scope),
            Err(ClindexError::MissingScope(_))
        ));
        assert!(matches!(
            store.insert_many(scope, &[variant(1).into()]),
            Err(ClindexError::MissingScope(_))
        ));
    }

    #[test]
    fn decode_helpers_reject_corrupt_payloads() {
        let err = decode_bitcode_payload(&[0x00, 0x01]).unwrap_err();
        assert!(matches!(err, ClindexError::Store(msg) if msg.contains("missing expected prefix")));

        let err = decode_versioned::<ScopeMeta>(SCOPE_RECORD_VERSION, &[9, BITCODE_PREFIX], "scope")
            .unwrap_err();
        assert!(matches!(err, ClindexError::Store(msg) if msg.contains("version mismatch")));

        let err = decode_versioned::<ScopeMeta>(
            SCOPE_RECORD_VERSION,
            &[SCOPE_RECORD_VERSION, BITCODE_PREFIX, 0xff],
            "scope",
        )
        .unwrap_err();
        assert!(matches!(err, ClindexError::Store(msg) if msg.contains("corrupt scope record")));

        assert!(decode_u64(&[1, 2, 3], "key index").is_err());
        assert_eq!(decode_u64(&7u64.to_le_bytes(), "key index").unwrap(), 7);
    }

    #[test]
    fn scope_meta_round_trips() {
        let meta = ScopeMeta {
            next_id: 12,
            sample_count: 2,
        };
        let bytes = encode_versioned(SCOPE_RECORD_VERSION, &meta);
        let decoded: ScopeMeta = decode_versioned(SCOPE_RECORD_VERSION, &bytes, "scope").unwrap();
        assert_eq!(decoded, meta);
    }

    #[test]
    fn links_are_appended_as_separate_entries() {
        let dir = tempdir().unwrap();
        let store = FileFeatureStore::open(dir.path()).unwrap();
        let scope = StoreScope::variants();
        store.init_scope(scope).unwrap();
        store.insert_many(scope, &[variant(10).into()]).unwrap();
        for sample in ["a", "b", "a2"] {
            store
                .append_links(
                    scope,
                    vec![SampleLink {
                        sample_id: sample.into(),
                        record_id: 1,
                        metrics: call("0/1"),
                    }],
                )
                .unwrap();
        }

        assert_eq!(store.entry_counts(LINKS, scope, &[1]).unwrap(), vec![3]);
        let first = read_bytes(&store.store, &entry_key(LINK_PREFIX, scope, 1, 0))
            .unwrap()
            .unwrap();
        let first: SampleLink = decode_versioned(LINK_RECORD_VERSION, &first, "link").unwrap();
        assert_eq!(first.sample_id, "a");
        assert_eq!(store.scope_meta(scope).unwrap().unwrap().sample_count, 3);

        let view = FileScopeView {
            store: &store,
            scope,
            next_id: 2,
        };
        let pairs = view.existing_pairs(&[("b", 1), ("c", 1), ("a", 2)]).unwrap();
        assert_eq!(pairs, vec![("b".to_string(), 1)]);

        // relinking a known sample to a new record adds no sample entry
        store.insert_many(scope, &[variant(20).into()]).unwrap();
        store
            .append_links(
                scope,
                vec![SampleLink {
                    sample_id: "b".into(),
                    record_id: 2,
                    metrics: call("1/1"),
                }],
            )
            .unwrap();
        assert_eq!(store.scope_meta(scope).unwrap().unwrap().sample_count, 3);
        assert_eq!(store.linked_samples(scope).unwrap().len(), 3);
    }
}
