//! Read-only cross-sample queries over committed features.
//!
//! Parameter errors (degenerate intervals, conflicting match settings, empty
//! populations) are reported before or instead of results and never touch
//! stored state.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::alleles::{AlleleCounts, CohortDirectory, GenotypeFilter, Population, carriers, count_alleles};
use crate::data::{CanonicalRecord, CompositeKey, JunctionKey, SampleLink, SampleMetrics, Strand, VariantKey};
use crate::errors::ClindexError;
use crate::overlap::{Interval, MatchMode};
use crate::scope::{FeatureKind, StoreScope};
use crate::store::{CanonicalStore, LinkStore};
use crate::types::{Chromosome, FeatureId, SampleId};

/// Closed genomic window `[start, end]` on one chromosome.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    /// Chromosome searched.
    pub chrom: Chromosome,
    /// First position in the window.
    pub start: u64,
    /// Last position in the window.
    pub end: u64,
    /// Restrict junction searches to one strand.
    pub strand: Option<Strand>,
}

impl Region {
    /// Any-strand window, rejecting `end < start`.
    pub fn new(chrom: impl Into<Chromosome>, start: u64, end: u64) -> Result<Self, ClindexError> {
        if end < start {
            return Err(ClindexError::OverlapParameter(format!(
                "region ({start}, {end}) ends before it starts"
            )));
        }
        Ok(Self {
            chrom: chrom.into(),
            start,
            end,
            strand: None,
        })
    }

    /// Same window limited to `strand`.
    pub fn with_strand(mut self, strand: Strand) -> Self {
        self.strand = Some(strand);
        self
    }
}

/// One sample's support for a junction matching a query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JunctionHit {
    /// Sample carrying the junction.
    pub sample_id: SampleId,
    /// Matching canonical junction.
    pub record: CanonicalRecord,
    /// Uniquely mapping reads in that sample.
    pub uniq_map: u32,
    /// Multi-mapping reads in that sample.
    pub multi_map: u32,
}

/// A feature found by a region search plus its (optionally restricted) links.
#[derive(Clone, Debug, PartialEq)]
pub struct RegionHit {
    /// Feature inside the region.
    pub record: CanonicalRecord,
    /// Its links, limited to the requested samples when given.
    pub links: Vec<SampleLink>,
}

fn require_kind(scope: StoreScope, kind: FeatureKind) -> Result<(), ClindexError> {
    if scope.kind != kind {
        return Err(ClindexError::Configuration(format!(
            "scope '{scope}' does not hold {kind}"
        )));
    }
    Ok(())
}

/// Samples carrying a junction that `mode` considers the same as `query`.
///
/// Candidates must share the query's chromosome and strand.
pub fn junction_samples<S>(
    store: &S,
    scope: StoreScope,
    query: &JunctionKey,
    mode: MatchMode,
) -> Result<Vec<JunctionHit>, ClindexError>
where
    S: CanonicalStore + LinkStore + ?Sized,
{
    require_kind(scope, FeatureKind::Junction)?;
    let query_span = Interval::new(query.start, query.end)?;
    // validates thresholds and rejects a degenerate query before any read
    mode.matches(query_span, query_span)?;

    let mut hits = Vec::new();
    for record in store.records(scope)? {
        let Some(candidate) = record.key.as_junction() else {
            continue;
        };
        if candidate.chrom != query.chrom || candidate.strand != query.strand {
            continue;
        }
        let span = candidate.interval();
        let matched = match mode.matches(query_span, span) {
            Ok(matched) => matched,
            // zero-length stored junctions cannot be covered reciprocally
            Err(_) if span.is_empty() => false,
            Err(err) => return Err(err),
        };
        if !matched {
            continue;
        }
        for link in store.links_for_record(scope, record.id)? {
            if let SampleMetrics::Junction {
                uniq_map,
                multi_map,
            } = link.metrics
            {
                hits.push(JunctionHit {
                    sample_id: link.sample_id,
                    record: record.clone(),
                    uniq_map,
                    multi_map,
                });
            }
        }
    }
    Ok(hits)
}

/// Distinct samples among `hits`, in first-seen order.
pub fn distinct_samples(hits: &[JunctionHit]) -> Vec<SampleId> {
    hits.iter()
        .map(|hit| hit.sample_id.clone())
        .collect::<IndexSet<_>>()
        .into_iter()
        .collect()
}

fn region_hits<S, F>(
    store: &S,
    scope: StoreScope,
    samples: Option<&[SampleId]>,
    mut in_region: F,
) -> Result<Vec<RegionHit>, ClindexError>
where
    S: CanonicalStore + LinkStore + ?Sized,
    F: FnMut(&CompositeKey) -> bool,
{
    let wanted: Option<HashSet<&str>> =
        samples.map(|samples| samples.iter().map(String::as_str).collect());
    let mut hits = Vec::new();
    for record in store.records(scope)? {
        if !in_region(&record.key) {
            continue;
        }
        let mut links = store.links_for_record(scope, record.id)?;
        if let Some(wanted) = &wanted {
            links.retain(|link| wanted.contains(link.sample_id.as_str()));
            if links.is_empty() {
                continue;
            }
        }
        hits.push(RegionHit { record, links });
    }
    Ok(hits)
}

/// Junctions on `region`'s chromosome (and strand, if set) whose span
/// intersects `[region.start, region.end]`.
///
/// With `samples`, only junctions carried by one of them are returned and
/// their links are restricted to those samples.
pub fn junctions_in_region<S>(
    store: &S,
    scope: StoreScope,
    region: &Region,
    samples: Option<&[SampleId]>,
) -> Result<Vec<RegionHit>, ClindexError>
where
    S: CanonicalStore + LinkStore + ?Sized,
{
    require_kind(scope, FeatureKind::Junction)?;
    region_hits(store, scope, samples, |key| {
        key.as_junction().is_some_and(|junction| {
            junction.chrom == region.chrom
                && region.strand.is_none_or(|strand| strand == junction.strand)
                && junction.end >= region.start
                && junction.start <= region.end
        })
    })
}

/// Variants on `region`'s chromosome with `start <= pos <= end`.
pub fn variants_in_region<S>(
    store: &S,
    scope: StoreScope,
    region: &Region,
    samples: Option<&[SampleId]>,
) -> Result<Vec<RegionHit>, ClindexError>
where
    S: CanonicalStore + LinkStore + ?Sized,
{
    require_kind(scope, FeatureKind::Variant)?;
    region_hits(store, scope, samples, |key| {
        key.as_variant().is_some_and(|variant| {
            variant.chrom == region.chrom && (region.start..=region.end).contains(&variant.pos)
        })
    })
}

/// Exact variant lookup.
pub fn find_variant<S>(
    store: &S,
    scope: StoreScope,
    key: &VariantKey,
) -> Result<Option<CanonicalRecord>, ClindexError>
where
    S: CanonicalStore + ?Sized,
{
    require_kind(scope, FeatureKind::Variant)?;
    let key = CompositeKey::Variant(key.clone());
    let ids = store.lookup_many(scope, &HashSet::from([key.clone()]))?;
    match ids.get(&key) {
        Some(id) => store.record(scope, *id),
        None => Ok(None),
    }
}

fn variant_links<S>(
    store: &S,
    scope: StoreScope,
    variant_id: FeatureId,
) -> Result<Vec<SampleLink>, ClindexError>
where
    S: CanonicalStore + LinkStore + ?Sized,
{
    require_kind(scope, FeatureKind::Variant)?;
    if store.record(scope, variant_id)?.is_none() {
        return Err(ClindexError::UnknownFeature {
            scope,
            ids: vec![variant_id],
        });
    }
    store.links_for_record(scope, variant_id)
}

/// Samples carrying `variant_id` with a genotype accepted by `filter`,
/// limited to `population`.
pub fn variant_samples<S>(
    store: &S,
    scope: StoreScope,
    variant_id: FeatureId,
    filter: GenotypeFilter,
    population: &Population,
    directory: &dyn CohortDirectory,
) -> Result<Vec<SampleId>, ClindexError>
where
    S: CanonicalStore + LinkStore + ?Sized,
{
    let links = variant_links(store, scope, variant_id)?;
    let members: Option<IndexSet<SampleId>> = match population {
        Population::All => None,
        restricted => Some(restricted.resolve(directory)?),
    };
    let calls = links.iter().filter_map(|link| {
        let genotype = link.metrics.genotype()?;
        let included = members
            .as_ref()
            .is_none_or(|members| members.contains(&link.sample_id));
        included.then_some((link.sample_id.as_str(), genotype))
    });
    Ok(carriers(calls, filter))
}

/// Het / hom counts and allele frequency of `variant_id` over `population`.
pub fn variant_counts<S>(
    store: &S,
    scope: StoreScope,
    variant_id: FeatureId,
    population: &Population,
    directory: &dyn CohortDirectory,
) -> Result<AlleleCounts, ClindexError>
where
    S: CanonicalStore + LinkStore + ?Sized,
{
    let links = variant_links(store, scope, variant_id)?;
    let calls = links.iter().filter_map(|link| {
        link.metrics
            .genotype()
            .map(|genotype| (link.sample_id.as_str(), genotype))
    });
    count_alleles(calls, population, directory)
}

/// Every feature linked to `sample`, with that sample's link.
pub fn sample_features<S>(
    store: &S,
    scope: StoreScope,
    sample: &str,
) -> Result<Vec<(CanonicalRecord, SampleLink)>, ClindexError>
where
    S: CanonicalStore + LinkStore + ?Sized,
{
    let mut features = Vec::new();
    for link in store.links(scope)? {
        if link.sample_id != sample {
            continue;
        }
        if let Some(record) = store.record(scope, link.record_id)? {
            features.push((record, link));
        }
    }
    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::NewRecord;
    use crate::store::{BatchCommit, MemoryFeatureStore};

    fn seeded() -> (MemoryFeatureStore, StoreScope) {
        let scope = StoreScope::junctions();
        let store = MemoryFeatureStore::with_scopes([scope]);
        let keys: Vec<CompositeKey> = [
            JunctionKey::new("chr1", 100, 200, Strand::Plus),
            JunctionKey::new("chr1", 97, 203, Strand::Plus),
            JunctionKey::new("chr1", 100, 200, Strand::Minus),
            JunctionKey::new("chr1", 500, 600, Strand::Plus),
        ]
        .into_iter()
        .map(CompositeKey::from)
        .collect();
        let records: Vec<NewRecord> = keys.iter().cloned().map(NewRecord::from).collect();
        store.insert_many(scope, &records).unwrap();
        let link = |sample: &str, id| SampleLink {
            sample_id: sample.into(),
            record_id: id,
            metrics: SampleMetrics::Junction {
                uniq_map: 15,
                multi_map: 1,
            },
        };
        store
            .append_links(
                scope,
                vec![link("s1", 1), link("s2", 2), link("s3", 3), link("s4", 4)],
            )
            .unwrap();
        (store, scope)
    }

    #[test]
    fn exact_and_tolerant_matching_respect_strand() {
        let (store, scope) = seeded();
        let query = JunctionKey::new("chr1", 100, 200, Strand::Plus);
        let exact = junction_samples(&store, scope, &query, MatchMode::Exact).unwrap();
        assert_eq!(distinct_samples(&exact), vec!["s1"]);

        let tolerant = MatchMode::Tolerance {
            five_prime: 5,
            three_prime: 5,
        };
        let hits = junction_samples(&store, scope, &query, tolerant).unwrap();
        assert_eq!(distinct_samples(&hits), vec!["s1", "s2"]);
    }

    #[test]
    fn degenerate_query_fails_before_reading() {
        let store = MemoryFeatureStore::new();
        let query = JunctionKey::new("chr1", 120, 120, Strand::Plus);
        let mode = MatchMode::overlap(0.5, true).unwrap();
        let err = junction_samples(&store, StoreScope::junctions(), &query, mode).unwrap_err();
        assert!(matches!(err, ClindexError::OverlapParameter(msg) if msg.contains("(120, 120)")));
    }

    #[test]
    fn region_search_uses_true_intersection() {
        let (store, scope) = seeded();
        let region = Region::new("chr1", 150, 180).unwrap().with_strand(Strand::Plus);
        let hits = junctions_in_region(&store, scope, &region, None).unwrap();
        let ids: Vec<FeatureId> = hits.iter().map(|hit| hit.record.id).collect();
        assert_eq!(ids, vec![1, 2]);

        let unstranded = Region::new("chr1", 150, 180).unwrap();
        assert_eq!(junctions_in_region(&store, scope, &unstranded, None).unwrap().len(), 3);

        let only_s2 = ["s2".to_string()];
        let hits = junctions_in_region(&store, scope, &region, Some(&only_s2)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].links[0].sample_id, "s2");
    }

    #[test]
    fn region_endpoints_are_inclusive() {
        let (store, scope) = seeded();
        let touching = Region::new("chr1", 200, 300).unwrap().with_strand(Strand::Plus);
        let ids: Vec<FeatureId> = junctions_in_region(&store, scope, &touching, None)
            .unwrap()
            .iter()
            .map(|hit| hit.record.id)
            .collect();
        assert_eq!(ids, vec![1, 2]);

        let gap = Region::new("chr1", 204, 499).unwrap();
        assert!(junctions_in_region(&store, scope, &gap, None).unwrap().is_empty());
        let up_to_start = Region::new("chr1", 204, 500).unwrap();
        assert_eq!(junctions_in_region(&store, scope, &up_to_start, None).unwrap().len(), 1);
    }

    #[test]
    fn wrong_scope_kind_is_rejected() {
        let (store, scope) = seeded();
        let region = Region::new("chr1", 1, 2).unwrap();
        assert!(matches!(
            variants_in_region(&store, scope, &region, None),
            Err(ClindexError::Configuration(_))
        ));
        assert!(Region::new("chr1", 5, 1).is_err());
    }

    #[test]
    fn sample_features_lists_one_samples_links() {
        let (store, scope) = seeded();
        let features = sample_features(&store, scope, "s3").unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].0.id, 3);
    }
}
