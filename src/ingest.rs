//! Batch import: row preparation, resolution, linking and atomic commit.

use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::config::IngestConfig;
use crate::data::{CompositeKey, FeatureExtras, JunctionKey, RawRecord, SampleMetrics, Strand};
use crate::dedup::Deduplicator;
use crate::errors::ClindexError;
use crate::links::SampleLinkEngine;
use crate::scope::StoreScope;
use crate::store::{BatchTransaction, FeatureStore};
use crate::types::SampleId;

/// Row counts from [`prepare_junctions`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PrepReport {
    /// Rows passed on to the import.
    pub kept: usize,
    /// Rows with fewer unique reads than the configured cutoff.
    pub below_cutoff: usize,
    /// Rows dropped for an undefined strand.
    pub undefined_strand: usize,
}

/// Filter raw junction rows and flag annotated introns.
///
/// Rows below `min_junction_reads` unique reads are dropped, as are rows with
/// an undefined strand when `drop_undefined_strand` is set. Every kept row is
/// marked annotated exactly when its key is in `annotated`.
pub fn prepare_junctions(
    rows: Vec<RawRecord>,
    config: &IngestConfig,
    annotated: &HashSet<JunctionKey>,
) -> Result<(Vec<RawRecord>, PrepReport), ClindexError> {
    let mut report = PrepReport::default();
    let mut kept = Vec::with_capacity(rows.len());
    for row in rows {
        let (CompositeKey::Junction(key), SampleMetrics::Junction { uniq_map, .. }) =
            (&row.key, &row.metrics)
        else {
            return Err(ClindexError::Configuration(format!(
                "junction preparation got a {} row ({}) for sample '{}'",
                row.key.kind(),
                row.key,
                row.sample_id
            )));
        };
        if *uniq_map < config.min_junction_reads {
            report.below_cutoff += 1;
            continue;
        }
        if config.drop_undefined_strand && key.strand == Strand::Undefined {
            report.undefined_strand += 1;
            continue;
        }
        let is_annotated = annotated.contains(key);
        kept.push(row.with_extras(FeatureExtras::Junction {
            annotated: is_annotated,
        }));
    }
    report.kept = kept.len();
    debug!(
        kept = report.kept,
        below_cutoff = report.below_cutoff,
        undefined_strand = report.undefined_strand,
        min_reads = config.min_junction_reads,
        "prepared junction rows"
    );
    Ok((kept, report))
}

/// Summary of one committed import.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchReport {
    /// Scope the batch was committed to.
    pub scope: StoreScope,
    /// Rows handed to the import.
    pub rows: usize,
    /// Distinct composite keys among the admitted rows.
    pub distinct_keys: usize,
    /// Keys minted by this batch.
    pub newly_inserted: usize,
    /// Keys that already had an id.
    pub already_known: usize,
    /// Sample links committed.
    pub links_written: usize,
    /// Consequence annotations committed.
    pub impacts_written: usize,
    /// Samples dropped by the skip policy.
    pub samples_skipped: Vec<SampleId>,
    /// Attempts used, starting at 1.
    pub attempts: usize,
}

/// Runs resolve-then-link imports against one store.
pub struct Ingestor<'s, S: FeatureStore + ?Sized> {
    store: &'s S,
    config: IngestConfig,
    linker: SampleLinkEngine,
}

impl<'s, S: FeatureStore + ?Sized> Ingestor<'s, S> {
    /// Ingestor writing to `store` with `config`.
    pub fn new(store: &'s S, config: IngestConfig) -> Self {
        let linker = SampleLinkEngine::new(config.existing_samples);
        Self {
            store,
            config,
            linker,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Initialize `scope` on the underlying store if needed.
    pub fn ensure_scope(&self, scope: StoreScope) -> Result<(), ClindexError> {
        self.store.init_scope(scope)
    }

    /// Import one batch atomically.
    ///
    /// Conflicts with a concurrent writer restart the whole batch from the
    /// collapse step, up to `max_batch_retries` extra attempts. Any other error
    /// aborts the batch with nothing written.
    pub fn import(
        &self,
        scope: StoreScope,
        rows: &[RawRecord],
    ) -> Result<BatchReport, ClindexError> {
        let mut attempt = 1;
        loop {
            match self.import_once(scope, rows) {
                Ok(mut report) => {
                    report.attempts = attempt;
                    info!(
                        scope = %scope,
                        rows = report.rows,
                        new = report.newly_inserted,
                        known = report.already_known,
                        links = report.links_written,
                        attempts = attempt,
                        "committed batch"
                    );
                    return Ok(report);
                }
                Err(err) if err.is_retryable() && attempt <= self.config.max_batch_retries => {
                    warn!(
                        scope = %scope,
                        attempt,
                        error = %err,
                        "batch conflicted with another writer; retrying"
                    );
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn import_once(
        &self,
        scope: StoreScope,
        rows: &[RawRecord],
    ) -> Result<BatchReport, ClindexError> {
        let txn = BatchTransaction::begin(self.store, scope)?;
        let linked = txn.durable_linked_samples()?;
        let admission = self.linker.admit(rows.to_vec(), &linked);

        let resolution = Deduplicator::new(scope).resolve(&admission.rows, &txn)?;
        let outcome = self.linker.link(&txn, &admission.rows, &resolution)?;
        let summary = txn.commit()?;

        Ok(BatchReport {
            scope,
            rows: rows.len(),
            distinct_keys: resolution.distinct_keys(),
            newly_inserted: resolution.newly_inserted.len(),
            already_known: resolution.already_known.len(),
            links_written: summary.links,
            impacts_written: outcome.impacts,
            samples_skipped: admission.skipped_samples,
            attempts: 1,
        })
    }
}
