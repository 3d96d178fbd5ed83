//! Per-sample measurement rows attached to resolved feature ids.

use indexmap::IndexSet;
use std::collections::HashSet;
use tracing::{debug, info};

use crate::config::ExistingSamplesPolicy;
use crate::data::{RawRecord, SampleLink, VariantImpact};
use crate::dedup::Resolution;
use crate::errors::ClindexError;
use crate::store::{BatchTransaction, FeatureStore};
use crate::types::{FeatureId, SampleId};

/// Links planned for one batch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LinkPlan {
    /// One link per distinct `(sample, record)` pair, first row wins.
    pub links: Vec<SampleLink>,
    /// Rows that repeated an earlier `(sample, record)` pair.
    pub duplicate_rows: usize,
}

/// Rows admitted under the existing-samples policy.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Admission {
    /// Rows that go on to resolution.
    pub rows: Vec<RawRecord>,
    /// Samples dropped because they already have links, in first-seen order.
    pub skipped_samples: Vec<SampleId>,
}

/// Outcome of staging links on a transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LinkOutcome {
    /// Links staged on the transaction.
    pub staged: usize,
    /// Impacts staged for newly minted variants.
    pub impacts: usize,
    /// Rows repeating a `(sample, record)` pair already staged by the batch.
    pub duplicate_rows: usize,
}

/// Writes sample links under an explicit [`ExistingSamplesPolicy`].
#[derive(Clone, Copy, Debug)]
pub struct SampleLinkEngine {
    policy: ExistingSamplesPolicy,
}

impl SampleLinkEngine {
    /// Engine applying `policy`.
    pub fn new(policy: ExistingSamplesPolicy) -> Self {
        Self { policy }
    }

    /// Policy for samples that already have links.
    pub fn policy(&self) -> ExistingSamplesPolicy {
        self.policy
    }

    /// Apply the policy before resolution.
    ///
    /// Under `Skip`, every row of a sample in `linked` is dropped so that
    /// neither ids nor links are produced for it. `Append` admits all rows.
    pub fn admit(&self, rows: Vec<RawRecord>, linked: &HashSet<SampleId>) -> Admission {
        match self.policy {
            ExistingSamplesPolicy::Append => Admission {
                rows,
                skipped_samples: Vec::new(),
            },
            ExistingSamplesPolicy::Skip => {
                let mut skipped = IndexSet::new();
                let rows = rows
                    .into_iter()
                    .filter(|row| {
                        if linked.contains(&row.sample_id) {
                            skipped.insert(row.sample_id.clone());
                            false
                        } else {
                            true
                        }
                    })
                    .collect();
                if !skipped.is_empty() {
                    info!(
                        samples = skipped.len(),
                        "skipping samples that already have links"
                    );
                }
                Admission {
                    rows,
                    skipped_samples: skipped.into_iter().collect(),
                }
            }
        }
    }

    /// One link per distinct `(sample, record id)` pair; the first row's metrics win.
    pub fn plan_links(&self, rows: &[RawRecord], id_by_row: &[FeatureId]) -> LinkPlan {
        let mut seen: HashSet<(&str, FeatureId)> = HashSet::with_capacity(rows.len());
        let mut plan = LinkPlan::default();
        for (row, id) in rows.iter().zip(id_by_row) {
            if seen.insert((row.sample_id.as_str(), *id)) {
                plan.links.push(SampleLink {
                    sample_id: row.sample_id.clone(),
                    record_id: *id,
                    metrics: row.metrics.clone(),
                });
            } else {
                plan.duplicate_rows += 1;
            }
        }
        plan
    }

    /// Consequence annotations for records minted by `resolution`, taken from
    /// the first row of each new key.
    pub fn plan_impacts(&self, rows: &[RawRecord], resolution: &Resolution) -> Vec<VariantImpact> {
        let mut impacts = Vec::new();
        for key in &resolution.newly_inserted {
            let (Some(row), Some(id)) = (
                resolution.first_row.get(key).map(|idx| &rows[*idx]),
                resolution.id_of(key),
            ) else {
                continue;
            };
            impacts.extend(row.impacts.iter().map(|fields| VariantImpact {
                record_id: id,
                fields: fields.clone(),
            }));
        }
        impacts
    }

    /// Stage links (and annotations for new records) for a resolved batch.
    ///
    /// Links are only staged on the transaction that minted or looked up their
    /// ids, so they become durable in the same commit as their records.
    pub fn link<S: FeatureStore + ?Sized>(
        &self,
        txn: &BatchTransaction<'_, S>,
        rows: &[RawRecord],
        resolution: &Resolution,
    ) -> Result<LinkOutcome, ClindexError> {
        if rows.len() != resolution.id_by_row.len() {
            return Err(ClindexError::Configuration(format!(
                "resolution covers {} rows but {} rows were given",
                resolution.id_by_row.len(),
                rows.len()
            )));
        }
        let plan = self.plan_links(rows, &resolution.id_by_row);
        if plan.duplicate_rows > 0 {
            debug!(
                scope = %txn.scope(),
                dropped = plan.duplicate_rows,
                "dropped repeated sample/feature rows"
            );
        }
        let impacts = self.plan_impacts(rows, resolution);
        let outcome = LinkOutcome {
            staged: plan.links.len(),
            impacts: impacts.len(),
            duplicate_rows: plan.duplicate_rows,
        };
        txn.stage_links(plan.links)?;
        txn.stage_impacts(impacts)?;
        Ok(outcome)
    }
}
