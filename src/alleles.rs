//! Allele count / frequency arithmetic over per-sample genotype calls.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::errors::ClindexError;
use crate::genotype::{Genotype, GenotypeCall};
use crate::types::{CohortId, SampleId};

/// Which samples make up the denominator of an allele frequency.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Population {
    /// Every sample known to the project.
    #[default]
    All,
    /// An explicit sample list.
    Samples(Vec<SampleId>),
    /// Every sample belonging to any of the listed cohorts.
    Cohorts(Vec<CohortId>),
}

impl Population {
    /// Distinct member samples, in first-seen order.
    pub fn resolve(
        &self,
        directory: &dyn CohortDirectory,
    ) -> Result<IndexSet<SampleId>, ClindexError> {
        let members = match self {
            Population::All => directory.all_samples()?,
            Population::Samples(samples) => samples.clone(),
            Population::Cohorts(cohorts) => directory.cohort_samples(cohorts)?,
        };
        Ok(members.into_iter().collect())
    }

    fn describe(&self) -> String {
        match self {
            Population::All => "all samples".to_string(),
            Population::Samples(samples) => format!("samples {samples:?}"),
            Population::Cohorts(cohorts) => format!("cohorts {cohorts:?}"),
        }
    }
}

/// Sample / cohort membership lookups owned by the project layer.
pub trait CohortDirectory {
    /// Every sample in the project.
    fn all_samples(&self) -> Result<Vec<SampleId>, ClindexError>;
    /// Samples belonging to any of `cohorts`; unknown cohorts are an error.
    fn cohort_samples(&self, cohorts: &[CohortId]) -> Result<Vec<SampleId>, ClindexError>;
}

/// In-memory [`CohortDirectory`].
#[derive(Clone, Debug, Default)]
pub struct StaticCohorts {
    samples: IndexSet<SampleId>,
    cohorts: IndexMap<CohortId, IndexSet<SampleId>>,
}

impl StaticCohorts {
    /// Empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sample that belongs to no cohort.
    pub fn add_sample(&mut self, sample: impl Into<SampleId>) {
        self.samples.insert(sample.into());
    }

    /// Register `sample` as a member of `cohort`.
    pub fn add_member(&mut self, cohort: impl Into<CohortId>, sample: impl Into<SampleId>) {
        let sample = sample.into();
        self.samples.insert(sample.clone());
        self.cohorts.entry(cohort.into()).or_default().insert(sample);
    }
}

impl CohortDirectory for StaticCohorts {
    fn all_samples(&self) -> Result<Vec<SampleId>, ClindexError> {
        Ok(self.samples.iter().cloned().collect())
    }

    fn cohort_samples(&self, cohorts: &[CohortId]) -> Result<Vec<SampleId>, ClindexError> {
        let mut members = IndexSet::new();
        for cohort in cohorts {
            let samples = self
                .cohorts
                .get(cohort)
                .ok_or_else(|| ClindexError::UnknownCohort(cohort.clone()))?;
            members.extend(samples.iter().cloned());
        }
        Ok(members.into_iter().collect())
    }
}

/// Genotype filter for "which samples carry this variant" queries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenotypeFilter {
    /// Heterozygous calls only.
    Het,
    /// Homozygous alternate calls only.
    Hom,
    /// Any call carrying the alternate allele.
    #[default]
    Both,
}

impl GenotypeFilter {
    /// Whether `call` passes the filter.
    pub fn accepts(&self, call: GenotypeCall) -> bool {
        match self {
            GenotypeFilter::Het => call == GenotypeCall::Het,
            GenotypeFilter::Hom => call == GenotypeCall::HomAlt,
            GenotypeFilter::Both => matches!(
                call,
                GenotypeCall::Het | GenotypeCall::HomAlt | GenotypeCall::HemiDel
            ),
        }
    }
}

impl FromStr for GenotypeFilter {
    type Err = ClindexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "het" => Ok(Self::Het),
            "hom" => Ok(Self::Hom),
            "both" => Ok(Self::Both),
            other => Err(ClindexError::Configuration(format!(
                "genotype filter can only be 'het', 'hom' or 'both', got '{other}'"
            ))),
        }
    }
}

/// Allele counts for one variant across a population.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlleleCounts {
    /// Heterozygous calls.
    pub hets: usize,
    /// Homozygous alternate calls.
    pub homs: usize,
    /// Hemizygous alternate calls; reported separately and not part of `allele_count`.
    pub hemizygous: usize,
    /// `hets + 2 * homs`.
    pub allele_count: usize,
    /// `allele_count / total_samples`.
    pub allele_frequency: f64,
    /// Distinct samples in the population.
    pub total_samples: usize,
    /// Samples whose genotype could not be classified, with the reason.
    pub invalid: Vec<(SampleId, String)>,
}

impl AlleleCounts {
    /// Fraction of the population's chromosomes carrying the alternate allele,
    /// `allele_count / (2 * total_samples)`.
    pub fn diploid_frequency(&self) -> f64 {
        self.allele_count as f64 / (2 * self.total_samples) as f64
    }
}

/// Count alleles of `calls` restricted to the members of `population`.
///
/// Each sample contributes at most once (its first call); calls from samples
/// outside the population are ignored. Unclassifiable genotypes are recorded in
/// [`AlleleCounts::invalid`] and otherwise skipped.
pub fn count_alleles<'a, I>(
    calls: I,
    population: &Population,
    directory: &dyn CohortDirectory,
) -> Result<AlleleCounts, ClindexError>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let members = population.resolve(directory)?;
    if members.is_empty() {
        return Err(ClindexError::ZeroPopulation(population.describe()));
    }

    let mut seen: IndexSet<&str> = IndexSet::new();
    let mut counts = AlleleCounts {
        hets: 0,
        homs: 0,
        hemizygous: 0,
        allele_count: 0,
        allele_frequency: 0.0,
        total_samples: members.len(),
        invalid: Vec::new(),
    };

    for (sample, raw) in calls {
        if !members.contains(sample) || !seen.insert(sample) {
            continue;
        }
        match Genotype::parse(raw) {
            Ok(genotype) => match genotype.call() {
                GenotypeCall::Het => counts.hets += 1,
                GenotypeCall::HomAlt => counts.homs += 1,
                GenotypeCall::HemiDel => counts.hemizygous += 1,
                GenotypeCall::HomRef | GenotypeCall::Unknown => {}
            },
            Err(err) => counts.invalid.push((sample.to_string(), err.to_string())),
        }
    }

    counts.allele_count = counts.hets + 2 * counts.homs;
    counts.allele_frequency = counts.allele_count as f64 / counts.total_samples as f64;
    Ok(counts)
}

/// Samples whose call passes `filter`, in call order, each listed once.
pub fn carriers<'a, I>(calls: I, filter: GenotypeFilter) -> Vec<SampleId>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut selected = IndexSet::new();
    for (sample, raw) in calls {
        let accepted = Genotype::parse(raw)
            .map(|genotype| filter.accepts(genotype.call()))
            .unwrap_or(false);
        if accepted {
            selected.insert(sample.to_string());
        }
    }
    selected.into_iter().collect()
}
