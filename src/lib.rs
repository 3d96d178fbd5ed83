#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Allele counting, population selection and carrier listing.
pub mod alleles;
/// Annotation field reconciliation and typed coercion.
pub mod annotation;
/// Import and matching configuration types.
pub mod config;
/// Centralized constants used across stores and ingestion.
pub mod constants;
/// Composite keys, canonical records and sample link types.
pub mod data;
/// Batch identity resolution.
pub mod dedup;
/// Genotype parsing and classification.
pub mod genotype;
/// Batch import pipeline.
pub mod ingest;
/// Sample link planning and staging.
pub mod links;
/// Interval overlap arithmetic and match modes.
pub mod overlap;
/// Cross-sample queries over committed features.
pub mod query;
/// Store scope identity.
pub mod scope;
/// Canonical store traits and backends.
pub mod store;
/// Shared type aliases.
pub mod types;

mod errors;

pub use alleles::{AlleleCounts, CohortDirectory, GenotypeFilter, Population, StaticCohorts};
pub use annotation::{FieldSet, FieldType, FieldValue, ReconciledFields};
pub use config::{ExistingSamplesPolicy, IngestConfig, MatchConfig, NotSamePolicy};
pub use data::{
    CanonicalRecord, CompositeKey, FeatureExtras, JunctionKey, NewRecord, RawRecord, SampleLink,
    SampleMetrics, Strand, VariantCall, VariantImpact, VariantKey,
};
pub use dedup::{Deduplicator, Resolution};
pub use errors::ClindexError;
pub use genotype::{Allele, Genotype, GenotypeCall};
pub use ingest::{BatchReport, Ingestor, PrepReport};
pub use links::SampleLinkEngine;
pub use overlap::{Interval, MatchMode};
pub use query::{JunctionHit, Region, RegionHit};
pub use scope::{FeatureKind, StoreScope};
pub use store::{
    BatchCommit, BatchTransaction, CanonicalStore, CommitSummary, FeatureStore,
    FileFeatureStore, LinkStore, MemoryFeatureStore, StagedBatch,
};
pub use types::{CohortId, FeatureId, FieldName, SampleId};
